use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use reqwest::{Client, Method, Response};

use secrecy::Secret;

use serde_json::json;

use sqlx::PgPool;

use tempfile::NamedTempFile;

use url::Url;

use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use movie_feeds::app::{self, Site};
use movie_feeds::catalog::Catalog;
use movie_feeds::client::TmdbClient;
use movie_feeds::controller::webhooks::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use movie_feeds::crypto::WebhookVerifier;

pub const DEFAULT_CATALOG: &str = "\
title,year,imdb_id,tmdb_id,released,url\n\
Arrival,2016,tt2543164,329865,2016-11-11,\n";

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

pub struct TestApp {
    addr: String,

    pub client: Client,
    pub tmdb_server: MockServer,
    pub verifier: WebhookVerifier,

    // Keeps the on-disk catalog alive for the lifetime of the app
    catalog_file: NamedTempFile,
}

impl TestApp {
    pub async fn spawn(pool: &PgPool) -> Self {
        Self::spawn_with_catalog(pool, DEFAULT_CATALOG).await
    }

    pub async fn spawn_with_catalog(pool: &PgPool, catalog_csv: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to listen on random port");
        let port = listener.local_addr().unwrap().port();

        let addr = format!("http://127.0.0.1:{}", port);

        let tmdb_server = MockServer::start().await;

        let tmdb_client = {
            let api_base_url =
                Url::parse(&tmdb_server.uri()).expect("Failed to parse mock server uri");
            let api_key = Secret::new("test-key".into());

            TmdbClient::new(api_base_url, api_key, Duration::from_secs(2))
                .expect("Failed to create TMDB client")
        };

        let mut catalog_file = NamedTempFile::new().expect("Failed to create catalog file");
        write!(catalog_file, "{}", catalog_csv).expect("Failed to write catalog file");
        let catalog = Catalog::new(catalog_file.path());

        let verifier = {
            let secret = Secret::new(WEBHOOK_SECRET.to_string());
            WebhookVerifier::new(&secret, chrono::Duration::minutes(5))
                .expect("Failed to create webhook verifier")
        };

        let site = Site::new(Url::parse(&addr).expect("Failed to parse app address"));

        let server = app::run(
            listener,
            pool.clone(),
            catalog,
            tmdb_client,
            verifier.clone(),
            site,
        )
        .expect("Failed to spawn app instance");
        let _ = tokio::spawn(server);

        let client = Client::new();

        Self {
            addr,
            client,
            tmdb_server,
            verifier,
            catalog_file,
        }
    }

    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", &self.addr, url);
        self.client.request(method, url)
    }

    pub async fn health_check(&self) -> reqwest::Result<Response> {
        self.request(Method::GET, "health_check").send().await
    }

    pub async fn get_feed(&self, path_and_query: &str) -> reqwest::Result<Response> {
        self.request(Method::GET, path_and_query).send().await
    }

    /// POST a webhook body with a freshly computed, valid signature
    pub async fn post_webhook_signed(
        &self,
        body: &serde_json::Value,
    ) -> reqwest::Result<Response> {
        let body = body.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.verifier.sign(timestamp, body.as_bytes());

        self.post_webhook_raw(body, &signature, timestamp).await
    }

    /// POST a webhook body with the given signature and timestamp headers
    pub async fn post_webhook_raw(
        &self,
        body: String,
        signature: &str,
        timestamp: i64,
    ) -> reqwest::Result<Response> {
        self.request(Method::POST, "webhooks/buymeacoffee")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
    }

    /// Delete the catalog file out from under the app
    pub fn remove_catalog(&self) {
        std::fs::remove_file(self.catalog_file.path()).expect("Failed to remove catalog file");
    }
}

/// TMDB details body for Arrival (tmdb id 329865), matching the default
/// catalog row
pub fn arrival_details() -> serde_json::Value {
    json!({
        "id": 329865,
        "title": "Arrival",
        "overview": "Taking place after alien crafts land around the world...",
        "release_date": "2016-11-11",
        "runtime": 116,
        "vote_average": 8.0,
        "genres": [{"id": 18, "name": "Drama"}, {"id": 878, "name": "Sci-Fi"}],
        "credits": {
            "cast": [{"name": "Amy Adams"}],
            "crew": [{"name": "Denis Villeneuve", "job": "Director"}]
        }
    })
}

/// Mount the Arrival details response on the mock TMDB server
pub async fn mount_arrival_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/movie/329865"))
        .respond_with(ResponseTemplate::new(200).set_body_json(arrival_details()))
        .mount(server)
        .await;
}

/// Mount a catch-all details response for any movie id
pub async fn mount_generic_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/movie/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 0,
            "overview": "A movie.",
            "vote_average": 7.0,
            "genres": [{"id": 18, "name": "Drama"}]
        })))
        .mount(server)
        .await;
}
