use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::{get, HttpResponse, Responder};
use actix_web::{web, App, HttpServer};

use sqlx::PgPool;

use tracing_actix_web::TracingLogger;

use url::Url;

use crate::catalog::Catalog;
use crate::client::TmdbClient;
use crate::controller::{feeds, webhooks};
use crate::crypto::WebhookVerifier;

/// The externally-visible base URL of this deployment, used to build the
/// self-referencing feed links and the tokenized feed URLs handed back to
/// new subscribers
#[derive(Debug, Clone)]
pub struct Site {
    base_url: Url,
}

impl Site {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn free_feed_url(&self) -> String {
        format!("{}/feeds/daily-discovery", self.trimmed_base())
    }

    pub fn feed_url(&self, token: &str) -> String {
        format!("{}/feeds/{}", self.trimmed_base(), token)
    }

    fn trimmed_base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

/// Simple health-check endpoint
#[tracing::instrument(name = "Health check")]
#[get("/health_check")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("I am alive")
}

/// Run the application on a specified TCP listener
pub fn run(
    listener: TcpListener,
    pool: PgPool,
    catalog: Catalog,
    tmdb_client: TmdbClient,
    webhook_verifier: WebhookVerifier,
    site: Site,
) -> anyhow::Result<Server> {
    // Wrap application data
    let pool = web::Data::new(pool);
    let catalog = web::Data::new(catalog);
    let tmdb_client = web::Data::new(tmdb_client);
    let webhook_verifier = web::Data::new(webhook_verifier);
    let site = web::Data::new(site);

    // Start the server
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(pool.clone())
            .app_data(catalog.clone())
            .app_data(tmdb_client.clone())
            .app_data(webhook_verifier.clone())
            .app_data(site.clone())
            .service(health_check)
            .service(feeds::scope())
            .service(webhooks::scope())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
