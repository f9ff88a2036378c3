use std::net::TcpListener;

use anyhow::Context;

use sqlx::PgPool;

use movie_feeds::app::{self, Site};
use movie_feeds::catalog::Catalog;
use movie_feeds::client::TmdbClient;
use movie_feeds::crypto::WebhookVerifier;
use movie_feeds::settings::Settings;
use movie_feeds::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::create_subscriber("info", std::io::stdout);
    telemetry::set_subscriber(subscriber)?;

    let settings = Settings::load().expect("Failed to load settings");

    let pool = PgPool::connect_with(settings.database.with_db())
        .await
        .context("Failed to connect to the database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let catalog = Catalog::new(settings.catalog.path());
    let tmdb_client = TmdbClient::new(
        settings.tmdb.api_base_url(),
        settings.tmdb.api_key(),
        settings.tmdb.api_timeout(),
    )?;
    let webhook_verifier =
        WebhookVerifier::new(settings.webhook.secret(), settings.webhook.tolerance())?;
    let site = Site::new(settings.app.base_url());

    let listener = TcpListener::bind(settings.app.addr())?;

    app::run(listener, pool, catalog, tmdb_client, webhook_verifier, site)?
        .await
        .context("Failed to run app")
}
