use actix_web::dev::HttpServiceFactory;
use actix_web::http::{header, StatusCode};
use actix_web::{get, web, HttpResponse, ResponseError};

use chrono::Utc;

use serde::Deserialize;

use sqlx::PgPool;

use thiserror::Error;

use crate::app::Site;
use crate::catalog::{Catalog, CatalogError, MovieCandidate};
use crate::client::{TmdbClient, TmdbError};
use crate::domain::{AccessToken, Plan};
use crate::feed::{self, ChannelMeta, FeedFilters, FeedItem, FREE_ITEM_LIMIT};
use crate::repo::{AnalyticsRepo, SubscriptionRepo};

const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// Query-string selection parameters shared by the feed endpoints
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    genre: Option<String>,
    #[serde(rename = "minRating")]
    min_rating: Option<f32>,
    #[serde(rename = "maxAge")]
    max_age: Option<u32>,
    count: Option<usize>,
    sort: Option<SortOrder>,
}

/// Upstream-ordered candidate lists available to paid tiers.
/// The selector itself never re-sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Trending,
    TopRated,
    Popularity,
}

/// The free daily discovery feed: five curated picks, enriched with TMDB
/// metadata and filtered by the optional query parameters
#[tracing::instrument(
    name = "Serve the free discovery feed",
    skip(catalog, tmdb_client, pool, site)
)]
#[get("/daily-discovery")]
async fn daily_discovery(
    query: web::Query<FeedQuery>,
    catalog: web::Data<Catalog>,
    tmdb_client: web::Data<TmdbClient>,
    pool: web::Data<PgPool>,
    site: web::Data<Site>,
) -> Result<HttpResponse, FeedError> {
    let candidates = load_catalog(&catalog)?;
    let details = feed::enrich_all(&tmdb_client, &candidates).await;

    let filters = FeedFilters {
        genre: query.genre.clone(),
        min_rating: query.min_rating.unwrap_or(0.0),
        max_age_years: query.max_age,
        limit: query.count.unwrap_or(FREE_ITEM_LIMIT).min(FREE_ITEM_LIMIT),
    };
    let items = feed::select(&candidates, &details, &filters);

    let meta = free_channel_meta(&site, query.genre.as_deref());
    let body = feed::render(&items, &meta);

    track_access(&pool, "free", &items);

    Ok(HttpResponse::Ok()
        .content_type(RSS_CONTENT_TYPE)
        .insert_header((header::CACHE_CONTROL, "public, max-age=300"))
        .body(body))
}

/// A token-gated feed. The token resolves to an active subscription, whose
/// plan sets the item limit, the usable candidate sources, and (for genre
/// packs) the forced genre.
#[tracing::instrument(
    name = "Serve a token-gated feed",
    skip(path, catalog, tmdb_client, pool, site)
)]
#[get("/{token}")]
async fn subscriber_feed(
    path: web::Path<(String,)>,
    query: web::Query<FeedQuery>,
    catalog: web::Data<Catalog>,
    tmdb_client: web::Data<TmdbClient>,
    pool: web::Data<PgPool>,
    site: web::Data<Site>,
) -> Result<HttpResponse, FeedError> {
    let (token_str,) = path.into_inner();
    let token: AccessToken = token_str.parse().map_err(|_| FeedError::InvalidToken)?;

    let subscription = SubscriptionRepo::find_active_by_token(pool.get_ref(), &token)
        .await?
        .ok_or(FeedError::InvalidToken)?;
    let plan = subscription.plan().ok_or(FeedError::UnknownPlan)?;

    // A genre pack is locked to the genre purchased with it
    let genre = if plan == Plan::GenrePack {
        subscription
            .metadata
            .get("genre")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .or_else(|| query.genre.clone())
    } else {
        query.genre.clone()
    };

    let candidates = gather_candidates(&catalog, &tmdb_client, plan, genre.as_deref(), query.sort)
        .await?;
    let details = feed::enrich_all(&tmdb_client, &candidates).await;

    let limit = plan.item_limit();
    let filters = FeedFilters {
        genre,
        min_rating: query.min_rating.unwrap_or(0.0),
        max_age_years: query.max_age,
        limit: query.count.unwrap_or(limit).min(limit),
    };
    let items = feed::select(&candidates, &details, &filters);

    let meta = subscriber_channel_meta(&site, token.as_ref());
    let body = feed::render(&items, &meta);

    track_access(&pool, plan.as_str(), &items);

    Ok(HttpResponse::Ok()
        .content_type(RSS_CONTENT_TYPE)
        .insert_header((header::CACHE_CONTROL, "private, max-age=300"))
        .body(body))
}

/// Pick the candidate source for a subscriber feed: the curated catalog by
/// default, an upstream-ordered TMDB list when the plan allows a `sort`,
/// and the genre discovery list for genre packs
async fn gather_candidates(
    catalog: &Catalog,
    tmdb_client: &TmdbClient,
    plan: Plan,
    genre: Option<&str>,
    sort: Option<SortOrder>,
) -> Result<Vec<MovieCandidate>, FeedError> {
    if plan == Plan::GenrePack {
        if let Some(genre) = genre {
            return Ok(tmdb_client.discover_by_genre(genre).await?);
        }
    }

    match sort {
        Some(sort) if plan.allows_upstream_sort() => {
            let candidates = match sort {
                SortOrder::Trending => tmdb_client.trending_movies().await?,
                SortOrder::TopRated => tmdb_client.top_rated_movies().await?,
                SortOrder::Popularity => tmdb_client.popular_movies().await?,
            };
            Ok(candidates)
        }
        _ => load_catalog(catalog),
    }
}

fn load_catalog(catalog: &Catalog) -> Result<Vec<MovieCandidate>, FeedError> {
    catalog.load().map_err(|e| match e {
        CatalogError::Unavailable(_) => FeedError::CatalogUnavailable,
        other => FeedError::CatalogRead(other),
    })
}

fn free_channel_meta(site: &Site, genre: Option<&str>) -> ChannelMeta {
    let (title, description) = match genre {
        Some(genre) => (
            format!("Daily Movie Discovery - {} Movies", genre),
            format!(
                "Daily movie recommendations in the {} genre, streamlined for Radarr.",
                genre
            ),
        ),
        None => (
            "Daily Movie Discovery".to_string(),
            "Daily movie recommendations, streamlined for Radarr. No contracts. No costs. Ever."
                .to_string(),
        ),
    };

    ChannelMeta {
        title,
        description,
        link: site.base_url().to_string(),
        self_url: site.free_feed_url(),
        last_build_date: Utc::now(),
    }
}

fn subscriber_channel_meta(site: &Site, token: &str) -> ChannelMeta {
    ChannelMeta {
        title: "Daily Movie Discovery - Premium".to_string(),
        description: "Movie recommendations based on your subscription.".to_string(),
        link: site.base_url().to_string(),
        self_url: site.feed_url(token),
        last_build_date: Utc::now(),
    }
}

/// Best-effort analytics; never fails or delays the feed response
fn track_access(pool: &web::Data<PgPool>, feed_type: &str, items: &[FeedItem]) {
    let pool = pool.get_ref().clone();
    let feed_type = feed_type.to_string();
    let ids: Vec<String> = items.iter().map(|item| item.external_id.clone()).collect();

    tokio::spawn(async move {
        if let Err(e) = AnalyticsRepo::record_feed_access(&pool, &feed_type).await {
            tracing::warn!("Failed to record feed access: {}", e);
        }
        for id in ids {
            if let Err(e) = AnalyticsRepo::record_selection(&pool, &id).await {
                tracing::warn!("Failed to record movie selection: {}", e);
            }
        }
    });
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("No movie data found")]
    CatalogUnavailable,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Error generating feed")]
    UnknownPlan,

    #[error("Error generating feed")]
    CatalogRead(#[source] CatalogError),

    #[error("Error generating feed")]
    UpstreamList(#[from] TmdbError),

    #[error("Error generating feed")]
    DatabaseError(#[from] sqlx::Error),
}

impl ResponseError for FeedError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CatalogUnavailable => StatusCode::NOT_FOUND,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::UnknownPlan
            | Self::CatalogRead(_)
            | Self::UpstreamList(_)
            | Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::InvalidToken => HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": self.to_string()})),
            other => HttpResponse::build(other.status_code())
                .content_type("application/xml; charset=utf-8")
                .body(error_feed(&other.to_string())),
        }
    }
}

/// Minimal structurally-valid channel for feed-path errors, so feed readers
/// see a parseable document instead of raw error text
fn error_feed(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <rss version=\"2.0\"><channel>\
         <title>Error</title>\
         <link>https://www.themoviedb.org/</link>\
         <description>{}</description>\
         </channel></rss>",
        message
    )
}

/// Feed API endpoints
pub fn scope() -> impl HttpServiceFactory {
    // The literal route is registered first, so it wins over the token match
    web::scope("/feeds")
        .service(daily_discovery)
        .service(subscriber_feed)
}
