use actix_web::dev::HttpServiceFactory;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use serde::{Deserialize, Serialize};

use serde_json::json;

use sqlx::PgPool;

use thiserror::Error;

use crate::app::Site;
use crate::crypto::{SignatureError, WebhookVerifier};
use crate::domain::{EmailAddress, Plan};
use crate::repo::{NewSubscription, SubscriptionRepo};

/// The only payment provider currently wired up
const PROVIDER_SOURCE: &str = "buymeacoffee";

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

/// JSON response body for every webhook outcome
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(rename = "feedUrl", skip_serializing_if = "Option::is_none")]
    feed_url: Option<String>,
}

/// The provider's loosely-typed body, validated into a closed set of
/// variants at the boundary. Unknown-but-well-formed event types stay
/// representable so they can be acknowledged instead of rejected.
#[derive(Debug)]
enum WebhookEvent {
    SubscriptionCreated(MembershipPayload),
    SubscriptionUpdated(UpdatePayload),
    SubscriptionCancelled(CancellationPayload),
    SupportCreated(SupportPayload),
    Unhandled(String),
}

#[derive(Debug, Deserialize)]
struct MembershipPayload {
    supporter_email: String,
    #[serde(default)]
    membership_level_name: String,
    #[serde(default)]
    amount: f64,
    subscription_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatePayload {
    #[serde(default)]
    #[allow(dead_code)]
    subscription_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancellationPayload {
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct SupportPayload {
    supporter_email: String,
    #[serde(default)]
    amount: f64,
    support_note: Option<String>,
}

impl WebhookEvent {
    fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            event_type: String,
            #[serde(default)]
            data: serde_json::Value,
        }

        let envelope: Envelope = serde_json::from_slice(body)?;

        Ok(match envelope.event_type.as_str() {
            "subscription_created" | "membership_created" => {
                Self::SubscriptionCreated(serde_json::from_value(envelope.data)?)
            }
            "subscription_updated" => Self::SubscriptionUpdated(serde_json::from_value(envelope.data)?),
            "subscription_cancelled" => {
                Self::SubscriptionCancelled(serde_json::from_value(envelope.data)?)
            }
            "support_created" => Self::SupportCreated(serde_json::from_value(envelope.data)?),
            _ => Self::Unhandled(envelope.event_type),
        })
    }
}

/// Payment provider event sink. The signature covers the timestamp and the
/// raw body; nothing is processed until it checks out.
#[tracing::instrument(
    name = "Receive provider webhook",
    skip(req, body, pool, verifier, site)
)]
async fn receive(
    req: HttpRequest,
    body: web::Bytes,
    pool: web::Data<PgPool>,
    verifier: web::Data<WebhookVerifier>,
    site: web::Data<Site>,
) -> Result<HttpResponse, WebhookError> {
    let signature = header_value(&req, SIGNATURE_HEADER).ok_or(WebhookError::MissingAuth)?;
    let timestamp: i64 = header_value(&req, TIMESTAMP_HEADER)
        .and_then(|value| value.parse().ok())
        .ok_or(WebhookError::MissingAuth)?;

    verifier.verify(timestamp, &body, &signature)?;

    let event = WebhookEvent::from_body(&body).map_err(WebhookError::BadPayload)?;

    let response = match event {
        WebhookEvent::SubscriptionCreated(payload) => {
            handle_membership(&pool, &site, payload).await?
        }
        WebhookEvent::SupportCreated(payload) => handle_support(&pool, &site, payload).await?,
        WebhookEvent::SubscriptionCancelled(payload) => {
            handle_cancellation(&pool, payload).await?
        }
        WebhookEvent::SubscriptionUpdated(_) => {
            // Nothing to apply: the provider defines no renewal semantics
            // for this event, only a notification
            tracing::warn!("subscription_updated received; acknowledged without state change");
            WebhookResponse {
                success: true,
                message: Some("subscription_updated acknowledged; no state change applied".into()),
                feed_url: None,
            }
        }
        WebhookEvent::Unhandled(event_type) => {
            tracing::info!("Acknowledging unhandled webhook event type {}", event_type);
            WebhookResponse {
                success: true,
                message: Some(format!("Unhandled event type: {}", event_type)),
                feed_url: None,
            }
        }
    };

    Ok(HttpResponse::Ok().json(response))
}

#[tracing::instrument(name = "Handle membership event", skip(pool, site))]
async fn handle_membership(
    pool: &PgPool,
    site: &Site,
    payload: MembershipPayload,
) -> Result<WebhookResponse, WebhookError> {
    let email: EmailAddress = payload
        .supporter_email
        .parse()
        .map_err(WebhookError::InvalidField)?;
    let plan = Plan::from_membership(&payload.membership_level_name, payload.amount);

    let new_subscription = NewSubscription {
        email,
        plan,
        source: PROVIDER_SOURCE.into(),
        provider_subscription_id: payload.subscription_id,
        metadata: json!({
            "membership_level_name": payload.membership_level_name,
            "amount": payload.amount,
        }),
    };
    let created = SubscriptionRepo::create(pool, &new_subscription).await?;

    Ok(WebhookResponse {
        success: true,
        message: Some(format!("Subscribed to {}", plan)),
        feed_url: Some(site.feed_url(created.token.as_ref())),
    })
}

#[tracing::instrument(name = "Handle one-time support event", skip(pool, site))]
async fn handle_support(
    pool: &PgPool,
    site: &Site,
    payload: SupportPayload,
) -> Result<WebhookResponse, WebhookError> {
    let email: EmailAddress = payload
        .supporter_email
        .parse()
        .map_err(WebhookError::InvalidField)?;

    match genre_pack_genre(payload.support_note.as_deref()) {
        Some(genre) => {
            let new_subscription = NewSubscription {
                email,
                plan: Plan::GenrePack,
                source: PROVIDER_SOURCE.into(),
                provider_subscription_id: None,
                metadata: json!({
                    "genre": genre,
                    "note": payload.support_note,
                    "amount": payload.amount,
                }),
            };
            let created = SubscriptionRepo::create(pool, &new_subscription).await?;

            Ok(WebhookResponse {
                success: true,
                message: Some(format!("Genre pack unlocked: {}", genre)),
                feed_url: Some(site.feed_url(created.token.as_ref())),
            })
        }
        None => {
            let new_subscription = NewSubscription {
                email,
                plan: Plan::OneTimeSupport,
                source: PROVIDER_SOURCE.into(),
                provider_subscription_id: None,
                metadata: json!({
                    "note": payload.support_note,
                    "amount": payload.amount,
                }),
            };
            SubscriptionRepo::create(pool, &new_subscription).await?;

            Ok(WebhookResponse {
                success: true,
                message: Some("Thanks for the support!".into()),
                feed_url: None,
            })
        }
    }
}

#[tracing::instrument(name = "Handle cancellation event", skip(pool))]
async fn handle_cancellation(
    pool: &PgPool,
    payload: CancellationPayload,
) -> Result<WebhookResponse, WebhookError> {
    let cancelled =
        SubscriptionRepo::cancel_by_provider_id(pool, PROVIDER_SOURCE, &payload.subscription_id)
            .await?;

    Ok(match cancelled {
        Some(id) => WebhookResponse {
            success: true,
            message: Some(format!("Cancelled subscription {}", id)),
            feed_url: None,
        },
        // Acknowledged with 200 either way, so the provider stops retrying;
        // the miss is called out instead of reported as a success
        None => WebhookResponse {
            success: false,
            message: Some(format!(
                "No active subscription matches provider reference {}",
                payload.subscription_id
            )),
            feed_url: None,
        },
    })
}

/// A `genre: <name>` line in the support note selects the genre-pack plan
fn genre_pack_genre(note: Option<&str>) -> Option<String> {
    let note = note?;
    for line in note.lines() {
        let line = line.trim();
        if line.len() >= 6 && line[..6].eq_ignore_ascii_case("genre:") {
            let genre = line[6..].trim();
            if !genre.is_empty() {
                return Some(genre.to_string());
            }
        }
    }
    None
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({"error": "Method Not Allowed"}))
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Forbidden")]
    MissingAuth,

    #[error("Forbidden")]
    AuthFailure(#[from] SignatureError),

    #[error("Forbidden")]
    BadPayload(#[source] serde_json::Error),

    #[error("Forbidden")]
    InvalidField(String),

    #[error("Internal Server Error")]
    DatabaseError(#[from] sqlx::Error),
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuth
            | Self::AuthFailure(_)
            | Self::BadPayload(_)
            | Self::InvalidField(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({"error": self.to_string()}))
    }
}

/// Webhook API endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/webhooks").service(
        web::resource("/buymeacoffee")
            .route(web::post().to(receive))
            .route(web::route().to(method_not_allowed)),
    )
}
