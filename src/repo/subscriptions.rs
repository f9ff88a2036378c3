use chrono::{DateTime, Utc};

use serde_json::Value;

use sqlx::{PgExecutor, PgPool};

use crate::domain::{AccessToken, EmailAddress, Plan};

use super::UserRepo;

/// A qualifying provider event, ready to be recorded
#[derive(Debug)]
pub struct NewSubscription {
    pub email: EmailAddress,
    pub plan: Plan,
    pub source: String,
    pub provider_subscription_id: Option<String>,
    pub metadata: Value,
}

/// Stored subscription record
#[derive(Debug, sqlx::FromRow)]
pub struct Subscription {
    /// Derived from the source and the creation timestamp
    pub id: String,
    /// Lower-cased supporter email
    pub email: String,
    pub plan_id: String,
    pub source: String,
    /// `active` or `cancelled`
    pub status: String,
    /// Opaque bearer token embedded in the subscriber's feed URL
    pub token: String,
    /// The provider's own reference for the subscription, kept so
    /// cancellation events can be resolved back to this record
    pub provider_subscription_id: Option<String>,
    /// Free-form provider event context
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    /// Fixed at creation from the plan cadence, never recomputed
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn plan(&self) -> Option<Plan> {
        self.plan_id.parse().ok()
    }
}

/// Receipt handed back to the webhook caller after recording a subscription
#[derive(Debug)]
pub struct CreatedSubscription {
    pub id: String,
    pub token: AccessToken,
    pub expires_at: DateTime<Utc>,
}

/// Repository for the subscription and denormalized user tables
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Record a subscription and refresh the supporter's user record.
    /// Both writes share one transaction, so a failure leaves no
    /// half-applied Subscription/User pair behind.
    #[tracing::instrument(name = "Create subscription", skip(pool))]
    pub async fn create(
        pool: &PgPool,
        new_subscription: &NewSubscription,
    ) -> sqlx::Result<CreatedSubscription> {
        let created_at = Utc::now();
        let expires_at = created_at + new_subscription.plan.term();
        let id = format!(
            "{}_{}",
            new_subscription.source,
            created_at.timestamp_millis()
        );
        let token = AccessToken::generate();

        let mut tx = pool.begin().await?;

        sqlx::query(
            "insert into subscriptions \
             (id, email, plan_id, source, status, token, provider_subscription_id, metadata, created_at, expires_at) \
             values ($1, $2, $3, $4, 'active', $5, $6, $7, $8, $9)",
        )
        .bind(&id)
        .bind(new_subscription.email.as_ref())
        .bind(new_subscription.plan.as_str())
        .bind(&new_subscription.source)
        .bind(token.as_ref())
        .bind(&new_subscription.provider_subscription_id)
        .bind(&new_subscription.metadata)
        .bind(created_at)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        UserRepo::mark_subscribed(&mut *tx, new_subscription.email.as_ref(), &id).await?;

        tx.commit().await?;

        Ok(CreatedSubscription {
            id,
            token,
            expires_at,
        })
    }

    /// The active, unexpired subscription matching a token, if any.
    /// The token match is exact and case-sensitive.
    #[tracing::instrument(name = "Find subscription by token", skip(executor, token))]
    pub async fn find_active_by_token<'con>(
        executor: impl PgExecutor<'con>,
        token: &AccessToken,
    ) -> sqlx::Result<Option<Subscription>> {
        sqlx::query_as::<_, Subscription>(
            "select * from subscriptions \
             where token = $1 and status = 'active' and expires_at > $2",
        )
        .bind(token.as_ref())
        .bind(Utc::now())
        .fetch_optional(executor)
        .await
    }

    /// Cancel a subscription, then re-derive the user's active flag from
    /// any remaining active, unexpired subscription for the same email
    #[tracing::instrument(name = "Cancel subscription", skip(pool))]
    pub async fn cancel(pool: &PgPool, id: &str) -> sqlx::Result<()> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let cancelled: Option<(String,)> = sqlx::query_as(
            "update subscriptions set status = 'cancelled', cancelled_at = $2 \
             where id = $1 returning email",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((email,)) = cancelled {
            let (still_active,): (bool,) = sqlx::query_as(
                "select exists(\
                 select 1 from subscriptions \
                 where email = $1 and status = 'active' and expires_at > $2)",
            )
            .bind(&email)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            UserRepo::set_active_flag(&mut *tx, &email, still_active).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Resolve a provider's subscription reference to the internal record
    /// and cancel it. Returns the cancelled internal id, or `None` when no
    /// active record matches the reference.
    #[tracing::instrument(name = "Cancel subscription by provider id", skip(pool))]
    pub async fn cancel_by_provider_id(
        pool: &PgPool,
        source: &str,
        provider_subscription_id: &str,
    ) -> sqlx::Result<Option<String>> {
        let found: Option<(String,)> = sqlx::query_as(
            "select id from subscriptions \
             where source = $1 and provider_subscription_id = $2 and status = 'active' \
             order by created_at desc limit 1",
        )
        .bind(source)
        .bind(provider_subscription_id)
        .fetch_optional(pool)
        .await?;

        match found {
            Some((id,)) => {
                Self::cancel(pool, &id).await?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}
