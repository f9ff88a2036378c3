use chrono::{DateTime, Utc};

use sqlx::PgExecutor;

/// Denormalized per-supporter record, keyed by lower-cased email.
/// Not authoritative: always recomputable from the email's subscriptions.
#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub email: String,
    pub has_active_subscription: bool,
    pub latest_subscription_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for the denormalized users table
pub struct UserRepo;

impl UserRepo {
    /// Upsert the user record after a subscription is created
    #[tracing::instrument(name = "Mark user subscribed", skip(executor))]
    pub async fn mark_subscribed<'con>(
        executor: impl PgExecutor<'con>,
        email: &str,
        subscription_id: &str,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "insert into users (email, has_active_subscription, latest_subscription_id, updated_at) \
             values ($1, true, $2, $3) \
             on conflict (email) do update \
             set has_active_subscription = true, latest_subscription_id = $2, updated_at = $3",
        )
        .bind(email)
        .bind(subscription_id)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Overwrite the re-derived active flag after a cancellation
    #[tracing::instrument(name = "Set user active flag", skip(executor))]
    pub async fn set_active_flag<'con>(
        executor: impl PgExecutor<'con>,
        email: &str,
        has_active_subscription: bool,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "update users set has_active_subscription = $2, updated_at = $3 where email = $1",
        )
        .bind(email)
        .bind(has_active_subscription)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Fetch user by email", skip(executor))]
    pub async fn find_by_email<'con>(
        executor: impl PgExecutor<'con>,
        email: &str,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>("select * from users where email = $1")
            .bind(email)
            .fetch_optional(executor)
            .await
    }
}
