use sqlx::PgExecutor;

/// Repository for feed access tracking.
/// Recording is best-effort: callers log failures and never fail the
/// request that triggered them.
pub struct AnalyticsRepo;

impl AnalyticsRepo {
    /// Append one feed access event
    #[tracing::instrument(name = "Record feed access", skip(executor))]
    pub async fn record_feed_access<'con>(
        executor: impl PgExecutor<'con>,
        feed_type: &str,
    ) -> sqlx::Result<()> {
        sqlx::query("insert into feed_access_events (feed_type) values ($1)")
            .bind(feed_type)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Bump a movie's selection counter. The upsert is a single atomic
    /// statement, so concurrent requests cannot lose updates.
    #[tracing::instrument(name = "Record movie selection", skip(executor))]
    pub async fn record_selection<'con>(
        executor: impl PgExecutor<'con>,
        tmdb_id: &str,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "insert into movie_stats (tmdb_id, selection_count) values ($1, 1) \
             on conflict (tmdb_id) do update \
             set selection_count = movie_stats.selection_count + 1, last_selected = now()",
        )
        .bind(tmdb_id)
        .execute(executor)
        .await?;
        Ok(())
    }
}
