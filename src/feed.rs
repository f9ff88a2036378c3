mod assembler;
mod filter;

pub use self::assembler::*;
pub use self::filter::*;

use std::collections::HashMap;

use futures::StreamExt;

use crate::catalog::MovieCandidate;
use crate::client::{MovieDetails, TmdbClient};

/// How many metadata fetches may be in flight at once for one request
const ENRICH_CONCURRENCY: usize = 8;

/// Fetch details for every candidate through a bounded-width fan-out.
/// Results are keyed by TMDB id, so completion order never affects the
/// assembled feed. A failed fetch degrades to neutral defaults and is
/// logged; it never aborts the whole feed.
pub async fn enrich_all(
    tmdb: &TmdbClient,
    candidates: &[MovieCandidate],
) -> HashMap<String, MovieDetails> {
    futures::stream::iter(candidates.iter().map(|candidate| async move {
        let details = match tmdb.movie_details(&candidate.tmdb_id).await {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch details for TMDB id {}: {}",
                    candidate.tmdb_id,
                    e
                );
                MovieDetails::unavailable()
            }
        };
        (candidate.tmdb_id.clone(), details)
    }))
    .buffer_unordered(ENRICH_CONCURRENCY)
    .collect()
    .await
}
