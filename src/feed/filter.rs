use std::collections::HashMap;

use chrono::{Datelike, Utc};

use crate::catalog::MovieCandidate;
use crate::client::MovieDetails;

use super::FeedItem;

/// Item limit for the free feed
pub const FREE_ITEM_LIMIT: usize = 5;

/// Query-driven selection criteria applied to the enriched candidate list
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFilters {
    pub genre: Option<String>,
    pub min_rating: f32,
    pub max_age_years: Option<u32>,
    pub limit: usize,
}

impl Default for FeedFilters {
    fn default() -> Self {
        Self {
            genre: None,
            min_rating: 0.0,
            max_age_years: None,
            limit: FREE_ITEM_LIMIT,
        }
    }
}

/// Walk the candidates in their given order, keep the ones whose enriched
/// details pass every filter, and truncate to the limit. The selector never
/// re-sorts: ordering is the catalog's (or the upstream list's) to decide.
pub fn select(
    candidates: &[MovieCandidate],
    details_by_id: &HashMap<String, MovieDetails>,
    filters: &FeedFilters,
) -> Vec<FeedItem> {
    select_in_year(candidates, details_by_id, filters, Utc::now().year())
}

fn select_in_year(
    candidates: &[MovieCandidate],
    details_by_id: &HashMap<String, MovieDetails>,
    filters: &FeedFilters,
    current_year: i32,
) -> Vec<FeedItem> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let details = details_by_id.get(&candidate.tmdb_id)?;

            if let Some(genre) = &filters.genre {
                if !details.genres.iter().any(|g| g.eq_ignore_ascii_case(genre)) {
                    return None;
                }
            }

            if details.vote_average.unwrap_or(0.0) < filters.min_rating {
                return None;
            }

            if let (Some(max_age), Some(release_year)) =
                (filters.max_age_years, release_year(details))
            {
                if current_year - release_year > max_age as i32 {
                    return None;
                }
            }

            Some(FeedItem::from_parts(candidate, details))
        })
        .take(filters.limit)
        .collect()
}

fn release_year(details: &MovieDetails) -> Option<i32> {
    details
        .release_date
        .as_deref()
        .and_then(|date| date.split('-').next())
        .and_then(|year| year.parse().ok())
}
