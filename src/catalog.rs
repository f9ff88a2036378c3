use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use thiserror::Error;

/// One row of the curated picks catalog
#[derive(Debug, Clone, PartialEq)]
pub struct MovieCandidate {
    pub title: String,
    pub year: String,
    pub imdb_id: Option<String>,
    pub tmdb_id: String,
    pub released: String,
    pub url: Option<String>,
}

impl MovieCandidate {
    /// The item link: the curated URL when one is present, otherwise the
    /// deterministic TMDB page for the movie
    pub fn link(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("https://www.themoviedb.org/movie/{}", self.tmdb_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog source not found: {0}")]
    Unavailable(PathBuf),

    #[error("Failed to read catalog source")]
    Read(#[from] std::io::Error),
}

/// The curated picks catalog, read fresh from disk on every request
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load all usable candidate rows, in file order.
    /// Rows without both a title and a TMDB id are dropped; rows that fail
    /// to parse are skipped with a warning rather than failing the load.
    #[tracing::instrument(name = "Load movie catalog", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Vec<MovieCandidate>, CatalogError> {
        if !self.path.exists() {
            return Err(CatalogError::Unavailable(self.path.clone()));
        }

        let file = File::open(&self.path)?;
        Ok(parse_candidates(file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: String,
    #[serde(default)]
    imdb_id: String,
    #[serde(default)]
    tmdb_id: String,
    #[serde(default)]
    released: String,
    #[serde(default)]
    url: String,
}

fn parse_candidates(reader: impl Read) -> Vec<MovieCandidate> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut candidates = Vec::new();
    for record in csv_reader.deserialize::<CatalogRow>() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Skipping unreadable catalog row: {}", e);
                continue;
            }
        };

        if row.title.is_empty() || row.tmdb_id.is_empty() {
            continue;
        }

        candidates.push(MovieCandidate {
            title: row.title,
            year: non_empty_or(row.year, "Unknown Year"),
            imdb_id: non_empty(row.imdb_id),
            tmdb_id: row.tmdb_id,
            released: non_empty_or(row.released, "Release date unknown"),
            url: non_empty(row.url),
        });
    }

    candidates
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
