use std::time::Duration;

use anyhow::Context;

use reqwest::{Client, StatusCode};

use secrecy::{ExposeSecret, Secret};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use thiserror::Error;

use url::Url;

use crate::catalog::MovieCandidate;

const POSTER_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const BACKDROP_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w1280";

/// Sub-resources composed into the movie details request
const APPEND_TO_RESPONSE: &str = "credits,keywords,recommendations,watch/providers,videos";

/// Streaming availability is reported for this region only
const WATCH_REGION: &str = "US";

const TOP_CAST_COUNT: usize = 5;
const RECOMMENDATION_COUNT: usize = 5;

/// Minimum vote count for discovery queries, to keep barely-rated movies out
const DISCOVER_MIN_VOTE_COUNT: &str = "100";

#[derive(Debug, Error)]
pub enum TmdbError {
    #[error("TMDB request failed")]
    Request(#[from] reqwest::Error),

    #[error("TMDB API returned status {0}")]
    Status(StatusCode),

    #[error("Failed to build TMDB request URL")]
    Url(#[from] url::ParseError),

    #[error("Unknown genre: {0}")]
    UnknownGenre(String),
}

/// Descriptive metadata fetched for one movie
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovieDetails {
    pub overview: String,
    pub tagline: Option<String>,
    pub release_date: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub vote_average: Option<f32>,
    pub genres: Vec<String>,
    pub directors: Vec<String>,
    pub cast: Vec<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub streaming_providers: Vec<String>,
    pub trailer_url: Option<String>,
    pub recommendations: Vec<MovieSummary>,
}

impl MovieDetails {
    /// Neutral stand-in used when enrichment fails for one candidate.
    /// The feed pipeline renders these instead of aborting the request.
    pub fn unavailable() -> Self {
        Self {
            overview: "Description not available.".into(),
            ..Self::default()
        }
    }
}

/// A lightweight movie reference used in recommendation lists
#[derive(Debug, Clone, PartialEq)]
pub struct MovieSummary {
    pub title: String,
    pub year: Option<String>,
    pub vote_average: Option<f32>,
}

/// REST client for the TMDB catalog API
#[derive(Debug)]
pub struct TmdbClient {
    client: Client,
    api_base_url: Url,
    api_key: Secret<String>,
}

impl TmdbClient {
    pub fn new(
        api_base_url: Url,
        api_key: Secret<String>,
        api_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(api_timeout)
            .build()
            .context("Failed to build http client")?;

        Ok(Self {
            client,
            api_base_url,
            api_key,
        })
    }

    /// Fetch full details for one movie, with credits, streaming
    /// availability, trailers, and recommendations composed into the
    /// single response. One attempt; the caller decides how to degrade.
    #[tracing::instrument(name = "Fetch movie details", skip(self))]
    pub async fn movie_details(&self, tmdb_id: &str) -> Result<MovieDetails, TmdbError> {
        let response: MovieResponse = self
            .get_json(
                &format!("movie/{}", tmdb_id),
                &[("append_to_response", APPEND_TO_RESPONSE)],
            )
            .await?;

        Ok(response.into())
    }

    /// This week's trending movies, in upstream order
    #[tracing::instrument(name = "Fetch trending movies", skip(self))]
    pub async fn trending_movies(&self) -> Result<Vec<MovieCandidate>, TmdbError> {
        let response: ListResponse = self.get_json("trending/movie/week", &[]).await?;

        Ok(response.into_candidates())
    }

    /// Top-rated movies, in upstream order
    #[tracing::instrument(name = "Fetch top rated movies", skip(self))]
    pub async fn top_rated_movies(&self) -> Result<Vec<MovieCandidate>, TmdbError> {
        let response: ListResponse = self.get_json("movie/top_rated", &[]).await?;

        Ok(response.into_candidates())
    }

    /// Currently popular movies, in upstream order
    #[tracing::instrument(name = "Fetch popular movies", skip(self))]
    pub async fn popular_movies(&self) -> Result<Vec<MovieCandidate>, TmdbError> {
        let response: ListResponse = self.get_json("movie/popular", &[]).await?;

        Ok(response.into_candidates())
    }

    /// Discover movies in a named genre, ordered by popularity
    #[tracing::instrument(name = "Discover movies by genre", skip(self))]
    pub async fn discover_by_genre(&self, genre: &str) -> Result<Vec<MovieCandidate>, TmdbError> {
        let genre_id = self
            .genre_id(genre)
            .await?
            .ok_or_else(|| TmdbError::UnknownGenre(genre.to_string()))?;

        let response: ListResponse = self
            .get_json(
                "discover/movie",
                &[
                    ("with_genres", genre_id.to_string().as_str()),
                    ("sort_by", "popularity.desc"),
                    ("vote_count.gte", DISCOVER_MIN_VOTE_COUNT),
                ],
            )
            .await?;

        Ok(response.into_candidates())
    }

    /// Resolve a genre name to its TMDB id, case-insensitively
    async fn genre_id(&self, name: &str) -> Result<Option<u32>, TmdbError> {
        let response: GenreListResponse = self.get_json("genre/movie/list", &[]).await?;

        Ok(response
            .genres
            .into_iter()
            .find(|genre| genre.name.eq_ignore_ascii_case(name))
            .map(|genre| genre.id))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, TmdbError> {
        let url = self.api_base_url.join(path)?;

        let response = self
            .client
            .get(url)
            .query(&[
                ("api_key", self.api_key.expose_secret().as_str()),
                ("language", "en-US"),
            ])
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TmdbError::Status(response.status()));
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct MovieResponse {
    overview: Option<String>,
    tagline: Option<String>,
    release_date: Option<String>,
    runtime: Option<u32>,
    vote_average: Option<f32>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    #[serde(default)]
    genres: Vec<GenreEntry>,
    credits: Option<CreditsResponse>,
    #[serde(rename = "watch/providers")]
    watch_providers: Option<WatchProvidersResponse>,
    videos: Option<VideosResponse>,
    recommendations: Option<RecommendationsResponse>,
}

#[derive(Debug, Deserialize)]
struct GenreEntry {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    #[serde(default)]
    genres: Vec<GenreEntry>,
}

#[derive(Debug, Deserialize)]
struct CreditsResponse {
    #[serde(default)]
    cast: Vec<CastEntry>,
    #[serde(default)]
    crew: Vec<CrewEntry>,
}

#[derive(Debug, Deserialize)]
struct CastEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CrewEntry {
    name: String,
    job: String,
}

#[derive(Debug, Deserialize)]
struct WatchProvidersResponse {
    #[serde(default)]
    results: std::collections::HashMap<String, RegionProviders>,
}

#[derive(Debug, Deserialize)]
struct RegionProviders {
    #[serde(default)]
    flatrate: Vec<ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    provider_name: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    results: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    key: String,
    site: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    results: Vec<ListedMovie>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<ListedMovie>,
}

#[derive(Debug, Deserialize)]
struct ListedMovie {
    id: u64,
    title: Option<String>,
    release_date: Option<String>,
    vote_average: Option<f32>,
}

impl ListedMovie {
    fn year(&self) -> Option<String> {
        self.release_date
            .as_deref()
            .filter(|date| !date.is_empty())
            .and_then(|date| date.split('-').next())
            .map(str::to_string)
    }
}

impl ListResponse {
    fn into_candidates(self) -> Vec<MovieCandidate> {
        self.results
            .into_iter()
            .filter_map(|movie| {
                let year = movie.year();
                let title = movie.title.filter(|title| !title.is_empty())?;
                Some(MovieCandidate {
                    title,
                    year: year.unwrap_or_else(|| "Unknown Year".into()),
                    imdb_id: None,
                    tmdb_id: movie.id.to_string(),
                    released: movie
                        .release_date
                        .filter(|date| !date.is_empty())
                        .unwrap_or_else(|| "Release date unknown".into()),
                    url: None,
                })
            })
            .collect()
    }
}

impl From<MovieResponse> for MovieDetails {
    fn from(response: MovieResponse) -> Self {
        let directors = response
            .credits
            .as_ref()
            .map(|credits| {
                credits
                    .crew
                    .iter()
                    .filter(|person| person.job == "Director")
                    .map(|person| person.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        let cast = response
            .credits
            .as_ref()
            .map(|credits| {
                credits
                    .cast
                    .iter()
                    .take(TOP_CAST_COUNT)
                    .map(|actor| actor.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        let streaming_providers = response
            .watch_providers
            .and_then(|mut providers| providers.results.remove(WATCH_REGION))
            .map(|region| {
                region
                    .flatrate
                    .into_iter()
                    .map(|provider| provider.provider_name)
                    .collect()
            })
            .unwrap_or_default();

        let trailer_url = response.videos.and_then(|videos| {
            videos
                .results
                .into_iter()
                .find(|video| video.kind == "Trailer" && video.site == "YouTube")
                .map(|video| format!("https://www.youtube.com/watch?v={}", video.key))
        });

        let recommendations = response
            .recommendations
            .map(|recs| {
                recs.results
                    .into_iter()
                    .take(RECOMMENDATION_COUNT)
                    .filter_map(|movie| {
                        let year = movie.year();
                        movie.title.map(|title| MovieSummary {
                            title,
                            year,
                            vote_average: movie.vote_average,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            overview: response
                .overview
                .filter(|overview| !overview.is_empty())
                .unwrap_or_else(|| "Description not available.".into()),
            tagline: response.tagline.filter(|tagline| !tagline.is_empty()),
            release_date: response.release_date.filter(|date| !date.is_empty()),
            runtime_minutes: response.runtime.filter(|runtime| *runtime > 0),
            vote_average: response.vote_average.filter(|avg| *avg > 0.0),
            genres: response.genres.into_iter().map(|genre| genre.name).collect(),
            directors,
            cast,
            poster_url: response
                .poster_path
                .map(|path| format!("{}{}", POSTER_IMAGE_BASE, path)),
            backdrop_url: response
                .backdrop_path
                .map(|path| format!("{}{}", BACKDROP_IMAGE_BASE, path)),
            streaming_providers,
            trailer_url,
            recommendations,
        }
    }
}
