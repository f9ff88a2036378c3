use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use atom_syndication::LinkBuilder;
use rss::extension::atom::AtomExtensionBuilder;
use rss::{CategoryBuilder, ChannelBuilder, EnclosureBuilder, GuidBuilder, ItemBuilder};

use crate::catalog::MovieCandidate;
use crate::client::MovieDetails;

/// Channel-level metadata for an assembled feed.
/// Rendering is a pure function of the items and this struct, so callers
/// that fix `last_build_date` get byte-identical output for the same input.
#[derive(Debug, Clone)]
pub struct ChannelMeta {
    pub title: String,
    pub link: String,
    pub description: String,
    pub self_url: String,
    pub last_build_date: DateTime<Utc>,
}

/// One movie as rendered into the feed: the union of a catalog candidate
/// and its fetched details
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub external_id: String,
    pub title: String,
    pub year: Option<String>,
    pub link: String,
    pub released: String,
    pub plain_description: String,
    pub rich_description_html: String,
    pub enclosure_url: Option<String>,
    pub categories: Vec<String>,
}

impl FeedItem {
    pub fn from_parts(candidate: &MovieCandidate, details: &MovieDetails) -> Self {
        let year = (candidate.year != "Unknown Year").then(|| candidate.year.clone());

        Self {
            external_id: candidate.tmdb_id.clone(),
            title: candidate.title.clone(),
            rich_description_html: build_rich_description(
                &candidate.title,
                year.as_deref(),
                details,
            ),
            year,
            link: candidate.link(),
            released: candidate.released.clone(),
            plain_description: details.overview.clone(),
            enclosure_url: details.poster_url.clone(),
            categories: details.genres.clone(),
        }
    }

    /// The item title, with the year suffix when the year is known
    fn display_title(&self) -> String {
        match &self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }
}

/// Render an RSS 2.0 document for the given items.
/// An empty item list still yields a structurally valid channel, carrying
/// one placeholder item that explains the empty state.
pub fn render(items: &[FeedItem], meta: &ChannelMeta) -> String {
    let mut channel = ChannelBuilder::default();
    channel
        .title(meta.title.as_str())
        .link(meta.link.as_str())
        .description(meta.description.as_str())
        .language(Some("en-us".to_string()))
        .last_build_date(Some(meta.last_build_date.to_rfc2822()))
        .generator(Some(format!("movie-feeds {}", env!("CARGO_PKG_VERSION"))));

    let self_link = LinkBuilder::default()
        .href(meta.self_url.as_str())
        .rel("self")
        .mime_type(Some("application/rss+xml".to_string()))
        .build();
    channel.atom_ext(Some(
        AtomExtensionBuilder::default().links(vec![self_link]).build(),
    ));

    // Item guids carry the channel build date, so a movie keeps the same
    // guid for every fetch of the same day's feed
    let guid_date = meta.last_build_date.format("%Y-%m-%d").to_string();

    if items.is_empty() {
        channel.item(placeholder_item(meta, &guid_date));
    }
    for item in items {
        channel.item(build_item(item, &guid_date));
    }

    channel.build().to_string()
}

fn build_item(item: &FeedItem, guid_date: &str) -> rss::Item {
    let categories: Vec<_> = item
        .categories
        .iter()
        .map(|genre| CategoryBuilder::default().name(genre.as_str()).build())
        .collect();

    let mut builder = ItemBuilder::default();
    builder
        .title(Some(item.display_title()))
        .link(Some(item.link.clone()))
        .guid(Some(
            GuidBuilder::default()
                .value(format!("movie-{}-{}", item.external_id, guid_date))
                .permalink(false)
                .build(),
        ))
        .pub_date(Some(format_pub_date(&item.released)))
        .description(Some(item.plain_description.clone()))
        .content(Some(item.rich_description_html.clone()))
        .categories(categories);

    if let Some(url) = &item.enclosure_url {
        builder.enclosure(Some(
            EnclosureBuilder::default()
                .url(url.as_str())
                .mime_type("image/jpeg")
                .build(),
        ));
    }

    builder.build()
}

fn placeholder_item(meta: &ChannelMeta, guid_date: &str) -> rss::Item {
    ItemBuilder::default()
        .title(Some("No movies to show today".to_string()))
        .link(Some(meta.link.clone()))
        .guid(Some(
            GuidBuilder::default()
                .value(format!("empty-{}", guid_date))
                .permalink(false)
                .build(),
        ))
        .pub_date(Some(meta.last_build_date.to_rfc2822()))
        .description(Some(
            "No movies matched the requested filters. Check back after the next update."
                .to_string(),
        ))
        .build()
}

/// RFC-822 publication date for a catalog release date, or the literal
/// "Unknown Date" when the value does not parse as a date
fn format_pub_date(released: &str) -> String {
    NaiveDate::parse_from_str(released, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).to_rfc2822())
        .unwrap_or_else(|| "Unknown Date".into())
}

fn format_runtime(minutes: u32) -> String {
    let hours = minutes / 60;
    if hours == 0 {
        format!("{}m", minutes)
    } else {
        format!("{}h {}m", hours, minutes % 60)
    }
}

/// The rich HTML body for `content:encoded`: poster, headline facts, and
/// the streaming/trailer/recommendation extras when present
fn build_rich_description(title: &str, year: Option<&str>, details: &MovieDetails) -> String {
    let mut html = String::new();

    html.push_str("<div style=\"font-family: Arial, sans-serif; max-width: 800px;\">");
    html.push_str("<div style=\"display: flex; margin-bottom: 20px;\">");

    if let Some(poster) = &details.poster_url {
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\" style=\"width: 150px; margin-right: 20px;\">",
            poster, title
        ));
    }

    html.push_str("<div>");
    match year {
        Some(year) => html.push_str(&format!(
            "<h2 style=\"margin-top: 0;\">{} ({})</h2>",
            title, year
        )),
        None => html.push_str(&format!("<h2 style=\"margin-top: 0;\">{}</h2>", title)),
    }

    if let Some(tagline) = &details.tagline {
        html.push_str(&format!("<p style=\"font-style: italic;\">{}</p>", tagline));
    }
    html.push_str(&format!("<p>{}</p>", details.overview));

    if !details.directors.is_empty() {
        html.push_str(&format!(
            "<p><strong>Director:</strong> {}</p>",
            details.directors.join(", ")
        ));
    }
    if !details.cast.is_empty() {
        html.push_str(&format!(
            "<p><strong>Cast:</strong> {}</p>",
            details.cast.join(", ")
        ));
    }
    if !details.genres.is_empty() {
        html.push_str(&format!(
            "<p><strong>Genres:</strong> {}</p>",
            details.genres.join(", ")
        ));
    }
    if let Some(runtime) = details.runtime_minutes {
        html.push_str(&format!(
            "<p><strong>Runtime:</strong> {}</p>",
            format_runtime(runtime)
        ));
    }
    if let Some(rating) = details.vote_average {
        html.push_str(&format!("<p><strong>Rating:</strong> {:.1}/10</p>", rating));
    }
    if !details.streaming_providers.is_empty() {
        html.push_str(&format!(
            "<p><strong>Available on:</strong> {}</p>",
            details.streaming_providers.join(", ")
        ));
    }
    if let Some(trailer) = &details.trailer_url {
        html.push_str(&format!(
            "<p><strong>Trailer:</strong> <a href=\"{}\">Watch on YouTube</a></p>",
            trailer
        ));
    }

    html.push_str("</div></div>");

    if !details.recommendations.is_empty() {
        html.push_str("<div style=\"margin-top: 15px;\"><p><strong>You might also like:</strong></p><ul>");
        for movie in &details.recommendations {
            let year = movie.year.as_deref().unwrap_or("N/A");
            match movie.vote_average {
                Some(rating) => html.push_str(&format!(
                    "<li>{} ({}) - {:.1}/10</li>",
                    movie.title, year, rating
                )),
                None => html.push_str(&format!("<li>{} ({})</li>", movie.title, year)),
            }
        }
        html.push_str("</ul></div>");
    }

    html.push_str("</div>");
    html
}
