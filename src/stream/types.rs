//! Content descriptors, search candidates, and resolved links.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderFailure, ResolveError};

/// Movie or TV series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    #[serde(alias = "tv")]
    Series,
}

impl ContentKind {
    /// Path segment used by the metadata API and embed URLs.
    pub fn api_segment(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "tv",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_segment())
    }
}

/// What to resolve: a movie, or one episode of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    /// Metadata-catalog (TMDB) ID.
    pub tmdb_id: u64,
    /// Alternate catalog ID, if the caller already knows it.
    pub imdb_id: Option<String>,
    pub title: String,
    pub year: Option<u16>,
    pub kind: ContentKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ContentDescriptor {
    pub fn movie(tmdb_id: u64, title: impl Into<String>, year: Option<u16>) -> Self {
        Self {
            tmdb_id,
            imdb_id: None,
            title: title.into(),
            year,
            kind: ContentKind::Movie,
            season: None,
            episode: None,
        }
    }

    pub fn episode(
        tmdb_id: u64,
        title: impl Into<String>,
        year: Option<u16>,
        season: u32,
        episode: u32,
    ) -> Self {
        Self {
            tmdb_id,
            imdb_id: None,
            title: title.into(),
            year,
            kind: ContentKind::Series,
            season: Some(season),
            episode: Some(episode),
        }
    }

    /// Reject descriptors no provider could act on.
    pub fn validate(&self) -> Result<(), ResolveError> {
        if self.tmdb_id == 0 {
            return Err(ResolveError::InvalidDescriptor("missing external ID".into()));
        }
        if self.title.trim().is_empty() {
            return Err(ResolveError::InvalidDescriptor("empty title".into()));
        }
        if self.kind == ContentKind::Series && (self.season.is_none() || self.episode.is_none()) {
            return Err(ResolveError::InvalidDescriptor(
                "series episode requires season and episode numbers".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ContentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(year) = self.year {
            write!(f, " ({year})")?;
        }
        if let (Some(s), Some(e)) = (self.season, self.episode) {
            write!(f, " S{s:02}E{e:02}")?;
        }
        Ok(())
    }
}

/// A provider's unverified search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    pub title: String,
    pub year: Option<u16>,
    pub kind: ContentKind,
    /// Provider-internal locator: a detail-page URL or opaque token.
    pub locator: String,
    pub poster: Option<String>,
}

/// Container / protocol of a playable link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Mp4,
    M3u8,
    Dash,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mp4 => "mp4",
            Self::M3u8 => "m3u8",
            Self::Dash => "dash",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Vtt,
    Srt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub url: String,
    pub language: String,
    pub label: String,
    pub format: SubtitleFormat,
}

/// Quality labels in ranking order, best first.
pub const QUALITY_ORDER: [&str; 5] = ["1080p", "720p", "480p", "360p", "unknown"];

static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*[xX]\s*(\d+)").expect("valid regex"));
static HEIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("valid regex"));

/// Normalize a provider-supplied quality hint to `{height}p` or `unknown`.
///
/// Accepts `"1080"`, `"1080p"`, `"1920x1080"`, `"FHD 1080P"` and the like.
pub fn normalize_quality(raw: &str) -> String {
    let height = RESOLUTION
        .captures(raw)
        .or_else(|| HEIGHT.captures(raw))
        .and_then(|caps| caps[1].parse::<u32>().ok());

    match height {
        Some(height) if height > 0 => format!("{height}p"),
        _ => "unknown".to_string(),
    }
}

/// Position of `quality` in [`QUALITY_ORDER`]; labels outside the table rank last.
pub fn quality_rank(quality: &str) -> usize {
    QUALITY_ORDER
        .iter()
        .position(|q| quality.contains(q))
        .unwrap_or(QUALITY_ORDER.len())
}

/// One playable stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingLink {
    pub url: String,
    /// `{height}p` or `unknown`.
    pub quality: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: LinkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtitles: Vec<Subtitle>,
}

impl StreamingLink {
    pub fn new(url: impl Into<String>, quality: &str, provider: &str, kind: LinkKind) -> Self {
        Self {
            url: url.into(),
            quality: normalize_quality(quality),
            provider: provider.to_string(),
            kind,
            headers: None,
            subtitles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = (!headers.is_empty()).then_some(headers);
        self
    }

    /// Deduplication key.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.url, &self.quality)
    }

    /// 1080p or 720p; counts toward the early-stop threshold.
    pub fn is_high_quality(&self) -> bool {
        self.quality.contains("1080") || self.quality.contains("720")
    }
}

/// Result of running one provider during a resolution.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub provider: String,
    pub links: Vec<StreamingLink>,
    pub error: Option<ProviderFailure>,
    pub elapsed: Duration,
}

impl ProviderOutcome {
    pub fn success(provider: &str, links: Vec<StreamingLink>, elapsed: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            links,
            error: None,
            elapsed,
        }
    }

    pub fn failure(provider: &str, error: ProviderFailure, elapsed: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            links: Vec::new(),
            error: Some(error),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_quality_variants() {
        assert_eq!(normalize_quality("1080"), "1080p");
        assert_eq!(normalize_quality("720p"), "720p");
        assert_eq!(normalize_quality("1920x1080"), "1080p");
        assert_eq!(normalize_quality("HD 480P"), "480p");
        assert_eq!(normalize_quality("auto"), "unknown");
        assert_eq!(normalize_quality(""), "unknown");
        assert_eq!(normalize_quality("0"), "unknown");
        assert_eq!(normalize_quality("1080p (max)"), "1080p");
    }

    #[test]
    fn quality_rank_follows_fixed_order() {
        assert_eq!(quality_rank("1080p"), 0);
        assert_eq!(quality_rank("720p"), 1);
        assert_eq!(quality_rank("360p"), 3);
        assert_eq!(quality_rank("unknown"), 4);
        assert_eq!(quality_rank("2160p"), 5);
    }

    #[test]
    fn descriptor_validation() {
        assert!(ContentDescriptor::movie(27205, "Inception", Some(2010))
            .validate()
            .is_ok());
        assert!(ContentDescriptor::movie(0, "Inception", Some(2010))
            .validate()
            .is_err());
        assert!(ContentDescriptor::movie(27205, "  ", None).validate().is_err());

        let mut ep = ContentDescriptor::episode(1399, "Game of Thrones", Some(2011), 1, 1);
        assert!(ep.validate().is_ok());
        ep.episode = None;
        assert!(matches!(
            ep.validate(),
            Err(ResolveError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn descriptor_display() {
        let ep = ContentDescriptor::episode(1399, "Game of Thrones", Some(2011), 2, 5);
        assert_eq!(ep.to_string(), "Game of Thrones (2011) S02E05");
    }

    #[test]
    fn link_serializes_with_type_field() {
        let link = StreamingLink::new("https://x/a.m3u8", "1080", "vidlink", LinkKind::M3u8);
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["type"], "m3u8");
        assert_eq!(json["quality"], "1080p");
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn empty_headers_are_dropped() {
        let link = StreamingLink::new("https://x", "720", "p", LinkKind::Mp4)
            .with_headers(HashMap::new());
        assert!(link.headers.is_none());
        assert!(link.is_high_quality());
    }

    #[test]
    fn series_kind_accepts_tv_alias() {
        let kind: ContentKind = serde_json::from_str("\"tv\"").unwrap();
        assert_eq!(kind, ContentKind::Series);
    }
}
