//! Advisory check of a descriptor against the metadata catalog (TMDB).
//!
//! Validation never blocks a resolution: without an API key, or when the
//! catalog is unreachable, every descriptor passes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::config::Configuration;
use crate::error::HttpError;
use crate::net::{browser_client, safe_request, with_retry_if};
use crate::stream::similarity::{normalize_title, similarity, years_match};
use crate::stream::types::{ContentDescriptor, ContentKind};

/// How long a fetched record is reused.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const TITLE_THRESHOLD: f64 = 0.85;

/// Authoritative facts about one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    /// Localized title first, then the original title if different.
    pub titles: Vec<String>,
    pub year: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct Details {
    title: Option<String>,
    original_title: Option<String>,
    name: Option<String>,
    original_name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
}

impl Details {
    fn into_metadata(self, kind: ContentKind) -> ContentMetadata {
        let (title, original, date) = match kind {
            ContentKind::Movie => (self.title, self.original_title, self.release_date),
            ContentKind::Series => (self.name, self.original_name, self.first_air_date),
        };
        let mut titles: Vec<String> = title.into_iter().filter(|t| !t.is_empty()).collect();
        if let Some(original) = original.filter(|o| !o.is_empty() && !titles.contains(o)) {
            titles.push(original);
        }
        ContentMetadata {
            titles,
            year: date.as_deref().and_then(year_of),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: u64,
    #[serde(flatten)]
    details: Details,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    imdb_id: Option<String>,
}

struct CacheEntry {
    metadata: ContentMetadata,
    fetched_at: Instant,
}

pub struct ContentValidator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_attempts: u32,
    retry_delay: Duration,
    cache_ttl: Duration,
    cache: RwLock<HashMap<(ContentKind, u64), CacheEntry>>,
}

impl ContentValidator {
    /// `api_key` of `None` (or blank) disables validation.
    pub fn new(base_url: &str, api_key: Option<String>) -> reqwest::Result<Self> {
        Ok(Self {
            client: browser_client(Duration::from_secs(15))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_attempts: 1,
            retry_delay: Duration::from_millis(500),
            cache_ttl: CACHE_TTL,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &Configuration) -> reqwest::Result<Self> {
        Ok(Self::new(&config.endpoints.metadata_api, config.tmdb_key().map(str::to_string))?
            .with_retries(config.max_retries, config.resolver.retry_delay()))
    }

    /// Retry transient catalog failures up to `max_attempts` times in total.
    #[must_use]
    pub fn with_retries(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Reuse fetched records for `ttl` instead of [`CACHE_TTL`].
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Option<Url> {
        let key = self.api_key.as_deref()?;
        let mut url = Url::parse(&format!("{}/{path}", self.base_url)).ok()?;
        url.query_pairs_mut()
            .append_pair("api_key", key)
            .extend_pairs(params);
        Some(url)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &Url) -> Result<T, HttpError> {
        with_retry_if(self.max_attempts, self.retry_delay, HttpError::is_transient, || {
            safe_request(&self.client, url.as_str())
        })
        .await
    }

    /// Catalog record for `tmdb_id`, cached for [`CACHE_TTL`] by default.
    pub async fn metadata(&self, tmdb_id: u64, kind: ContentKind) -> Option<ContentMetadata> {
        if let Some(entry) = self.cache.read().await.get(&(kind, tmdb_id)) {
            if entry.fetched_at.elapsed() < self.cache_ttl {
                return Some(entry.metadata.clone());
            }
        }

        let url = self.endpoint(
            &format!("{}/{tmdb_id}", kind.api_segment()),
            &[("language", "en-US")],
        )?;
        let details: Details = match self.get(&url).await {
            Ok(details) => details,
            Err(e) => {
                warn!("Metadata lookup for {kind} {tmdb_id} failed: {e}");
                return None;
            }
        };

        let metadata = details.into_metadata(kind);
        let mut cache = self.cache.write().await;
        cache.retain(|_, entry| entry.fetched_at.elapsed() < self.cache_ttl);
        cache.insert(
            (kind, tmdb_id),
            CacheEntry {
                metadata: metadata.clone(),
                fetched_at: Instant::now(),
            },
        );
        Some(metadata)
    }

    /// Whether `descriptor` agrees with the catalog. Permissive on any doubt.
    pub async fn validate(&self, descriptor: &ContentDescriptor) -> bool {
        if !self.is_enabled() {
            debug!("No metadata API key, skipping validation");
            return true;
        }
        let Some(metadata) = self.metadata(descriptor.tmdb_id, descriptor.kind).await else {
            return true;
        };

        let wanted = normalize_title(&descriptor.title);
        let title_ok = metadata.titles.iter().any(|t| {
            normalize_title(t) == wanted || similarity(t, &descriptor.title) > TITLE_THRESHOLD
        });
        let year_ok = years_match(metadata.year, descriptor.year);

        if !(title_ok && year_ok) {
            debug!(
                "Descriptor '{descriptor}' does not match catalog {:?} ({:?})",
                metadata.titles, metadata.year
            );
        }
        title_ok && year_ok
    }

    /// First catalog hit for `title`, as a descriptor.
    pub async fn search_content(
        &self,
        title: &str,
        year: Option<u16>,
        kind: ContentKind,
    ) -> Option<ContentDescriptor> {
        let year = year.map(|y| y.to_string());
        let mut params = vec![("query", title)];
        if let Some(year) = year.as_deref() {
            let key = match kind {
                ContentKind::Movie => "year",
                ContentKind::Series => "first_air_date_year",
            };
            params.push((key, year));
        }

        let url = self.endpoint(&format!("search/{}", kind.api_segment()), &params)?;
        let page: SearchPage = match self.get(&url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Catalog search for '{title}' failed: {e}");
                return None;
            }
        };

        let item = page.results.into_iter().next()?;
        let metadata = item.details.into_metadata(kind);
        Some(ContentDescriptor {
            tmdb_id: item.id,
            imdb_id: None,
            title: metadata.titles.into_iter().next()?,
            year: metadata.year,
            kind,
            season: None,
            episode: None,
        })
    }

    /// IMDb id for `tmdb_id`, if the catalog knows one.
    pub async fn imdb_id(&self, tmdb_id: u64, kind: ContentKind) -> Option<String> {
        let url = self.endpoint(&format!("{}/{tmdb_id}/external_ids", kind.api_segment()), &[])?;
        match self.get::<ExternalIds>(&url).await {
            Ok(ids) => ids.imdb_id.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!("External id lookup for {kind} {tmdb_id} failed: {e}");
                None
            }
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Year from an ISO date like `2010-07-15`.
fn year_of(date: &str) -> Option<u16> {
    date.get(..4)?.parse().ok()
}
