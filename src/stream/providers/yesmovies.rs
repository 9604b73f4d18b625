//! YesMovies provider.
//!
//! Title search against the site's JSON search endpoint, then a handshake
//! through the embedded player:
//!
//! 1. detail page → base64 `plyURL`
//! 2. player `/cdn-cgi/trace` → edge location
//! 3. helper service `yesgenhash` / `yesdehash` → request key
//! 4. player `/get/{key}` → stream id → `/hls/{id}/master.m3u8`

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::fail_soft;
use crate::net::{browser_client, send_json, send_text, DESKTOP_USER_AGENT};
use crate::stream::provider::StreamProvider;
use crate::stream::registry::ProviderContext;
use crate::stream::similarity::titles_match;
use crate::stream::types::{
    ContentDescriptor, ContentKind, LinkKind, SearchCandidate, StreamingLink,
};

const NAME: &str = "yesmovies";
pub const DEFAULT_DOMAIN: &str = "https://ww.yesmovies.ag";
const PRIORITY: u32 = 3;
const MATCH_THRESHOLD: f64 = 0.7;
const SEARCH_LIMIT: u32 = 40;
/// Server selector passed to the hash helper.
const SERVER_VERSION: &str = "1";

static SEASON_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)-\s*season\s*([0-9]+)").expect("valid regex"));
static MOVIE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)\.html$").expect("valid regex"));
static PLAY_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)plyURL\s*=\s*"([^"]+)""#).expect("valid regex"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    /// Display title, with a "- Season N" suffix for series.
    t: Option<String>,
    /// Slug.
    s: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayInfo {
    info: Option<String>,
}

pub struct YesMoviesProvider {
    client: Client,
    domain: String,
    token_service: String,
    extra_headers: HashMap<String, String>,
}

impl YesMoviesProvider {
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        Ok(Self {
            client: browser_client(ctx.request_timeout)?,
            domain: ctx.domain_or(DEFAULT_DOMAIN),
            token_service: ctx.token_service.clone(),
            extra_headers: ctx.extra_headers(),
        })
    }

    /// Headers sent on every request and attached to returned links.
    fn request_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::from([
            ("User-Agent".to_string(), DESKTOP_USER_AGENT.to_string()),
            ("Referer".to_string(), format!("{}/", self.domain)),
        ]);
        headers.extend(self.extra_headers.clone());
        headers
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.request_headers()
            .iter()
            .fold(self.client.get(url), |req, (k, v)| req.header(k.as_str(), v.as_str()))
    }

    fn search_url(&self, title: &str) -> String {
        let query = title
            .split_whitespace()
            .map(|w| urlencoding::encode(w).into_owned())
            .collect::<Vec<_>>()
            .join("+");
        format!(
            "{}/searching?q={query}&limit={SEARCH_LIMIT}&offset=0",
            self.domain
        )
    }

    /// Keep hits of the right kind (and season) whose base title is close enough.
    fn candidates_from(
        &self,
        hits: Vec<SearchHit>,
        descriptor: &ContentDescriptor,
    ) -> Vec<SearchCandidate> {
        hits.into_iter()
            .filter_map(|hit| {
                let (title, slug) = (hit.t?, hit.s?);
                let (base, season) = split_season(&title);
                let kind = if season.is_some() {
                    ContentKind::Series
                } else {
                    ContentKind::Movie
                };

                if kind != descriptor.kind {
                    return None;
                }
                if kind == ContentKind::Series && season != descriptor.season {
                    return None;
                }
                if !titles_match(&descriptor.title, &base, MATCH_THRESHOLD) {
                    return None;
                }

                Some(SearchCandidate {
                    title: base,
                    // search results carry no year
                    year: descriptor.year,
                    kind,
                    locator: format!("{}/movie/{slug}.html", self.domain),
                    poster: None,
                })
            })
            .collect()
    }

    async fn try_search(&self, descriptor: &ContentDescriptor) -> Result<Vec<SearchCandidate>> {
        let url = self.search_url(&descriptor.title);
        let response: SearchResponse = send_json(self.get(&url), &url).await?;
        Ok(self.candidates_from(response.data, descriptor))
    }

    /// Edge location code reported by the player's CDN.
    async fn edge_location(&self, play_url: &str) -> Result<String> {
        let url = format!("{play_url}/cdn-cgi/trace");
        let trace = send_text(self.get(&url), &url)
            .await
            .context("CDN trace")?;
        trace_field(&trace, "loc").ok_or_else(|| anyhow!("no loc in CDN trace"))
    }

    /// GET a helper-service endpoint and return its non-empty text body.
    async fn helper_text(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String> {
        let url = Url::parse_with_params(&format!("{}/{endpoint}", self.token_service), params)?;
        let body = send_text(self.client.get(url.as_str()), url.as_str())
            .await
            .with_context(|| format!("{endpoint} helper"))?;
        let body = body.trim();
        if body.is_empty() {
            bail!("{endpoint} helper returned an empty body");
        }
        Ok(body.to_string())
    }

    async fn try_extract(
        &self,
        descriptor: &ContentDescriptor,
        candidate: &SearchCandidate,
    ) -> Result<Vec<StreamingLink>> {
        let movie_id =
            movie_id(&candidate.locator).ok_or_else(|| anyhow!("no id in {}", candidate.locator))?;

        let page = send_text(self.get(&candidate.locator), &candidate.locator)
            .await
            .context("detail page")?;
        let play = play_url(&page).ok_or_else(|| anyhow!("plyURL not found on detail page"))?;
        debug!(provider = NAME, "player at {play}");

        let loc = self.edge_location(&play).await?;
        let episode = match descriptor.kind {
            ContentKind::Movie => 1,
            ContentKind::Series => descriptor.episode.unwrap_or(1),
        }
        .to_string();
        let tsx = chrono::Utc::now().timestamp().to_string();

        let hash = self
            .helper_text(
                "yesgenhash",
                &[
                    ("loc", loc.as_str()),
                    ("sv", SERVER_VERSION),
                    ("mid", movie_id),
                    ("eid", episode.as_str()),
                    ("tsx", tsx.as_str()),
                ],
            )
            .await?;
        let key = self
            .helper_text(
                "yesdehash",
                &[("loc", loc.as_str()), ("hash", hash.as_str()), ("tsx", tsx.as_str())],
            )
            .await?;

        let info_url = format!("{play}/get/{key}");
        let info: PlayInfo = send_json(self.get(&info_url), &info_url).await?;
        let stream_id = info
            .info
            .filter(|i| !i.is_empty())
            .ok_or_else(|| anyhow!("player returned no stream info"))?;

        let link = StreamingLink::new(
            format!("{play}/hls/{stream_id}/master.m3u8"),
            "1080p",
            NAME,
            LinkKind::M3u8,
        )
        .with_headers(self.request_headers());
        Ok(vec![link])
    }
}

/// Split `"Dark - Season 2"` into `("Dark", Some(2))`.
fn split_season(title: &str) -> (String, Option<u32>) {
    match SEASON_SUFFIX.captures(title) {
        Some(caps) => {
            let start = caps.get(0).map_or(title.len(), |m| m.start());
            let season = caps.get(1).and_then(|m| m.as_str().parse().ok());
            (title[..start].trim().to_string(), season)
        }
        None => (title.trim().to_string(), None),
    }
}

fn movie_id(locator: &str) -> Option<&str> {
    MOVIE_ID
        .captures(locator)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Decode the base64 player URL embedded in a detail page.
fn play_url(html: &str) -> Option<String> {
    let encoded = PLAY_URL.captures(html)?.get(1)?.as_str().trim();
    let bytes = STANDARD
        .decode(encoded)
        .or_else(|_| STANDARD_NO_PAD.decode(encoded.trim_end_matches('=')))
        .ok()?;
    let url = String::from_utf8(bytes).ok()?;
    let url = url.trim().trim_end_matches('/');
    url.starts_with("http").then(|| url.to_string())
}

/// Value of `key` in a `key=value` per-line document.
fn trace_field(text: &str, key: &str) -> Option<String> {
    text.lines()
        .filter_map(|l| l.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl StreamProvider for YesMoviesProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn priority(&self) -> u32 {
        PRIORITY
    }

    async fn search(&self, descriptor: &ContentDescriptor) -> Result<Vec<SearchCandidate>> {
        match self.try_search(descriptor).await {
            Ok(candidates) => Ok(candidates),
            Err(e) => {
                warn!(provider = NAME, "search failed: {e:#}");
                Ok(Vec::new())
            }
        }
    }

    async fn extract_links(
        &self,
        descriptor: &ContentDescriptor,
        candidate: &SearchCandidate,
    ) -> Result<Vec<StreamingLink>> {
        fail_soft(NAME, self.try_extract(descriptor, candidate).await)
    }

    fn match_threshold(&self) -> f64 {
        MATCH_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderDefinition;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> YesMoviesProvider {
        let def = ProviderDefinition::new(NAME, &server.uri(), PRIORITY, 5000);
        let ctx = ProviderContext::new(Some(def), &server.uri(), Duration::from_secs(5));
        YesMoviesProvider::new(&ctx).unwrap()
    }

    fn hit(t: &str, s: &str) -> SearchHit {
        SearchHit {
            t: Some(t.into()),
            s: Some(s.into()),
        }
    }

    #[test]
    fn season_suffix_is_split() {
        assert_eq!(split_season("Dark - Season 2"), ("Dark".into(), Some(2)));
        assert_eq!(split_season("Dark -season3"), ("Dark".into(), Some(3)));
        assert_eq!(split_season("Inception"), ("Inception".into(), None));
    }

    #[test]
    fn ids_and_trace_fields() {
        assert_eq!(movie_id("https://x/movie/inception-1234.html"), Some("1234"));
        assert_eq!(movie_id("https://x/movie/inception"), None);
        assert_eq!(trace_field("ip=1.2.3.4\nloc=FI\nvisit_scheme=https", "loc"), Some("FI".into()));
        assert_eq!(trace_field("loc=\n", "loc"), None);
    }

    #[test]
    fn play_url_is_base64_decoded() {
        let html = format!(
            r#"<script>var plyURL = "{}";</script>"#,
            STANDARD.encode("https://play.example/")
        );
        assert_eq!(play_url(&html), Some("https://play.example".into()));
        assert_eq!(play_url("<html></html>"), None);
        assert_eq!(play_url(r#"plyURL="!!notbase64""#), None);
    }

    #[test]
    fn candidates_filter_kind_season_and_title() {
        let ctx = ProviderContext::default();
        let provider = YesMoviesProvider::new(&ctx).unwrap();

        let movie = ContentDescriptor::movie(27205, "Inception", Some(2010));
        let hits = vec![
            hit("Inception", "inception-1"),
            hit("Inception - Season 1", "inception-s1-2"),
            hit("Interstellar", "interstellar-3"),
            SearchHit { t: None, s: Some("x".into()) },
        ];
        let found = provider.candidates_from(hits, &movie);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].locator, "https://ww.yesmovies.ag/movie/inception-1.html");
        assert_eq!(found[0].year, Some(2010));

        let episode = ContentDescriptor::episode(70523, "Dark", Some(2017), 2, 5);
        let hits = vec![hit("Dark - Season 1", "dark-1"), hit("Dark - Season 2", "dark-2")];
        let found = provider.candidates_from(hits, &episode);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ContentKind::Series);
        assert!(found[0].locator.ends_with("dark-2.html"));
    }

    #[tokio::test]
    async fn search_fails_soft() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/searching"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let d = ContentDescriptor::movie(27205, "Inception", Some(2010));
        assert!(provider.search(&d).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_handshake_produces_master_link() {
        let server = MockServer::start().await;
        let play = format!("{}/player", server.uri());

        Mock::given(method("GET"))
            .and(path("/searching"))
            .and(query_param("q", "Inception"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data":[{"t":"Inception","s":"inception-1234"}]}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/inception-1234.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><script>var plyURL = "{}";</script></html>"#,
                STANDARD.encode(&play)
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/player/cdn-cgi/trace"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ip=1.2.3.4\nloc=FI\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/yesgenhash"))
            .and(query_param("mid", "1234"))
            .and(query_param("eid", "1"))
            .and(query_param("loc", "FI"))
            .respond_with(ResponseTemplate::new(200).set_body_string("HASH\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/yesdehash"))
            .and(query_param("hash", "HASH"))
            .respond_with(ResponseTemplate::new(200).set_body_string("KEY"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/player/get/KEY"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"info":"abc"}"#))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let d = ContentDescriptor::movie(27205, "Inception", Some(2010));
        let candidates = provider.search(&d).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(provider.validate_content(&d, &candidates[0]));

        let links = provider.extract_links(&d, &candidates[0]).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, format!("{play}/hls/abc/master.m3u8"));
        assert_eq!(links[0].quality, "1080p");
        assert_eq!(links[0].kind, LinkKind::M3u8);
        let headers = links[0].headers.as_ref().unwrap();
        assert_eq!(headers["Referer"], format!("{}/", server.uri()));
    }

    #[tokio::test]
    async fn missing_player_yields_no_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/inception-1234.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gone</html>"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let d = ContentDescriptor::movie(27205, "Inception", Some(2010));
        let candidate = SearchCandidate {
            title: "Inception".into(),
            year: Some(2010),
            kind: ContentKind::Movie,
            locator: format!("{}/movie/inception-1234.html", server.uri()),
            poster: None,
        };
        assert!(provider.extract_links(&d, &candidate).await.unwrap().is_empty());
    }
}
