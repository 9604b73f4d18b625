//! VidLink provider.
//!
//! No search step: the embed page is addressed by TMDB id directly. The
//! API endpoint segment rotates, so it is scraped from the page's scripts.
//! Stream descriptors may come back encrypted with the request token.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::fail_soft;
use crate::net::{browser_client, cache_buster, send_text, DESKTOP_USER_AGENT};
use crate::stream::crypto::{decrypt_envelope, looks_like_envelope};
use crate::stream::hls::{is_master_playlist, parse_master_playlist};
use crate::stream::provider::StreamProvider;
use crate::stream::registry::ProviderContext;
use crate::stream::types::{
    normalize_quality, ContentDescriptor, ContentKind, LinkKind, SearchCandidate, StreamingLink,
    Subtitle, SubtitleFormat,
};

const NAME: &str = "vidlink";
pub const DEFAULT_DOMAIN: &str = "https://vidlink.pro";
const PRIORITY: u32 = 4;
/// Endpoint segment used when none can be found in the page scripts.
const FALLBACK_ENDPOINT: &str = "b";
const FALLBACK_QUALITY: &str = "1080p";
const SKIPPED_SCRIPT_HOSTS: [&str; 3] = ["google", "facebook", "analytics"];

static API_ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/api/([A-Za-z0-9]+)/[A-Za-z]+/").expect("valid regex"));
static SCRIPT_SRC: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[src]").expect("valid selector"));

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    stream: Option<StreamInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamInfo {
    playlist: Option<String>,
    #[serde(default)]
    qualities: HashMap<String, QualityEntry>,
    #[serde(default)]
    captions: Vec<Caption>,
}

#[derive(Debug, Deserialize)]
struct QualityEntry {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Caption {
    url: Option<String>,
    language: Option<String>,
    #[serde(rename = "type")]
    format: Option<String>,
}

pub struct VidLinkProvider {
    client: Client,
    domain: String,
    token_service: String,
    extra_headers: HashMap<String, String>,
}

impl VidLinkProvider {
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        Ok(Self {
            client: browser_client(ctx.request_timeout)?,
            domain: ctx.domain_or(DEFAULT_DOMAIN),
            token_service: ctx.token_service.clone(),
            extra_headers: ctx.extra_headers(),
        })
    }

    /// Browser-like header set the player endpoints expect.
    fn direct_headers(&self) -> HashMap<String, String> {
        let mut headers: HashMap<String, String> = [
            ("User-Agent", DESKTOP_USER_AGENT),
            ("Accept", "*/*"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Sec-Fetch-Dest", "empty"),
            ("Sec-Fetch-Mode", "cors"),
            ("Sec-Fetch-Site", "cross-site"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        headers.insert("Referer".into(), format!("{}/", self.domain));
        headers.insert("Origin".into(), self.domain.clone());
        headers.extend(self.extra_headers.clone());
        headers
    }

    fn get_with(&self, url: &str, headers: &HashMap<String, String>) -> RequestBuilder {
        headers
            .iter()
            .fold(self.client.get(url), |req, (k, v)| req.header(k.as_str(), v.as_str()))
    }

    fn embed_url(&self, descriptor: &ContentDescriptor) -> String {
        match (descriptor.kind, descriptor.season, descriptor.episode) {
            (ContentKind::Series, Some(s), Some(e)) => {
                format!("{}/tv/{}/{s}/{e}", self.domain, descriptor.tmdb_id)
            }
            _ => format!("{}/movie/{}", self.domain, descriptor.tmdb_id),
        }
    }

    fn api_url(&self, endpoint: &str, token: &str, descriptor: &ContentDescriptor) -> String {
        let token = urlencoding::encode(token);
        match (descriptor.kind, descriptor.season, descriptor.episode) {
            (ContentKind::Series, Some(s), Some(e)) => {
                format!("{}/api/{endpoint}/tv/{token}/{s}/{e}?multiLang=0", self.domain)
            }
            _ => format!("{}/api/{endpoint}/movie/{token}?multiLang=0", self.domain),
        }
    }

    /// Scan first-party scripts for the current `/api/{segment}/` prefix.
    async fn find_api_endpoint(&self, embed_html: &str) -> String {
        let headers = self.direct_headers();
        for script in script_sources(embed_html, &self.domain) {
            let url = format!(
                "{script}{}t={}",
                if script.contains('?') { '&' } else { '?' },
                cache_buster()
            );
            let Ok(body) = send_text(self.get_with(&url, &headers), &url).await else {
                continue;
            };
            if let Some(endpoint) = API_ENDPOINT.captures(&body).and_then(|c| c.get(1)) {
                debug!(provider = NAME, "API endpoint '{}' from {script}", endpoint.as_str());
                return endpoint.as_str().to_string();
            }
        }
        debug!(provider = NAME, "no API endpoint in scripts, using '{FALLBACK_ENDPOINT}'");
        FALLBACK_ENDPOINT.to_string()
    }

    async fn fetch_token(&self, tmdb_id: u64) -> Result<String> {
        let url = format!("{}/vlinktoken?id={tmdb_id}", self.token_service);
        let token = send_text(self.client.get(&url), &url)
            .await
            .context("token helper")?;
        let token = token.trim();
        if token.is_empty() {
            bail!("token helper returned an empty token");
        }
        Ok(token.to_string())
    }

    /// Fetch the stream descriptor, decrypting it if it arrives as an envelope.
    async fn fetch_stream(&self, url: &str, token: &str) -> Result<StreamInfo> {
        let body = send_text(self.get_with(url, &self.direct_headers()), url).await?;
        let value: serde_json::Value = serde_json::from_str(&body).context("stream descriptor")?;
        let value = if looks_like_envelope(&value) {
            decrypt_envelope(&body, token).context("encrypted stream descriptor")?
        } else {
            value
        };
        let response: ApiResponse = serde_json::from_value(value).context("stream descriptor")?;
        response.stream.ok_or_else(|| anyhow!("response has no stream"))
    }

    /// Fetch a master playlist and return one link per variant, or a single
    /// link to the playlist itself when it cannot be expanded.
    async fn expand_playlist(
        &self,
        url: &str,
        headers: HashMap<String, String>,
    ) -> Vec<StreamingLink> {
        let variants = match send_text(self.get_with(url, &headers), url).await {
            Ok(manifest) if is_master_playlist(&manifest) => {
                parse_master_playlist(&manifest, Some(url))
            }
            Ok(_) => {
                debug!(provider = NAME, "not a master playlist, keeping a single link");
                Vec::new()
            }
            Err(e) => {
                debug!(provider = NAME, "playlist fetch failed: {e}");
                Vec::new()
            }
        };

        if variants.is_empty() {
            return vec![
                StreamingLink::new(url, FALLBACK_QUALITY, NAME, LinkKind::M3u8)
                    .with_headers(headers),
            ];
        }

        variants
            .into_iter()
            .map(|v| {
                StreamingLink::new(v.uri, &format!("{}p", v.height), NAME, LinkKind::M3u8)
                    .with_headers(headers.clone())
            })
            .collect()
    }

    async fn try_extract(
        &self,
        descriptor: &ContentDescriptor,
        candidate: &SearchCandidate,
    ) -> Result<Vec<StreamingLink>> {
        let headers = self.direct_headers();
        let embed = format!("{}?t={}", candidate.locator, cache_buster());
        let html = send_text(self.get_with(&embed, &headers), &embed)
            .await
            .context("embed page")?;
        let endpoint = self.find_api_endpoint(&html).await;

        let token = self.fetch_token(descriptor.tmdb_id).await?;
        let api = self.api_url(&endpoint, &token, descriptor);
        let stream = self.fetch_stream(&api, &token).await?;
        let subtitles = subtitles_from(&stream.captions);

        let mut links = match stream.playlist.filter(|p| !p.is_empty()) {
            Some(playlist) => {
                let (url, inline) = unwrap_playlist(&playlist);
                let link_headers = match inline {
                    Some(mut inline) => {
                        inline.insert("User-Agent".into(), DESKTOP_USER_AGENT.into());
                        inline
                    }
                    None => headers.clone(),
                };
                self.expand_playlist(&url, link_headers).await
            }
            None => quality_links(&stream.qualities, &headers),
        };

        if links.is_empty() {
            bail!("stream descriptor has neither playlist nor qualities");
        }
        for link in &mut links {
            link.subtitles.clone_from(&subtitles);
        }
        Ok(links)
    }
}

/// Absolute first-party script URLs referenced by the embed page.
fn script_sources(html: &str, domain: &str) -> Vec<String> {
    let base = Url::parse(domain).ok();
    let document = Html::parse_document(html);
    document
        .select(&SCRIPT_SRC)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| !SKIPPED_SCRIPT_HOSTS.iter().any(|h| src.contains(h)))
        .filter_map(|src| {
            if src.starts_with("http://") || src.starts_with("https://") {
                Some(src.to_string())
            } else if let Some(rest) = src.strip_prefix("//") {
                Some(format!("https://{rest}"))
            } else {
                base.as_ref()?.join(src).ok().map(String::from)
            }
        })
        .filter(|src| src.split(['?', '#']).next().is_some_and(|p| p.ends_with(".js")))
        .collect()
}

/// Undo the two wrapping schemes the API uses for playlist URLs.
///
/// - `…/m3u8/{"Referer":"…"}` carries headers as trailing JSON.
/// - `…/proxy/{encoded}?headers={…}&host=…` points through a relay.
///
/// Returns the real URL and, when present, the headers it needs.
fn unwrap_playlist(playlist: &str) -> (String, Option<HashMap<String, String>>) {
    if let Some((head, json)) = playlist.split_once("m3u8/{") {
        let url = format!("{head}m3u8");
        return match serde_json::from_str::<HashMap<String, String>>(&format!("{{{json}")) {
            Ok(headers) => (url, Some(headers)),
            Err(e) => {
                warn!(provider = NAME, "unreadable inline playlist headers: {e}");
                (url, None)
            }
        };
    }

    if let Some((_, rest)) = playlist.split_once("/proxy/") {
        let (encoded, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut host = None;
        let mut headers = None;
        for (key, value) in query.split('&').filter_map(|p| p.split_once('=')) {
            let value = urlencoding::decode(value)
                .map_or_else(|_| value.to_string(), |v| v.into_owned());
            match key {
                "host" => host = Some(value),
                "headers" => headers = serde_json::from_str::<HashMap<String, String>>(&value).ok(),
                _ => {}
            }
        }

        if let (Some(host), Some(headers)) = (host.filter(|h| !h.is_empty()), headers) {
            let path = urlencoding::decode(encoded)
                .map_or_else(|_| encoded.to_string(), |p| p.into_owned());
            let url = format!("{}/{}", host.trim_end_matches('/'), path.trim_start_matches('/'));
            return (url, Some(headers));
        }
    }

    (playlist.to_string(), None)
}

/// One link per direct quality entry, best first.
fn quality_links(
    qualities: &HashMap<String, QualityEntry>,
    headers: &HashMap<String, String>,
) -> Vec<StreamingLink> {
    let mut entries: Vec<(u32, &str, &str)> = qualities
        .iter()
        .filter_map(|(label, entry)| {
            let url = entry.url.as_deref().filter(|u| !u.is_empty())?;
            let height = label.trim_end_matches('p').parse().unwrap_or(0);
            Some((height, label.as_str(), url))
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    entries
        .into_iter()
        .map(|(_, label, url)| {
            let kind = if url.contains(".m3u8") {
                LinkKind::M3u8
            } else {
                LinkKind::Mp4
            };
            StreamingLink::new(url, &normalize_quality(label), NAME, kind)
                .with_headers(headers.clone())
        })
        .collect()
}

fn subtitles_from(captions: &[Caption]) -> Vec<Subtitle> {
    captions
        .iter()
        .filter_map(|c| {
            let url = c.url.clone().filter(|u| !u.is_empty())?;
            let language = c.language.clone().unwrap_or_else(|| "Unknown".into());
            let format = match c.format.as_deref() {
                Some(f) if f.eq_ignore_ascii_case("srt") => SubtitleFormat::Srt,
                _ if url.ends_with(".srt") => SubtitleFormat::Srt,
                _ => SubtitleFormat::Vtt,
            };
            Some(Subtitle {
                url,
                label: language.clone(),
                language,
                format,
            })
        })
        .collect()
}

#[async_trait]
impl StreamProvider for VidLinkProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn priority(&self) -> u32 {
        PRIORITY
    }

    /// Synthesizes the single candidate the embed page represents.
    async fn search(&self, descriptor: &ContentDescriptor) -> Result<Vec<SearchCandidate>> {
        Ok(vec![SearchCandidate {
            title: descriptor.title.clone(),
            year: descriptor.year,
            kind: descriptor.kind,
            locator: self.embed_url(descriptor),
            poster: None,
        }])
    }

    async fn extract_links(
        &self,
        descriptor: &ContentDescriptor,
        candidate: &SearchCandidate,
    ) -> Result<Vec<StreamingLink>> {
        fail_soft(NAME, self.try_extract(descriptor, candidate).await)
    }
}
