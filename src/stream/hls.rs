//! HLS master-playlist parsing.
//!
//! Only the variant list matters here: the resolver hands variant URLs
//! straight to the player, so media playlists and segments are never read.

use std::collections::HashMap;

use url::Url;

/// One `#EXT-X-STREAM-INF` entry with a usable absolute URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsVariant {
    /// Vertical resolution in pixels.
    pub height: u32,
    /// Declared peak bitrate, 0 if absent.
    pub bandwidth: u64,
    pub uri: String,
}

/// Extract `(height, uri)` variants from master-playlist text, highest first.
///
/// Entries without a `RESOLUTION` attribute are skipped. Relative URIs are
/// resolved against `base_url` when given; entries that still have no
/// absolute `http(s)` URL are dropped. URIs lacking `.m3u8` get it appended.
pub fn parse_master_playlist(content: &str, base_url: Option<&str>) -> Vec<HlsVariant> {
    let base = base_url.and_then(|b| Url::parse(b).ok());
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .peekable();
    let mut variants = Vec::new();

    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") else {
            continue;
        };
        let attrs = parse_attributes(rest);
        // a tag here means the entry has no URI; leave the tag for the next pass
        let Some(uri_line) = lines.next_if(|l| !l.starts_with('#')) else {
            continue;
        };

        let Some(height) = attrs
            .get("RESOLUTION")
            .and_then(|r| r.split(['x', 'X']).nth(1))
            .and_then(|h| h.parse::<u32>().ok())
        else {
            continue;
        };
        let Some(mut uri) = absolute_uri(uri_line, base.as_ref()) else {
            continue;
        };
        if !uri.contains(".m3u8") {
            uri.push_str(".m3u8");
        }

        let bandwidth = attrs
            .get("BANDWIDTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        variants.push(HlsVariant {
            height,
            bandwidth,
            uri,
        });
    }

    variants.sort_by(|a, b| b.height.cmp(&a.height).then(b.bandwidth.cmp(&a.bandwidth)));
    variants
}

/// `true` if the text looks like a master playlist rather than a media one.
pub fn is_master_playlist(content: &str) -> bool {
    content.contains("#EXT-X-STREAM-INF:")
}

fn absolute_uri(raw: &str, base: Option<&Url>) -> Option<String> {
    if raw.starts_with("https://") || raw.starts_with("http://") {
        return Some(raw.to_string());
    }
    let joined = base?.join(raw).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Parse an attribute list like `BANDWIDTH=1280000,CODECS="avc1,mp4a"`.
fn parse_attributes(attr_str: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut chars = attr_str.chars().peekable();

    while chars.peek().is_some() {
        let key: String = chars.by_ref().take_while(|&c| c != '=').collect();
        if key.is_empty() {
            break;
        }

        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let v: String = chars.by_ref().take_while(|&c| c != '"').collect();
            // separator after the closing quote
            chars.next();
            v
        } else {
            chars.by_ref().take_while(|&c| c != ',').collect()
        };

        attrs.insert(key.trim().to_string(), value.trim().to_string());
    }

    attrs
}
