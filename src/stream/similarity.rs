//! Title similarity used to match provider search hits against the
//! requested content.

use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Lowercase, drop punctuation, collapse runs of whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// `(maxLen - levenshtein) / maxLen` over normalized titles, in `[0, 1]`.
///
/// Two empty strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_title(a), &normalize_title(b))
}

/// `true` when the normalized titles are equal or more similar than `threshold`.
pub fn titles_match(a: &str, b: &str, threshold: f64) -> bool {
    let (a, b) = (normalize_title(a), normalize_title(b));
    a == b || strsim::normalized_levenshtein(&a, &b) > threshold
}

/// Year check shared by providers and the validator: unknown years pass,
/// known years may differ by one (regional release dates).
pub fn years_match(a: Option<u16>, b: Option<u16>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.abs_diff(b) <= 1,
        _ => true,
    }
}
