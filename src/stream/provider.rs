//! Stream provider trait.
//!
//! A [`StreamProvider`] knows how to find one title on a specific
//! third-party source and turn it into playable [`StreamingLink`]s.
//! Providers are expected to be unreliable: the resolver treats every
//! error as "no links from this source" and moves on.

use anyhow::Result;
use async_trait::async_trait;

use super::similarity::{titles_match, years_match};
use super::types::{ContentDescriptor, SearchCandidate, StreamingLink};

/// Contract implemented by every content source.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Short lowercase provider name (e.g., `"vidlink"`).
    fn name(&self) -> &str;

    /// Base URL the provider talks to.
    fn domain(&self) -> &str;

    /// Built-in priority, lower runs first. Configuration may override it.
    fn priority(&self) -> u32;

    /// Find candidates for `descriptor`. "Not found" is `Ok(vec![])`.
    async fn search(&self, descriptor: &ContentDescriptor) -> Result<Vec<SearchCandidate>>;

    /// Run the provider handshake for `candidate` and return its links.
    async fn extract_links(
        &self,
        descriptor: &ContentDescriptor,
        candidate: &SearchCandidate,
    ) -> Result<Vec<StreamingLink>>;

    /// Whether `candidate` plausibly is `descriptor`.
    ///
    /// The default requires a matching kind, title similarity above
    /// [`match_threshold`](Self::match_threshold), and years within one
    /// of each other when both are known.
    fn validate_content(
        &self,
        descriptor: &ContentDescriptor,
        candidate: &SearchCandidate,
    ) -> bool {
        candidate.kind == descriptor.kind
            && titles_match(&descriptor.title, &candidate.title, self.match_threshold())
            && years_match(descriptor.year, candidate.year)
    }

    /// Minimum title similarity for [`validate_content`](Self::validate_content).
    fn match_threshold(&self) -> f64 {
        0.8
    }
}
