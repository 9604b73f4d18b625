//! Built-in content sources.

pub mod vidlink;
pub mod yesmovies;

pub use vidlink::VidLinkProvider;
pub use yesmovies::YesMoviesProvider;

use anyhow::Result;
use tracing::warn;

use crate::error::ProviderFailure;
use crate::stream::types::StreamingLink;

/// Turn a failed handshake into "no links", unless the failure is one a
/// retry could fix, in which case it is passed up to the resolver.
pub(crate) fn fail_soft(
    provider: &str,
    result: Result<Vec<StreamingLink>>,
) -> Result<Vec<StreamingLink>> {
    match result {
        Ok(links) => Ok(links),
        Err(e) if ProviderFailure::from_provider_error(&e).is_retryable() => Err(e),
        Err(e) => {
            warn!(provider, "link extraction failed: {e:#}");
            Ok(Vec::new())
        }
    }
}
