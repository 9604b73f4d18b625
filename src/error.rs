//! Error types shared across the resolver.
//!
//! Only [`ResolveError`] ever reaches a caller of
//! [`Resolver::resolve`](crate::Resolver::resolve). Everything a provider
//! does wrong is folded into a [`ProviderFailure`] and recorded on its
//! [`ProviderOutcome`](crate::stream::ProviderOutcome).

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a resolution call.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The descriptor cannot be resolved as given (missing ID, episode
    /// without season/episode numbers, empty title).
    #[error("invalid content descriptor: {0}")]
    InvalidDescriptor(String),

    /// Configuration could not be loaded at all.
    #[error("configuration unavailable: {0}")]
    Config(#[from] ConfigError),

    /// Configuration loaded but no provider is enabled.
    #[error("no active providers configured")]
    NoActiveProviders,
}

/// Configuration storage failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures of a plain HTTP request made through [`crate::net`].
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HttpError {
    /// Connection problems, timeouts and 5xx/429 are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Decode { .. } => false,
        }
    }
}

/// Failures while opening an encrypted `{ s, iv, ct }` envelope.
#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("envelope field `{0}` is missing or empty")]
    MissingField(&'static str),

    #[error("envelope field `{field}` is not valid {encoding}")]
    Encoding {
        field: &'static str,
        encoding: &'static str,
    },

    #[error("invalid key or IV length")]
    KeyLength,

    #[error("decryption failed (wrong password or corrupted ciphertext)")]
    Padding,

    #[error("decrypted payload is not UTF-8 JSON: {0}")]
    Payload(String),
}

/// Why a single provider produced no links.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("provider not available")]
    NotAvailable,

    #[error("provider timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Transient(String),

    #[error("{0}")]
    Protocol(String),

    #[error("provider task panicked")]
    Panicked,
}

impl ProviderFailure {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }

    /// Classify an error returned by a provider implementation.
    pub fn from_provider_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(http) = cause.downcast_ref::<HttpError>() {
                return if http.is_transient() {
                    Self::Transient(err.to_string())
                } else {
                    Self::Protocol(err.to_string())
                };
            }
            if let Some(req) = cause.downcast_ref::<reqwest::Error>() {
                if req.is_timeout() || req.is_connect() || req.is_request() {
                    return Self::Transient(err.to_string());
                }
            }
        }
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_classify_by_code() {
        let server = HttpError::Status {
            url: "https://x".into(),
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        let missing = HttpError::Status {
            url: "https://x".into(),
            status: reqwest::StatusCode::NOT_FOUND,
        };
        assert!(server.is_transient());
        assert!(!missing.is_transient());
    }

    #[test]
    fn provider_errors_default_to_protocol() {
        let err = anyhow::anyhow!("plyURL not found");
        assert_eq!(
            ProviderFailure::from_provider_error(&err),
            ProviderFailure::Protocol("plyURL not found".into())
        );
        assert!(!ProviderFailure::from_provider_error(&err).is_retryable());
    }

    #[test]
    fn wrapped_http_status_is_found_in_chain() {
        let err = anyhow::Error::new(HttpError::Status {
            url: "https://x".into(),
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        })
        .context("search request");
        assert!(ProviderFailure::from_provider_error(&err).is_retryable());
    }

    #[test]
    fn timeout_message_includes_millis() {
        let failure = ProviderFailure::Timeout(Duration::from_millis(250));
        assert_eq!(failure.to_string(), "provider timed out after 250ms");
    }
}
