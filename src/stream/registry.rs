//! Name → constructor table for stream providers.
//!
//! The built-in set is closed ([`ProviderKind`]), but the registry itself
//! is open so tests and embedders can register their own constructors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::provider::StreamProvider;
use super::providers::{VidLinkProvider, YesMoviesProvider};
use crate::config::{ProviderDefinition, DEFAULT_TOKEN_SERVICE};

/// Everything a constructor gets to build a provider instance.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Configured definition, if the provider appears in the configuration.
    pub definition: Option<ProviderDefinition>,
    /// Base URL of the token/hash helper service.
    pub token_service: String,
    /// HTTP client timeout for the provider's requests.
    pub request_timeout: Duration,
}

impl ProviderContext {
    pub fn new(
        definition: Option<ProviderDefinition>,
        token_service: &str,
        request_timeout: Duration,
    ) -> Self {
        Self {
            definition,
            token_service: token_service.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    /// Configured domain, or `fallback` when unconfigured.
    pub fn domain_or(&self, fallback: &str) -> String {
        self.definition
            .as_ref()
            .map_or(fallback, |d| d.domain.as_str())
            .trim_end_matches('/')
            .to_string()
    }

    /// Extra headers from the configured definition.
    pub fn extra_headers(&self) -> HashMap<String, String> {
        self.definition
            .as_ref()
            .and_then(|d| d.headers.clone())
            .unwrap_or_default()
    }
}

impl Default for ProviderContext {
    fn default() -> Self {
        Self::new(None, DEFAULT_TOKEN_SERVICE, Duration::from_secs(30))
    }
}

/// Builds one provider instance.
pub type ProviderConstructor =
    Arc<dyn Fn(&ProviderContext) -> Result<Arc<dyn StreamProvider>> + Send + Sync>;

/// Providers shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    YesMovies,
    VidLink,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::YesMovies, ProviderKind::VidLink];

    pub fn name(self) -> &'static str {
        match self {
            Self::YesMovies => "yesmovies",
            Self::VidLink => "vidlink",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name.trim()))
    }

    fn constructor(self) -> ProviderConstructor {
        match self {
            Self::YesMovies => Arc::new(|ctx: &ProviderContext| {
                Ok(Arc::new(YesMoviesProvider::new(ctx)?) as Arc<dyn StreamProvider>)
            }),
            Self::VidLink => Arc::new(|ctx: &ProviderContext| {
                Ok(Arc::new(VidLinkProvider::new(ctx)?) as Arc<dyn StreamProvider>)
            }),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps lowercase provider names to constructors.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    /// Registry with no providers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every [`ProviderKind`].
    pub fn builtin() -> Self {
        ProviderKind::ALL
            .into_iter()
            .fold(Self::empty(), |reg, kind| reg.register_arc(kind.name(), kind.constructor()))
    }

    /// Add or replace the constructor for `name`.
    #[must_use]
    pub fn register<F>(self, name: &str, constructor: F) -> Self
    where
        F: Fn(&ProviderContext) -> Result<Arc<dyn StreamProvider>> + Send + Sync + 'static,
    {
        self.register_arc(name, Arc::new(constructor))
    }

    fn register_arc(mut self, name: &str, constructor: ProviderConstructor) -> Self {
        self.constructors.insert(name.trim().to_lowercase(), constructor);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<ProviderConstructor> {
        self.constructors.get(&name.trim().to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.trim().to_lowercase())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
