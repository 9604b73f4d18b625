//! Resolution orchestrator.
//!
//! One [`Resolver`] per process (or per test). It owns the configuration
//! store, the provider loader and the optional content validator, and
//! turns a [`ContentDescriptor`] into a ranked, deduplicated list of
//! [`StreamingLink`]s:
//!
//! 1. initialize once (config, validator, preload top providers)
//! 2. advisory validation against the metadata catalog
//! 3. select active providers by priority, capped
//! 4. run them in fixed-size concurrent groups, in sequence, stopping
//!    early once enough high-quality links are in hand
//! 5. deduplicate by `(url, quality)` and stable-sort by quality rank
//!
//! Provider failures never escape: each becomes a failed
//! [`ProviderOutcome`] that is logged and excluded from the result.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, ProviderDefinition, ResolverSettings};
use crate::error::{ProviderFailure, ResolveError};
use crate::net::with_retry_if;
use crate::stream::loader::ProviderLoader;
use crate::stream::provider::StreamProvider;
use crate::stream::registry::ProviderRegistry;
use crate::stream::types::{quality_rank, ContentDescriptor, ProviderOutcome, StreamingLink};
use crate::validator::ContentValidator;

/// Stages of a resolution, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPhase {
    Idle,
    Initializing,
    SelectingProviders,
    FanningOut,
    Aggregating,
    Done,
}

impl fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::SelectingProviders => "selecting-providers",
            Self::FanningOut => "fanning-out",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
        })
    }
}

/// Counts reported by [`Resolver::provider_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Configured providers.
    pub total: usize,
    /// Configured and enabled.
    pub active: usize,
    /// Instantiated and cached.
    pub loaded: usize,
}

/// Links plus per-provider outcomes, in the order providers were run.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub links: Vec<StreamingLink>,
    pub outcomes: Vec<ProviderOutcome>,
}

impl Resolution {
    pub fn outcome(&self, provider: &str) -> Option<&ProviderOutcome> {
        self.outcomes.iter().find(|o| o.provider == provider)
    }
}

pub struct Resolver {
    config: Arc<ConfigStore>,
    loader: Arc<ProviderLoader>,
    validator: RwLock<Option<Arc<ContentValidator>>>,
    /// Replaced wholesale on reinitialize so in-flight waiters keep theirs.
    init: RwLock<Arc<OnceCell<()>>>,
}

impl Resolver {
    /// Resolver over the built-in providers.
    pub fn new(config: ConfigStore) -> Self {
        Self::with_registry(config, ProviderRegistry::builtin())
    }

    pub fn with_registry(config: ConfigStore, registry: ProviderRegistry) -> Self {
        Self {
            config: Arc::new(config),
            loader: Arc::new(ProviderLoader::new(registry)),
            validator: RwLock::new(None),
            init: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn loader(&self) -> &ProviderLoader {
        &self.loader
    }

    pub async fn is_initialized(&self) -> bool {
        self.init.read().await.initialized()
    }

    /// Run initialization once; concurrent callers share the same run.
    pub async fn initialize(&self) -> Result<(), ResolveError> {
        let cell = Arc::clone(&*self.init.read().await);
        cell.get_or_try_init(|| self.run_initialization()).await?;
        Ok(())
    }

    async fn run_initialization(&self) -> Result<(), ResolveError> {
        debug!(phase = %ResolutionPhase::Initializing);
        self.config.invalidate().await;
        let config = self.config.get().await?;
        self.loader.configure(&config).await;

        let validator = match ContentValidator::from_config(&config) {
            Ok(v) => Some(Arc::new(v)),
            Err(e) => {
                warn!("Content validation disabled: {e}");
                None
            }
        };
        *self.validator.write().await = validator;

        let preload: Vec<String> = config
            .active_providers()
            .into_iter()
            .take(config.resolver.preload_count)
            .map(|p| p.name)
            .collect();
        self.loader.preload(&preload).await;

        info!(
            "Resolver initialized with {} configured providers",
            config.providers.len()
        );
        Ok(())
    }

    /// Resolve `descriptor` into ranked, deduplicated links.
    ///
    /// An empty list means no provider found anything. Errors are reserved
    /// for an invalid descriptor or unusable configuration.
    pub async fn resolve(
        &self,
        descriptor: &ContentDescriptor,
    ) -> Result<Vec<StreamingLink>, ResolveError> {
        Ok(self.resolve_detailed(descriptor).await?.links)
    }

    /// Like [`resolve`](Self::resolve), also returning every provider's outcome.
    pub async fn resolve_detailed(
        &self,
        descriptor: &ContentDescriptor,
    ) -> Result<Resolution, ResolveError> {
        debug!(phase = %ResolutionPhase::Idle, "resolution requested for '{descriptor}'");
        descriptor.validate()?;
        self.initialize().await?;

        let config = self.config.get().await?;

        let validator = self.validator.read().await.clone();
        if let Some(validator) = validator {
            if !validator.validate(descriptor).await {
                warn!("'{descriptor}' does not match the metadata catalog, resolving anyway");
            }
        }

        debug!(phase = %ResolutionPhase::SelectingProviders);
        let selected = config.active_providers();
        if selected.is_empty() {
            return Err(ResolveError::NoActiveProviders);
        }
        let settings = config.resolver.clone();
        info!(
            "Resolving '{descriptor}' via {} providers: {}",
            selected.len(),
            selected.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        let shared = Arc::new(descriptor.clone());
        let mut outcomes: Vec<ProviderOutcome> = Vec::new();
        let mut collected: Vec<StreamingLink> = Vec::new();

        for (index, group) in selected.chunks(settings.group_size.max(1)).enumerate() {
            debug!(phase = %ResolutionPhase::FanningOut, group = index + 1, size = group.len());

            let tasks: Vec<_> = group
                .iter()
                .map(|definition| {
                    let loader = Arc::clone(&self.loader);
                    let descriptor = Arc::clone(&shared);
                    let definition = definition.clone();
                    let settings = settings.clone();
                    tokio::spawn(async move {
                        run_provider(&loader, &definition, &descriptor, &settings).await
                    })
                })
                .collect();

            for (definition, joined) in group.iter().zip(join_all(tasks).await) {
                let outcome = joined.unwrap_or_else(|e| {
                    error!(provider = %definition.name, "Provider task aborted: {e}");
                    ProviderOutcome::failure(
                        &definition.name,
                        ProviderFailure::Panicked,
                        Duration::ZERO,
                    )
                });
                collected.extend(outcome.links.iter().cloned());
                outcomes.push(outcome);
            }

            let high = collected.iter().filter(|l| l.is_high_quality()).count();
            if high >= settings.early_stop_links {
                info!("Early stop after group {}: {high} high-quality links", index + 1);
                break;
            }
        }

        debug!(phase = %ResolutionPhase::Aggregating);
        let links = aggregate(collected);
        log_summary(descriptor, &outcomes, links.len());
        debug!(phase = %ResolutionPhase::Done);
        Ok(Resolution { links, outcomes })
    }

    pub async fn provider_stats(&self) -> Result<ProviderStats, ResolveError> {
        let counts = self.config.stats().await?;
        Ok(ProviderStats {
            total: counts.total,
            active: counts.active,
            loaded: self.loader.loaded_count().await,
        })
    }

    /// Drop cached providers, catalog records and the in-memory config.
    pub async fn clear_caches(&self) {
        self.loader.clear().await;
        if let Some(validator) = self.validator.read().await.as_ref() {
            validator.clear_cache().await;
        }
        self.config.invalidate().await;
        info!("All resolver caches cleared");
    }

    /// Reset to uninitialized; the next call re-reads configuration.
    ///
    /// Resolutions already running keep the providers and configuration
    /// they started with.
    pub async fn reinitialize(&self) {
        *self.init.write().await = Arc::new(OnceCell::new());
        self.clear_caches().await;
    }

    /// [`reinitialize`](Self::reinitialize), then initialize right away.
    pub async fn refresh(&self) -> Result<(), ResolveError> {
        self.reinitialize().await;
        self.initialize().await
    }
}

/// Load and run one provider with timeout and retry, capturing the outcome.
async fn run_provider(
    loader: &ProviderLoader,
    definition: &ProviderDefinition,
    descriptor: &ContentDescriptor,
    settings: &ResolverSettings,
) -> ProviderOutcome {
    let started = Instant::now();
    let Some(provider) = loader.load(&definition.name).await else {
        return ProviderOutcome::failure(
            &definition.name,
            ProviderFailure::NotAvailable,
            started.elapsed(),
        );
    };

    let timeout = definition.timeout();
    let result = with_retry_if(
        settings.retry_attempts,
        settings.retry_delay(),
        ProviderFailure::is_retryable,
        || attempt(provider.as_ref(), descriptor, timeout),
    )
    .await;

    match result {
        Ok(links) => ProviderOutcome::success(&definition.name, links, started.elapsed()),
        Err(failure) => ProviderOutcome::failure(&definition.name, failure, started.elapsed()),
    }
}

/// One bounded attempt. On timeout the provider future is dropped and
/// whatever it would have produced is discarded.
async fn attempt(
    provider: &dyn StreamProvider,
    descriptor: &ContentDescriptor,
    timeout: Duration,
) -> Result<Vec<StreamingLink>, ProviderFailure> {
    match tokio::time::timeout(timeout, search_and_extract(provider, descriptor)).await {
        Ok(Ok(links)) => Ok(links),
        Ok(Err(e)) => Err(ProviderFailure::from_provider_error(&e)),
        Err(_) => Err(ProviderFailure::Timeout(timeout)),
    }
}

async fn search_and_extract(
    provider: &dyn StreamProvider,
    descriptor: &ContentDescriptor,
) -> anyhow::Result<Vec<StreamingLink>> {
    let candidates = provider.search(descriptor).await?;
    let best = candidates
        .iter()
        .find(|c| provider.validate_content(descriptor, c))
        .or_else(|| candidates.first());

    let Some(best) = best else {
        debug!(provider = provider.name(), "No search results");
        return Ok(Vec::new());
    };
    provider.extract_links(descriptor, best).await
}

/// Deduplicate by `(url, quality)`, keeping the first occurrence, then
/// stable-sort by quality rank.
pub fn aggregate(links: Vec<StreamingLink>) -> Vec<StreamingLink> {
    let keep: Vec<bool> = {
        let mut seen = HashSet::new();
        links.iter().map(|l| seen.insert(l.dedup_key())).collect()
    };
    let mut unique: Vec<StreamingLink> = links
        .into_iter()
        .zip(keep)
        .filter_map(|(link, keep)| keep.then_some(link))
        .collect();
    unique.sort_by_key(|l| quality_rank(&l.quality));
    unique
}

fn log_summary(descriptor: &ContentDescriptor, outcomes: &[ProviderOutcome], total: usize) {
    for outcome in outcomes {
        let elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX);
        match &outcome.error {
            None => info!(
                provider = %outcome.provider,
                links = outcome.links.len(),
                elapsed_ms,
                "provider ok"
            ),
            Some(failure) => info!(
                provider = %outcome.provider,
                error = %failure,
                elapsed_ms,
                "provider failed"
            ),
        }
    }
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    info!(
        "Resolved '{descriptor}': {total} links from {succeeded}/{} providers",
        outcomes.len()
    );
}
