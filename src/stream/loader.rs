//! Lazy, cached provider instantiation.
//!
//! Each provider name gets its own [`OnceCell`], so concurrent loads of the
//! same name share one construction while different names never wait on
//! each other. Failed constructions leave the cell empty and are retried on
//! the next load.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use super::provider::StreamProvider;
use super::registry::{ProviderContext, ProviderRegistry};
use crate::config::{Configuration, ProviderDefinition, DEFAULT_TOKEN_SERVICE};

type ProviderCell = Arc<OnceCell<Arc<dyn StreamProvider>>>;

#[derive(Debug, Clone)]
struct LoaderSettings {
    definitions: HashMap<String, ProviderDefinition>,
    token_service: String,
    request_timeout: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            definitions: HashMap::new(),
            token_service: DEFAULT_TOKEN_SERVICE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ProviderLoader {
    registry: ProviderRegistry,
    settings: RwLock<LoaderSettings>,
    cells: Mutex<HashMap<String, ProviderCell>>,
}

impl ProviderLoader {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            settings: RwLock::new(LoaderSettings::default()),
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Use `config` for providers constructed from now on.
    pub async fn configure(&self, config: &Configuration) {
        let definitions = config
            .providers
            .iter()
            .map(|d| (d.name.to_lowercase(), d.clone()))
            .collect();
        *self.settings.write().await = LoaderSettings {
            definitions,
            token_service: config.endpoints.token_service.clone(),
            request_timeout: config.timeout(),
        };
    }

    async fn context_for(&self, key: &str) -> ProviderContext {
        let settings = self.settings.read().await;
        ProviderContext::new(
            settings.definitions.get(key).cloned(),
            &settings.token_service,
            settings.request_timeout,
        )
    }

    /// Cached instance for `name`, constructing it on first use.
    ///
    /// Unknown names and failed or invalid constructions yield `None`.
    pub async fn load(&self, name: &str) -> Option<Arc<dyn StreamProvider>> {
        let key = name.trim().to_lowercase();
        let Some(constructor) = self.registry.lookup(&key) else {
            warn!("Unknown provider: {name}");
            return None;
        };

        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(key.clone()).or_default())
        };

        let loaded = cell
            .get_or_try_init(|| async {
                let ctx = self.context_for(&key).await;
                let provider = constructor(&ctx)?;
                check_provider(&key, provider.as_ref())?;
                debug!(provider = %key, "Provider instantiated");
                Ok::<_, anyhow::Error>(provider)
            })
            .await;

        match loaded {
            Ok(provider) => Some(Arc::clone(provider)),
            Err(e) => {
                error!(provider = %key, "Failed to load provider: {e:#}");
                None
            }
        }
    }

    /// Load `names` concurrently; returns how many succeeded.
    pub async fn preload(&self, names: &[String]) -> usize {
        let loaded = join_all(names.iter().map(|n| self.load(n)))
            .await
            .into_iter()
            .filter(Option::is_some)
            .count();
        info!("Preloaded {loaded}/{} providers", names.len());
        loaded
    }

    /// Drop every cached instance.
    pub async fn clear(&self) {
        self.cells.lock().await.clear();
    }

    /// Names with a constructed instance, sorted.
    pub async fn loaded_names(&self) -> Vec<String> {
        let cells = self.cells.lock().await;
        let mut names: Vec<_> = cells
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn loaded_count(&self) -> usize {
        self.cells
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

/// Reject instances whose identity does not match the registration.
fn check_provider(expected: &str, provider: &dyn StreamProvider) -> Result<()> {
    let name = provider.name();
    if name.trim().is_empty() {
        bail!("provider has an empty name");
    }
    if !name.eq_ignore_ascii_case(expected) {
        bail!("provider registered as '{expected}' reports name '{name}'");
    }
    match Url::parse(provider.domain()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => bail!("provider '{name}' has invalid domain '{}'", provider.domain()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::types::{ContentDescriptor, SearchCandidate, StreamingLink};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        name: String,
        domain: String,
    }

    #[async_trait]
    impl StreamProvider for Stub {
        fn name(&self) -> &str {
            &self.name
        }
        fn domain(&self) -> &str {
            &self.domain
        }
        fn priority(&self) -> u32 {
            1
        }
        async fn search(&self, _: &ContentDescriptor) -> Result<Vec<SearchCandidate>> {
            Ok(vec![])
        }
        async fn extract_links(
            &self,
            _: &ContentDescriptor,
            _: &SearchCandidate,
        ) -> Result<Vec<StreamingLink>> {
            Ok(vec![])
        }
    }

    fn stub(name: &str, domain: &str) -> Arc<dyn StreamProvider> {
        Arc::new(Stub {
            name: name.into(),
            domain: domain.into(),
        })
    }

    #[tokio::test]
    async fn concurrent_loads_construct_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let registry = ProviderRegistry::empty().register("alpha", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(stub("alpha", "https://alpha.example"))
        });
        let loader = ProviderLoader::new(registry);

        let loads = join_all((0..10).map(|_| loader.load("alpha"))).await;
        assert!(loads.iter().all(Option::is_some));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(loader.loaded_names().await, ["alpha"]);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let registry = ProviderRegistry::empty().register("flaky", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                bail!("first construction fails");
            }
            Ok(stub("flaky", "https://flaky.example"))
        });
        let loader = ProviderLoader::new(registry);

        assert!(loader.load("flaky").await.is_none());
        assert_eq!(loader.loaded_count().await, 0);
        assert!(loader.load("FLAKY").await.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_instances_are_rejected() {
        let registry = ProviderRegistry::empty()
            .register("renamed", |_| Ok(stub("other", "https://x.example")))
            .register("nodomain", |_| Ok(stub("nodomain", "not a url")))
            .register("ftp", |_| Ok(stub("ftp", "ftp://x.example")));
        let loader = ProviderLoader::new(registry);

        assert!(loader.load("renamed").await.is_none());
        assert!(loader.load("nodomain").await.is_none());
        assert!(loader.load("ftp").await.is_none());
        assert!(loader.load("unregistered").await.is_none());
    }

    #[tokio::test]
    async fn clear_forces_reconstruction() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let registry = ProviderRegistry::empty().register("alpha", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(stub("alpha", "https://alpha.example"))
        });
        let loader = ProviderLoader::new(registry);

        loader.load("alpha").await;
        loader.clear().await;
        assert_eq!(loader.loaded_count().await, 0);
        loader.load("alpha").await;
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn configured_domain_reaches_constructor() {
        let registry = ProviderRegistry::empty().register("alpha", |ctx| {
            Ok(stub("alpha", &ctx.domain_or("https://default.example")))
        });
        let loader = ProviderLoader::new(registry);

        let mut config = Configuration::default();
        config.providers = vec![ProviderDefinition::new(
            "alpha",
            "https://mirror.example",
            1,
            1000,
        )];
        loader.configure(&config).await;

        let provider = loader.load("alpha").await.unwrap();
        assert_eq!(provider.domain(), "https://mirror.example");
    }

    #[tokio::test]
    async fn preload_counts_successes() {
        let registry = ProviderRegistry::empty()
            .register("a", |_| Ok(stub("a", "https://a.example")))
            .register("b", |_| bail!("broken"));
        let loader = ProviderLoader::new(registry);

        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(loader.preload(&names).await, 1);
    }
}
