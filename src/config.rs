//! Local configuration: provider definitions, API keys, resolver tunables.
//!
//! Persisted as JSON at `~/.config/reelscout/streaming.json` (wrapped with
//! a save timestamp) and cached in memory. No network access happens here.
//!
//! ```json
//! {
//!   "config": {
//!     "providers": [{ "name": "vidlink", "domain": "https://vidlink.pro",
//!                     "priority": 2, "active": true, "timeout": 25000 }],
//!     "apiKeys": { "tmdb": "..." },
//!     "timeout": 30000,
//!     "maxRetries": 3
//!   },
//!   "timestamp": 1760000000000
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

pub const DEFAULT_TOKEN_SERVICE: &str = "https://aquariumtv.app";
pub const DEFAULT_METADATA_API: &str = "https://api.themoviedb.org/3";

/// Environment variable consulted for the metadata API key.
pub const TMDB_KEY_ENV: &str = "TMDB_API_KEY";

/// One configured content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDefinition {
    pub name: String,
    pub domain: String,
    /// Lower runs first.
    pub priority: u32,
    pub active: bool,
    /// Per-provider time budget in milliseconds.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl ProviderDefinition {
    pub fn new(name: &str, domain: &str, priority: u32, timeout_ms: u64) -> Self {
        Self {
            name: name.to_lowercase(),
            domain: domain.trim_end_matches('/').to_string(),
            priority,
            active: true,
            timeout_ms,
            headers: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Orchestration tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverSettings {
    /// At most this many providers are consulted per resolution.
    pub max_providers: usize,
    /// Providers run concurrently in groups of this size.
    pub group_size: usize,
    /// Stop after a group once this many 1080p/720p links are collected.
    pub early_stop_links: usize,
    /// Providers instantiated eagerly at startup.
    pub preload_count: usize,
    /// Attempts per provider (first try included).
    pub retry_attempts: u32,
    /// Linear backoff unit between attempts.
    pub retry_delay_ms: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_providers: 6,
            group_size: 3,
            early_stop_links: 3,
            preload_count: 3,
            retry_attempts: 2,
            retry_delay_ms: 1000,
        }
    }
}

impl ResolverSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// External helper services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    /// Token signing / hashing helper used by provider handshakes.
    pub token_service: String,
    /// Metadata catalog base URL.
    pub metadata_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_service: DEFAULT_TOKEN_SERVICE.to_string(),
            metadata_api: DEFAULT_METADATA_API.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub providers: Vec<ProviderDefinition>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    /// Global request timeout in milliseconds.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    pub max_retries: u32,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Default for Configuration {
    fn default() -> Self {
        let mut api_keys = HashMap::new();
        api_keys.insert("tmdb".to_string(), default_tmdb_key());

        Self {
            providers: vec![
                ProviderDefinition::new("yesmovies", "https://ww.yesmovies.ag", 1, 18_000),
                ProviderDefinition::new("vidlink", "https://vidlink.pro", 2, 25_000),
            ],
            api_keys,
            timeout_ms: 30_000,
            max_retries: 3,
            resolver: ResolverSettings::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Configuration {
    /// Active providers, ascending priority (stable for ties), capped at
    /// `resolver.max_providers`.
    pub fn active_providers(&self) -> Vec<ProviderDefinition> {
        let mut active: Vec<_> = self.providers.iter().filter(|p| p.active).cloned().collect();
        active.sort_by_key(|p| p.priority);
        active.truncate(self.resolver.max_providers);
        active
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderDefinition> {
        self.providers.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Metadata API key, `None` when unset or blank.
    pub fn tmdb_key(&self) -> Option<&str> {
        self.api_keys
            .get("tmdb")
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `$TMDB_API_KEY`, then the build-time `REELSCOUT_TMDB_KEY`, then empty.
fn default_tmdb_key() -> String {
    std::env::var(TMDB_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| option_env!("REELSCOUT_TMDB_KEY").map(str::to_string))
        .unwrap_or_default()
}

/// Partial update merged over the current configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub providers: Option<Vec<ProviderDefinition>>,
    pub api_keys: Option<HashMap<String, String>>,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub resolver: Option<ResolverSettings>,
    pub endpoints: Option<Endpoints>,
}

impl ConfigPatch {
    fn apply(self, config: &mut Configuration) {
        if let Some(providers) = self.providers {
            config.providers = providers;
        }
        if let Some(keys) = self.api_keys {
            config.api_keys = keys;
        }
        if let Some(timeout) = self.timeout_ms {
            config.timeout_ms = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(resolver) = self.resolver {
            config.resolver = resolver;
        }
        if let Some(endpoints) = self.endpoints {
            config.endpoints = endpoints;
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredConfig {
    config: Configuration,
    /// Unix millis at save time.
    timestamp: i64,
}

/// Counts reported by [`ConfigStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

/// Raw persistence behind [`ConfigStore`].
#[async_trait]
pub trait ConfigStorage: Send + Sync {
    /// Stored document, `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<String>, ConfigError>;
    async fn save(&self, data: &str) -> Result<(), ConfigError>;
    async fn remove(&self) -> Result<(), ConfigError>;
}

/// JSON file on disk.
pub struct FileConfigStorage {
    path: PathBuf,
}

impl FileConfigStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/reelscout/streaming.json` (platform config dir).
    pub fn default_location() -> Self {
        Self::new(default_config_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ConfigStorage for FileConfigStorage {
    async fn load(&self) -> Result<Option<String>, ConfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, data: &str) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|e| self.io_error(e))
    }

    async fn remove(&self) -> Result<(), ConfigError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-process storage for tests and embedding.
#[derive(Default)]
pub struct MemoryConfigStorage {
    data: Mutex<Option<String>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded with `config`, as if it had been saved earlier.
    pub fn with_config(config: &Configuration) -> Result<Self, ConfigError> {
        let data = encode(config)?;
        Ok(Self {
            data: Mutex::new(Some(data)),
        })
    }
}

#[async_trait]
impl ConfigStorage for MemoryConfigStorage {
    async fn load(&self) -> Result<Option<String>, ConfigError> {
        Ok(self.data.lock().await.clone())
    }

    async fn save(&self, data: &str) -> Result<(), ConfigError> {
        *self.data.lock().await = Some(data.to_string());
        Ok(())
    }

    async fn remove(&self) -> Result<(), ConfigError> {
        *self.data.lock().await = None;
        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reelscout")
        .join("streaming.json")
}

fn encode(config: &Configuration) -> Result<String, ConfigError> {
    let stored = StoredConfig {
        config: config.clone(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    Ok(serde_json::to_string_pretty(&stored)?)
}

/// Cached configuration over a [`ConfigStorage`].
///
/// Edits are serialized: each read-modify-write holds `edits` from the
/// read through the save, so concurrent edits never start from the same
/// snapshot.
pub struct ConfigStore {
    storage: Arc<dyn ConfigStorage>,
    cached: RwLock<Option<Arc<Configuration>>>,
    edits: Mutex<()>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn ConfigStorage>) -> Self {
        Self {
            storage,
            cached: RwLock::new(None),
            edits: Mutex::new(()),
        }
    }

    /// Store backed by [`MemoryConfigStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryConfigStorage::new()))
    }

    /// Cached config, else the persisted one, else the built-in default
    /// (which is then persisted).
    ///
    /// Fails only if the storage itself cannot be read. An unreadable
    /// document is replaced by the default.
    pub async fn get(&self) -> Result<Arc<Configuration>, ConfigError> {
        if let Some(config) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(config));
        }

        let mut cached = self.cached.write().await;
        if let Some(config) = cached.as_ref() {
            return Ok(Arc::clone(config));
        }

        let config = match self.storage.load().await? {
            Some(raw) => match serde_json::from_str::<StoredConfig>(&raw) {
                Ok(stored) => {
                    debug!("Using persisted configuration saved at {}", stored.timestamp);
                    stored.config
                }
                Err(e) => {
                    warn!("Ignoring unreadable persisted configuration: {e}");
                    self.persist_default().await
                }
            },
            None => self.persist_default().await,
        };

        let config = Arc::new(config);
        *cached = Some(Arc::clone(&config));
        Ok(config)
    }

    async fn persist_default(&self) -> Configuration {
        let config = Configuration::default();
        let saved = match encode(&config) {
            Ok(data) => self.storage.save(&data).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!("Failed to persist default configuration: {e}");
        }
        config
    }

    /// Merge `patch` into the current configuration and persist it.
    pub async fn update(&self, patch: ConfigPatch) -> Result<Arc<Configuration>, ConfigError> {
        let _edit = self.edits.lock().await;
        let mut config = (*self.get().await?).clone();
        patch.apply(&mut config);
        self.store(config).await
    }

    /// Persist `config` wholesale and make it current.
    pub async fn replace(&self, config: Configuration) -> Result<Arc<Configuration>, ConfigError> {
        let _edit = self.edits.lock().await;
        self.store(config).await
    }

    /// Caller holds `edits`.
    async fn store(&self, config: Configuration) -> Result<Arc<Configuration>, ConfigError> {
        let mut cached = self.cached.write().await;
        self.storage.save(&encode(&config)?).await?;
        let config = Arc::new(config);
        *cached = Some(Arc::clone(&config));
        info!("Configuration updated");
        Ok(config)
    }

    /// Apply `edit` to a copy of the current config under the edit lock and
    /// persist it. `edit` returns `false` to leave everything untouched.
    async fn modify<F>(&self, edit: F) -> Result<bool, ConfigError>
    where
        F: FnOnce(&mut Configuration) -> bool,
    {
        let _edit = self.edits.lock().await;
        let mut config = (*self.get().await?).clone();
        if !edit(&mut config) {
            return Ok(false);
        }
        self.store(config).await?;
        Ok(true)
    }

    /// Drop the in-memory copy; the next [`get`](Self::get) rereads storage.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Drop both the in-memory and persisted copies; the next
    /// [`get`](Self::get) returns the built-in default.
    pub async fn clear(&self) -> Result<(), ConfigError> {
        let _edit = self.edits.lock().await;
        let mut cached = self.cached.write().await;
        *cached = None;
        self.storage.remove().await?;
        info!("Configuration cache cleared");
        Ok(())
    }

    /// Insert `provider`, replacing any definition with the same name.
    pub async fn add_provider(&self, provider: ProviderDefinition) -> Result<(), ConfigError> {
        self.modify(|config| {
            match config.providers.iter_mut().find(|p| p.name == provider.name) {
                Some(existing) => *existing = provider,
                None => config.providers.push(provider),
            }
            true
        })
        .await?;
        Ok(())
    }

    /// Returns `false` if no provider had that name.
    pub async fn remove_provider(&self, name: &str) -> Result<bool, ConfigError> {
        self.modify(|config| {
            let before = config.providers.len();
            config.providers.retain(|p| !p.name.eq_ignore_ascii_case(name));
            config.providers.len() != before
        })
        .await
    }

    /// Returns `false` if no provider had that name.
    pub async fn set_provider_active(&self, name: &str, active: bool) -> Result<bool, ConfigError> {
        self.modify(|config| {
            match config.providers.iter_mut().find(|p| p.name.eq_ignore_ascii_case(name)) {
                Some(provider) => {
                    provider.active = active;
                    true
                }
                None => false,
            }
        })
        .await
    }

    pub async fn stats(&self) -> Result<ProviderCounts, ConfigError> {
        let config = self.get().await?;
        let active = config.providers.iter().filter(|p| p.active).count();
        Ok(ProviderCounts {
            total: config.providers.len(),
            active,
            inactive: config.providers.len() - active,
        })
    }
}
