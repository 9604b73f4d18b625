pub mod config;
pub mod providers;
pub mod resolve;

use std::path::Path;
use std::sync::Arc;

use reelscout::{ConfigStore, FileConfigStorage};

/// Store over `path`, or the default location.
pub fn open_store(path: Option<&Path>) -> ConfigStore {
    let storage = match path {
        Some(path) => FileConfigStorage::new(path),
        None => FileConfigStorage::default_location(),
    };
    ConfigStore::new(Arc::new(storage))
}
