//! `reelscout` - streaming-link resolver
//!
//! Given a movie or episode identified by its TMDB id, fans out to a
//! prioritized set of third-party content providers and returns a
//! deduplicated, quality-ranked list of playable links.
//!
//! # Example
//!
//! ```rust,no_run
//! use reelscout::{ConfigStore, ContentDescriptor, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::new(ConfigStore::in_memory());
//!     let movie = ContentDescriptor::movie(27205, "Inception", Some(2010));
//!     for link in resolver.resolve(&movie).await? {
//!         println!("{} {} ({})", link.quality, link.url, link.provider);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod net;
pub mod resolver;
pub mod stream;
pub mod validator;

pub use config::{
    ConfigPatch, ConfigStorage, ConfigStore, Configuration, FileConfigStorage, MemoryConfigStorage,
    ProviderDefinition, ResolverSettings,
};
pub use error::{ConfigError, DecryptError, HttpError, ProviderFailure, ResolveError};
pub use resolver::{ProviderStats, Resolution, ResolutionPhase, Resolver};
pub use stream::{
    ContentDescriptor, ContentKind, LinkKind, ProviderRegistry, SearchCandidate, StreamProvider,
    StreamingLink,
};
pub use validator::ContentValidator;

/// Version of reelscout
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
