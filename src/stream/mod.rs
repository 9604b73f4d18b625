//! Stream link resolution: data model, provider contract, built-in
//! providers, and the pieces they share (title matching, HLS manifest
//! parsing, envelope decryption).

pub mod crypto;
pub mod hls;
pub mod loader;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod similarity;
pub mod types;

pub use loader::ProviderLoader;
pub use provider::StreamProvider;
pub use registry::{ProviderContext, ProviderKind, ProviderRegistry};
pub use types::{
    ContentDescriptor, ContentKind, LinkKind, ProviderOutcome, SearchCandidate, StreamingLink,
    Subtitle, SubtitleFormat,
};
