//! I/O modules for imagery access, band decoding, and artifact storage

pub mod provider;
pub mod band_decoder;
pub mod sentinel_hub;
pub mod artifacts;

pub use provider::{CancellationToken, SceneBands, SceneDescriptor, SceneProvider};
pub use sentinel_hub::SentinelHubProvider;
pub use artifacts::ArtifactStore;
