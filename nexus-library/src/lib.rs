//! Track loading for NEXUS - decoding, resampling and configuration

mod config;
mod loader;

pub use config::Config;
pub use loader::{LoadError, LoadedTrack, TrackLoader, TrackMetadata};
