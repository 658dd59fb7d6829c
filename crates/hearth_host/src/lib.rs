//! # Hearth Standalone Host
//!
//! Loads Hearth plugins from cdylibs described by TOML manifests, gives
//! each one its own context, and performs the platform-adapter duties:
//! driving the tick loop, routing inbound commands and originating events.

pub mod config;
pub mod events;
pub mod host;
pub mod loader;
pub mod manifest;

use std::path::PathBuf;

pub use config::AppConfig;
pub use events::{PluginLoadedEvent, PluginUnloadedEvent};
pub use host::{HostSettings, LoggingCommandSink, PluginHost, StandalonePlatform};
pub use manifest::{discover_manifests, PluginManifest};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
    #[error("invalid configuration {path}: {reason}")]
    Config { path: PathBuf, reason: String },
    #[error("failed to load library {path}: {reason}")]
    Library { path: PathBuf, reason: String },
    #[error("plugin '{name}' is already loaded")]
    DuplicatePlugin { name: String },
    #[error("plugin '{name}' failed: {reason}")]
    PluginFailed { name: String, reason: String },
    #[error("plugin '{name}' is not loaded")]
    NotLoaded { name: String },
}
