//! Typed plugin configuration with versioned text migrations.
//!
//! The codec is separated from the store so the format can change without
//! touching plugin code, and the store is separated from the manager so
//! platforms can swap the storage mechanism (files, database rows, memory).
//!
//! Stored documents carry a tiny format-agnostic version header as their
//! first non-empty, non-comment line:
//!
//! ```text
//! hearthConfigVersion: 3
//! ```
//!
//! Migrations operate on raw text between versions, which keeps old
//! documents readable even when their schema no longer parses.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::context::ContextGate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config manager is torn down")]
    ContextClosed,
    #[error("invalid config id '{0}'")]
    InvalidId(String),
    #[error("config io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("config decode failure: {0}")]
    Decode(String),
    #[error("config encode failure: {0}")]
    Encode(String),
}

/// Encodes and decodes a typed configuration document.
pub trait ConfigCodec<T>: Send + Sync {
    fn decode(&self, text: &str) -> Result<T, ConfigError>;

    fn encode(&self, value: &T) -> Result<String, ConfigError>;
}

/// TOML codec, the default format.
pub struct TomlCodec;

impl<T: Serialize + DeserializeOwned> ConfigCodec<T> for TomlCodec {
    fn decode(&self, text: &str) -> Result<T, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Decode(e.to_string()))
    }

    fn encode(&self, value: &T) -> Result<String, ConfigError> {
        toml::to_string_pretty(value).map_err(|e| ConfigError::Encode(e.to_string()))
    }
}

/// JSON codec, for hosts that prefer machine-edited documents.
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> ConfigCodec<T> for JsonCodec {
    fn decode(&self, text: &str) -> Result<T, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Decode(e.to_string()))
    }

    fn encode(&self, value: &T) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(value).map_err(|e| ConfigError::Encode(e.to_string()))
    }
}

/// A versioned migration from one schema version to the next.
#[derive(Clone)]
pub struct ConfigMigration {
    from_version: u32,
    to_version: u32,
    apply: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl ConfigMigration {
    pub fn new(
        from_version: u32,
        to_version: u32,
        apply: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            from_version,
            to_version,
            apply: Arc::new(apply),
        }
    }
}

/// Typed handle for one configuration document.
pub struct ConfigKey<T> {
    id: String,
    version: u32,
    codec: Arc<dyn ConfigCodec<T>>,
    default_value: Arc<dyn Fn() -> T + Send + Sync>,
    migrations: Vec<ConfigMigration>,
}

impl<T: Serialize + DeserializeOwned> ConfigKey<T> {
    /// A TOML-backed key. `id` is the storage-relative document name,
    /// extension included (e.g. `"greeter.toml"`).
    pub fn toml(
        id: impl Into<String>,
        version: u32,
        default_value: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self::with_codec(id, version, Arc::new(TomlCodec), default_value)
    }

    /// A JSON-backed key.
    pub fn json(
        id: impl Into<String>,
        version: u32,
        default_value: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self::with_codec(id, version, Arc::new(JsonCodec), default_value)
    }

    pub fn with_codec(
        id: impl Into<String>,
        version: u32,
        codec: Arc<dyn ConfigCodec<T>>,
        default_value: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            version,
            codec,
            default_value: Arc::new(default_value),
            migrations: Vec::new(),
        }
    }

    pub fn with_migration(mut self, migration: ConfigMigration) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn default_value(&self) -> T {
        (self.default_value)()
    }
}

/// Text-based config storage boundary.
pub trait ConfigTextStore: Send + Sync {
    fn read(&self, id: &str) -> Result<Option<String>, ConfigError>;

    fn write(&self, id: &str, text: &str) -> Result<(), ConfigError>;
}

/// In-memory store for tests and fake platforms.
#[derive(Default)]
pub struct InMemoryConfigStore {
    documents: DashMap<String, String>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigTextStore for InMemoryConfigStore {
    fn read(&self, id: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.documents.get(id).map(|text| text.clone()))
    }

    fn write(&self, id: &str, text: &str) -> Result<(), ConfigError> {
        self.documents.insert(id.to_string(), text.to_string());
        Ok(())
    }
}

/// File-backed store. Ids are treated as relative filenames below the base
/// directory; absolute paths and parent traversal are rejected.
pub struct FileConfigStore {
    base_dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn resolve(&self, id: &str) -> Result<PathBuf, ConfigError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidId(id.to_string()));
        }
        let relative = Path::new(trimmed);
        let traverses = relative.is_absolute()
            || relative
                .components()
                .any(|part| matches!(part, Component::ParentDir | Component::RootDir));
        if traverses {
            return Err(ConfigError::InvalidId(id.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }
}

impl ConfigTextStore for FileConfigStore {
    fn read(&self, id: &str) -> Result<Option<String>, ConfigError> {
        let path = self.resolve(id)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn write(&self, id: &str, text: &str) -> Result<(), ConfigError> {
        let path = self.resolve(id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(path, text)?)
    }
}

const VERSION_HEADER: &str = "hearthConfigVersion:";

/// Loads and saves typed configs via a [`ConfigTextStore`], applying
/// migrations when the stored version is older than the key's.
pub struct ConfigManager {
    store: Arc<dyn ConfigTextStore>,
    gate: ContextGate,
}

impl ConfigManager {
    pub fn new(store: Arc<dyn ConfigTextStore>) -> Self {
        Self::scoped(store, ContextGate::new())
    }

    pub(crate) fn scoped(store: Arc<dyn ConfigTextStore>, gate: ContextGate) -> Self {
        Self { store, gate }
    }

    /// Loads the config for `key`.
    ///
    /// Resilient by design: a missing document writes and returns the
    /// default; a document that fails to decode after migration logs the
    /// failure, overwrites with the default and returns it. Only store IO
    /// problems surface as errors.
    pub fn load<T: Serialize + DeserializeOwned>(
        &self,
        key: &ConfigKey<T>,
    ) -> Result<T, ConfigError> {
        if self.gate.is_closed() {
            return Err(ConfigError::ContextClosed);
        }

        let Some(existing) = self.store.read(key.id())? else {
            let default = key.default_value();
            self.save(key, &default)?;
            return Ok(default);
        };

        let (stored_version, body) = split_version_header(&existing);
        let mut version = stored_version.unwrap_or(0);
        let mut text = body;

        if version < key.version() {
            let mut migrations = key.migrations.clone();
            migrations.sort_by_key(|m| m.from_version);
            for migration in &migrations {
                if migration.from_version != version {
                    continue;
                }
                text = (migration.apply)(&text);
                version = migration.to_version;
            }
        }
        if version != key.version() {
            warn!(
                "config '{}' could not be fully migrated (have={} want={}); decoding best-effort",
                key.id(),
                version,
                key.version()
            );
        }

        let value = match key.codec.decode(&text) {
            Ok(value) => value,
            Err(decode_error) => {
                error!(
                    "failed to decode config '{}', falling back to defaults: {}",
                    key.id(),
                    decode_error
                );
                key.default_value()
            }
        };

        // Persist applied migrations (and the current header) in one place.
        self.save(key, &value)?;
        Ok(value)
    }

    /// Saves `value` for `key` with the current version header.
    pub fn save<T: Serialize + DeserializeOwned>(
        &self,
        key: &ConfigKey<T>,
        value: &T,
    ) -> Result<(), ConfigError> {
        if self.gate.is_closed() {
            return Err(ConfigError::ContextClosed);
        }
        let encoded = key.codec.encode(value)?;
        let document = format!("{} {}\n{}", VERSION_HEADER, key.version(), encoded);
        self.store.write(key.id(), &document)
    }
}

fn split_version_header(text: &str) -> (Option<u32>, String) {
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        if let Some(rest) = line.strip_prefix(VERSION_HEADER) {
            let version = rest.trim().parse::<u32>().ok();
            let body = text
                .lines()
                .skip(index + 1)
                .collect::<Vec<_>>()
                .join("\n");
            return (version, body);
        }
        break;
    }
    (None, text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct MotdConfig {
        message: String,
        interval_ticks: u64,
    }

    fn motd_key() -> ConfigKey<MotdConfig> {
        ConfigKey::toml("motd.toml", 1, || MotdConfig {
            message: "welcome".to_string(),
            interval_ticks: 200,
        })
    }

    #[test]
    fn missing_document_writes_and_returns_defaults() {
        let store = Arc::new(InMemoryConfigStore::new());
        let manager = ConfigManager::new(store.clone());

        let loaded = manager.load(&motd_key()).unwrap();
        assert_eq!(loaded.message, "welcome");

        let stored = store.read("motd.toml").unwrap().unwrap();
        assert!(stored.starts_with("hearthConfigVersion: 1"));
        assert!(stored.contains("welcome"));
    }

    #[test]
    fn save_then_load_roundtrips_through_the_header() {
        let manager = ConfigManager::new(Arc::new(InMemoryConfigStore::new()));
        let key = motd_key();

        manager
            .save(
                &key,
                &MotdConfig {
                    message: "hello there".to_string(),
                    interval_ticks: 40,
                },
            )
            .unwrap();

        let loaded = manager.load(&key).unwrap();
        assert_eq!(loaded.message, "hello there");
        assert_eq!(loaded.interval_ticks, 40);
    }

    #[test]
    fn migrations_chain_in_version_order() {
        let store = Arc::new(InMemoryConfigStore::new());
        store
            .write("motd.toml", "hearthConfigVersion: 0\nmessage = \"old\"\n")
            .unwrap();

        let key = ConfigKey::toml("motd.toml", 2, || MotdConfig {
            message: "default".to_string(),
            interval_ticks: 100,
        })
        .with_migration(ConfigMigration::new(1, 2, |text| {
            format!("{text}interval_ticks = 60\n")
        }))
        .with_migration(ConfigMigration::new(0, 1, |text| {
            text.replace("old", "migrated")
        }));

        let manager = ConfigManager::new(store.clone());
        let loaded = manager.load(&key).unwrap();
        assert_eq!(loaded.message, "migrated");
        assert_eq!(loaded.interval_ticks, 60);

        // Migrated content is persisted back under the new version.
        let stored = store.read("motd.toml").unwrap().unwrap();
        assert!(stored.starts_with("hearthConfigVersion: 2"));
    }

    #[test]
    fn undecodable_document_falls_back_to_defaults() {
        let store = Arc::new(InMemoryConfigStore::new());
        store
            .write("motd.toml", "hearthConfigVersion: 1\nthis is not toml [")
            .unwrap();

        let manager = ConfigManager::new(store.clone());
        let loaded = manager.load(&motd_key()).unwrap();
        assert_eq!(loaded.message, "welcome");

        let stored = store.read("motd.toml").unwrap().unwrap();
        assert!(stored.contains("welcome"));
    }

    #[test]
    fn file_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.read("../outside.toml"),
            Err(ConfigError::InvalidId(_))
        ));
        assert!(matches!(
            store.write("/etc/motd.toml", "x"),
            Err(ConfigError::InvalidId(_))
        ));

        store.write("nested/motd.toml", "body").unwrap();
        assert_eq!(
            store.read("nested/motd.toml").unwrap().as_deref(),
            Some("body")
        );
    }

    #[test]
    fn json_codec_documents_roundtrip() {
        let manager = ConfigManager::new(Arc::new(InMemoryConfigStore::new()));
        let key = ConfigKey::json("motd.json", 1, || MotdConfig {
            message: "json default".to_string(),
            interval_ticks: 10,
        });

        let loaded = manager.load(&key).unwrap();
        assert_eq!(loaded.message, "json default");
    }
}
