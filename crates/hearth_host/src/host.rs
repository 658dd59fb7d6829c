//! Plugin host: lifecycle management and platform-adapter duties.

use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use hearth_core::commands::{CommandContext, CommandDefinition, CommandResult, CommandSender, CommandSink};
use hearth_core::config::FileConfigStore;
use hearth_core::context::{ContextSettings, PluginContext};
use hearth_core::events::Event;
use hearth_core::scheduler::TaskFailurePolicy;
use hearth_platform::{Platform, PlatformClock, SystemClock};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::events::{PluginLoadedEvent, PluginUnloadedEvent};
use crate::loader::{load_plugin_library, LoadedLibrary};
use crate::manifest::{discover_manifests, PluginManifest};
use crate::HostError;

/// Host-side knobs, usually filled from the app config.
pub struct HostSettings {
    pub plugin_dir: PathBuf,
    /// Per-plugin config files land in `<config_dir>/<plugin name>/`.
    pub config_dir: PathBuf,
    pub slow_call_threshold: Duration,
    pub task_failure_policy: TaskFailurePolicy,
}

/// Command sink that just logs mirror operations. A real server adapter
/// would register the command with the host runtime here.
pub struct LoggingCommandSink;

impl CommandSink for LoggingCommandSink {
    fn on_register(&self, definition: &CommandDefinition) {
        info!(
            "command '{}' registered ({} aliases)",
            definition.name(),
            definition.aliases().len()
        );
    }

    fn on_unregister(&self, name: &str) {
        info!("command '{}' unregistered", name);
    }
}

/// Platform implementation for the standalone host.
pub struct StandalonePlatform {
    clock: Arc<SystemClock>,
    sink: Arc<LoggingCommandSink>,
}

impl StandalonePlatform {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock::new()),
            sink: Arc::new(LoggingCommandSink),
        }
    }
}

impl Default for StandalonePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for StandalonePlatform {
    fn platform_id(&self) -> &str {
        "standalone"
    }

    fn clock(&self) -> Arc<dyn PlatformClock> {
        self.clock.clone()
    }

    fn command_sink(&self) -> Arc<dyn CommandSink> {
        self.sink.clone()
    }
}

struct HostedPlugin {
    manifest: PluginManifest,
    context: Arc<PluginContext>,
    loaded: LoadedLibrary,
}

/// Loads plugins from manifests, owns their contexts and plays the
/// platform-adapter role: ticking schedulers, forwarding inbound commands
/// and originating events.
pub struct PluginHost {
    platform: Arc<dyn Platform>,
    settings: HostSettings,
    plugins: Mutex<Vec<HostedPlugin>>,
    // Context list mirrored outside the async lock so the tick path and
    // inbound routing stay synchronous.
    contexts: RwLock<Vec<Arc<PluginContext>>>,
}

impl PluginHost {
    pub fn new(platform: Arc<dyn Platform>, settings: HostSettings) -> Self {
        Self {
            platform,
            settings,
            plugins: Mutex::new(Vec::new()),
            contexts: RwLock::new(Vec::new()),
        }
    }

    /// Discovers manifests and loads every enabled plugin.
    ///
    /// A plugin that fails to load is skipped with an error log; it never
    /// takes the host down. Returns the number of plugins running.
    pub async fn load_all(&self) -> Result<usize, HostError> {
        let manifests = discover_manifests(&self.settings.plugin_dir)?;
        if manifests.is_empty() {
            warn!(
                "no plugin manifests found in {}",
                self.settings.plugin_dir.display()
            );
        }

        for (path, manifest) in manifests {
            let name = manifest.name.clone();
            if let Err(e) = self.load_plugin(&path, manifest).await {
                error!("failed to load plugin '{}': {}", name, e);
            }
        }
        Ok(self.read_contexts().len())
    }

    async fn load_plugin(
        &self,
        manifest_path: &std::path::Path,
        manifest: PluginManifest,
    ) -> Result<(), HostError> {
        {
            let plugins = self.plugins.lock().await;
            if plugins.iter().any(|hosted| hosted.manifest.name == manifest.name) {
                return Err(HostError::DuplicatePlugin {
                    name: manifest.name,
                });
            }
        }

        let mut loaded = load_plugin_library(&manifest.library_path(manifest_path))?;
        if loaded.plugin.name() != manifest.name {
            warn!(
                "manifest name '{}' differs from plugin-reported name '{}'",
                manifest.name,
                loaded.plugin.name()
            );
        }

        let config_store = FileConfigStore::new(self.settings.config_dir.join(&manifest.name))
            .map_err(|e| HostError::PluginFailed {
                name: manifest.name.clone(),
                reason: e.to_string(),
            })?;
        let context = Arc::new(PluginContext::with_settings(
            manifest.name.as_str(),
            ContextSettings {
                slow_call_threshold: self.settings.slow_call_threshold,
                task_failure_policy: self.settings.task_failure_policy,
                config_store: Arc::new(config_store),
                command_sink: Some(self.platform.command_sink()),
                ..ContextSettings::default()
            },
        ));

        let lifecycle = async {
            loaded.plugin.on_load(context.clone()).await?;
            loaded.plugin.on_enable(context.clone()).await
        };
        if let Err(e) = lifecycle.await {
            context.teardown();
            return Err(HostError::PluginFailed {
                name: manifest.name,
                reason: e.to_string(),
            });
        }

        info!(
            "plugin '{}' v{} loaded on platform '{}'",
            manifest.name,
            manifest.version,
            self.platform.platform_id()
        );

        let mut loaded_event = PluginLoadedEvent {
            plugin: manifest.name.clone(),
            version: manifest.version.clone(),
        };
        self.publish(&mut loaded_event);

        self.write_contexts().push(context.clone());
        self.plugins.lock().await.push(HostedPlugin {
            manifest,
            context,
            loaded,
        });
        Ok(())
    }

    /// Disables and unloads one plugin, tearing its context down.
    pub async fn unload(&self, name: &str) -> Result<(), HostError> {
        let mut hosted = {
            let mut plugins = self.plugins.lock().await;
            let index = plugins
                .iter()
                .position(|hosted| hosted.manifest.name == name)
                .ok_or_else(|| HostError::NotLoaded {
                    name: name.to_string(),
                })?;
            plugins.remove(index)
        };
        self.write_contexts()
            .retain(|context| context.plugin_id() != hosted.context.plugin_id());

        if let Err(e) = hosted.loaded.plugin.on_disable(hosted.context.clone()).await {
            error!("plugin '{}' failed during disable: {}", name, e);
        }
        hosted.context.teardown();
        drop(hosted);

        self.publish(&mut PluginUnloadedEvent {
            plugin: name.to_string(),
        });
        info!("plugin '{}' unloaded", name);
        Ok(())
    }

    /// Unloads every plugin, last-loaded first.
    pub async fn shutdown(&self) {
        loop {
            let name = {
                let plugins = self.plugins.lock().await;
                plugins.last().map(|hosted| hosted.manifest.name.clone())
            };
            let Some(name) = name else { break };
            if let Err(e) = self.unload(&name).await {
                error!("shutdown: {}", e);
            }
        }
    }

    /// Advances every plugin scheduler by one tick. Called from the tick
    /// loop; this is the logical tick thread.
    pub fn tick(&self) {
        for context in self.read_contexts().iter() {
            context.scheduler().tick();
        }
    }

    /// Routes an inbound command to the plugin that can resolve it.
    pub fn dispatch_command(
        &self,
        sender: Arc<dyn CommandSender>,
        label: &str,
        args: &[&str],
    ) -> CommandResult {
        let context = CommandContext::new(sender, label, args.iter().copied());
        for plugin_context in self.read_contexts().iter() {
            match plugin_context.command_bridge().dispatch_inbound(&context) {
                CommandResult::NotFound => continue,
                result => return result,
            }
        }
        CommandResult::NotFound
    }

    /// Originates an inbound event into every plugin context.
    pub fn publish<E: Event>(&self, event: &mut E) {
        for context in self.read_contexts().iter() {
            context.events().publish(event);
        }
    }

    /// Names of the plugins currently running.
    pub async fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .lock()
            .await
            .iter()
            .map(|hosted| hosted.manifest.name.clone())
            .collect()
    }

    fn read_contexts(&self) -> RwLockReadGuard<'_, Vec<Arc<PluginContext>>> {
        self.contexts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_contexts(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<PluginContext>>> {
        self.contexts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
