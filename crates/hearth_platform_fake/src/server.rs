//! Fully controllable fake server runtime.
//!
//! Lets Hearth plugins be exercised without a real server: deterministic
//! time, manual tick driving, event simulation and inbound command routing,
//! all against real per-plugin contexts.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hearth_core::commands::{CommandContext, CommandResult, CommandSender};
use hearth_core::config::InMemoryConfigStore;
use hearth_core::context::{ContextSettings, PluginContext, PluginId};
use hearth_core::events::Event;
use hearth_core::plugin::{Plugin, PluginError};
use hearth_platform::{Platform, PlatformClock};
use tracing::debug;

use crate::clock::DeterministicClock;
use crate::sink::RecordingCommandSink;

/// Fake platform implementation: deterministic clock plus recording sink.
pub struct FakePlatform {
    clock: Arc<DeterministicClock>,
    sink: Arc<RecordingCommandSink>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(DeterministicClock::new()),
            sink: Arc::new(RecordingCommandSink::new()),
        }
    }

    pub fn deterministic_clock(&self) -> &Arc<DeterministicClock> {
        &self.clock
    }

    pub fn recording_sink(&self) -> &Arc<RecordingCommandSink> {
        &self.sink
    }
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for FakePlatform {
    fn platform_id(&self) -> &str {
        "fake"
    }

    fn clock(&self) -> Arc<dyn PlatformClock> {
        self.clock.clone()
    }

    fn command_sink(&self) -> Arc<dyn hearth_core::commands::CommandSink> {
        self.sink.clone()
    }
}

/// In-memory server harness around [`FakePlatform`].
///
/// Owns one [`PluginContext`] per plugin and plays the platform-adapter
/// role: it ticks every scheduler, posts inbound events into every context
/// and routes inbound commands to the context that can resolve them.
pub struct FakeServer {
    platform: FakePlatform,
    contexts: Mutex<Vec<Arc<PluginContext>>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            platform: FakePlatform::new(),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn platform(&self) -> &FakePlatform {
        &self.platform
    }

    /// Creates (and tracks) a context for `plugin_id`, wired to the fake
    /// platform with an in-memory config store.
    pub fn create_context(&self, plugin_id: impl Into<PluginId>) -> Arc<PluginContext> {
        let settings = ContextSettings {
            config_store: Arc::new(InMemoryConfigStore::new()),
            command_sink: Some(self.platform.sink.clone()),
            ..ContextSettings::default()
        };
        let context = Arc::new(PluginContext::with_settings(plugin_id, settings));
        self.lock_contexts().push(context.clone());
        context
    }

    /// Runs `on_load` + `on_enable` for `plugin` against a fresh context.
    pub async fn enable_plugin(
        &self,
        plugin_id: impl Into<PluginId>,
        plugin: &mut dyn Plugin,
    ) -> Result<Arc<PluginContext>, PluginError> {
        let context = self.create_context(plugin_id);
        plugin.on_load(context.clone()).await?;
        plugin.on_enable(context.clone()).await?;
        debug!("enabled plugin '{}'", context.plugin_id());
        Ok(context)
    }

    /// Runs `on_disable` and tears the plugin's context down.
    pub async fn disable_plugin(
        &self,
        plugin: &mut dyn Plugin,
        context: &Arc<PluginContext>,
    ) -> Result<(), PluginError> {
        let result = plugin.on_disable(context.clone()).await;
        context.teardown();
        self.lock_contexts()
            .retain(|tracked| tracked.plugin_id() != context.plugin_id());
        result
    }

    /// Advances every context's scheduler by one tick.
    pub fn tick(&self) {
        for context in self.lock_contexts().iter() {
            context.scheduler().tick();
        }
    }

    /// Advances every scheduler by `ticks` ticks.
    pub fn tick_many(&self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Moves the deterministic clock forward (ticks are separate).
    pub fn advance_clock(&self, duration: Duration) {
        self.platform.clock.advance_by(duration);
    }

    /// Posts an inbound event into every plugin context, the way a platform
    /// adapter forwards server events.
    pub fn post<E: Event>(&self, event: &mut E) {
        for context in self.lock_contexts().iter() {
            context.events().publish(event);
        }
    }

    /// Routes an inbound command invocation.
    ///
    /// Contexts are tried in creation order; the first one that resolves the
    /// label wins. `NotFound` only when no context resolves it.
    pub fn dispatch_command(
        &self,
        sender: Arc<dyn CommandSender>,
        label: &str,
        args: &[&str],
    ) -> CommandResult {
        let context = CommandContext::new(sender, label, args.iter().copied());
        for plugin_context in self.lock_contexts().iter() {
            match plugin_context.command_bridge().dispatch_inbound(&context) {
                CommandResult::NotFound => continue,
                result => return result,
            }
        }
        CommandResult::NotFound
    }

    fn lock_contexts(&self) -> MutexGuard<'_, Vec<Arc<PluginContext>>> {
        self.contexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}
