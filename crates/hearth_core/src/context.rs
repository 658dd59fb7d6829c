//! Per-plugin composition root.
//!
//! A [`PluginContext`] owns one instance of every runtime component, scoped
//! to one plugin's lifecycle. There are no ambient singletons: everything a
//! plugin registers lives in its context and is released by
//! [`teardown`](PluginContext::teardown).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::commands::{CommandBridge, CommandRegistry, CommandSink};
use crate::config::{ConfigManager, ConfigTextStore, InMemoryConfigStore};
use crate::events::EventBus;
use crate::report::{Diagnostics, Reporter, TracingReporter};
use crate::scheduler::{Scheduler, TaskFailurePolicy};
use crate::services::ServiceRegistry;

/// Opaque plugin identifier, stable across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Shared close flag for every component of one context.
///
/// Teardown flips this single flag before draining any registry, so
/// concurrent callers observe either the fully-open or the fully-closed
/// context — never a partially torn-down one.
#[derive(Debug, Clone, Default)]
pub struct ContextGate(Arc<AtomicBool>);

impl ContextGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Closes the gate. Returns `true` for the first caller.
    pub fn close(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Construction-time knobs for a context.
pub struct ContextSettings {
    pub reporter: Arc<dyn Reporter>,
    pub slow_call_threshold: Duration,
    pub task_failure_policy: TaskFailurePolicy,
    pub config_store: Arc<dyn ConfigTextStore>,
    pub command_sink: Option<Arc<dyn CommandSink>>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            reporter: Arc::new(TracingReporter),
            slow_call_threshold: Duration::from_millis(50),
            task_failure_policy: TaskFailurePolicy::default(),
            config_store: Arc::new(InMemoryConfigStore::new()),
            command_sink: None,
        }
    }
}

/// Per-plugin access to the runtime.
///
/// Intentionally capability-oriented: plugins hold this one object instead
/// of a giant "server" handle, and platform adapters stay free to swap the
/// world behind it.
pub struct PluginContext {
    id: PluginId,
    gate: ContextGate,
    events: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    commands: Arc<CommandRegistry>,
    command_bridge: Arc<CommandBridge>,
    services: Arc<ServiceRegistry>,
    configs: Arc<ConfigManager>,
}

impl PluginContext {
    pub fn new(id: impl Into<PluginId>) -> Self {
        Self::with_settings(id, ContextSettings::default())
    }

    pub fn with_settings(id: impl Into<PluginId>, settings: ContextSettings) -> Self {
        let gate = ContextGate::new();
        let diagnostics = Arc::new(Diagnostics::new(
            settings.reporter,
            settings.slow_call_threshold,
        ));

        let events = Arc::new(EventBus::scoped(gate.clone(), diagnostics.clone()));
        let scheduler = Arc::new(Scheduler::scoped(
            gate.clone(),
            diagnostics.clone(),
            settings.task_failure_policy,
        ));
        let commands = Arc::new(CommandRegistry::scoped(gate.clone()));
        if let Some(sink) = settings.command_sink {
            commands.bind_sink(sink);
        }
        let command_bridge = Arc::new(CommandBridge::scoped(commands.clone(), diagnostics));
        let services = Arc::new(ServiceRegistry::scoped(gate.clone()));
        let configs = Arc::new(ConfigManager::scoped(settings.config_store, gate.clone()));

        Self {
            id: id.into(),
            gate,
            events,
            scheduler,
            commands,
            command_bridge,
            services,
            configs,
        }
    }

    pub fn plugin_id(&self) -> &PluginId {
        &self.id
    }

    /// Event publishing and subscription.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Deferred and periodic work, driven by the platform tick.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Command registration.
    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Inbound command dispatch, for the platform side.
    pub fn command_bridge(&self) -> &Arc<CommandBridge> {
        &self.command_bridge
    }

    /// Shared capability instances.
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Typed configuration access.
    pub fn configs(&self) -> &Arc<ConfigManager> {
        &self.configs
    }

    pub fn is_torn_down(&self) -> bool {
        self.gate.is_closed()
    }

    /// Releases everything this context owns: listeners, tasks, commands
    /// and services.
    ///
    /// The shared gate closes before any registry is drained, so a
    /// registration racing teardown either completes and is drained with
    /// the rest, or fails with the component's `ContextClosed` error.
    /// Idempotent.
    pub fn teardown(&self) {
        if !self.gate.close() {
            return;
        }
        self.events.clear();
        self.scheduler.cancel_all();
        self.commands.clear();
        self.services.clear();
        info!("plugin context '{}' torn down", self.id);
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("id", &self.id)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandDefinition, CommandResult};
    use crate::events::EventError;
    use crate::impl_event;
    use crate::scheduler::SchedulerError;
    use crate::services::ServiceError;
    use std::sync::atomic::AtomicU64;

    #[derive(Debug)]
    struct TickEvent;

    impl_event!(TickEvent);

    struct Marker;

    #[test]
    fn teardown_releases_every_registration() {
        let context = PluginContext::new("testplugin");
        let hits = Arc::new(AtomicU64::new(0));

        let listener_hits = hits.clone();
        context
            .events()
            .on(move |_: &mut TickEvent| {
                listener_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let task_hits = hits.clone();
        let handle = context
            .scheduler()
            .run_repeating(1, 1, move || {
                task_hits.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        context
            .commands()
            .register(CommandDefinition::new("noop", |_| CommandResult::Success))
            .unwrap();
        context.services().register(Marker).unwrap();

        context.teardown();
        context.teardown();

        context.events().publish(&mut TickEvent);
        context.scheduler().tick();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
        assert!(context.commands().resolve("noop").is_none());
        assert!(context.services().get::<Marker>().is_none());
        assert!(context.is_torn_down());
    }

    #[test]
    fn registrations_after_teardown_are_rejected_everywhere() {
        let context = PluginContext::new("testplugin");
        context.teardown();

        assert!(matches!(
            context.events().on(|_: &mut TickEvent| Ok(())),
            Err(EventError::ContextClosed)
        ));
        assert!(matches!(
            context.scheduler().run_now(|| {}),
            Err(SchedulerError::ContextClosed)
        ));
        assert!(matches!(
            context
                .commands()
                .register(CommandDefinition::new("late", |_| CommandResult::Success)),
            Err(crate::commands::CommandError::ContextClosed)
        ));
        assert!(matches!(
            context.services().register(Marker),
            Err(ServiceError::ContextClosed)
        ));
    }

    #[test]
    fn contexts_are_isolated_from_each_other() {
        let first = PluginContext::new("first");
        let second = PluginContext::new("second");
        let hits = Arc::new(AtomicU64::new(0));

        let counter = hits.clone();
        first
            .events()
            .on(move |_: &mut TickEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        second.events().publish(&mut TickEvent);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        first.events().publish(&mut TickEvent);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
