//! # Hearth Core
//!
//! Host-neutral runtime for game-server plugins. Plugin code registers
//! commands, subscribes to events, schedules deferred and periodic work and
//! shares per-plugin services through one [`PluginContext`]; a swappable
//! platform adapter bridges those operations to an actual server (or to the
//! fake in-memory server for tests).
//!
//! ## Execution model
//!
//! The host drives a single logical tick thread. [`EventBus::publish`] and
//! [`CommandBridge::dispatch_inbound`] are synchronous, non-suspending calls
//! expected to run on that thread; no listener or executor may hold it for
//! unbounded time (violations are surfaced through the configurable
//! slow-call [`Reporter`]). The [`Scheduler`] is the sole synchronization
//! boundary: any thread may enqueue or cancel, only the tick thread
//! executes.
//!
//! Faults inside plugin-supplied callables — listeners, executors, tasks —
//! are always caught at the dispatch boundary and recorded; they never
//! escape to crash the host tick loop. Registration-time errors (duplicate
//! command, duplicate service) are returned synchronously to the caller.
//!
//! ## Example
//!
//! ```rust
//! use hearth_core::context::PluginContext;
//! use hearth_core::commands::{CommandDefinition, CommandResult};
//!
//! let context = PluginContext::new("motd");
//! context.commands().register(
//!     CommandDefinition::new("motd", |ctx| {
//!         ctx.sender.send_message("Welcome to the server!");
//!         CommandResult::Success
//!     }),
//! )?;
//! context.scheduler().run_repeating(20, 20 * 60, || {
//!     tracing::info!("minute marker");
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod commands;
pub mod config;
pub mod context;
pub mod discover;
pub mod events;
pub mod plugin;
pub mod report;
pub mod scheduler;
pub mod services;

pub use commands::{
    CommandBridge, CommandContext, CommandDefinition, CommandError, CommandRegistry, CommandResult,
    CommandSender, CommandSink, Permission,
};
pub use config::{
    ConfigCodec, ConfigError, ConfigKey, ConfigManager, ConfigMigration, ConfigTextStore,
    FileConfigStore, InMemoryConfigStore,
};
pub use context::{ContextGate, ContextSettings, PluginContext, PluginId};
pub use discover::{register_all, DiscoveryError, Registration};
pub use events::{Cancellable, Event, EventBus, EventError, EventPriority, Subscription};
pub use plugin::{Plugin, PluginError};
pub use report::{CallKind, Diagnostics, Reporter, TracingReporter};
pub use scheduler::{Scheduler, SchedulerError, TaskFailurePolicy, TaskHandle, Ticks};
pub use services::{ServiceError, ServiceRegistry};

/// Version information for host/plugin compatibility checks.
pub const HEARTH_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
