//! Command registry and inbound dispatch pipeline.
//!
//! The registry is logic-only: platforms handle input tokenization and
//! output routing, then hand inbound invocations to the [`CommandBridge`].
//! Labels and aliases are matched case-insensitively (trim + ASCII
//! lowercase), applied consistently at registration and lookup.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::debug;

use crate::context::ContextGate;
use crate::report::{panic_message, CallKind, Diagnostics};

/// Abstract permission identifier.
///
/// The runtime does not assume any specific permission engine; a platform
/// adapter decides how permissions are represented and checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission(String);

impl Permission {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity that can execute commands: player, console, remote admin, script.
///
/// Modeled as a capability surface, not a concrete actor hierarchy.
pub trait CommandSender: Send + Sync {
    fn name(&self) -> &str;

    fn send_message(&self, message: &str);

    fn has_permission(&self, permission: &Permission) -> bool;
}

/// Context for one command invocation. Lives for a single dispatch call.
#[derive(Clone)]
pub struct CommandContext {
    pub sender: Arc<dyn CommandSender>,
    /// The label used to invoke the command (may be an alias).
    pub label: String,
    /// Tokenized arguments after the label (no quoting guarantees).
    pub args: Vec<String>,
}

impl CommandContext {
    pub fn new(
        sender: Arc<dyn CommandSender>,
        label: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            sender,
            label: label.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("sender", &self.sender.name())
            .field("label", &self.label)
            .field("args", &self.args)
            .finish()
    }
}

/// Outcome of a command execution, communicated back to the platform
/// without panicking. Platforms map these to their own messaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    /// Failed with a message suitable for end users.
    Failure(String),
    /// Arguments were invalid for the chosen command route.
    UsageError(String),
    /// Sender lacks the required permission.
    NoPermission,
    /// No definition matched the label.
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command registry is torn down")]
    ContextClosed,
    #[error("command label must not be blank")]
    BlankLabel,
    #[error("command '{label}' already maps to a definition")]
    DuplicateCommand { label: String },
}

type Executor = dyn Fn(&CommandContext) -> CommandResult + Send + Sync;

/// Declarative command definition: a pure value plus an executor capability.
/// The registry is the sole source of truth for label → definition lookup
/// once this is registered.
pub struct CommandDefinition {
    name: String,
    aliases: Vec<String>,
    description: Option<String>,
    permission: Option<Permission>,
    executor: Arc<Executor>,
}

impl CommandDefinition {
    pub fn new(
        name: impl Into<String>,
        executor: impl Fn(&CommandContext) -> CommandResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: None,
            permission: None,
            executor: Arc::new(executor),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn permission(&self) -> Option<&Permission> {
        self.permission.as_ref()
    }

    pub fn execute(&self, context: &CommandContext) -> CommandResult {
        (self.executor)(context)
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("permission", &self.permission)
            .finish()
    }
}

/// Host-side mirror for command registration changes.
///
/// Platform adapters implement this to expose registered commands to the
/// host runtime so that input routes back into the bridge.
pub trait CommandSink: Send + Sync {
    fn on_register(&self, definition: &CommandDefinition);

    fn on_unregister(&self, name: &str);
}

#[derive(Default)]
struct CommandTables {
    by_name: HashMap<String, Arc<CommandDefinition>>,
    alias_to_name: HashMap<String, String>,
}

/// In-memory command registry.
///
/// A single lock covers both tables so duplicate detection and alias
/// rollback stay atomic under concurrent registration.
pub struct CommandRegistry {
    tables: RwLock<CommandTables>,
    sink: RwLock<Option<Arc<dyn CommandSink>>>,
    gate: ContextGate,
}

impl CommandRegistry {
    /// A stand-alone registry, for tests and tools that do not go through a
    /// [`PluginContext`](crate::context::PluginContext).
    pub fn new() -> Self {
        Self::scoped(ContextGate::new())
    }

    pub(crate) fn scoped(gate: ContextGate) -> Self {
        Self {
            tables: RwLock::new(CommandTables::default()),
            sink: RwLock::new(None),
            gate,
        }
    }

    /// Binds the host-side sink. Bind before registering; registrations made
    /// earlier are not replayed.
    pub fn bind_sink(&self, sink: Arc<dyn CommandSink>) {
        *self
            .sink
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);
    }

    /// Registers `definition` under its name and aliases.
    ///
    /// Fails with [`CommandError::DuplicateCommand`] when the name or any
    /// alias already resolves to a different definition; a failed
    /// registration leaves the registry untouched.
    pub fn register(&self, definition: CommandDefinition) -> Result<(), CommandError> {
        let name = normalize(definition.name());
        if name.is_empty() {
            return Err(CommandError::BlankLabel);
        }

        let mut aliases = Vec::new();
        for alias in definition.aliases() {
            let alias = normalize(alias);
            if alias.is_empty() {
                return Err(CommandError::BlankLabel);
            }
            if alias != name && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        let definition = Arc::new(definition);
        {
            // Gate check under the table lock keeps registration atomic with
            // respect to teardown.
            let mut tables = self.write_tables();
            if self.gate.is_closed() {
                return Err(CommandError::ContextClosed);
            }
            for label in std::iter::once(&name).chain(aliases.iter()) {
                if tables.by_name.contains_key(label) || tables.alias_to_name.contains_key(label) {
                    return Err(CommandError::DuplicateCommand {
                        label: label.clone(),
                    });
                }
            }
            tables.by_name.insert(name.clone(), definition.clone());
            for alias in &aliases {
                tables.alias_to_name.insert(alias.clone(), name.clone());
            }
        }
        debug!("registered command '{}' ({} aliases)", name, aliases.len());

        if let Some(sink) = self.current_sink() {
            sink.on_register(&definition);
        }
        Ok(())
    }

    /// Unregisters a command by its primary name, removing its aliases too.
    pub fn unregister(&self, name: &str) {
        let key = normalize(name);
        let removed = {
            let mut tables = self.write_tables();
            let removed = tables.by_name.remove(&key).is_some();
            tables.alias_to_name.retain(|_, target| *target != key);
            removed
        };
        if removed {
            if let Some(sink) = self.current_sink() {
                sink.on_unregister(&key);
            }
        }
    }

    /// Resolves a label to a definition: exact name first, then aliases.
    pub fn resolve(&self, label: &str) -> Option<Arc<CommandDefinition>> {
        let key = normalize(label);
        let tables = self.read_tables();
        if let Some(definition) = tables.by_name.get(&key) {
            return Some(definition.clone());
        }
        let name = tables.alias_to_name.get(&key)?;
        tables.by_name.get(name).cloned()
    }

    /// Primary names of all registered commands.
    pub fn registered_names(&self) -> Vec<String> {
        self.read_tables().by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_tables().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_tables().by_name.is_empty()
    }

    /// Drops every registration. Used by context teardown.
    pub(crate) fn clear(&self) {
        let mut tables = self.write_tables();
        tables.by_name.clear();
        tables.alias_to_name.clear();
    }

    fn current_sink(&self) -> Option<Arc<dyn CommandSink>> {
        self.sink
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, CommandTables> {
        self.tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, CommandTables> {
        self.tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

/// Receives inbound command invocations from the platform and turns them
/// into [`CommandResult`]s. Runs on the tick thread; executor faults are
/// reported and converted, never propagated.
pub struct CommandBridge {
    registry: Arc<CommandRegistry>,
    diagnostics: Arc<Diagnostics>,
}

impl CommandBridge {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self::scoped(registry, Arc::new(Diagnostics::default()))
    }

    pub(crate) fn scoped(registry: Arc<CommandRegistry>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            registry,
            diagnostics,
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Resolves `context.label` and executes the matching definition.
    ///
    /// Unknown labels come back as [`CommandResult::NotFound`]; a missing
    /// permission as [`CommandResult::NoPermission`]; an executor panic is
    /// reported and converted to [`CommandResult::Failure`].
    pub fn dispatch_inbound(&self, context: &CommandContext) -> CommandResult {
        let Some(definition) = self.registry.resolve(&context.label) else {
            return CommandResult::NotFound;
        };

        if let Some(permission) = definition.permission() {
            if !context.sender.has_permission(permission) {
                return CommandResult::NoPermission;
            }
        }

        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| definition.execute(context)));
        self.diagnostics
            .observe(CallKind::CommandExecutor, definition.name(), started.elapsed());

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.diagnostics.reporter.call_panicked(
                    CallKind::CommandExecutor,
                    definition.name(),
                    &message,
                );
                CommandResult::Failure(message)
            }
        }
    }
}
