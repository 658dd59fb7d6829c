//! Host infrastructure events published into every plugin context.

use hearth_core::impl_event;

/// A sibling plugin finished loading and enabling.
#[derive(Debug, Clone)]
pub struct PluginLoadedEvent {
    pub plugin: String,
    pub version: String,
}

impl_event!(PluginLoadedEvent);

/// A sibling plugin was disabled and unloaded.
#[derive(Debug, Clone)]
pub struct PluginUnloadedEvent {
    pub plugin: String,
}

impl_event!(PluginUnloadedEvent);
