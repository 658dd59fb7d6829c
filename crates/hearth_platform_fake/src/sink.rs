//! Command sink that records registrations for introspection.

use dashmap::DashMap;

use hearth_core::commands::{CommandDefinition, CommandSink};

/// Captures command registrations the way a real host would mirror them
/// into its own dispatcher, and exposes them to assertions.
#[derive(Default)]
pub struct RecordingCommandSink {
    registered: DashMap<String, Vec<String>>,
}

impl RecordingCommandSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a command is currently registered (by primary name).
    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.contains_key(&name.to_ascii_lowercase())
    }

    /// Aliases recorded for a registered command.
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        self.registered
            .get(&name.to_ascii_lowercase())
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

impl CommandSink for RecordingCommandSink {
    fn on_register(&self, definition: &CommandDefinition) {
        self.registered.insert(
            definition.name().to_ascii_lowercase(),
            definition.aliases().to_vec(),
        );
    }

    fn on_unregister(&self, name: &str) {
        self.registered.remove(&name.to_ascii_lowercase());
    }
}
