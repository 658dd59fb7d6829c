//! Fake command senders for tests.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use hearth_core::commands::{CommandSender, Permission};
use uuid::Uuid;

/// Stable fake-player identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recording player: captures every message it receives and answers
/// permission checks from a grantable set.
pub struct FakePlayer {
    id: PlayerId,
    name: String,
    permissions: Mutex<HashSet<String>>,
    messages: Mutex<Vec<String>>,
}

impl FakePlayer {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            permissions: Mutex::new(HashSet::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Grants a permission node.
    pub fn grant(&self, permission: &str) {
        self.lock(&self.permissions).insert(permission.to_string());
    }

    /// Revokes a permission node.
    pub fn revoke(&self, permission: &str) {
        self.lock(&self.permissions).remove(permission);
    }

    /// Everything sent to this player so far.
    pub fn messages(&self) -> Vec<String> {
        self.lock(&self.messages).clone()
    }

    pub fn clear_messages(&self) {
        self.lock(&self.messages).clear();
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CommandSender for FakePlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_message(&self, message: &str) {
        self.lock(&self.messages).push(message.to_string());
    }

    fn has_permission(&self, permission: &Permission) -> bool {
        self.lock(&self.permissions).contains(permission.as_str())
    }
}

/// Console-style sender that has every permission.
pub struct FakeConsole;

impl CommandSender for FakeConsole {
    fn name(&self) -> &str {
        "console"
    }

    fn send_message(&self, message: &str) {
        tracing::info!("[console] {message}");
    }

    fn has_permission(&self, _permission: &Permission) -> bool {
        true
    }
}
