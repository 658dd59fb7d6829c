//! Sample plugin that exercises the whole runtime surface: a configurable
//! greeting command, a join listener, a chat filter with a final-tier
//! auditor, a heartbeat task and a shared statistics service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::commands::{CommandDefinition, CommandResult, Permission};
use hearth_core::config::ConfigKey;
use hearth_core::context::PluginContext;
use hearth_core::events::{Cancellable, EventPriority};
use hearth_core::plugin::{Plugin, PluginError};
use hearth_core::{export_plugin, impl_event};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A player joined the server (posted by the platform adapter).
#[derive(Debug, Clone)]
pub struct PlayerJoinedEvent {
    pub player: String,
}

impl_event!(PlayerJoinedEvent);

/// Chat line on its way to other players. Cancelling suppresses delivery.
#[derive(Debug, Clone)]
pub struct ChatMessageEvent {
    pub player: String,
    pub message: String,
    cancelled: bool,
}

impl ChatMessageEvent {
    pub fn new(player: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            message: message.into(),
            cancelled: false,
        }
    }
}

impl Cancellable for ChatMessageEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl_event!(ChatMessageEvent, cancellable);

/// Join statistics shared with other plugins through the service registry.
#[derive(Debug, Default)]
pub struct GreeterStats {
    joins_seen: AtomicU64,
    chats_blocked: AtomicU64,
}

impl GreeterStats {
    pub fn joins_seen(&self) -> u64 {
        self.joins_seen.load(Ordering::Acquire)
    }

    pub fn chats_blocked(&self) -> u64 {
        self.chats_blocked.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreeterConfig {
    /// `{player}` is replaced with the joining player's name.
    pub greeting: String,
    /// Chat lines containing any of these are suppressed.
    pub blocked_words: Vec<String>,
    /// Heartbeat log interval; 0 disables the heartbeat.
    pub heartbeat_ticks: u64,
}

impl Default for GreeterConfig {
    fn default() -> Self {
        Self {
            greeting: "Welcome, {player}!".to_string(),
            blocked_words: vec!["spam".to_string()],
            heartbeat_ticks: 200,
        }
    }
}

fn config_key() -> ConfigKey<GreeterConfig> {
    ConfigKey::toml("greeter.toml", 1, GreeterConfig::default)
}

#[derive(Default)]
pub struct GreeterPlugin;

#[async_trait]
impl Plugin for GreeterPlugin {
    fn name(&self) -> &str {
        "greeter"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn on_load(&mut self, context: Arc<PluginContext>) -> Result<(), PluginError> {
        context
            .services()
            .register(GreeterStats::default())
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;
        Ok(())
    }

    async fn on_enable(&mut self, context: Arc<PluginContext>) -> Result<(), PluginError> {
        let config = context
            .configs()
            .load(&config_key())
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;
        let stats = context
            .services()
            .require::<GreeterStats>()
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;

        let greeting = config.greeting.clone();
        context
            .commands()
            .register(
                CommandDefinition::new("greet", move |ctx| {
                    let target = ctx
                        .args
                        .first()
                        .map(String::as_str)
                        .unwrap_or_else(|| ctx.sender.name());
                    ctx.sender
                        .send_message(&greeting.replace("{player}", target));
                    CommandResult::Success
                })
                .with_alias("hello")
                .with_description("Greets you, or the named player.")
                .with_permission(Permission::new("greeter.greet")),
            )
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;

        let join_stats = stats.clone();
        context
            .events()
            .subscribe(EventPriority::Normal, false, move |event: &mut PlayerJoinedEvent| {
                join_stats.joins_seen.fetch_add(1, Ordering::AcqRel);
                info!("say hello to {}", event.player);
                Ok(())
            })
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;

        let blocked_words = config.blocked_words.clone();
        context
            .events()
            .subscribe(EventPriority::Early, false, move |event: &mut ChatMessageEvent| {
                let lowered = event.message.to_lowercase();
                if blocked_words.iter().any(|word| lowered.contains(word)) {
                    event.set_cancelled(true);
                }
                Ok(())
            })
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;

        let audit_stats = stats.clone();
        context
            .events()
            .subscribe(EventPriority::Final, true, move |event: &mut ChatMessageEvent| {
                if event.is_cancelled() {
                    audit_stats.chats_blocked.fetch_add(1, Ordering::AcqRel);
                    debug!("blocked chat from {}", event.player);
                }
                Ok(())
            })
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;

        if config.heartbeat_ticks > 0 {
            let heartbeat_stats = stats.clone();
            context
                .scheduler()
                .run_repeating(config.heartbeat_ticks, config.heartbeat_ticks, move || {
                    debug!(
                        "greeter heartbeat: {} joins, {} blocked chats",
                        heartbeat_stats.joins_seen(),
                        heartbeat_stats.chats_blocked()
                    );
                })
                .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;
        }

        Ok(())
    }

    async fn on_disable(&mut self, context: Arc<PluginContext>) -> Result<(), PluginError> {
        if let Ok(stats) = context.services().require::<GreeterStats>() {
            info!(
                "greeter shutting down after {} joins and {} blocked chats",
                stats.joins_seen(),
                stats.chats_blocked()
            );
        }
        Ok(())
    }
}

export_plugin!(GreeterPlugin);
