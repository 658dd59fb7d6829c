//! # Hearth Platform Boundary
//!
//! This crate defines *only* the boundary between the Hearth core and a
//! concrete server runtime. It contains no game logic, no entity or world
//! modeling, and no assumptions about any particular server's APIs.
//!
//! A platform adapter is responsible for three things:
//! - ticking each plugin context's scheduler once per server tick (the
//!   [`tick::TickLoop`] helper covers adapters with a tokio runtime),
//! - forwarding inbound command invocations to each context's
//!   `CommandBridge`,
//! - originating inbound events into each context's `EventBus`.
//!
//! Both a plugin SDK hosted by an official server runtime and a bundled
//! server distribution that embeds Hearth as its core can be expressed as
//! implementations of this boundary without changing the core contracts.

pub mod clock;
pub mod tick;

use std::sync::Arc;

use hearth_core::commands::CommandSink;

pub use clock::{PlatformClock, SystemClock};
pub use tick::{TickLoop, TickLoopHandle};

/// The platform adapter surface consumed by hosts.
pub trait Platform: Send + Sync {
    /// Stable identifier for diagnostics (e.g. "fake", "standalone").
    fn platform_id(&self) -> &str;

    /// Platform-provided time source.
    fn clock(&self) -> Arc<dyn PlatformClock>;

    /// Host-side mirror for command registrations.
    fn command_sink(&self) -> Arc<dyn CommandSink>;
}
