//! # Hearth Fake Platform
//!
//! Fully controllable platform implementation for tests and demos. Nothing
//! here mimics a real server; the point is to let core runtime behavior and
//! plugin code be exercised deterministically:
//!
//! - [`DeterministicClock`] only moves when told to,
//! - [`FakeServer`] ticks schedulers manually, posts simulated events and
//!   routes inbound commands,
//! - [`FakePlayer`] records messages and answers permission checks from a
//!   grantable set.

pub mod clock;
pub mod player;
pub mod server;
pub mod sink;

pub use clock::DeterministicClock;
pub use player::{FakeConsole, FakePlayer, PlayerId};
pub use server::{FakePlatform, FakeServer};
pub use sink::RecordingCommandSink;
