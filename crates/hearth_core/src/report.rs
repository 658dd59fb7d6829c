//! Diagnostics boundary for plugin-supplied callables.
//!
//! Listeners, command executors and scheduled tasks run on the tick thread
//! and must never crash it. Every fault is caught at the dispatch boundary
//! and handed to a [`Reporter`]; the default reporter routes to `tracing`.
//! Calls that hold the tick thread longer than the configured threshold are
//! reported as slow so contract violations stay observable.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

/// Which dispatch boundary a report originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Listener,
    Task,
    CommandExecutor,
}

impl CallKind {
    fn label(&self) -> &'static str {
        match self {
            CallKind::Listener => "listener",
            CallKind::Task => "task",
            CallKind::CommandExecutor => "command executor",
        }
    }
}

/// Sink for runtime diagnostics.
///
/// Injected into the event bus, scheduler and command bridge; swap it out in
/// tests to assert on failure handling without capturing log output.
pub trait Reporter: Send + Sync {
    /// A plugin-supplied callable returned an error.
    fn call_failed(&self, kind: CallKind, name: &str, error: &str);

    /// A plugin-supplied callable panicked.
    fn call_panicked(&self, kind: CallKind, name: &str, payload: &str);

    /// A call held the tick thread longer than the configured threshold.
    fn slow_call(&self, kind: CallKind, name: &str, elapsed: Duration, threshold: Duration);
}

/// Default reporter backed by `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn call_failed(&self, kind: CallKind, name: &str, error: &str) {
        error!("{} {} failed: {}", kind.label(), name, error);
    }

    fn call_panicked(&self, kind: CallKind, name: &str, payload: &str) {
        error!("{} {} panicked: {}", kind.label(), name, payload);
    }

    fn slow_call(&self, kind: CallKind, name: &str, elapsed: Duration, threshold: Duration) {
        warn!(
            "{} {} held the tick thread for {:?} (threshold {:?})",
            kind.label(),
            name,
            elapsed,
            threshold
        );
    }
}

/// Diagnostics configuration shared by the runtime components of one context.
pub struct Diagnostics {
    pub reporter: Arc<dyn Reporter>,
    pub slow_call_threshold: Duration,
}

impl Diagnostics {
    pub fn new(reporter: Arc<dyn Reporter>, slow_call_threshold: Duration) -> Self {
        Self {
            reporter,
            slow_call_threshold,
        }
    }

    /// Reports `elapsed` as a slow call if it crossed the threshold.
    pub(crate) fn observe(&self, kind: CallKind, name: &str, elapsed: Duration) {
        if elapsed >= self.slow_call_threshold {
            self.reporter
                .slow_call(kind, name, elapsed, self.slow_call_threshold);
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            reporter: Arc::new(TracingReporter),
            slow_call_threshold: Duration::from_millis(50),
        }
    }
}

/// Extracts a printable message from a `catch_unwind` payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
