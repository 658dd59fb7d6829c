//! Synchronous event bus with priority ordering and cancellation.
//!
//! Dispatch is type-exact (one listener table per concrete event type, no
//! hierarchy walking) and runs on the calling thread — the platform driver
//! is expected to publish from its tick thread. Listeners are invoked in
//! priority order, `Early < Normal < Late < Final`, ties broken by
//! registration order, so independent plugins can coordinate veto/observe
//! behavior without knowing about each other.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::debug;

use crate::context::ContextGate;
use crate::report::{panic_message, CallKind, Diagnostics};

/// An occurrence dispatched through the [`EventBus`].
///
/// Events are plain structs; the bus makes no assumption about inheritance
/// or serialization. Implement via [`impl_event!`](crate::impl_event) rather
/// than by hand.
pub trait Event: Any + Send + Sync + std::fmt::Debug + 'static {
    /// Stable name used in diagnostics.
    fn event_type() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Cancellation view, when the event supports it.
    fn cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }
}

/// Capability for events that can be cancelled mid-dispatch.
///
/// Cancellation semantics are event-defined: a platform adapter may treat a
/// cancelled event as "do not execute default behavior", other events may
/// use it as a hint to later phases.
pub trait Cancellable {
    fn is_cancelled(&self) -> bool;
    fn set_cancelled(&mut self, cancelled: bool);
}

/// Wires a plain struct into the [`Event`] trait.
///
/// ```ignore
/// impl_event!(PlayerJoinedEvent);
/// impl_event!(ChatMessageEvent, cancellable);
/// ```
///
/// The `cancellable` form expects the type to implement [`Cancellable`].
#[macro_export]
macro_rules! impl_event {
    ($event_type:ty) => {
        impl $crate::events::Event for $event_type {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
    ($event_type:ty, cancellable) => {
        impl $crate::events::Event for $event_type {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn cancellable(&self) -> Option<&dyn $crate::events::Cancellable> {
                Some(self)
            }
        }
    };
}

/// Relative ordering for event listeners.
///
/// `Final` is the observe-only tier: listeners there see the event's final
/// state (including the cancelled flag) and should not mutate it. That rule
/// is documentation, not enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EventPriority {
    /// Earliest observers: validation, cheap pre-checks, early vetoes.
    Early,
    /// Default priority for most listeners.
    #[default]
    Normal,
    /// Later observers that should see effects from `Normal` listeners.
    Late,
    /// Last observers: metrics, logging, state mirroring.
    Final,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event bus is torn down")]
    ContextClosed,
    #[error("listener failure: {0}")]
    Handler(String),
    #[error("event payload type mismatch: expected {expected}")]
    TypeMismatch { expected: &'static str },
}

/// Handle for one listener registration.
///
/// Dropping the handle does not unsubscribe; pass it back to
/// [`EventBus::unsubscribe`]. Unsubscription is idempotent.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

type ErasedListener = Arc<dyn Fn(&mut dyn Any) -> Result<(), EventError> + Send + Sync>;

#[derive(Clone)]
struct RegisteredListener {
    id: u64,
    priority: EventPriority,
    ignore_cancelled: bool,
    active: Arc<AtomicBool>,
    name: Arc<str>,
    invoke: ErasedListener,
}

/// Priority-ordered, type-exact event dispatcher.
pub struct EventBus {
    listeners: RwLock<HashMap<TypeId, Vec<RegisteredListener>>>,
    next_id: AtomicU64,
    gate: ContextGate,
    diagnostics: Arc<Diagnostics>,
}

impl EventBus {
    /// A stand-alone bus with default diagnostics, for tests and tools that
    /// do not go through a [`PluginContext`](crate::context::PluginContext).
    pub fn new() -> Self {
        Self::scoped(ContextGate::new(), Arc::new(Diagnostics::default()))
    }

    pub(crate) fn scoped(gate: ContextGate, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            gate,
            diagnostics,
        }
    }

    /// Subscribes `listener` for events of type `E`.
    ///
    /// The listener is inserted after all existing entries of equal or lower
    /// priority, so equal-priority listeners run in registration order.
    /// `ignore_cancelled = true` means the listener still runs for an event
    /// that was cancelled earlier in the dispatch, observing the flag.
    pub fn subscribe<E, F>(
        &self,
        priority: EventPriority,
        ignore_cancelled: bool,
        listener: F,
    ) -> Result<Subscription, EventError>
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let name: Arc<str> = format!("{}#{}", E::event_type(), id).into();
        let invoke: ErasedListener = Arc::new(move |payload: &mut dyn Any| {
            let event = payload.downcast_mut::<E>().ok_or(EventError::TypeMismatch {
                expected: E::event_type(),
            })?;
            listener(event)
        });

        let registration = RegisteredListener {
            id,
            priority,
            ignore_cancelled,
            active: active.clone(),
            name,
            invoke,
        };

        // The gate is checked under the table lock so a registration can
        // never slip in between teardown's close and its clear.
        let mut table = self.write_table();
        if self.gate.is_closed() {
            return Err(EventError::ContextClosed);
        }
        let list = table.entry(TypeId::of::<E>()).or_default();
        let at = list.partition_point(|existing| existing.priority <= priority);
        list.insert(at, registration);
        debug!("registered {} listener at {:?}", E::event_type(), priority);

        Ok(Subscription { id, active })
    }

    /// Shorthand for `subscribe(EventPriority::Normal, false, listener)`.
    pub fn on<E, F>(&self, listener: F) -> Result<Subscription, EventError>
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.subscribe(EventPriority::Normal, false, listener)
    }

    /// Removes a listener. No-op if it was already removed.
    ///
    /// Safe to call from inside a listener during dispatch: the removed
    /// listener will not be invoked again, including later in the dispatch
    /// that is currently in progress.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.active.store(false, Ordering::Release);
        let mut table = self.write_table();
        for list in table.values_mut() {
            list.retain(|registration| registration.id != subscription.id);
        }
    }

    /// Dispatches `event` to every matching listener, in priority order.
    ///
    /// Never panics and never returns listener faults to the caller: a
    /// failing or panicking listener is reported and the chain continues.
    /// If the event is cancellable and gets cancelled, remaining listeners
    /// with `ignore_cancelled = false` are skipped; the flag is re-checked
    /// before every listener, so an uncancelling listener re-enables the
    /// rest of the chain.
    pub fn publish<E: Event>(&self, event: &mut E) {
        let snapshot: Vec<RegisteredListener> = {
            let table = self.read_table();
            match table.get(&TypeId::of::<E>()) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for registration in &snapshot {
            if !registration.active.load(Ordering::Acquire) {
                continue;
            }
            let cancelled = event
                .cancellable()
                .map_or(false, |cancellable| cancellable.is_cancelled());
            if cancelled && !registration.ignore_cancelled {
                continue;
            }

            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| (registration.invoke)(event.as_any_mut())));
            self.diagnostics
                .observe(CallKind::Listener, &registration.name, started.elapsed());
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => self.diagnostics.reporter.call_failed(
                    CallKind::Listener,
                    &registration.name,
                    &error.to_string(),
                ),
                Err(payload) => self.diagnostics.reporter.call_panicked(
                    CallKind::Listener,
                    &registration.name,
                    &panic_message(payload.as_ref()),
                ),
            }
        }
    }

    /// Number of live listeners across all event types.
    pub fn listener_count(&self) -> usize {
        self.read_table().values().map(Vec::len).sum()
    }

    /// Deactivates and removes every listener. Used by context teardown.
    pub(crate) fn clear(&self) {
        let mut table = self.write_table();
        for list in table.values() {
            for registration in list {
                registration.active.store(false, Ordering::Release);
            }
        }
        table.clear();
    }

    fn read_table(&self) -> RwLockReadGuard<'_, HashMap<TypeId, Vec<RegisteredListener>>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, HashMap<TypeId, Vec<RegisteredListener>>> {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::test_support::RecordingReporter;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug)]
    struct PingEvent;

    impl_event!(PingEvent);

    #[derive(Debug, Default)]
    struct GateEvent {
        cancelled: bool,
    }

    impl Cancellable for GateEvent {
        fn is_cancelled(&self) -> bool {
            self.cancelled
        }

        fn set_cancelled(&mut self, cancelled: bool) {
            self.cancelled = cancelled;
        }
    }

    impl_event!(GateEvent, cancellable);

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) {
        log.lock().unwrap().push(entry);
    }

    #[test]
    fn dispatches_in_priority_order_with_stable_ties() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (priority, tag) in [
            (EventPriority::Late, "late"),
            (EventPriority::Early, "early"),
            (EventPriority::Normal, "normal-1"),
            (EventPriority::Final, "final"),
            (EventPriority::Normal, "normal-2"),
        ] {
            let log = log.clone();
            bus.subscribe(priority, false, move |_: &mut PingEvent| {
                record(&log, tag);
                Ok(())
            })
            .unwrap();
        }

        bus.publish(&mut PingEvent);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["early", "normal-1", "normal-2", "late", "final"]
        );
    }

    #[test]
    fn cancellation_mid_dispatch_skips_only_non_ignoring_listeners() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(EventPriority::Early, false, |event: &mut GateEvent| {
            event.set_cancelled(true);
            Ok(())
        })
        .unwrap();

        let skipped = log.clone();
        bus.subscribe(EventPriority::Normal, false, move |_: &mut GateEvent| {
            record(&skipped, "skipped");
            Ok(())
        })
        .unwrap();

        let observer = log.clone();
        bus.subscribe(EventPriority::Final, true, move |event: &mut GateEvent| {
            assert!(event.is_cancelled());
            record(&observer, "observer");
            Ok(())
        })
        .unwrap();

        let mut event = GateEvent::default();
        bus.publish(&mut event);

        assert!(event.cancelled);
        assert_eq!(*log.lock().unwrap(), vec!["observer"]);
    }

    #[test]
    fn uncancelling_reenables_later_listeners() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(EventPriority::Early, false, |event: &mut GateEvent| {
            event.set_cancelled(true);
            Ok(())
        })
        .unwrap();
        bus.subscribe(EventPriority::Normal, true, |event: &mut GateEvent| {
            event.set_cancelled(false);
            Ok(())
        })
        .unwrap();
        let tail = log.clone();
        bus.subscribe(EventPriority::Late, false, move |_: &mut GateEvent| {
            record(&tail, "tail");
            Ok(())
        })
        .unwrap();

        bus.publish(&mut GateEvent::default());
        assert_eq!(*log.lock().unwrap(), vec!["tail"]);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_effective() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let seen = log.clone();
        let subscription = bus
            .on(move |_: &mut PingEvent| {
                record(&seen, "seen");
                Ok(())
            })
            .unwrap();

        bus.publish(&mut PingEvent);
        bus.unsubscribe(&subscription);
        bus.unsubscribe(&subscription);
        bus.publish(&mut PingEvent);

        assert_eq!(*log.lock().unwrap(), vec!["seen"]);
        assert!(!subscription.is_active());
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_from_inside_a_listener_takes_effect_same_dispatch() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let victim_log = log.clone();
        let victim = bus
            .subscribe(EventPriority::Late, false, move |_: &mut PingEvent| {
                record(&victim_log, "victim");
                Ok(())
            })
            .unwrap();

        let bus_ref = bus.clone();
        bus.subscribe(EventPriority::Early, false, move |_: &mut PingEvent| {
            bus_ref.unsubscribe(&victim);
            Ok(())
        })
        .unwrap();

        bus.publish(&mut PingEvent);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn listener_faults_are_reported_and_do_not_break_the_chain() {
        let reporter = Arc::new(RecordingReporter::default());
        let diagnostics = Arc::new(Diagnostics::new(reporter.clone(), Duration::from_secs(1)));
        let bus = EventBus::scoped(ContextGate::new(), diagnostics);
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(EventPriority::Early, false, |_: &mut PingEvent| {
            Err(EventError::Handler("boom".into()))
        })
        .unwrap();
        bus.subscribe(EventPriority::Normal, false, |_: &mut PingEvent| {
            panic!("listener exploded")
        })
        .unwrap();
        let tail = log.clone();
        bus.subscribe(EventPriority::Late, false, move |_: &mut PingEvent| {
            record(&tail, "tail");
            Ok(())
        })
        .unwrap();

        bus.publish(&mut PingEvent);

        assert_eq!(*log.lock().unwrap(), vec!["tail"]);
        assert_eq!(reporter.failures.lock().unwrap().len(), 1);
        let panics = reporter.panics.lock().unwrap();
        assert_eq!(panics.len(), 1);
        assert!(panics[0].2.contains("listener exploded"));
    }

    #[test]
    fn subscribe_after_close_is_rejected() {
        let gate = ContextGate::new();
        let bus = EventBus::scoped(gate.clone(), Arc::new(Diagnostics::default()));
        gate.close();

        let result = bus.on(|_: &mut PingEvent| Ok(()));
        assert!(matches!(result, Err(EventError::ContextClosed)));
    }
}
