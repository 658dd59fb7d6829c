//! Tick-driven task scheduler.
//!
//! Time is measured in ticks: the platform driver calls [`Scheduler::tick`]
//! once per server tick, and that call is the only place tasks execute.
//! Enqueue and cancel are safe from any thread — the scheduler is the one
//! component that crosses from "any thread may enqueue" to "only the tick
//! thread executes".

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::trace;

use crate::context::ContextGate;
use crate::report::{panic_message, CallKind, Diagnostics};

/// Scheduler delays and intervals are whole ticks.
pub type Ticks = u64;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is torn down")]
    ContextClosed,
}

/// What happens to a repeating task whose iteration panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFailurePolicy {
    /// A crashed iteration does not cancel future iterations.
    #[default]
    KeepRepeating,
    /// A crashed iteration cancels the task.
    CancelRepeating,
}

/// Handle for a scheduled task. Cancellation is idempotent and cooperative:
/// an invocation already running completes, but no further invocation occurs.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

struct Entry {
    due: Ticks,
    seq: u64,
    interval: Option<Ticks>,
    cancelled: Arc<AtomicBool>,
    name: Arc<str>,
    task: Box<dyn FnMut() + Send>,
}

// Min-heap on (due, seq): earliest due first, enqueue order among equals.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

/// Tick-based scheduler with immediate, delayed and repeating tasks.
pub struct Scheduler {
    queue: Mutex<BinaryHeap<Entry>>,
    now: AtomicU64,
    next_seq: AtomicU64,
    gate: ContextGate,
    diagnostics: Arc<Diagnostics>,
    failure_policy: TaskFailurePolicy,
}

impl Scheduler {
    /// A stand-alone scheduler with default diagnostics, for tests and tools
    /// that do not go through a [`PluginContext`](crate::context::PluginContext).
    pub fn new() -> Self {
        Self::scoped(
            ContextGate::new(),
            Arc::new(Diagnostics::default()),
            TaskFailurePolicy::default(),
        )
    }

    pub(crate) fn scoped(
        gate: ContextGate,
        diagnostics: Arc<Diagnostics>,
        failure_policy: TaskFailurePolicy,
    ) -> Self {
        Self {
            queue: Mutex::new(BinaryHeap::new()),
            now: AtomicU64::new(0),
            next_seq: AtomicU64::new(1),
            gate,
            diagnostics,
            failure_policy,
        }
    }

    /// Enqueues `task` for the next tick boundary.
    ///
    /// Never executes inline at call time, even when called from a task that
    /// is itself running inside [`tick`](Self::tick).
    pub fn run_now(
        &self,
        task: impl FnMut() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(1, None, Box::new(task))
    }

    /// Runs `task` once after at least `delay` ticks have elapsed.
    ///
    /// A zero delay is clamped to one tick so the task still goes through a
    /// tick boundary.
    pub fn run_delayed(
        &self,
        delay: Ticks,
        task: impl FnMut() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(delay.max(1), None, Box::new(task))
    }

    /// Runs `task` after `initial_delay` ticks, then every `interval` ticks
    /// until the returned handle is cancelled.
    ///
    /// Re-firing is fixed-rate relative to the task's own schedule
    /// (`due + interval`). Zero delays/intervals are clamped to one tick.
    pub fn run_repeating(
        &self,
        initial_delay: Ticks,
        interval: Ticks,
        task: impl FnMut() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(initial_delay.max(1), Some(interval.max(1)), Box::new(task))
    }

    fn schedule(
        &self,
        delay: Ticks,
        interval: Option<Ticks>,
        task: Box<dyn FnMut() + Send>,
    ) -> Result<TaskHandle, SchedulerError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let due = self.now.load(Ordering::Acquire) + delay;
        let name: Arc<str> = match interval {
            Some(every) => format!("repeating task #{seq} (every {every} ticks)").into(),
            None => format!("task #{seq}").into(),
        };

        // Gate check under the queue lock: either this entry lands before
        // teardown's cancel_all and gets drained with the rest, or the
        // closed gate rejects it.
        {
            let mut queue = self.lock_queue();
            if self.gate.is_closed() {
                return Err(SchedulerError::ContextClosed);
            }
            queue.push(Entry {
                due,
                seq,
                interval,
                cancelled: cancelled.clone(),
                name,
                task,
            });
        }
        trace!("scheduled task #{} for tick {}", seq, due);

        Ok(TaskHandle { id: seq, cancelled })
    }

    /// Advances the tick counter and runs every due task, in
    /// `(due tick, enqueue order)` order.
    ///
    /// Only the platform driver may call this, and only from its tick
    /// thread. Task faults are reported and never escape; a panicking
    /// iteration of a repeating task cancels the task only under
    /// [`TaskFailurePolicy::CancelRepeating`].
    pub fn tick(&self) {
        let now = self.now.fetch_add(1, Ordering::AcqRel) + 1;

        loop {
            // Pop under the lock, run without it: tasks may re-enter the
            // scheduler to enqueue or cancel.
            let entry = {
                let mut queue = self.lock_queue();
                match queue.peek() {
                    Some(next) if next.due <= now => queue.pop(),
                    _ => break,
                }
            };
            let Some(mut entry) = entry else { break };

            if entry.cancelled.load(Ordering::Acquire) {
                continue;
            }

            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.task)()));
            self.diagnostics
                .observe(CallKind::Task, &entry.name, started.elapsed());

            let panicked = match outcome {
                Ok(()) => false,
                Err(payload) => {
                    self.diagnostics.reporter.call_panicked(
                        CallKind::Task,
                        &entry.name,
                        &panic_message(payload.as_ref()),
                    );
                    true
                }
            };

            if let Some(interval) = entry.interval {
                let abandoned = entry.cancelled.load(Ordering::Acquire)
                    || (panicked && self.failure_policy == TaskFailurePolicy::CancelRepeating);
                if !abandoned {
                    entry.due += interval;
                    self.lock_queue().push(entry);
                }
            }
        }
    }

    /// Current tick, as advanced by the platform driver. Monotonic.
    pub fn now(&self) -> Ticks {
        self.now.load(Ordering::Acquire)
    }

    /// Number of queued entries, cancelled ones included until they come due.
    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    /// Cancels every queued task. Used by context teardown.
    pub(crate) fn cancel_all(&self) {
        let mut queue = self.lock_queue();
        for entry in queue.iter() {
            entry.cancelled.store(true, Ordering::Release);
        }
        queue.clear();
    }

    // Tasks never run under the lock, so a poisoned mutex cannot hold
    // inconsistent state; recover instead of propagating.
    fn lock_queue(&self) -> MutexGuard<'_, BinaryHeap<Entry>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
