//! Cancellable delayed work.
//!
//! Each scheduled task is a spawned tokio task sleeping until its fire time.
//! A small atomic state machine (pending, running, cancelled) decides the
//! race between firing and cancellation: whichever side wins the
//! compare-exchange owns the task, so a cancel issued strictly before the
//! fire time always prevents the handler from running, and a handler that
//! already started is never interrupted.
//!
//! The scheduler knows nothing about lifecycle records. Mutual exclusion of
//! handlers for the same event is provided by the registry, which every
//! handler enters first.

use crate::clock::Clock;
use crate::registry::EventKey;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Kind of a scheduled lifecycle task. At most one task of each kind is
/// pending per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// First attendance check at the creation offset.
    Main,
    /// Attendance re-check at checkpoint `n`.
    Retry(u32),
    Start,
    Warning,
    Cleanup,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Main => f.write_str("main"),
            TaskKind::Retry(n) => write!(f, "retry({n})"),
            TaskKind::Start => f.write_str("start"),
            TaskKind::Warning => f.write_str("warning"),
            TaskKind::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// Identifies one scheduled invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    pub key: EventKey,
    pub kind: TaskKind,
    pub fire_at: OffsetDateTime,
    id: u64,
}

struct PendingTask {
    handle: TaskHandle,
    state: Arc<AtomicU8>,
    join: JoinHandle<()>,
}

impl PendingTask {
    /// Returns `true` when this call won the race against firing.
    fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.join.abort();
        }
        won
    }
}

/// Owns every pending lifecycle task, keyed by event.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<EventKey, Vec<PendingTask>>>,
    next_id: AtomicU64,
}

impl SchedulerInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<EventKey, Vec<PendingTask>>> {
        // A poisoned map only means a panic elsewhere; the entries stay valid.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn forget(&self, key: EventKey, id: u64) {
        let mut pending = self.pending();
        if let Some(tasks) = pending.get_mut(&key) {
            tasks.retain(|task| task.handle.id != id);
            if tasks.is_empty() {
                pending.remove(&key);
            }
        }
    }
}

impl TaskScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                clock,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Run `handler` no earlier than `fire_at`.
    ///
    /// A fire time in the past fires as soon as possible. Any pending task of
    /// the same kind for the same event is cancelled and replaced.
    pub fn schedule<F>(
        &self,
        key: EventKey,
        kind: TaskKind,
        fire_at: OffsetDateTime,
        handler: F,
    ) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = TaskHandle {
            key,
            kind,
            fire_at,
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let state = Arc::new(AtomicU8::new(PENDING));
        let delay = (fire_at - self.inner.clock.now()).max(time::Duration::ZERO);
        let delay = std::time::Duration::try_from(delay).unwrap_or_default();

        let mut pending = self.inner.pending();
        let tasks = pending.entry(key).or_default();
        tasks.retain(|task| {
            let same_kind = task.handle.kind == kind;
            if same_kind && task.cancel() {
                debug!(%key, %kind, "Replaced pending task");
            }
            !same_kind
        });

        let inner = Arc::clone(&self.inner);
        let task_state = Arc::clone(&state);
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if task_state
                .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            inner.forget(handle.key, handle.id);
            trace!(key = %handle.key, kind = %handle.kind, "Task fired");
            handler.await;
        });
        tasks.push(PendingTask {
            handle,
            state,
            join,
        });
        handle
    }

    /// Cancel one task. Idempotent; a task that already fired is unaffected.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        let mut pending = self.inner.pending();
        let Some(tasks) = pending.get_mut(&handle.key) else {
            return false;
        };
        let mut cancelled = false;
        tasks.retain(|task| {
            if task.handle.id == handle.id {
                cancelled = task.cancel();
                false
            } else {
                true
            }
        });
        if tasks.is_empty() {
            pending.remove(&handle.key);
        }
        cancelled
    }

    /// Cancel every pending task of an event. Returns how many were cancelled.
    pub fn cancel_all(&self, key: EventKey) -> usize {
        let tasks = self.inner.pending().remove(&key).unwrap_or_default();
        let cancelled = tasks.iter().filter(|task| task.cancel()).count();
        if cancelled > 0 {
            debug!(%key, cancelled, "Cancelled pending tasks");
        }
        cancelled
    }

    /// Cancel the pending task of one kind, if any.
    pub fn cancel_kind(&self, key: EventKey, kind: TaskKind) -> bool {
        let mut pending = self.inner.pending();
        let Some(tasks) = pending.get_mut(&key) else {
            return false;
        };
        let mut cancelled = false;
        tasks.retain(|task| {
            if task.handle.kind == kind {
                cancelled |= task.cancel();
                false
            } else {
                true
            }
        });
        if tasks.is_empty() {
            pending.remove(&key);
        }
        cancelled
    }

    /// Tasks of an event that have not fired yet, ordered by fire time.
    pub fn pending(&self, key: EventKey) -> Vec<TaskHandle> {
        let mut handles: Vec<TaskHandle> = self
            .inner
            .pending()
            .get(&key)
            .map(|tasks| tasks.iter().map(|task| task.handle).collect())
            .unwrap_or_default();
        handles.sort_by_key(|handle| handle.fire_at);
        handles
    }

    /// Cancel everything. Used on process shutdown.
    pub fn shutdown(&self) {
        let all: Vec<PendingTask> = self
            .inner
            .pending()
            .drain()
            .flat_map(|(_, tasks)| tasks)
            .collect();
        let cancelled = all.iter().filter(|task| task.cancel()).count();
        debug!(cancelled, "Scheduler shut down");
    }
}
