use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of a deferred task. `Executed` and `Cancelled` are terminal:
/// once reached, no further transition is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Executed,
    Cancelled,
}

pub type TaskAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

enum Slot {
    Pending(TaskAction),
    Executed,
    Cancelled,
}

impl Slot {
    fn state(&self) -> TaskState {
        match self {
            Slot::Pending(_) => TaskState::Pending,
            Slot::Executed => TaskState::Executed,
            Slot::Cancelled => TaskState::Cancelled,
        }
    }
}

/// A zero-argument action that fires once after a delay, on its own timer
/// task. The action can be forced early or cancelled; whichever path claims
/// the action first wins, so it runs at most once under any race.
pub struct DeferredTask {
    id: Uuid,
    slot: Arc<Mutex<Slot>>,
    timer: JoinHandle<()>,
    delay: Duration,
    created_at: DateTime<Utc>,
}

impl DeferredTask {
    pub fn schedule<F>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let slot = Arc::new(Mutex::new(Slot::Pending(Box::new(action))));

        let timer_slot = Arc::clone(&slot);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(action) = claim(&timer_slot, Slot::Executed) {
                debug!("deferred task {} fired after {:?}", id, delay);
                action().await;
            }
        });

        Self {
            id,
            slot,
            timer,
            delay,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> TaskState {
        self.slot.lock().expect("task slot poisoned").state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    /// Runs the action now, in the calling context, if it is still pending.
    /// The action is claimed before the timer is aborted, so the timer can
    /// no longer fire it; if the timer already claimed it, this is a no-op.
    /// A panicking action is reported as an error, not propagated.
    pub async fn force_execute(&self) -> anyhow::Result<()> {
        let Some(action) = claim(&self.slot, Slot::Executed) else {
            return Ok(());
        };
        self.timer.abort();
        debug!("deferred task {} force-executed", self.id);

        AssertUnwindSafe(action())
            .catch_unwind()
            .await
            .map_err(|_| anyhow::anyhow!("deferred task {} panicked", self.id))
    }

    /// Drops the action without running it. No-op once resolved.
    pub fn cancel(&self) {
        if claim(&self.slot, Slot::Cancelled).is_some() {
            self.timer.abort();
            debug!("deferred task {} cancelled", self.id);
        }
    }
}

fn claim(slot: &Mutex<Slot>, next: Slot) -> Option<TaskAction> {
    let mut guard = slot.lock().expect("task slot poisoned");
    if !matches!(*guard, Slot::Pending(_)) {
        return None;
    }
    match std::mem::replace(&mut *guard, next) {
        Slot::Pending(action) => Some(action),
        _ => None,
    }
}

/// Process-wide collection of outstanding deferred tasks. Workers append as
/// directives resolve; the shutdown path drains it exactly once.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<Vec<DeferredTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task: DeferredTask) {
        self.tasks.lock().expect("task registry poisoned").push(task);
    }

    pub fn drain(&self) -> Vec<DeferredTask> {
        let mut tasks = self.tasks.lock().expect("task registry poisoned");
        tasks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().expect("task registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.tasks
            .lock()
            .expect("task registry poisoned")
            .iter()
            .filter(|task| task.is_pending())
            .count()
    }
}
