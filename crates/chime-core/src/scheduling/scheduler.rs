use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TaskId;
use crate::config::{CheckingMode, SchedulingConfig};
use crate::scheduling::errors::ScheduleError;
use crate::scheduling::task::{TaskInner, TimedTask};

/// Pending tasks ordered by expiry instant, with insertion order breaking
/// ties so tasks due in the same pass fire deterministically.
#[derive(Default)]
struct PendingSet {
    entries: BTreeMap<(Instant, u64), Arc<TaskInner>>,
    index: HashMap<TaskId, (Instant, u64)>,
    next_seq: u64,
}

impl PendingSet {
    fn insert(&mut self, expires_at: Instant, task: Arc<TaskInner>) {
        let key = (expires_at, self.next_seq);
        self.next_seq += 1;
        self.index.insert(task.id().clone(), key);
        self.entries.insert(key, task);
    }

    fn remove(&mut self, id: &TaskId) -> bool {
        match self.index.remove(id) {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    fn earliest(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Detach every entry due at or before `now`, in expiry-then-insertion
    /// order. The caller dispatches outside the lock.
    fn take_due(&mut self, now: Instant) -> Vec<Arc<TaskInner>> {
        let mut due = Vec::new();
        while self
            .entries
            .first_key_value()
            .is_some_and(|(key, _)| key.0 <= now)
        {
            if let Some((_, task)) = self.entries.pop_first() {
                self.index.remove(task.id());
                due.push(task);
            }
        }
        due
    }
}

pub(crate) struct SchedulerInner {
    category: String,
    mode: CheckingMode,
    lateness: Duration,
    pending: Mutex<PendingSet>,
    wake: Notify,
    shutdown: CancellationToken,
}

impl SchedulerInner {
    pub(crate) async fn insert_entry(&self, task: Arc<TaskInner>, expires_at: Instant) {
        self.pending.lock().await.insert(expires_at, task);
        // a sooner deadline must interrupt the current sleep
        self.wake.notify_one();
    }

    pub(crate) async fn remove_entry(&self, id: &TaskId) -> bool {
        let removed = self.pending.lock().await.remove(id);
        if removed {
            self.wake.notify_one();
        }
        removed
    }
}

/// Detects and fires due [`TimedTask`]s for one task category.
///
/// The loop runs as a single spawned unit of work from construction until
/// [`Scheduler::shutdown`]; handles are cheap clones.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    loop_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Scheduler {
    pub fn new(category: impl Into<String>, config: &SchedulingConfig) -> Self {
        let inner = Arc::new(SchedulerInner {
            category: category.into(),
            mode: config.checking,
            lateness: config.lateness_threshold(),
            pending: Mutex::new(PendingSet::default()),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        });
        info!(
            category = %inner.category,
            mode = ?inner.mode,
            lateness_secs = inner.lateness.as_secs(),
            "starting scheduler"
        );
        let loop_handle = tokio::spawn(run_loop(inner.clone()));
        Self {
            inner,
            loop_handle: Arc::new(Mutex::new(Some(loop_handle))),
        }
    }

    pub fn category(&self) -> &str {
        &self.inner.category
    }

    /// Register a task. A task due sooner than the loop's current wake
    /// target interrupts the sleep and is not delayed by it.
    pub async fn schedule_task(&self, task: &TimedTask) -> Result<(), ScheduleError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ScheduleError::Terminated);
        }
        task.register_with(&self.inner).await?;
        debug!(category = %self.inner.category, task_id = %task.id(), "task scheduled");
        Ok(())
    }

    /// Remove a task without running its callback. Idempotent; removing a
    /// task that is mid-fire is a no-op.
    pub async fn unschedule_task(&self, task: &TimedTask) {
        task.detach().await;
        debug!(category = %self.inner.category, task_id = %task.id(), "task unscheduled");
    }

    pub async fn len(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn shutdown(&self) {
        info!(category = %self.inner.category, "scheduler shutdown initiated");
        self.inner.shutdown.cancel();
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }
        info!(category = %self.inner.category, "scheduler shutdown complete");
    }
}

async fn run_loop(inner: Arc<SchedulerInner>) {
    info!(category = %inner.category, "scheduler loop started");

    let mut next_poll = Instant::now() + inner.lateness;
    loop {
        let wake_at = match inner.mode {
            CheckingMode::Fixed => next_poll,
            CheckingMode::Dynamic => {
                let earliest = inner.pending.lock().await.earliest();
                let cap = Instant::now() + inner.lateness;
                earliest.map_or(cap, |at| at.min(cap))
            }
        };

        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = inner.wake.notified() => {}
            _ = time::sleep_until(wake_at) => {}
        }
        if inner.shutdown.is_cancelled() {
            break;
        }

        let now = Instant::now();
        expire_due(&inner, now).await;
        next_poll = now + inner.lateness;
    }

    info!(category = %inner.category, "scheduler loop exited");
}

async fn expire_due(inner: &Arc<SchedulerInner>, now: Instant) {
    let due = inner.pending.lock().await.take_due(now);
    if due.is_empty() {
        return;
    }
    debug!(category = %inner.category, count = due.len(), "expiring due tasks");
    for task in due {
        fire_task(inner, task, now).await;
    }
}

/// Dispatch one due task. Auto-rescheduling tasks re-enter the pending set
/// with a freshly computed delay before their action runs; the action
/// itself is spawned so a slow or failing callback never stalls the loop or
/// the other due tasks.
async fn fire_task(inner: &Arc<SchedulerInner>, task: Arc<TaskInner>, now: Instant) {
    if task.is_completed() {
        // force-expired after becoming due; never fire twice
        return;
    }
    if task.auto_reschedules() {
        if let Some(delay) = task.next_reschedule_delay() {
            let expires_at = now + delay;
            task.set_expires_at(expires_at).await;
            inner.pending.lock().await.insert(expires_at, task.clone());
        }
    } else if !task.begin_expiry().await {
        return;
    }

    let category = inner.category.clone();
    tokio::spawn(async move {
        if let Err(err) = task.run_action().await {
            warn!(category = %category, task_id = %task.id(), %err, "expiry action failed");
        }
    });
}
