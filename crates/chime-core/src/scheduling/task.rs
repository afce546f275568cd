use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::TaskId;
use crate::scheduling::delay::{DelaySource, MIN_RESCHEDULE_DELAY, clamp_delay};
use crate::scheduling::errors::{ExpiryError, ScheduleError, TaskBuildError};
use crate::scheduling::scheduler::SchedulerInner;

/// The action a [`TimedTask`] runs at expiry.
///
/// Implemented once per concrete use: a spawn trigger, a challenge timeout,
/// a menu timeout, a periodic refresh. The future may suspend for I/O; it
/// runs as its own unit of work and never blocks a scheduler loop.
pub trait Expire: Send + Sync {
    fn on_expire(&self) -> BoxFuture<'_, Result<(), ExpiryError>>;
}

/// Wrap an async closure as an expiry action.
pub fn expire_fn<F, Fut>(f: F) -> impl Expire
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ExpiryError>> + Send + 'static,
{
    struct FnExpire<F>(F);

    impl<F, Fut> Expire for FnExpire<F>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), ExpiryError>> + Send + 'static,
    {
        fn on_expire(&self) -> BoxFuture<'_, Result<(), ExpiryError>> {
            Box::pin((self.0)())
        }
    }

    FnExpire(f)
}

/// How a task computes the delay for its next (re)scheduling.
enum RescheduleDelta {
    None,
    Fixed(Duration),
    Source(Box<dyn DelaySource>),
}

struct TaskState {
    /// Absolute expiry instant; None until first scheduling for tasks whose
    /// delay comes from a source.
    expires_at: Option<Instant>,
    /// The scheduler this task is registered with, if any. A task belongs
    /// to at most one scheduler at a time.
    scheduler: Option<Weak<SchedulerInner>>,
}

pub(crate) struct TaskInner {
    id: TaskId,
    action: Box<dyn Expire>,
    auto_reschedule: bool,
    delta: RescheduleDelta,
    completed: AtomicBool,
    state: Mutex<TaskState>,
}

impl TaskInner {
    pub(crate) fn id(&self) -> &TaskId {
        &self.id
    }

    pub(crate) fn auto_reschedules(&self) -> bool {
        self.auto_reschedule
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// The delay for the next (re)scheduling, clamped; None when the task
    /// was built from a bare absolute instant.
    pub(crate) fn next_reschedule_delay(&self) -> Option<Duration> {
        match &self.delta {
            RescheduleDelta::None => None,
            RescheduleDelta::Fixed(delay) => Some((*delay).max(MIN_RESCHEDULE_DELAY)),
            RescheduleDelta::Source(source) => Some(clamp_delay(source.next_delay())),
        }
    }

    pub(crate) async fn set_expires_at(&self, at: Instant) {
        self.state.lock().await.expires_at = Some(at);
    }

    /// Claim a natural one-shot expiry. False if the task was already
    /// completed (e.g. force-expired while due), in which case it must not
    /// fire again.
    pub(crate) async fn begin_expiry(&self) -> bool {
        if self.completed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.state.lock().await.scheduler = None;
        true
    }

    pub(crate) async fn run_action(&self) -> Result<(), ExpiryError> {
        self.action.on_expire().await
    }
}

/// A single deferred, cancellable action with an absolute expiry instant.
///
/// Handles are cheap clones sharing one underlying task; a menu keeps a
/// handle to its own timeout task and cancels it on deletion.
#[derive(Clone)]
pub struct TimedTask {
    inner: Arc<TaskInner>,
}

impl fmt::Debug for TimedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTask")
            .field("id", &self.inner.id)
            .field("auto_reschedule", &self.inner.auto_reschedule)
            .field("completed", &self.inner.is_completed())
            .finish()
    }
}

impl TimedTask {
    pub fn builder() -> TimedTaskBuilder {
        TimedTaskBuilder::default()
    }

    pub fn id(&self) -> &TaskId {
        &self.inner.id
    }

    /// True once the task has fired or been force-expired. A completed task
    /// never fires again.
    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    pub fn auto_reschedules(&self) -> bool {
        self.inner.auto_reschedule
    }

    /// The absolute expiry instant; None until a source-delayed task is
    /// first scheduled.
    pub async fn expires_at(&self) -> Option<Instant> {
        self.inner.state.lock().await.expires_at
    }

    /// Expire the task now instead of at its scheduled instant.
    ///
    /// With `run_callback = false` this is the cancellation primitive: the
    /// task is marked completed and is guaranteed to be out of its
    /// scheduler's pending set before the call returns; the action is never
    /// invoked. An already in-flight action is not interrupted.
    ///
    /// With `run_callback = true` a one-shot task fires exactly once and
    /// completes; an auto-rescheduling task fires now and re-enters its
    /// scheduler with a freshly computed delay. Action errors propagate to
    /// the caller.
    pub async fn force_expire(&self, run_callback: bool) -> Result<(), ExpiryError> {
        if run_callback && self.inner.auto_reschedule {
            return self.fire_now_and_reschedule().await;
        }

        if self.inner.completed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let scheduler = { self.inner.state.lock().await.scheduler.take() };
        if let Some(scheduler) = scheduler.and_then(|weak| weak.upgrade()) {
            scheduler.remove_entry(&self.inner.id).await;
        }
        if run_callback {
            self.inner.run_action().await
        } else {
            Ok(())
        }
    }

    async fn fire_now_and_reschedule(&self) -> Result<(), ExpiryError> {
        if self.inner.is_completed() {
            return Ok(());
        }
        let scheduler = { self.inner.state.lock().await.scheduler.clone() };
        let scheduler = scheduler.and_then(|weak| weak.upgrade());
        if let Some(scheduler) = &scheduler {
            scheduler.remove_entry(&self.inner.id).await;
        }
        let result = self.inner.run_action().await;
        if let Some(scheduler) = scheduler {
            if let Some(delay) = self.inner.next_reschedule_delay() {
                let expires_at = Instant::now() + delay;
                self.inner.set_expires_at(expires_at).await;
                scheduler.insert_entry(self.inner.clone(), expires_at).await;
            }
        }
        result
    }

    pub(crate) async fn register_with(
        &self,
        scheduler: &Arc<SchedulerInner>,
    ) -> Result<(), ScheduleError> {
        if self.inner.is_completed() {
            return Err(ScheduleError::Completed);
        }
        let expires_at = {
            let mut state = self.inner.state.lock().await;
            if let Some(weak) = &state.scheduler {
                if weak.upgrade().is_some() {
                    return Err(ScheduleError::AlreadyScheduled);
                }
            }
            let expires_at = match state.expires_at {
                Some(at) => at,
                None => {
                    Instant::now()
                        + self
                            .inner
                            .next_reschedule_delay()
                            .unwrap_or(MIN_RESCHEDULE_DELAY)
                }
            };
            state.expires_at = Some(expires_at);
            state.scheduler = Some(Arc::downgrade(scheduler));
            expires_at
        };
        scheduler.insert_entry(self.inner.clone(), expires_at).await;
        Ok(())
    }

    /// Detach from the owning scheduler without firing; idempotent.
    pub(crate) async fn detach(&self) {
        let scheduler = { self.inner.state.lock().await.scheduler.take() };
        if let Some(scheduler) = scheduler.and_then(|weak| weak.upgrade()) {
            scheduler.remove_entry(&self.inner.id).await;
        }
    }
}

#[derive(Default)]
pub struct TimedTaskBuilder {
    expire_at: Option<Instant>,
    expire_after: Option<Duration>,
    delay_source: Option<Box<dyn DelaySource>>,
    auto_reschedule: bool,
    action: Option<Box<dyn Expire>>,
}

impl fmt::Debug for TimedTaskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTaskBuilder")
            .field("expire_at", &self.expire_at)
            .field("expire_after", &self.expire_after)
            .field("auto_reschedule", &self.auto_reschedule)
            .finish()
    }
}

impl TimedTaskBuilder {
    /// Expire at an absolute instant.
    pub fn expire_at(mut self, at: Instant) -> Self {
        self.expire_at = Some(at);
        self
    }

    /// Expire after a delta from now; the delta is also the reschedule
    /// period of an auto-rescheduling task.
    pub fn expire_after(mut self, delta: Duration) -> Self {
        self.expire_after = Some(delta);
        self
    }

    /// Compute the initial and every subsequent delay from a generator,
    /// re-evaluated at each (re)scheduling.
    pub fn delay_source(mut self, source: impl DelaySource + 'static) -> Self {
        self.delay_source = Some(Box::new(source));
        self
    }

    pub fn auto_reschedule(mut self, auto: bool) -> Self {
        self.auto_reschedule = auto;
        self
    }

    pub fn action(mut self, action: impl Expire + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    pub fn build(self) -> Result<TimedTask, TaskBuildError> {
        let action = self.action.ok_or(TaskBuildError::MissingAction)?;

        let sources = usize::from(self.expire_at.is_some())
            + usize::from(self.expire_after.is_some())
            + usize::from(self.delay_source.is_some());
        match sources {
            0 => return Err(TaskBuildError::MissingExpiry),
            1 => {}
            _ => return Err(TaskBuildError::ConflictingExpiry),
        }

        let delta = match (self.expire_after, self.delay_source) {
            (Some(delay), None) => RescheduleDelta::Fixed(delay),
            (None, Some(source)) => RescheduleDelta::Source(source),
            _ => RescheduleDelta::None,
        };
        if self.auto_reschedule && matches!(delta, RescheduleDelta::None) {
            return Err(TaskBuildError::NoRescheduleDelta);
        }

        let expires_at = match (self.expire_at, &delta) {
            (Some(at), _) => Some(at),
            (None, RescheduleDelta::Fixed(delay)) => Some(Instant::now() + *delay),
            // computed from the source when the task is scheduled
            (None, _) => None,
        };

        Ok(TimedTask {
            inner: Arc::new(TaskInner {
                id: TaskId::new(),
                action,
                auto_reschedule: self.auto_reschedule,
                delta,
                completed: AtomicBool::new(false),
                state: Mutex::new(TaskState {
                    expires_at,
                    scheduler: None,
                }),
            }),
        })
    }
}
