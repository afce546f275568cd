#[derive(Debug, thiserror::Error)]
pub enum TaskBuildError {
    #[error("a timed task needs an expiry action")]
    MissingAction,

    #[error("a timed task needs exactly one of: expire_at, expire_after, delay_source")]
    MissingExpiry,

    #[error("conflicting expiry sources given")]
    ConflictingExpiry,

    #[error("auto-reschedule needs a delta or a delay source, not a bare absolute instant")]
    NoRescheduleDelta,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("task is already registered with a scheduler")]
    AlreadyScheduled,

    #[error("task has already expired")]
    Completed,

    #[error("scheduler has shut down")]
    Terminated,
}

/// Failure raised by an expiry action. Caught and logged per task by the
/// scheduler loop; propagated to the caller on direct force-expiry.
#[derive(Debug, Clone, thiserror::Error)]
#[error("expiry action failed: {0}")]
pub struct ExpiryError(pub String);

impl ExpiryError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("delay source failed: {0}")]
pub struct DelaySourceError(pub String);
