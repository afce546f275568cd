use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::scheduling::errors::DelaySourceError;

/// Floor applied to every generated reschedule delay. A failing or
/// degenerate delay source schedules this far out instead of scheduling in
/// the past or not at all.
pub const MIN_RESCHEDULE_DELAY: Duration = Duration::from_secs(1);

/// Produces the next delay for a dynamically rescheduled task.
///
/// Re-evaluated at every (re)scheduling, never cached; implementations may
/// read collaborator state that changes between firings.
pub trait DelaySource: Send + Sync {
    fn next_delay(&self) -> Result<Duration, DelaySourceError>;
}

/// Always produces the same delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl DelaySource for FixedDelay {
    fn next_delay(&self) -> Result<Duration, DelaySourceError> {
        Ok(self.0)
    }
}

/// Uniform random delay between `min` and `max` seconds, inclusive.
#[derive(Debug, Clone, Copy)]
pub struct RandomWindow {
    min_secs: u64,
    max_secs: u64,
}

impl RandomWindow {
    pub fn new(min: Duration, max: Duration) -> Result<Self, DelaySourceError> {
        let (min_secs, max_secs) = (min.as_secs(), max.as_secs());
        if max_secs == 0 || min_secs > max_secs {
            return Err(DelaySourceError(format!(
                "invalid random window: {min_secs}s..={max_secs}s"
            )));
        }
        Ok(Self { min_secs, max_secs })
    }
}

impl DelaySource for RandomWindow {
    fn next_delay(&self) -> Result<Duration, DelaySourceError> {
        let secs = rand::rng().random_range(self.min_secs..=self.max_secs);
        Ok(Duration::from_secs(secs))
    }
}

/// Clamp a generated delay to [`MIN_RESCHEDULE_DELAY`].
pub(crate) fn clamp_delay(generated: Result<Duration, DelaySourceError>) -> Duration {
    match generated {
        Ok(delay) if delay >= MIN_RESCHEDULE_DELAY => delay,
        Ok(delay) => {
            warn!(
                delay_ms = delay.as_millis() as u64,
                "degenerate delay clamped to minimum"
            );
            MIN_RESCHEDULE_DELAY
        }
        Err(err) => {
            warn!(%err, "delay source failed, falling back to minimum delay");
            MIN_RESCHEDULE_DELAY
        }
    }
}
