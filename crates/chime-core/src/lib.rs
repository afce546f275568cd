//! Deferred-action scheduling for long-running interactive processes.
//!
//! A [`Scheduler`] owns the timed tasks of one category (spawn timers,
//! challenge timers, menu timers) and fires each task's expiry action at or
//! near its absolute expiry instant, under either a fixed polling strategy
//! or a sleep-until-earliest-deadline strategy.

pub mod config;
pub mod ids;
pub mod scheduling;

pub use config::{CheckingMode, ConfigError, SchedulingConfig};
pub use ids::TaskId;
pub use scheduling::delay::{DelaySource, FixedDelay, MIN_RESCHEDULE_DELAY, RandomWindow};
pub use scheduling::errors::{DelaySourceError, ExpiryError, ScheduleError, TaskBuildError};
pub use scheduling::scheduler::Scheduler;
pub use scheduling::task::{Expire, TimedTask, TimedTaskBuilder, expire_fn};
