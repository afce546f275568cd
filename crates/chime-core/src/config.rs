use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wake strategy shared by every scheduler built from one config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckingMode {
    /// Poll for due tasks every lateness-threshold seconds.
    Fixed,
    /// Sleep until the earliest pending expiry, re-checking at least every
    /// lateness-threshold seconds.
    Dynamic,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("lateness threshold must be at least 1 second")]
    ZeroLatenessThreshold,
}

/// Process-wide scheduling configuration.
///
/// The lateness threshold is the fixed-mode poll period, the dynamic-mode
/// safety sleep cap, and the bound on how long a loop may take to notice a
/// termination signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub checking: CheckingMode,
    pub lateness_threshold_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            checking: CheckingMode::Dynamic,
            lateness_threshold_secs: 10,
        }
    }
}

impl SchedulingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lateness_threshold_secs == 0 {
            return Err(ConfigError::ZeroLatenessThreshold);
        }
        Ok(())
    }

    pub fn lateness_threshold(&self) -> Duration {
        Duration::from_secs(self.lateness_threshold_secs)
    }
}
