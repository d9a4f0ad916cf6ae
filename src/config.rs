//! Scheduler configuration with sensible defaults.
//!
//! [`SchedulerConfig`] controls where task records are persisted and the
//! defaults applied to newly created tasks. Uses the [`dirs`] crate for
//! platform-appropriate directory resolution.

use crate::error::ChimeError;
use std::path::PathBuf;

/// Default number of attempts recorded on a task when its creation
/// options do not specify one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for a [`Scheduler`](crate::Scheduler).
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Directory holding one JSON record per task.
    pub state_dir: PathBuf,
    /// `max_attempts` applied to tasks created without an explicit value.
    pub default_max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl SchedulerConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `state_dir` must not be empty
    /// - `default_max_attempts` must be greater than 0
    pub fn validate(&self) -> Result<(), ChimeError> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(ChimeError::Config("state_dir must not be empty".into()));
        }
        if self.default_max_attempts == 0 {
            return Err(ChimeError::Config(
                "default_max_attempts must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Default task record directory.
///
/// Resolves to `dirs::config_dir()/chime/tasks/` by default. Override
/// with the `CHIME_STATE_DIR` environment variable (useful for tests and
/// custom deployments).
#[must_use]
pub fn default_state_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CHIME_STATE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("chime").join("tasks"))
        .unwrap_or_else(|| PathBuf::from("/tmp/chime-tasks"))
}
