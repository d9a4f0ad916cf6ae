//! Task records, creation options, and list summaries.
//!
//! [`Task`] is the persisted unit: identity, schedule, command, seed
//! context, and run statistics. It stays fully serializable — live
//! timer handles are kept in a side table owned by the scheduler, never
//! on the record itself.

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::schedule::Timing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a seed-context message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) output.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message of the conversation context seeded into each run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Who sent this message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ContextMessage {
    /// Create a message with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Optional fields for task creation.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Skill profile to apply when the task runs.
    pub skill: Option<String>,
    /// Conversation context seeded into each run.
    pub context: Vec<ContextMessage>,
    /// Recorded attempt budget. Defaults to
    /// [`SchedulerConfig::default_max_attempts`](crate::SchedulerConfig).
    pub max_attempts: Option<u32>,
}

/// A scheduled task: definition plus run statistics.
///
/// Persisted as one camelCase JSON document per task; the timing
/// payload is flattened in as the `type` tag plus its one payload
/// field (`datetime`, `interval`, or `cron`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque unique identifier, immutable for the task's lifetime.
    pub id: String,
    /// Human-readable task name.
    pub name: String,
    #[serde(flatten)]
    /// When this task fires.
    pub timing: Timing,
    /// The original schedule phrase the task was created from.
    pub schedule: String,
    /// Command text handed to the message processor on each run.
    pub command: String,
    /// Skill profile to apply, if any.
    #[serde(default)]
    pub skill: Option<String>,
    /// Conversation context seeded into each run.
    #[serde(default)]
    pub context: Vec<ContextMessage>,
    /// Whether the task may be armed. Disabled tasks never fire.
    pub enabled: bool,
    /// Recorded attempt budget (not yet consulted by the runner).
    pub max_attempts: u32,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task last finished a run.
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Estimated next fire. For recurring tasks this is the next poll,
    /// not the true next cron match.
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    /// Completed runs. Always `success_count + failure_count`.
    #[serde(default)]
    pub run_count: u64,
    /// Runs that completed successfully.
    #[serde(default)]
    pub success_count: u64,
    /// Runs that failed (processor error reply or call failure).
    #[serde(default)]
    pub failure_count: u64,
}

impl Task {
    /// Create a new enabled task with a fresh id and zeroed statistics.
    pub(crate) fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        command: impl Into<String>,
        timing: Timing,
        options: TaskOptions,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            timing,
            schedule: schedule.into(),
            command: command.into(),
            skill: options.skill,
            context: options.context,
            enabled: true,
            max_attempts: options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            created_at: Utc::now(),
            last_run: None,
            next_run: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
        }
    }

    /// The wire-format type tag (`one-time`, `heartbeat`, `recurring`).
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        self.timing.type_label()
    }

    /// Record a completed run at `now`.
    ///
    /// Keeps `run_count == success_count + failure_count`.
    pub(crate) fn record_run(&mut self, succeeded: bool, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.run_count += 1;
        if succeeded {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }

    /// Returns `true` if the task may be armed at `now`: it is enabled,
    /// and a one-time target instant has not already passed.
    #[must_use]
    pub fn is_armable(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.timing {
            Timing::OneTime { datetime } => *datetime > now,
            Timing::Heartbeat { .. } | Timing::Recurring { .. } => true,
        }
    }
}

/// Read-only row returned by `list()`. Carries no internal handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    /// Task id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Type tag (`one-time`, `heartbeat`, `recurring`).
    #[serde(rename = "type")]
    pub task_type: &'static str,
    /// The original schedule phrase.
    pub schedule: String,
    /// Whether the task may fire.
    pub enabled: bool,
    /// When the task last finished a run.
    pub last_run: Option<DateTime<Utc>>,
    /// Estimated next fire.
    pub next_run: Option<DateTime<Utc>>,
    /// Completed runs.
    pub run_count: u64,
    /// Successful runs.
    pub success_count: u64,
    /// Failed runs.
    pub failure_count: u64,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            task_type: task.type_label(),
            schedule: task.schedule.clone(),
            enabled: task.enabled,
            last_run: task.last_run,
            next_run: task.next_run,
            run_count: task.run_count,
            success_count: task.success_count,
            failure_count: task.failure_count,
        }
    }
}
