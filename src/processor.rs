//! The message-processing collaborator seam.
//!
//! The scheduler never carries out commands itself: every run hands the
//! task's command text to a [`MessageProcessor`] supplied by the
//! embedding application (an LLM pipeline, a skill runtime, a test
//! double). The trait is object-safe so the scheduler can hold it as
//! `Arc<dyn MessageProcessor>`.

use crate::error::Result;
use crate::task::{ContextMessage, Task};
use async_trait::async_trait;

/// One task invocation handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// The task's command text.
    pub command: String,
    /// Skill profile to apply, if the task names one.
    pub skill: Option<String>,
    /// Conversation context seeded from the task record.
    pub context: Vec<ContextMessage>,
}

impl From<&Task> for ProcessRequest {
    fn from(task: &Task) -> Self {
        Self {
            command: task.command.clone(),
            skill: task.skill.clone(),
            context: task.context.clone(),
        }
    }
}

/// The processor's reply to one invocation.
///
/// A populated `error` marks the run as failed even though the call
/// itself returned; the runner counts it exactly like an `Err`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReply {
    /// Response text, if the processor produced one.
    pub response: Option<String>,
    /// Failure description reported by the processor.
    pub error: Option<String>,
    /// The skill the processor actually applied, if any.
    pub skill: Option<String>,
}

impl ProcessReply {
    /// Reply carrying a response text.
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            ..Self::default()
        }
    }

    /// Reply carrying a failure description.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Returns `true` if this reply reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// External entrypoint that carries out a task's command text.
///
/// Implementations may take arbitrarily long; the scheduler enforces no
/// timeout. A hung call blocks only that task's subsequent cycles via
/// the in-flight marker, never other tasks.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Process one command.
    ///
    /// # Errors
    ///
    /// An `Err` is treated by the runner exactly like a reply with a
    /// populated `error` field: the run counts as failed and nothing
    /// propagates further.
    async fn process_message(&self, request: ProcessRequest) -> Result<ProcessReply>;
}
