//! # chime
//!
//! Task scheduling for conversational agents: one-time reminders,
//! fixed-interval heartbeats, and cron-style recurring tasks, each
//! firing a stored command through a pluggable message processor.
//!
//! ## Design
//!
//! - Natural-language schedule phrases (`at …`, `every …`, `daily at …`,
//!   `weekly on …`, `monthly on …`) parsed into typed timings
//! - One JSON record per task under a state directory; an unreadable
//!   store degrades to an empty set instead of failing startup
//! - Tokio timers tracked per task behind cancellation handles
//! - Overlap and stop-request guards in front of every invocation
//! - Run statistics recorded and persisted after every invocation,
//!   successful or not
//!
//! ## Example
//!
//! ```no_run
//! use chime::{
//!     MessageProcessor, ProcessReply, ProcessRequest, Scheduler, SchedulerConfig, TaskOptions,
//! };
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl MessageProcessor for Echo {
//!     async fn process_message(&self, request: ProcessRequest) -> chime::Result<ProcessReply> {
//!         Ok(ProcessReply::success(request.command))
//!     }
//! }
//!
//! # async fn example() -> chime::Result<()> {
//! let scheduler = Scheduler::new(SchedulerConfig::default(), Arc::new(Echo))?;
//! scheduler.start();
//! scheduler.add("ping", "every 5 minutes", "say hi", TaskOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cron;
mod dispatch;
pub mod error;
pub mod processor;
mod runner;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod task;

pub use config::{DEFAULT_MAX_ATTEMPTS, SchedulerConfig, default_state_dir};
pub use cron::CronExpr;
pub use error::{ChimeError, Result};
pub use processor::{MessageProcessor, ProcessReply, ProcessRequest};
pub use schedule::{SCHEDULE_FORMATS, Timing, parse_schedule};
pub use scheduler::Scheduler;
pub use store::{JsonFileStore, MemoryStore, TaskStore};
pub use task::{ContextMessage, Role, Task, TaskOptions, TaskSummary};
