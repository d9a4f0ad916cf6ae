//! The scheduling context and its registry operations.
//!
//! A [`Scheduler`] owns every piece of engine state behind one shared
//! inner value: the task map, the in-flight and stop-request sets, and
//! the timer side table. Handles are cheap to clone and safe to share
//! across tasks and threads. All mutation happens under a single short
//! lock that is never held across an await point.

use crate::config::SchedulerConfig;
use crate::dispatch;
use crate::error::{ChimeError, Result};
use crate::processor::MessageProcessor;
use crate::runner;
use crate::schedule::parse_schedule;
use crate::store::{JsonFileStore, TaskStore};
use crate::task::{Task, TaskOptions, TaskSummary};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Mutable engine state, guarded by the lock in [`SchedulerInner`].
#[derive(Default)]
pub(crate) struct EngineState {
    /// Every known task, keyed by id.
    pub(crate) tasks: HashMap<String, Task>,
    /// Ids with an invocation currently executing.
    pub(crate) in_flight: HashSet<String>,
    /// Ids with a pending stop request.
    pub(crate) stop_requests: HashSet<String>,
    /// Cancellation handle for each armed timer primitive.
    pub(crate) timers: HashMap<String, CancellationToken>,
}

/// State shared between scheduler handles and spawned timer tasks.
pub(crate) struct SchedulerInner {
    pub(crate) config: SchedulerConfig,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) processor: Arc<dyn MessageProcessor>,
    state: Mutex<EngineState>,
}

impl SchedulerInner {
    /// Lock the engine state, recovering from a poisoned lock.
    pub(crate) fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to a running scheduling context.
///
/// Operations assume a Tokio runtime: arming a task spawns its timer.
/// Cloning is cheap and every clone drives the same context.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Build a scheduler persisting task records under
    /// `config.state_dir`.
    pub fn new(config: SchedulerConfig, processor: Arc<dyn MessageProcessor>) -> Result<Self> {
        let store = Arc::new(JsonFileStore::new(config.state_dir.clone()));
        Self::with_store(config, store, processor)
    }

    /// Build a scheduler over any [`TaskStore`] implementation.
    pub fn with_store(
        config: SchedulerConfig,
        store: Arc<dyn TaskStore>,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                config,
                store,
                processor,
                state: Mutex::new(EngineState::default()),
            }),
        })
    }

    pub(crate) fn inner(&self) -> &Arc<SchedulerInner> {
        &self.inner
    }

    /// Load persisted records and arm every eligible task.
    ///
    /// A store that cannot be read is logged and treated as empty, so a
    /// missing or damaged state directory never prevents startup.
    /// Disabled tasks and one-time tasks whose instant has passed are
    /// loaded but left dormant.
    pub fn start(&self) {
        let loaded = match self.inner.store.load_all() {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("cannot load task records: {e}");
                Vec::new()
            }
        };

        let mut state = self.inner.state();
        for task in loaded {
            state.tasks.insert(task.id.clone(), task);
        }

        let now = Utc::now();
        let eligible: Vec<String> = state
            .tasks
            .values()
            .filter(|task| task.is_armable(now))
            .map(|task| task.id.clone())
            .collect();
        for id in &eligible {
            dispatch::arm(&self.inner, &mut state, id);
        }
        info!(
            "scheduler started with {} tasks ({} armed)",
            state.tasks.len(),
            eligible.len()
        );
    }

    /// Parse the schedule phrase, persist a fresh task, and arm it.
    ///
    /// An unrecognized phrase fails synchronously and nothing is stored.
    /// When `options.max_attempts` is unset the configured default
    /// applies. Returns a snapshot of the task as armed.
    pub fn add(
        &self,
        name: &str,
        schedule: &str,
        command: &str,
        options: TaskOptions,
    ) -> Result<Task> {
        let timing = parse_schedule(schedule)?;
        let mut options = options;
        if options.max_attempts.is_none() {
            options.max_attempts = Some(self.inner.config.default_max_attempts);
        }
        let mut task = Task::new(name, schedule.trim(), command, timing, options);

        // Persist before arming so a task that cannot be stored never
        // fires.
        self.inner.store.save(&task)?;

        let mut state = self.inner.state();
        state.tasks.insert(task.id.clone(), task.clone());
        dispatch::arm(&self.inner, &mut state, &task.id);
        if let Some(armed) = state.tasks.get(&task.id) {
            task = armed.clone();
        }
        drop(state);

        // Arming estimated next_run in memory; write the record again so
        // the estimate survives a restart.
        if task.next_run.is_some() {
            if let Err(e) = self.inner.store.save(&task) {
                error!("cannot persist task {}: {e}", task.id);
            }
        }

        info!("added {} task {} ({})", task.type_label(), task.id, task.name);
        Ok(task)
    }

    /// Disarm a task and delete it, both from memory and the store.
    pub fn remove(&self, id: &str) -> Result<()> {
        {
            let mut state = self.inner.state();
            if !state.tasks.contains_key(id) {
                return Err(ChimeError::UnknownTask(id.to_owned()));
            }
            dispatch::disarm(&mut state, id);
            state.tasks.remove(id);
            state.in_flight.remove(id);
            state.stop_requests.remove(id);
        }
        self.inner.store.delete(id)?;
        info!("removed task {id}");
        Ok(())
    }

    /// Disarm a task and mark it disabled. The record stays stored and
    /// keeps its statistics.
    pub fn pause(&self, id: &str) -> Result<()> {
        let snapshot = {
            let mut state = self.inner.state();
            let Some(task) = state.tasks.get_mut(id) else {
                return Err(ChimeError::UnknownTask(id.to_owned()));
            };
            task.enabled = false;
            let snapshot = task.clone();
            dispatch::disarm(&mut state, id);
            snapshot
        };
        self.inner.store.save(&snapshot)?;
        info!("paused task {id}");
        Ok(())
    }

    /// Re-enable a paused task and re-arm its timer. A pending stop
    /// request is cleared so the task can fire again. A one-time task
    /// whose instant has passed stays dormant.
    pub fn resume(&self, id: &str) -> Result<()> {
        let snapshot = {
            let mut state = self.inner.state();
            let Some(task) = state.tasks.get_mut(id) else {
                return Err(ChimeError::UnknownTask(id.to_owned()));
            };
            task.enabled = true;
            state.stop_requests.remove(id);
            dispatch::arm(&self.inner, &mut state, id);
            state.tasks.get(id).cloned()
        };
        if let Some(task) = snapshot {
            self.inner.store.save(&task)?;
        }
        info!("resumed task {id}");
        Ok(())
    }

    /// Record a stop request and clear the task's in-flight marker.
    ///
    /// The next scheduled fire sees the flag and skips without touching
    /// the statistics. An invocation already executing is not
    /// interrupted; because the marker is cleared here, a fire landing
    /// before that invocation completes can slip past the overlap guard.
    /// The flag stays set until the task is resumed.
    pub fn request_stop(&self, id: &str) -> Result<()> {
        {
            let mut state = self.inner.state();
            if !state.tasks.contains_key(id) {
                return Err(ChimeError::UnknownTask(id.to_owned()));
            }
            state.stop_requests.insert(id.to_owned());
            state.in_flight.remove(id);
        }
        info!("stop requested for task {id}");
        Ok(())
    }

    /// Trigger a task immediately through the same guard path scheduled
    /// fires use. Skipped runs (in flight, stop pending) return `Ok`.
    pub async fn run_now(&self, id: &str) -> Result<()> {
        if !self.inner.state().tasks.contains_key(id) {
            return Err(ChimeError::UnknownTask(id.to_owned()));
        }
        runner::run_task(&self.inner, id).await;
        Ok(())
    }

    /// Read-only summaries of every known task, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<TaskSummary> {
        let state = self.inner.state();
        let mut tasks: Vec<&Task> = state.tasks.values().collect();
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks.into_iter().map(TaskSummary::from).collect()
    }

    /// A full snapshot of one task.
    pub fn get(&self, id: &str) -> Result<Task> {
        self.inner
            .state()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ChimeError::UnknownTask(id.to_owned()))
    }

    /// Whether an invocation of this task is currently executing.
    /// Unknown ids report as not running.
    #[must_use]
    pub fn is_running(&self, id: &str) -> bool {
        self.inner.state().in_flight.contains(id)
    }

    /// Whether a stop request is pending for this task.
    #[must_use]
    pub fn is_stopped(&self, id: &str) -> bool {
        self.inner.state().stop_requests.contains(id)
    }

    /// Disarm every timer. Records and statistics are left untouched;
    /// runs already executing complete on their own.
    pub fn shutdown(&self) {
        let timers = std::mem::take(&mut self.inner.state().timers);
        let count = timers.len();
        for token in timers.into_values() {
            token.cancel();
        }
        info!("scheduler shut down, {count} timers disarmed");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::processor::{ProcessReply, ProcessRequest};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct OkProcessor;

    #[async_trait]
    impl MessageProcessor for OkProcessor {
        async fn process_message(&self, _request: ProcessRequest) -> Result<ProcessReply> {
            Ok(ProcessReply::success("done"))
        }
    }

    /// Store double whose reads always fail.
    struct BrokenStore;

    impl TaskStore for BrokenStore {
        fn load_all(&self) -> Result<Vec<Task>> {
            Err(ChimeError::Store("disk on fire".into()))
        }

        fn save(&self, _task: &Task) -> Result<()> {
            Ok(())
        }

        fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn scheduler_over(store: Arc<dyn TaskStore>) -> Scheduler {
        Scheduler::with_store(
            SchedulerConfig::default(),
            store,
            Arc::new(OkProcessor) as Arc<dyn MessageProcessor>,
        )
        .unwrap()
    }

    fn scheduler() -> (Scheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler_over(Arc::clone(&store) as Arc<dyn TaskStore>);
        (scheduler, store)
    }

    // ── Construction ─────────────────────────────────────────────────

    #[test]
    fn rejects_invalid_config() {
        let config = SchedulerConfig {
            default_max_attempts: 0,
            ..SchedulerConfig::default()
        };
        let result = Scheduler::with_store(
            config,
            Arc::new(MemoryStore::new()) as Arc<dyn TaskStore>,
            Arc::new(OkProcessor) as Arc<dyn MessageProcessor>,
        );
        assert!(matches!(result, Err(ChimeError::Config(_))));
    }

    // ── add ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn add_parses_persists_and_arms() {
        let (scheduler, store) = scheduler();
        let task = scheduler
            .add("ping", "every 1 minute", "say hi", TaskOptions::default())
            .unwrap();

        assert_eq!(task.type_label(), "heartbeat");
        assert!(task.enabled);
        assert_eq!(task.max_attempts, crate::config::DEFAULT_MAX_ATTEMPTS);
        assert!(task.next_run.is_some());

        let stored = store.load_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, task.id);
        // The persisted record carries the next-run estimate.
        assert!(stored[0].next_run.is_some());
        assert!(scheduler.inner().state().timers.contains_key(&task.id));
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn add_rejects_unknown_phrase_and_stores_nothing() {
        let (scheduler, store) = scheduler();
        let result = scheduler.add("bad", "whenever you like", "nope", TaskOptions::default());

        assert!(matches!(result, Err(ChimeError::InvalidSchedule(_))));
        assert!(store.load_all().unwrap().is_empty());
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn add_trims_the_schedule_phrase() {
        let (scheduler, _store) = scheduler();
        let task = scheduler
            .add("hb", "  every 2 hours  ", "tick", TaskOptions::default())
            .unwrap();
        assert_eq!(task.schedule, "every 2 hours");
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn add_honors_explicit_max_attempts() {
        let (scheduler, _store) = scheduler();
        let options = TaskOptions {
            max_attempts: Some(7),
            ..TaskOptions::default()
        };
        let task = scheduler
            .add("hb", "every 1 hour", "tick", options)
            .unwrap();
        assert_eq!(task.max_attempts, 7);
        scheduler.shutdown();
    }

    // ── remove / pause / resume ──────────────────────────────────────

    #[tokio::test]
    async fn remove_disarms_and_deletes() {
        let (scheduler, store) = scheduler();
        let task = scheduler
            .add("hb", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();
        let token = scheduler
            .inner()
            .state()
            .timers
            .get(&task.id)
            .unwrap()
            .clone();

        scheduler.remove(&task.id).unwrap();

        assert!(token.is_cancelled());
        assert!(scheduler.list().is_empty());
        assert!(store.load_all().unwrap().is_empty());
        assert!(matches!(
            scheduler.remove(&task.id),
            Err(ChimeError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn pause_disables_and_disarms() {
        let (scheduler, store) = scheduler();
        let task = scheduler
            .add("hb", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();

        scheduler.pause(&task.id).unwrap();

        assert!(!scheduler.get(&task.id).unwrap().enabled);
        assert!(!scheduler.inner().state().timers.contains_key(&task.id));
        assert!(!store.load_all().unwrap()[0].enabled);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn resume_reenables_and_rearms() {
        let (scheduler, store) = scheduler();
        let task = scheduler
            .add("hb", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();
        scheduler.pause(&task.id).unwrap();

        scheduler.resume(&task.id).unwrap();

        assert!(scheduler.get(&task.id).unwrap().enabled);
        assert!(scheduler.inner().state().timers.contains_key(&task.id));
        assert!(store.load_all().unwrap()[0].enabled);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn resume_clears_a_pending_stop_request() {
        let (scheduler, _store) = scheduler();
        let task = scheduler
            .add("hb", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();

        scheduler.request_stop(&task.id).unwrap();
        assert!(scheduler.is_stopped(&task.id));

        scheduler.resume(&task.id).unwrap();
        assert!(!scheduler.is_stopped(&task.id));
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn lifecycle_operations_reject_unknown_ids() {
        let (scheduler, _store) = scheduler();
        assert!(matches!(
            scheduler.pause("ghost"),
            Err(ChimeError::UnknownTask(_))
        ));
        assert!(matches!(
            scheduler.resume("ghost"),
            Err(ChimeError::UnknownTask(_))
        ));
        assert!(matches!(
            scheduler.request_stop("ghost"),
            Err(ChimeError::UnknownTask(_))
        ));
        assert!(matches!(
            scheduler.run_now("ghost").await,
            Err(ChimeError::UnknownTask(_))
        ));
        assert!(matches!(
            scheduler.get("ghost"),
            Err(ChimeError::UnknownTask(_))
        ));
    }

    // ── request_stop / run_now ───────────────────────────────────────

    #[tokio::test]
    async fn request_stop_clears_the_in_flight_marker() {
        let (scheduler, _store) = scheduler();
        let task = scheduler
            .add("hb", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();

        scheduler
            .inner()
            .state()
            .in_flight
            .insert(task.id.clone());
        assert!(scheduler.is_running(&task.id));

        scheduler.request_stop(&task.id).unwrap();
        assert!(!scheduler.is_running(&task.id));
        assert!(scheduler.is_stopped(&task.id));
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn run_now_goes_through_the_guard_path() {
        let (scheduler, _store) = scheduler();
        let task = scheduler
            .add("hb", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();

        scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(scheduler.get(&task.id).unwrap().run_count, 1);

        // A pending stop request turns the trigger into a skip.
        scheduler.request_stop(&task.id).unwrap();
        scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(scheduler.get(&task.id).unwrap().run_count, 1);
        scheduler.shutdown();
    }

    // ── list / start / shutdown ──────────────────────────────────────

    #[tokio::test]
    async fn list_returns_summaries_oldest_first() {
        let (scheduler, _store) = scheduler();
        for name in ["first", "second", "third"] {
            scheduler
                .add(name, "every 1 hour", "tick", TaskOptions::default())
                .unwrap();
        }

        let summaries = scheduler.list();
        assert_eq!(summaries.len(), 3);
        for pair in summaries.windows(2) {
            let a = scheduler.get(&pair[0].id).unwrap();
            let b = scheduler.get(&pair[1].id).unwrap();
            assert!(a.created_at <= b.created_at);
        }
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn start_loads_and_arms_only_eligible_tasks() {
        let store = Arc::new(MemoryStore::new());

        // Seed the store through a first context.
        let first = scheduler_over(Arc::clone(&store) as Arc<dyn TaskStore>);
        let armed = first
            .add("hb", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();
        let paused = first
            .add("paused", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();
        first.pause(&paused.id).unwrap();
        let stale = first
            .add("old", "at 1999-01-01 00:00", "late", TaskOptions::default())
            .unwrap();
        first.shutdown();

        let second = scheduler_over(Arc::clone(&store) as Arc<dyn TaskStore>);
        second.start();

        assert_eq!(second.list().len(), 3);
        let state = second.inner().state();
        assert!(state.timers.contains_key(&armed.id));
        assert!(!state.timers.contains_key(&paused.id));
        assert!(!state.timers.contains_key(&stale.id));
        drop(state);
        second.shutdown();
    }

    #[tokio::test]
    async fn start_survives_an_unreadable_store() {
        let scheduler = scheduler_over(Arc::new(BrokenStore) as Arc<dyn TaskStore>);
        scheduler.start();
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn restart_round_trips_every_field() {
        let store = Arc::new(MemoryStore::new());
        let first = scheduler_over(Arc::clone(&store) as Arc<dyn TaskStore>);
        let options = TaskOptions {
            skill: Some("ops".into()),
            context: vec![crate::task::ContextMessage::user("remember me")],
            max_attempts: Some(5),
        };
        let added = first.add("hb", "every 2 hours", "tick", options).unwrap();
        first.run_now(&added.id).await.unwrap();
        let before = first.get(&added.id).unwrap();
        first.shutdown();

        let second = scheduler_over(Arc::clone(&store) as Arc<dyn TaskStore>);
        second.start();
        let after = second.get(&added.id).unwrap();

        assert_eq!(after.id, before.id);
        assert_eq!(after.name, before.name);
        assert_eq!(after.schedule, before.schedule);
        assert_eq!(after.command, before.command);
        assert_eq!(after.skill, before.skill);
        assert_eq!(after.context, before.context);
        assert_eq!(after.max_attempts, before.max_attempts);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.last_run, before.last_run);
        assert_eq!(after.run_count, before.run_count);
        assert_eq!(after.success_count, before.success_count);
        assert_eq!(after.failure_count, before.failure_count);
        second.shutdown();
    }

    #[tokio::test]
    async fn shutdown_cancels_every_timer() {
        let (scheduler, _store) = scheduler();
        let a = scheduler
            .add("a", "every 1 hour", "tick", TaskOptions::default())
            .unwrap();
        let b = scheduler
            .add("b", "daily at 9:30", "tick", TaskOptions::default())
            .unwrap();

        let tokens: Vec<CancellationToken> = {
            let state = scheduler.inner().state();
            [&a.id, &b.id]
                .iter()
                .map(|id| state.timers.get(*id).unwrap().clone())
                .collect()
        };

        scheduler.shutdown();

        assert!(tokens.iter().all(|token| token.is_cancelled()));
        assert!(scheduler.inner().state().timers.is_empty());
    }
}
