//! Timer arming and disarming.
//!
//! Each armed task owns exactly one timer primitive, tracked in a side
//! table keyed by task id so the record itself stays plain data. One-time
//! tasks get a single sleep, heartbeats a repeating interval, and
//! recurring tasks share a per-task 60-second poller that evaluates the
//! cron expression against the current instant. Cancelling the token in
//! the side table tears the primitive down; an executing run is never
//! interrupted.

use crate::cron::CronExpr;
use crate::runner;
use crate::schedule::Timing;
use crate::scheduler::{EngineState, SchedulerInner};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Seconds between cron evaluations for recurring tasks. Matching is at
/// minute granularity, so one poll per minute visits every minute once.
pub(crate) const POLL_INTERVAL_SECS: u64 = 60;

/// Arm the timer primitive for a task, replacing any existing one.
///
/// Disabled tasks and one-time tasks whose instant has already passed
/// are left dormant with no table entry. `next_run` is re-estimated in
/// memory as part of arming.
pub(crate) fn arm(inner: &Arc<SchedulerInner>, state: &mut EngineState, id: &str) {
    disarm(state, id);
    let Some(task) = state.tasks.get_mut(id) else {
        return;
    };
    if !task.enabled {
        return;
    }

    let now = Utc::now();
    let token = match &task.timing {
        Timing::OneTime { datetime } => {
            let delay = match (*datetime - now).to_std() {
                Ok(delay) if !delay.is_zero() => delay,
                _ => {
                    debug!("one-time task {id} target has already passed, leaving dormant");
                    return;
                }
            };
            task.next_run = Some(*datetime);
            spawn_one_shot(inner, id, delay)
        }
        Timing::Heartbeat { interval } => {
            let millis = i64::try_from(*interval).unwrap_or(i64::MAX);
            task.next_run = now.checked_add_signed(chrono::Duration::milliseconds(millis));
            spawn_heartbeat(inner, id, Duration::from_millis(*interval))
        }
        Timing::Recurring { cron } => {
            let step = chrono::Duration::seconds(POLL_INTERVAL_SECS as i64);
            task.next_run = now.checked_add_signed(step);
            spawn_poller(inner, id, cron.clone())
        }
    };

    debug!("armed {} task {id}", task.type_label());
    state.timers.insert(id.to_owned(), token);
}

/// Cancel and forget the timer primitive for a task, if any.
pub(crate) fn disarm(state: &mut EngineState, id: &str) {
    if let Some(token) = state.timers.remove(id) {
        token.cancel();
        debug!("disarmed timer for task {id}");
    }
}

/// Fire once after `delay`, then drop out of the side table. The run is
/// awaited in place since there is no further tick to hold up.
fn spawn_one_shot(inner: &Arc<SchedulerInner>, id: &str, delay: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let guard = token.clone();
    let inner = Arc::clone(inner);
    let id = id.to_owned();
    tokio::spawn(async move {
        tokio::select! {
            () = guard.cancelled() => {}
            () = tokio::time::sleep(delay) => {
                runner::run_task(&inner, &id).await;
                inner.state().timers.remove(&id);
            }
        }
    });
    token
}

/// Repeat every `period`, with the first fire one full period after
/// arming. Runs are spawned so a slow processor cannot stall the timer;
/// the in-flight guard keeps overlapping fires from stacking.
fn spawn_heartbeat(inner: &Arc<SchedulerInner>, id: &str, period: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let guard = token.clone();
    let inner = Arc::clone(inner);
    let id = id.to_owned();
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = guard.cancelled() => break,
                _ = ticker.tick() => {
                    let run_inner = Arc::clone(&inner);
                    let run_id = id.clone();
                    tokio::spawn(async move {
                        runner::run_task(&run_inner, &run_id).await;
                    });
                }
            }
        }
    });
    token
}

/// Evaluate the cron expression once per poll interval and fire on a
/// match. Delayed ticks stay a full interval apart, so a matching minute
/// is never visited twice.
fn spawn_poller(inner: &Arc<SchedulerInner>, id: &str, cron: CronExpr) -> CancellationToken {
    let token = CancellationToken::new();
    let guard = token.clone();
    let inner = Arc::clone(inner);
    let id = id.to_owned();
    tokio::spawn(async move {
        let period = Duration::from_secs(POLL_INTERVAL_SECS);
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = guard.cancelled() => break,
                _ = ticker.tick() => {
                    if cron.matches(&Utc::now()) {
                        let run_inner = Arc::clone(&inner);
                        let run_id = id.clone();
                        tokio::spawn(async move {
                            runner::run_task(&run_inner, &run_id).await;
                        });
                    }
                }
            }
        }
    });
    token
}
