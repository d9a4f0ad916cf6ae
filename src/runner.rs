//! The guarded single-task invocation path.
//!
//! Every fire — timer, poller, or manual trigger — funnels through
//! [`run_task`]. The guards run in a fixed order under one short lock:
//! unknown id, execution already in flight, stop request pending. A run
//! that passes the guards invokes the message processor, records the
//! outcome in the task's statistics, and persists the updated record.
//! Nothing in here ever propagates a failure to the caller.

use crate::processor::ProcessRequest;
use crate::scheduler::SchedulerInner;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run one task through the guard path, invoking the processor if the
/// guards pass. Guard rejections return silently after a log entry.
pub(crate) async fn run_task(inner: &Arc<SchedulerInner>, id: &str) {
    let request = {
        let mut state = inner.state();
        let Some(task) = state.tasks.get(id) else {
            debug!("run requested for unknown task {id}");
            return;
        };
        if state.in_flight.contains(id) {
            debug!("task {id} is still running, skipping this cycle");
            return;
        }
        if state.stop_requests.contains(id) {
            info!("task {id} has a pending stop request, skipping run");
            return;
        }
        let request = ProcessRequest::from(task);
        state.in_flight.insert(id.to_owned());
        request
    };

    debug!("executing scheduled task {id}");
    let outcome = inner.processor.process_message(request).await;

    let succeeded = match outcome {
        Ok(reply) if reply.is_error() => {
            warn!(
                "task {id} failed: {}",
                reply.error.as_deref().unwrap_or("unspecified error")
            );
            false
        }
        Ok(_) => {
            debug!("task {id} completed successfully");
            true
        }
        Err(e) => {
            warn!("task {id} failed: {e}");
            false
        }
    };

    // The in-flight marker is cleared and the record persisted whether
    // or not the processor call succeeded. A task removed while its run
    // was executing is not resurrected.
    let record = {
        let mut state = inner.state();
        state.in_flight.remove(id);
        match state.tasks.get_mut(id) {
            Some(task) => {
                task.record_run(succeeded, Utc::now());
                Some(task.clone())
            }
            None => None,
        }
    };

    if let Some(task) = record {
        if let Err(e) = inner.store.save(&task) {
            error!("cannot persist task {id}: {e}");
        }
    }
}
