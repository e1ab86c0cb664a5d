//! Workflow poller
//!
//! Submits a scenario and then queries the job status on a fixed interval
//! until the job reaches a terminal state, a query fails, or the poller is
//! stopped. The poller never mutates job state itself; every observation is
//! handed to an [`UpdateSink`] as a [`PollEvent`].
//!
//! Queries are serialized: the next status query is only issued after the
//! previous response has been handled, and ticks missed while a slow query
//! was outstanding are delayed rather than bunched. Query failures end the
//! loop immediately; there is no retry or backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job::{StatusUpdate, WorkflowJob};
use crate::service::JobService;
use crate::{Error, Result};

/// Observation proposed by the poller
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// Submission succeeded; emitted before the first query
    Started { generation: u64, job: WorkflowJob },
    /// A status response, to replace the job's mutable fields
    Updated {
        generation: u64,
        update: StatusUpdate,
    },
    /// A status query failed; polling has stopped
    Failed { generation: u64, error: String },
}

impl PollEvent {
    /// Generation of the job this event belongs to
    pub fn generation(&self) -> u64 {
        match self {
            PollEvent::Started { generation, .. }
            | PollEvent::Updated { generation, .. }
            | PollEvent::Failed { generation, .. } => *generation,
        }
    }
}

/// Receiver of poll events
pub trait UpdateSink: Send + Sync {
    fn apply(&self, event: PollEvent);
}

/// Handle to a running poll loop; dropping it tears the loop down
struct PollHandle {
    job_id: String,
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// The loop cancels its own token before reporting a terminal state
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Owns the polling loop for at most one job
pub struct WorkflowPoller {
    service: Arc<dyn JobService>,
    interval: Duration,
    generation: u64,
    active: Option<PollHandle>,
}

impl WorkflowPoller {
    /// Create a poller querying `service` every `interval`
    pub fn new(service: Arc<dyn JobService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            generation: 0,
            active: None,
        }
    }

    /// Whether a poll loop is still running
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(PollHandle::is_running)
    }

    /// Id of the job being polled, if any
    pub fn active_job(&self) -> Option<&str> {
        self.active
            .as_ref()
            .filter(|h| h.is_running())
            .map(|h| h.job_id.as_str())
    }

    /// Submit a scenario and start polling the new job
    pub async fn start(
        &mut self,
        scenario_id: &str,
        sink: Arc<dyn UpdateSink>,
    ) -> Result<WorkflowJob> {
        if let Some(job_id) = self.active_job() {
            return Err(Error::WorkflowActive(job_id.to_string()));
        }
        // Release whatever is left of a finished loop
        self.stop();

        info!("Submitting scenario: {}", scenario_id);
        let job_id = self
            .service
            .submit(scenario_id)
            .await
            .map_err(|e| match e {
                Error::Submission(_) => e,
                other => Error::Submission(other.to_string()),
            })?;

        self.generation += 1;
        let generation = self.generation;
        let job = WorkflowJob::new(&job_id, scenario_id);
        info!("Job {} started (generation {})", job_id, generation);

        sink.apply(PollEvent::Started {
            generation,
            job: job.clone(),
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            self.service.clone(),
            job_id.clone(),
            generation,
            self.interval,
            cancel.clone(),
            sink,
        ));

        self.active = Some(PollHandle {
            job_id,
            generation,
            cancel,
            task,
        });

        Ok(job)
    }

    /// Stop polling; returns whether a loop was torn down
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(handle) => {
                debug!(
                    "Stopping poll loop for job {} (generation {})",
                    handle.job_id, handle.generation
                );
                true
            }
            None => false,
        }
    }
}

async fn poll_loop(
    service: Arc<dyn JobService>,
    job_id: String,
    generation: u64,
    interval: Duration,
    cancel: CancellationToken,
    sink: Arc<dyn UpdateSink>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        polls += 1;
        debug!(job_id = %job_id, polls, "Querying job status");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = service.status(&job_id) => outcome,
        };

        // A stop that raced the response wins
        if cancel.is_cancelled() {
            break;
        }

        match outcome {
            Ok(update) => {
                let terminal = update.status.is_terminal();
                if terminal {
                    info!("Job {} reached {} after {} polls", job_id, update.status, polls);
                    cancel.cancel();
                }
                sink.apply(PollEvent::Updated { generation, update });
                if terminal {
                    break;
                }
            }
            Err(e) => {
                let error = match e {
                    Error::Polling(_) => e,
                    other => Error::Polling(other.to_string()),
                };
                warn!("Polling job {} stopped: {}", job_id, error);
                cancel.cancel();
                sink.apply(PollEvent::Failed {
                    generation,
                    error: error.to_string(),
                });
                break;
            }
        }
    }

    debug!(job_id = %job_id, polls, "Poll loop finished");
}
