//! Workflow monitor
//!
//! Root of the client: owns the live job, drives the poller, and publishes a
//! [`Snapshot`] (job, stage checklist, decision report) on every change.
//!
//! The job is mutated only here. The poller proposes [`PollEvent`]s through
//! an [`UpdateSink`]; events whose generation is no longer accepted (after a
//! stop, a reset, or a newer start) are dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::job::{JobStatus, Scenario, WorkflowJob};
use crate::poller::{PollEvent, UpdateSink, WorkflowPoller};
use crate::report::{extract, DecisionReport};
use crate::service::{HttpJobService, JobService, ScenarioCatalog};
use crate::stage::{all_completed, all_pending, resolve, StageRegistry, StageView};
use crate::{Error, Result};

/// Coarse state of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    /// No job
    Idle,
    /// Job accepted but not yet executing
    Pending,
    Running,
    Completed,
    /// Job failed, or could not be submitted or observed
    Failed,
}

impl MonitorPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorPhase::Completed | MonitorPhase::Failed)
    }
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorPhase::Idle => write!(f, "idle"),
            MonitorPhase::Pending => write!(f, "pending"),
            MonitorPhase::Running => write!(f, "running"),
            MonitorPhase::Completed => write!(f, "completed"),
            MonitorPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Everything a view needs, recomputed on every job mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub phase: MonitorPhase,
    pub job: Option<WorkflowJob>,
    pub stage_views: Vec<StageView>,
    pub decision_report: Option<DecisionReport>,
    pub error: Option<String>,
}

impl Snapshot {
    /// Snapshot with no job
    pub fn initial(registry: &StageRegistry) -> Self {
        project(None, None, registry)
    }

    /// Snapshot for a single observed job, outside of any monitor
    pub fn of_job(job: &WorkflowJob, registry: &StageRegistry) -> Self {
        project(Some(job), None, registry)
    }
}

fn project(
    job: Option<&WorkflowJob>,
    error: Option<&str>,
    registry: &StageRegistry,
) -> Snapshot {
    let phase = match job {
        Some(job) => match job.status {
            JobStatus::Queued => MonitorPhase::Pending,
            JobStatus::Running => MonitorPhase::Running,
            JobStatus::Completed => MonitorPhase::Completed,
            JobStatus::Failed => MonitorPhase::Failed,
        },
        None if error.is_some() => MonitorPhase::Failed,
        None => MonitorPhase::Idle,
    };

    let stage_views = match job {
        Some(job) if job.status == JobStatus::Completed => all_completed(registry),
        Some(job) => resolve(job.current_stage_label.as_deref(), registry),
        None => all_pending(registry),
    };

    Snapshot {
        phase,
        job: job.cloned(),
        stage_views,
        decision_report: job.and_then(|j| extract(j.results.as_ref())),
        error: error
            .map(str::to_string)
            .or_else(|| job.and_then(|j| j.error.clone())),
    }
}

#[derive(Default)]
struct MonitorState {
    job: Option<WorkflowJob>,
    /// Submission or polling fault
    error: Option<String>,
    /// Generation whose poll events are still applied
    accepting: Option<u64>,
    scenarios: Vec<Scenario>,
}

struct Inner {
    registry: StageRegistry,
    catalog: Arc<dyn ScenarioCatalog>,
    state: Mutex<MonitorState>,
    poller: tokio::sync::Mutex<WorkflowPoller>,
    snapshots: watch::Sender<Snapshot>,
}

impl Inner {
    fn publish(&self, state: &MonitorState) {
        let snapshot = project(state.job.as_ref(), state.error.as_deref(), &self.registry);
        self.snapshots.send_replace(snapshot);
    }

    fn apply(&self, event: PollEvent) {
        let mut state = self.state.lock();

        if let PollEvent::Started { generation, job } = event {
            state.accepting = Some(generation);
            state.job = Some(job);
            state.error = None;
            self.publish(&state);
            return;
        }

        if state.accepting != Some(event.generation()) {
            warn!(
                "Ignoring stale poll event (generation {})",
                event.generation()
            );
            return;
        }

        match event {
            PollEvent::Updated { update, .. } => {
                let terminal = update.status.is_terminal();
                match state.job.as_mut() {
                    Some(job) => {
                        job.apply(update);
                        debug!("{}", job.summary());
                    }
                    None => return,
                }
                if terminal {
                    state.accepting = None;
                }
            }
            PollEvent::Failed { error, .. } => {
                if let Some(job) = state.job.as_mut() {
                    job.fail(&error);
                }
                state.error = Some(error);
                state.accepting = None;
            }
            PollEvent::Started { .. } => return,
        }

        self.publish(&state);
    }
}

/// Holds the monitor weakly so a running poll loop never keeps it alive
struct MonitorSink {
    inner: Weak<Inner>,
}

impl UpdateSink for MonitorSink {
    fn apply(&self, event: PollEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.apply(event);
        }
    }
}

/// Cloneable handle to the workflow monitor
#[derive(Clone)]
pub struct WorkflowMonitor {
    inner: Arc<Inner>,
}

impl WorkflowMonitor {
    /// Create a monitor over the given service and catalog
    pub fn new(
        service: Arc<dyn JobService>,
        catalog: Arc<dyn ScenarioCatalog>,
        registry: StageRegistry,
        interval: Duration,
    ) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::initial(&registry));

        Self {
            inner: Arc::new(Inner {
                registry,
                catalog,
                state: Mutex::new(MonitorState::default()),
                poller: tokio::sync::Mutex::new(WorkflowPoller::new(service, interval)),
                snapshots,
            }),
        }
    }

    /// Create a monitor talking HTTP to the configured service
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Arc::new(HttpJobService::new(&config.service)?);
        Ok(Self::new(
            http.clone(),
            http,
            config.stage_registry(),
            config.polling.interval,
        ))
    }

    /// Fetch and store the scenario catalog
    pub async fn load_scenarios(&self) -> Result<Vec<Scenario>> {
        let scenarios = self.inner.catalog.list().await.map_err(|e| match e {
            Error::Catalog(_) => e,
            other => Error::Catalog(other.to_string()),
        })?;

        info!("Loaded {} scenarios", scenarios.len());
        self.inner.state.lock().scenarios = scenarios.clone();
        Ok(scenarios)
    }

    /// Scenarios from the last successful load
    pub fn scenarios(&self) -> Vec<Scenario> {
        self.inner.state.lock().scenarios.clone()
    }

    /// Submit a scenario and start polling the new job
    pub async fn start_workflow(&self, scenario_id: &str) -> Result<WorkflowJob> {
        let mut poller = self.inner.poller.lock().await;

        if let Some(job_id) = poller.active_job() {
            return Err(Error::WorkflowActive(job_id.to_string()));
        }

        {
            let state = self.inner.state.lock();
            if !state.scenarios.is_empty() && !state.scenarios.iter().any(|s| s.id == scenario_id)
            {
                warn!("Scenario {} is not in the loaded catalog", scenario_id);
            }
        }

        let sink: Arc<dyn UpdateSink> = Arc::new(MonitorSink {
            inner: Arc::downgrade(&self.inner),
        });

        match poller.start(scenario_id, sink).await {
            Ok(job) => Ok(job),
            Err(e @ Error::WorkflowActive(_)) => Err(e),
            Err(e) => {
                warn!("Could not start scenario {}: {}", scenario_id, e);
                let mut state = self.inner.state.lock();
                state.job = None;
                state.accepting = None;
                state.error = Some(e.to_string());
                self.inner.publish(&state);
                Err(e)
            }
        }
    }

    /// Stop polling; the current job and views are kept
    pub async fn stop(&self) {
        let mut poller = self.inner.poller.lock().await;
        if poller.stop() {
            info!("Polling stopped");
        }
        self.inner.state.lock().accepting = None;
    }

    /// Stop polling and return to the initial snapshot
    pub async fn reset(&self) {
        let mut poller = self.inner.poller.lock().await;
        poller.stop();

        let mut state = self.inner.state.lock();
        state.job = None;
        state.error = None;
        state.accepting = None;
        self.inner.publish(&state);
    }

    /// Whether a poll loop is running
    pub async fn is_polling(&self) -> bool {
        self.inner.poller.lock().await.is_active()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Wait for the first completed or failed snapshot
    ///
    /// Only resolves if a job reaches a terminal state; after `stop` it waits
    /// forever, so callers racing it against a shutdown signal should stop
    /// waiting themselves.
    pub async fn wait_for_terminal(&self) -> Snapshot {
        let mut rx = self.subscribe();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.phase.is_terminal() {
                    return snapshot.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::StatusUpdate;
    use crate::stage::StageStatus;
    use serde_json::json;

    fn statuses(snapshot: &Snapshot) -> Vec<StageStatus> {
        snapshot.stage_views.iter().map(|v| v.status).collect()
    }

    #[test]
    fn test_initial_snapshot() {
        let snapshot = Snapshot::initial(&StageRegistry::default());
        assert_eq!(snapshot.phase, MonitorPhase::Idle);
        assert!(snapshot.job.is_none());
        assert!(snapshot.decision_report.is_none());
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.stage_views.len(), 5);
        assert!(statuses(&snapshot).iter().all(|s| *s == StageStatus::Pending));
    }

    #[test]
    fn test_projection_phases() {
        let registry = StageRegistry::default();
        let mut job = WorkflowJob::new("abc", "emergency");

        assert_eq!(Snapshot::of_job(&job, &registry).phase, MonitorPhase::Running);

        job.apply(StatusUpdate::new(JobStatus::Queued));
        assert_eq!(Snapshot::of_job(&job, &registry).phase, MonitorPhase::Pending);

        job.apply(StatusUpdate::new(JobStatus::Failed).with_error("timeout"));
        let snapshot = Snapshot::of_job(&job, &registry);
        assert_eq!(snapshot.phase, MonitorPhase::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("timeout"));

        let snapshot = project(None, Some("Submission failed: 503"), &registry);
        assert_eq!(snapshot.phase, MonitorPhase::Failed);
        assert!(snapshot.job.is_none());
    }

    #[test]
    fn test_completed_job_marks_all_stages_completed() {
        let registry = StageRegistry::default();
        let mut job = WorkflowJob::new("abc", "emergency");
        job.apply(
            StatusUpdate::new(JobStatus::Completed)
                .with_progress(100)
                .with_stage("Completed")
                .with_results(json!({
                    "stages": { "decision": { "data": { "decision": {
                        "RECOMMENDED DECISION": "Evacuate Region B first"
                    } } } }
                })),
        );

        let snapshot = Snapshot::of_job(&job, &registry);
        assert!(statuses(&snapshot)
            .iter()
            .all(|s| *s == StageStatus::Completed));
        assert_eq!(
            snapshot
                .decision_report
                .and_then(|r| r.recommended_decision)
                .as_deref(),
            Some("Evacuate Region B first")
        );
    }

    #[test]
    fn test_running_job_resolves_label() {
        let registry = StageRegistry::default();
        let mut job = WorkflowJob::new("abc", "emergency");
        job.apply(StatusUpdate::new(JobStatus::Running).with_stage("Reasoning: option 2"));

        let snapshot = Snapshot::of_job(&job, &registry);
        assert_eq!(
            statuses(&snapshot),
            vec![
                StageStatus::Completed,
                StageStatus::Completed,
                StageStatus::Active,
                StageStatus::Pending,
                StageStatus::Pending,
            ]
        );
    }
}
