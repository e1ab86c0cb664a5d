//! Workflow job state
//!
//! A [`WorkflowJob`] is the client-side record of one remote execution. It is
//! created when submission succeeds and afterwards only changes by applying a
//! [`StatusUpdate`] received from the job service. Updates replace the mutable
//! fields wholesale; the service protocol carries full state, not deltas.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Scenario offered by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier, passed to the job service on submit
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

/// Remote job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not started
    Queued,
    /// Executing
    Running,
    /// Finished with results
    Completed,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Completed or failed; no further polling happens for terminal jobs
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "queued" | "pending" => Ok(JobStatus::Queued),
            "running" | "in_progress" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::Service(format!("Unknown job status: {}", s))),
        }
    }
}

/// Full job state as reported by one status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: JobStatus,
    /// Percent complete, clamped to 0..=100
    pub progress: Option<u8>,
    /// Free-text stage label, e.g. "Reasoning: evaluating option 2 of 5"
    pub current_stage_label: Option<String>,
    /// Raw pipeline output
    pub results: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Scenario the service reports for the job; never overrides a known one
    pub scenario_id: Option<String>,
}

impl StatusUpdate {
    /// Update carrying only a status
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            current_stage_label: None,
            results: None,
            error: None,
            started_at: None,
            completed_at: None,
            scenario_id: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_stage(mut self, label: &str) -> Self {
        self.current_stage_label = Some(label.to_string());
        self
    }

    pub fn with_results(mut self, results: Value) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_scenario(mut self, scenario_id: &str) -> Self {
        self.scenario_id = Some(scenario_id.to_string());
        self
    }
}

/// Client-side record of the live job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowJob {
    /// Identifier assigned by the job service
    pub id: String,
    /// Scenario the job was started for
    pub scenario_id: String,
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub current_stage_label: Option<String>,
    pub results: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl WorkflowJob {
    /// Record for a freshly submitted job
    pub fn new(id: &str, scenario_id: &str) -> Self {
        Self {
            id: id.to_string(),
            scenario_id: scenario_id.to_string(),
            status: JobStatus::Running,
            progress: Some(0),
            current_stage_label: None,
            results: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Replace the mutable fields with a status response
    pub fn apply(&mut self, update: StatusUpdate) {
        self.status = update.status;
        self.progress = update.progress.map(|p| p.min(100));
        self.current_stage_label = update.current_stage_label;
        self.results = update.results;
        self.error = update.error;
        self.started_at = update.started_at;
        self.completed_at = update.completed_at;

        if self.scenario_id.is_empty() {
            if let Some(scenario_id) = update.scenario_id {
                self.scenario_id = scenario_id;
            }
        }
    }

    /// Record a failure to observe the job (submission or polling fault)
    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall time between the service's start and completion stamps
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let started = parse_timestamp(self.started_at.as_deref()?)?;
        let completed = parse_timestamp(self.completed_at.as_deref()?)?;
        Some(completed - started)
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let mut line = if self.scenario_id.is_empty() {
            format!("Job {}: {}", self.id, self.status)
        } else {
            format!("Job {} ({}): {}", self.id, self.scenario_id, self.status)
        };
        if let Some(progress) = self.progress {
            line.push_str(&format!(" {}%", progress));
        }
        if let Some(stage) = &self.current_stage_label {
            line.push_str(&format!(" [{}]", stage));
        }
        if let Some(error) = &self.error {
            line.push_str(&format!(" - {}", error));
        }
        line
    }
}

/// Service timestamps are ISO 8601, with or without an offset
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
}
