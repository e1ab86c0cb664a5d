//! Arbiter: Decision Workflow Monitor
//!
//! Client for a remote decision-analysis service. A scenario is submitted as a
//! long-running job, the job is polled until it reaches a terminal state, and
//! the nested result payload is reduced to a readable decision report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          WorkflowMonitor (root)         │
//! │  owns the job, publishes snapshots      │
//! └───────┬─────────────────────┬───────────┘
//!         ▼                     ▼
//! ┌───────────────┐   ┌─────────────────────┐
//! │ WorkflowPoller│   │ stage::resolve      │
//! │ one task/job  │   │ report::extract     │
//! └───────┬───────┘   └─────────────────────┘
//!         ▼
//! ┌─────────────────────────────────────────┐
//! │   JobService / ScenarioCatalog (HTTP)   │
//! └─────────────────────────────────────────┘
//! ```

pub mod config;
pub mod job;
pub mod monitor;
pub mod poller;
pub mod report;
pub mod service;
pub mod stage;

// Re-exports for convenience
pub use config::Config;
pub use job::{JobStatus, Scenario, StatusUpdate, WorkflowJob};
pub use monitor::{MonitorPhase, Snapshot, WorkflowMonitor};
pub use poller::{PollEvent, UpdateSink, WorkflowPoller};
pub use report::{extract, DecisionReport};
pub use service::{HttpJobService, JobService, ScenarioCatalog};
pub use stage::{resolve, StageDescriptor, StageRegistry, StageStatus, StageView};

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Polling failed: {0}")]
    Polling(String),

    #[error("Scenario catalog error: {0}")]
    Catalog(String),

    #[error("A workflow is already active: {0}")]
    WorkflowActive(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
