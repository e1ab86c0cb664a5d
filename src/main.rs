//! Arbiter CLI
//!
//! Run decision-analysis scenarios against the analysis service and follow
//! them stage by stage.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arbiter::stage::{active_stage, StageStatus};
use arbiter::{
    Config, Error, HttpJobService, JobService, MonitorPhase, Result, Snapshot, WorkflowJob,
    WorkflowMonitor,
};

#[derive(Parser)]
#[command(name = "arbiter")]
#[command(author, version, about = "Decision workflow monitor")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Analysis service base URL
    #[arg(long, global = true, env = "ARBITER_SERVICE_URL")]
    service_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available scenarios
    Scenarios,

    /// Run a scenario and follow it until it finishes
    Run {
        /// Scenario id (see `arbiter scenarios`)
        scenario: String,

        /// Polling interval, e.g. "2s" or "500ms"
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,

        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Query a job once
    Status {
        /// Job ID
        job_id: String,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List jobs known to the service
    Jobs,

    /// Delete a job from the service
    Delete {
        /// Job ID
        job_id: String,
    },

    /// Check service health
    Health,

    /// Show the configured stages
    Stages,

    /// Initialize .arbiter directory
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Commands::Init { force } = cli.command {
        let path = arbiter::config::init(force)?;
        info!("Created default config at {:?}", path);
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?.with_service_url(cli.service_url);
    config.validate()?;

    match cli.command {
        Commands::Scenarios => {
            let monitor = WorkflowMonitor::from_config(&config)?;
            for scenario in monitor.load_scenarios().await? {
                println!("{} - {}", scenario.id, scenario.name);
                if !scenario.category.is_empty() {
                    println!("    [{}]", scenario.category);
                }
                if !scenario.description.is_empty() {
                    println!("    {}", scenario.description);
                }
            }
        }

        Commands::Run {
            scenario,
            interval,
            json,
        } => {
            let config = config.with_interval(interval);
            config.validate()?;
            run_scenario(&config, &scenario, json).await?;
        }

        Commands::Status { job_id, json } => {
            let service = HttpJobService::new(&config.service)?;
            let update = service.status(&job_id).await?;

            let mut job = WorkflowJob::new(&job_id, "");
            job.apply(update);
            let snapshot = Snapshot::of_job(&job, &config.stage_registry());

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
        }

        Commands::Jobs => {
            let service = HttpJobService::new(&config.service)?;
            let listing = service.list_jobs().await?;

            for job in &listing.workflows {
                println!(
                    "{} | {} | {}% | {} | {}",
                    job.workflow_id,
                    job.status,
                    job.progress.map(|p| p.round() as i64).unwrap_or(0),
                    job.scenario_type.as_deref().unwrap_or("-"),
                    job.started_at.as_deref().unwrap_or("-"),
                );
            }
            println!("{} job(s)", listing.total.max(listing.workflows.len()));
        }

        Commands::Delete { job_id } => {
            let service = HttpJobService::new(&config.service)?;
            service.delete_job(&job_id).await?;
            println!("Deleted {}", job_id);
        }

        Commands::Health => {
            let service = HttpJobService::new(&config.service)?;
            let health = service.health().await?;

            println!("Service: {} ({})", service.base_url(), health.status);
            if let Some(provider) = &health.llm_provider {
                println!("LLM provider: {}", provider);
            }
            if let Some(configuration) = &health.configuration {
                println!("Configuration: {}", configuration);
            }
        }

        Commands::Stages => {
            for stage in config.stage_registry().stages() {
                if stage.description.is_empty() {
                    println!("{}. {}", stage.order + 1, stage.name);
                } else {
                    println!("{}. {} - {}", stage.order + 1, stage.name, stage.description);
                }
            }
        }

        Commands::Config => {
            let content =
                toml::to_string_pretty(&config).map_err(|e| Error::Config(e.to_string()))?;
            println!("{}", content);
        }

        // Handled before config loading
        Commands::Init { .. } => {}
    }

    Ok(())
}

/// Start a scenario and print progress until it finishes or Ctrl-C
async fn run_scenario(config: &Config, scenario: &str, json: bool) -> Result<()> {
    let monitor = WorkflowMonitor::from_config(config)?;

    if let Err(e) = monitor.load_scenarios().await {
        warn!("Scenario catalog unavailable: {}", e);
    }

    let job = monitor.start_workflow(scenario).await?;
    info!("Started job {} for {}", job.id, scenario);

    let mut rx = monitor.subscribe();
    let mut last_line = String::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let snapshot = loop {
        let snapshot = rx.borrow_and_update().clone();
        if !json {
            let line = progress_line(&snapshot);
            if line != last_line {
                println!("{}", line);
                last_line = line;
            }
        }
        if snapshot.phase.is_terminal() {
            break snapshot;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break monitor.snapshot();
                }
            }
            _ = &mut ctrl_c => {
                monitor.stop().await;
                info!("Interrupted; stopped polling job {}", job.id);
                return Ok(());
            }
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!();
        print_snapshot(&snapshot);
    }

    match snapshot.phase {
        MonitorPhase::Failed => Err(Error::Service(format!(
            "Job {} failed: {}",
            job.id,
            snapshot.error.as_deref().unwrap_or("unknown error")
        ))),
        _ => Ok(()),
    }
}

/// One line per observed change: phase, progress and the stage checklist
fn progress_line(snapshot: &Snapshot) -> String {
    let progress = snapshot
        .job
        .as_ref()
        .and_then(|j| j.progress)
        .unwrap_or(0);

    let checklist: Vec<String> = snapshot
        .stage_views
        .iter()
        .map(|v| {
            let mark = match v.status {
                StageStatus::Completed => "x",
                StageStatus::Active => ">",
                StageStatus::Pending => " ",
            };
            format!("[{}] {}", mark, v.name)
        })
        .collect();

    format!(
        "{:<9} {:>3}%  {}",
        snapshot.phase,
        progress,
        checklist.join("  ")
    )
}

fn print_snapshot(snapshot: &Snapshot) {
    if let Some(job) = &snapshot.job {
        println!("{}", job.summary());
        if let Some(elapsed) = job.elapsed() {
            println!("Elapsed: {}s", elapsed.num_seconds());
        }
    }

    if let Some(stage) = active_stage(&snapshot.stage_views) {
        println!("Active stage: {}", stage.name);
    }

    match snapshot.phase {
        MonitorPhase::Failed => {
            eprintln!(
                "Error: {}",
                snapshot.error.as_deref().unwrap_or("unknown error")
            );
        }
        MonitorPhase::Completed => match &snapshot.decision_report {
            Some(report) if !report.is_empty() => {
                println!();
                println!("{}", report.render());
            }
            _ => println!("No decision report in results"),
        },
        _ => {}
    }
}
