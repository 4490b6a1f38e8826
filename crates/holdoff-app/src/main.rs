//! holdoff binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Open the SQLite store and the simulated device
//! 3. Build the coordinator, dispatcher, scheduler and intercepting gateway
//! 4. Run the requested subcommand

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;

use holdoff_action::{
    ActionDispatcher, DelayCoordinator, DurationChange, InterceptingGateway, PolicyCommand,
    Scheduler, SimulatedGateway, Submission, TickReport,
};
use holdoff_core::config::HoldoffConfig;
use holdoff_core::types::{format_remaining, ActionId, ActionRecord, ActionStatus, Timestamp};
use holdoff_storage::Database;

use cli::{CliArgs, Command};

/// Everything a subcommand may need.
struct App {
    coordinator: DelayCoordinator,
    device: Arc<SimulatedGateway>,
    gateway: InterceptingGateway,
    scheduler: Scheduler,
}

impl App {
    fn open(config: &HoldoffConfig, data_dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("holdoff.db");
        let db = Arc::new(Database::new(&db_path)?);
        tracing::info!(path = %db_path.display(), "SQLite database opened");

        let device_path = data_dir.join("device.json");
        let device = Arc::new(SimulatedGateway::open(&device_path)?);
        tracing::debug!(path = %device_path.display(), "Simulated device loaded");

        let coordinator = DelayCoordinator::open(db, config.delay.to_policy())?;
        let dispatcher = Arc::new(ActionDispatcher::with_defaults(
            device.clone(),
            coordinator.clone(),
        ));
        let poll_interval = Duration::from_secs(config.scheduler.poll_interval_secs.max(1));
        let scheduler =
            Scheduler::new(coordinator.clone(), dispatcher).with_poll_interval(poll_interval);
        let gateway = InterceptingGateway::new(device.clone(), coordinator.clone());

        Ok(Self {
            coordinator,
            device,
            gateway,
            scheduler,
        })
    }
}

fn print_records(records: &[ActionRecord], now: Timestamp) {
    if records.is_empty() {
        println!("No changes.");
        return;
    }
    for record in records {
        let remaining = match record.status {
            ActionStatus::Pending => format_remaining(record.remaining_millis(now)),
            ActionStatus::Failed => "-".to_string(),
        };
        println!(
            "{:>5}  {:<7}  {:>8}  {:<32}  {}",
            record.id, record.status, remaining, record.action_type, record.description
        );
    }
}

fn print_report(report: &TickReport, now: Timestamp) {
    println!(
        "Applied {}, failed {}, skipped {}; {} pending",
        report.applied, report.failed, report.skipped, report.pending
    );
    if let Some(deadline) = report.next_deadline {
        println!(
            "Next change in {}",
            format_remaining(deadline.0.saturating_sub(now.0))
        );
    }
}

async fn run_scheduler(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = app.coordinator.events();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    event = event.event_name(),
                    id = ?event.action_id(),
                    "Delay event"
                ),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event log fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    app.scheduler.start()?;
    tracing::info!(
        poll_interval_secs = app.scheduler.poll_interval().as_secs(),
        "Scheduler running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    app.scheduler.stop().await?;
    event_log.abort();
    Ok(())
}

async fn execute(app: &App, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = &app.coordinator;
    match command {
        Command::Run => run_scheduler(app).await?,
        Command::Tick => {
            let report = app.scheduler.tick().await;
            print_report(&report, coordinator.now());
        }
        Command::Status => {
            coordinator.refresh().await?;
            let policy = coordinator.policy();
            let state = if policy.enabled { "enabled" } else { "disabled" };
            println!("Delay: {} ({})", state, policy.display_duration());

            let summary = coordinator.summary().await?;
            match &summary.next {
                Some(next) => println!(
                    "{} pending. Next in {}: {}",
                    summary.pending,
                    format_remaining(next.remaining_millis(coordinator.now())),
                    next.description
                ),
                None => println!("{} pending", summary.pending),
            }
            println!("Failed: {}", summary.failed);
        }
        Command::Enable => {
            coordinator.enable().await?;
            println!(
                "Delay enabled ({})",
                coordinator.policy().display_duration()
            );
        }
        Command::Disable => match coordinator.queue_disable().await? {
            Some(record) => println!(
                "Queued: {}. Applies at {}",
                record.description, record.applies_at
            ),
            None => println!("Delay is already disabled"),
        },
        Command::SetDelay { value, unit } => match coordinator.set_duration(value, unit).await? {
            DurationChange::Applied(policy) => {
                println!("Delay duration set to {}", policy.display_duration())
            }
            DurationChange::Queued(record) => println!(
                "Duration change queued: {}. Applies at {}",
                record.description, record.applies_at
            ),
        },
        Command::List { failed, json } => {
            let records = if failed {
                coordinator.failed().await?
            } else {
                coordinator.pending().await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_records(&records, coordinator.now());
            }
        }
        Command::Cancel { id } => {
            if coordinator.cancel(ActionId(id)).await? {
                println!("Cancelled {}", id);
            } else {
                println!("No change with id {}", id);
            }
        }
        Command::Apply {
            action_type,
            params,
        } => {
            let params: serde_json::Value = serde_json::from_str(&params)?;
            let payload = serde_json::json!({ "params": params }).to_string();
            let command = PolicyCommand::from_payload(&action_type, &payload)?;
            let description = command.describe();
            match app.gateway.submit(command).await? {
                Submission::Applied => println!("Applied: {}", description),
                Submission::Queued { id, applies_at } => println!(
                    "Queued: {}. Applies in {} at {} (id {})",
                    description,
                    coordinator.policy().display_duration(),
                    applies_at,
                    id
                ),
            }
        }
        Command::Device => {
            println!("{}", serde_json::to_string_pretty(&app.device.state())?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = HoldoffConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over --log-level and the config value.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(path = %config_file.display(), "Configuration resolved");

    let data_dir = args.resolve_data_dir().unwrap_or_else(|| config.data_dir());
    let app = App::open(&config, &data_dir)?;
    execute(&app, args.command).await
}
