use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use roster_sync::activity;
use roster_sync::config::{self, SyncConfig};
use roster_sync::report::{self, StatusFilter};
use roster_sync::sync::RosterService;

#[derive(Parser)]
#[command(name = "roster-sync")]
#[command(about = "Codeforces progress tracker for a student roster", long_about = None)]
struct Cli {
    /// Codeforces API root
    #[arg(long, env = "CF_API_BASE_URL", default_value = config::DEFAULT_BASE_URL, global = true)]
    base_url: String,
    /// How long a Codeforces response is reused
    #[arg(long, env = "ROSTER_CACHE_TTL_SECS", default_value_t = 300, global = true)]
    cache_ttl_secs: u64,
    /// Gap between students during a roster sync
    #[arg(long, env = "ROSTER_PACING_MS", default_value_t = 500, global = true)]
    pacing_ms: u64,
    /// Days without a submission before a student is flagged inactive
    #[arg(
        long,
        env = "ROSTER_INACTIVITY_DAYS",
        default_value_t = 30,
        value_parser = clap::value_parser!(i64).range(1..=activity::MAX_WINDOW_DAYS),
        global = true
    )]
    inactivity_days: i64,
    #[arg(long, default_value_t = 30, global = true)]
    request_timeout_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            base_url: self.base_url.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            pacing_delay: Duration::from_millis(self.pacing_ms),
            inactivity_days: self.inactivity_days,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..SyncConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the roster (or one student) and print a summary
    Sync {
        #[arg(long)]
        handle: Option<String>,
    },
    /// Sync the roster and write a markdown progress report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        inactive_only: bool,
    },
    /// Sync the roster and export it as CSV
    Export {
        #[arg(long, default_value = "students.csv")]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = StatusFilter::All)]
        status: StatusFilter,
    },
    /// Keep syncing on a fixed interval until interrupted
    Watch {
        #[arg(long, default_value_t = 60)]
        interval_minutes: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let service = RosterService::from_config(cli.sync_config())
        .context("failed to set up the roster service")?;

    match cli.command {
        Commands::Sync { handle } => {
            match handle {
                Some(handle) => {
                    let student = service
                        .repository()
                        .find_by_handle(&handle)
                        .with_context(|| format!("no student with handle {handle}"))?;
                    let outcome = service
                        .sync_student(student.id)
                        .await
                        .with_context(|| format!("failed to sync {handle}"))?;
                    tracing::debug!(?outcome, "Single student sync finished");
                }
                None => service.sync_all().await,
            }

            println!("Roster:");
            for student in service.list_students() {
                let last_sync = student
                    .last_data_sync
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "- {} ({}) rating {} (max {}) {} last sync {}",
                    student.name,
                    student.handle,
                    student.current_rating,
                    student.max_rating,
                    student.status_label(),
                    last_sync
                );
            }
            if let Some(run) = service.last_sync_run() {
                if run.is_clean() {
                    println!("Synced {} of {} students.", run.succeeded, run.attempted);
                } else {
                    println!(
                        "Synced {} of {} students, {} failed (see log).",
                        run.succeeded, run.attempted, run.failed
                    );
                }
            }
        }
        Commands::Report { out, inactive_only } => {
            service.sync_all().await;
            let report = report::build_report(
                &service.list_students(),
                service.last_sync_run().as_ref(),
                inactive_only,
                chrono::Utc::now(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out, status } => {
            service.sync_all().await;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let written = report::export_csv(file, &service.list_students(), status)
                .with_context(|| format!("failed to export {}", out.display()))?;
            println!("Exported {written} students to {}.", out.display());
        }
        Commands::Watch { interval_minutes } => {
            let cancel = CancellationToken::new();
            let task = service.spawn_auto_sync(
                Duration::from_secs(interval_minutes.max(1) * 60),
                cancel.clone(),
            );
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            tracing::info!("Shutdown requested");
            cancel.cancel();
            task.await.context("automatic sync task panicked")?;
        }
    }

    Ok(())
}
