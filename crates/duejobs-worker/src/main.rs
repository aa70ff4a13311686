use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use duejobs_core::DuejobsConfig;
use duejobs_scheduler::{JobId, Scheduler, SqliteJobStore, TableName};
use serde_json::Value;
use tracing::info;

mod handlers;

#[derive(Debug, Parser)]
#[command(
    name = "duejobs-worker",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("DUEJOBS_GIT_SHA"), ")"),
    about = "Durable poll-based job worker"
)]
struct Cli {
    /// Config file. Falls back to $DUEJOBS_CONFIG, then ~/.duejobs/duejobs.toml.
    #[arg(long)]
    config: Option<String>,

    /// Verbose scheduling/execution tracing (same as scheduler.debug = true).
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sweep for due jobs until Ctrl-C.
    Run,
    /// Persist a job for one of the built-in handlers.
    Schedule {
        #[arg(long = "type")]
        job_type: String,
        /// Seconds from now until the job is due.
        #[arg(long, default_value_t = 0)]
        in_secs: i64,
        /// JSON array of positional arguments.
        #[arg(long, default_value = "[]")]
        args: String,
    },
    /// Print pending jobs as JSON lines.
    List,
    /// Delete a job.
    Cancel { job_id: JobId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config: --config > DUEJOBS_CONFIG env > ~/.duejobs/duejobs.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("DUEJOBS_CONFIG").ok());
    let config = DuejobsConfig::load(config_path.as_deref()).context("loading config")?;

    init_tracing(cli.debug || config.scheduler.debug);

    let db_path = &config.database.path;
    info!(path = %db_path, table = %config.scheduler.table, "opening job store");
    let store = Arc::new(SqliteJobStore::open(db_path)?);
    store.ensure_table(&TableName::parse(&config.scheduler.table)?)?;

    let scheduler = Scheduler::from_settings(&config.scheduler, store)?;
    handlers::register_builtin(&scheduler)?;
    info!(job_types = ?scheduler.job_types(), "handlers registered");

    match cli.command {
        Command::Run => {
            scheduler.start(config.scheduler.interval_ms).await?;
            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
            scheduler.stop();
        }
        Command::Schedule {
            job_type,
            in_secs,
            args,
        } => {
            let args: Value =
                serde_json::from_str(&args).context("--args must be a JSON value")?;
            let due_at = due_in(Utc::now(), in_secs)?;
            let id = scheduler.schedule(due_at, &job_type, &args).await?;
            println!("{id}");
        }
        Command::List => {
            for job in scheduler.list().await? {
                println!("{}", serde_json::to_string(&job)?);
            }
        }
        Command::Cancel { job_id } => {
            scheduler.cancel(job_id).await?;
        }
    }
    Ok(())
}

/// `now` shifted by `secs`, or an error when the result is not representable.
fn due_in(now: DateTime<Utc>, secs: i64) -> anyhow::Result<DateTime<Utc>> {
    Duration::try_seconds(secs)
        .and_then(|offset| now.checked_add_signed(offset))
        .with_context(|| format!("--in-secs {secs} is out of range"))
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "duejobs_worker=debug,duejobs_scheduler=debug"
    } else {
        "duejobs_worker=info,duejobs_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_in_offsets_from_now() {
        let now = Utc::now();
        assert_eq!(due_in(now, 0).unwrap(), now);
        assert_eq!(due_in(now, 90).unwrap(), now + Duration::seconds(90));
        assert_eq!(due_in(now, -5).unwrap(), now - Duration::seconds(5));
    }

    #[test]
    fn due_in_rejects_overflow() {
        let now = Utc::now();
        for secs in [i64::MAX, i64::MIN, i64::MAX / 1000, 10_000_000_000_000] {
            let err = due_in(now, secs).unwrap_err();
            assert!(err.to_string().contains("out of range"), "{secs}: {err}");
        }
    }

    #[test]
    fn cli_parses_schedule() {
        let cli = Cli::try_parse_from([
            "duejobs-worker",
            "schedule",
            "--type",
            "echo",
            "--in-secs",
            "9223372036854775807",
        ])
        .unwrap();
        match cli.command {
            Command::Schedule { job_type, in_secs, args } => {
                assert_eq!(job_type, "echo");
                assert_eq!(in_secs, i64::MAX);
                assert_eq!(args, "[]");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
