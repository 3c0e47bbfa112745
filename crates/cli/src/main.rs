mod command_job;
mod config_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    cadence_config::CadenceConfig,
    cadence_jobs::{EventFn, JobRunner, RunnerEvent, Schedule, TimerScheduler},
    cadence_metrics::{MetricsRecorderConfig, init_metrics},
    chrono::Utc,
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "cadence", about = "Cadence: scheduled jobs with bounded retry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./cadence.toml, then the user config dir).
    #[arg(long, short, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured jobs until interrupted.
    Run {
        /// Print every runner event to stdout as a JSON line.
        #[arg(long)]
        events: bool,
    },
    /// Validate the config file and preview the next firing of each job.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Preview upcoming firings of a schedule expression.
    Next {
        /// e.g. "daily", "every 15m", "0 9 * * MON-FRI tz=Europe/Paris".
        schedule: String,
        #[arg(long, short = 'n', default_value_t = 5)]
        count: usize,
    },
    /// List configured jobs with their next firing.
    Status,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load(cli: &Cli) -> anyhow::Result<CadenceConfig> {
    match &cli.config {
        Some(path) => cadence_config::load_config(path),
        None => Ok(cadence_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match &cli.command {
        Commands::Run { events } => run(load(&cli)?, *events).await,
        Commands::Check { verbose } => config_commands::check(cli.config.as_deref(), *verbose),
        Commands::Next { schedule, count } => next(schedule, *count),
        Commands::Status => status(&load(&cli)?),
    }
}

async fn run(config: CadenceConfig, events: bool) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "cadence starting");

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: config.metrics.labels.clone().into_iter().collect(),
    })?;

    let scheduler = Arc::new(TimerScheduler::with_idle_poll(
        config.runner.idle_poll().context("runner.idle_poll")?,
    ));
    let on_event: Option<EventFn> = events.then(|| {
        Arc::new(|event: RunnerEvent| {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        }) as EventFn
    });
    let runner = JobRunner::with_config(
        scheduler,
        config.runner.runner_config().context("runner")?,
        on_event,
    );

    let defaults = config.runner.retry_policy()?;
    for job in &config.jobs {
        if !job.enabled {
            info!(job = %job.name, "job disabled, skipping");
            continue;
        }
        let work = command_job::command_job(job)?;
        let policy = job
            .retry_policy(&defaults)
            .with_context(|| format!("job '{}': invalid retry_delay", job.name))?;
        runner
            .add_job_with_retry(job.name.clone(), work, &job.schedule, policy)
            .await?;
    }

    if config.jobs.iter().all(|j| !j.enabled) {
        warn!("no enabled jobs configured");
    }

    runner.start().await?;
    let summary = runner.summary().await;
    info!(
        jobs = summary.job_count,
        next_run_at = ?summary.next_run_at,
        "runner started, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    runner.stop().await;

    println!("{}", serde_json::to_string_pretty(&runner.get_status().await)?);
    if config.metrics.enabled {
        eprint!("{}", metrics.render());
    }
    Ok(())
}

fn next(schedule: &str, count: usize) -> anyhow::Result<()> {
    let schedule = Schedule::parse(schedule)?;
    let upcoming = schedule.upcoming(Utc::now(), count);
    if upcoming.is_empty() {
        println!("'{schedule}' never fires again.");
    }
    for at in upcoming {
        println!("{}", at.to_rfc3339());
    }
    Ok(())
}

fn status(config: &CadenceConfig) -> anyhow::Result<()> {
    if config.jobs.is_empty() {
        println!("No jobs configured.");
        return Ok(());
    }
    let now = Utc::now();
    for job in &config.jobs {
        let next = match Schedule::parse(&job.schedule) {
            Ok(schedule) if job.enabled => schedule
                .next_after(now)
                .map_or_else(|| "never".to_string(), |at| at.to_rfc3339()),
            Ok(_) => "disabled".to_string(),
            Err(e) => format!("invalid: {e}"),
        };
        println!("  {:<24} {:<28} {next}", job.name, job.schedule);
    }
    Ok(())
}
