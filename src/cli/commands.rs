//! CLI command definitions for the recorder worker.
//!
//! `run` starts a worker that competes for reservations and hands each claimed
//! job to an external recording program. `reserve` publishes a reservation,
//! which is handy for smoke-testing a fleet.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::metrics::{export_metrics, init_metrics};
use crate::recorder::CommandRecorderFactory;
use crate::reservation::{RedisReservationQueue, ReservationQueue, ReservationRequest};
use crate::service::{Service, ServiceConfig, ServiceHandle, DEFAULT_RESERVATION_CHANNEL};

/// Recorder worker competing for recording jobs on a shared queue.
#[derive(Parser)]
#[command(name = "recorder-worker")]
#[command(about = "Claim recording jobs from a shared reservation queue")]
#[command(version)]
#[command(
    long_about = "recorder-worker joins a fleet of recorders competing for reservations on a Redis-backed queue.\n\nEach worker claims at most one job at a time, runs the configured recorder program until it exits, then becomes available again.\n\nSignals:\n  SIGTERM / SIGQUIT  finish the current recording, then exit\n  SIGINT (Ctrl-C)    stop now, killing the current recording\n\nExample usage:\n  recorder-worker run --recorder-command /usr/local/bin/record-room\n  recorder-worker reserve room-42 --option template=grid"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a recorder worker until it is signalled to stop.
    Run(RunArgs),

    /// Publish a reservation for a recording job.
    Reserve(ReserveArgs),
}

/// Arguments for `recorder-worker run`.
///
/// Unset options fall back to the `RECORDER_*` environment variables read by
/// `ServiceConfig::from_env`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Program launched for every claimed reservation.
    #[arg(long, env = "RECORDER_COMMAND")]
    pub recorder_command: String,

    /// Extra argument passed to the recorder program before the job id (repeatable).
    #[arg(long = "recorder-arg", allow_hyphen_values = true)]
    pub recorder_args: Vec<String>,

    /// Working directory for the recorder program.
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Redis URL of the reservation queue.
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Reservation channel shared by the fleet.
    #[arg(short = 'c', long)]
    pub channel: Option<String>,

    /// Reservations older than this many milliseconds are discarded.
    #[arg(long)]
    pub reservation_timeout_ms: Option<u64>,

    /// Identifier used in logs.
    #[arg(long)]
    pub worker_id: Option<String>,

    /// Print Prometheus metrics to stdout when the worker exits.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Arguments for `recorder-worker reserve`.
#[derive(Parser, Debug)]
pub struct ReserveArgs {
    /// Job identifier (a random one is generated when omitted).
    pub id: Option<String>,

    /// Pass-through recording option as key=value; values that parse as JSON
    /// are sent as JSON (repeatable).
    #[arg(short = 'o', long = "option")]
    pub options: Vec<String>,

    /// Redis URL of the reservation queue.
    #[arg(long, env = "RECORDER_REDIS_URL", default_value = crate::service::config::DEFAULT_REDIS_URL)]
    pub redis_url: String,

    /// Reservation channel shared by the fleet.
    #[arg(short = 'c', long, env = "RECORDER_RESERVATION_CHANNEL", default_value = DEFAULT_RESERVATION_CHANNEL)]
    pub channel: String,

    /// Output the published reservation as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Summary printed by `reserve --json`.
#[derive(Debug, Serialize)]
struct ReserveOutput {
    channel: String,
    reservation: ReservationRequest,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_worker_command(args).await?,
        Commands::Reserve(args) => run_reserve_command(args).await?,
    }
    Ok(())
}

// ============================================================================
// Run Command Implementation
// ============================================================================

fn build_service_config(args: &RunArgs) -> anyhow::Result<ServiceConfig> {
    let mut config = ServiceConfig::from_env().context("Invalid RECORDER_* environment")?;

    if let Some(ref url) = args.redis_url {
        config = config.with_redis_url(url);
    }
    if let Some(ref channel) = args.channel {
        config = config.with_reservation_channel(channel);
    }
    if let Some(ms) = args.reservation_timeout_ms {
        config = config.with_reservation_timeout(Duration::from_millis(ms));
    }
    if let Some(ref id) = args.worker_id {
        config = config.with_worker_id(id);
    }

    config.validate()?;
    Ok(config)
}

async fn run_worker_command(args: RunArgs) -> anyhow::Result<()> {
    let config = build_service_config(&args)?;

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let queue = RedisReservationQueue::connect(&config.redis_url)
        .await
        .with_context(|| format!("Failed to connect to {}", config.redis_url))?;

    let mut recorders =
        CommandRecorderFactory::new(&args.recorder_command).with_args(args.recorder_args.clone());
    if let Some(ref dir) = args.working_dir {
        recorders = recorders.with_working_dir(dir);
    }

    info!(
        worker_id = %config.worker_id,
        channel = %config.reservation_channel,
        reservation_timeout_ms = config.reservation_timeout.as_millis() as u64,
        recorder = %args.recorder_command,
        "Recorder worker configured"
    );

    let service = Service::new(config, Arc::new(queue), Arc::new(recorders));
    spawn_signal_listener(service.handle());

    let result = service.run().await;

    if args.print_metrics {
        print!("{}", export_metrics());
    }

    result.map_err(Into::into)
}

/// Translates OS signals into stop requests.
fn spawn_signal_listener(handle: ServiceHandle) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for interrupts");
                    return;
                }
                info!("Interrupt received, stopping and killing current recording");
                handle.stop(true);
            }
            _ = graceful_stop_signal() => {
                info!("Termination requested, finishing current recording before exit");
                handle.stop(false);
            }
        }
    });
}

#[cfg(unix)]
async fn graceful_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut quit) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    ) {
        (Ok(term), Ok(quit)) => (term, quit),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to install termination handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = term.recv() => {}
        _ = quit.recv() => {}
    }
}

#[cfg(not(unix))]
async fn graceful_stop_signal() {
    std::future::pending().await
}

// ============================================================================
// Reserve Command Implementation
// ============================================================================

fn parse_option(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Option '{}' is not in key=value form", raw))?;

    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Option '{}' has an empty key", raw);
    }
    if key == "id" || key == "submittedAt" {
        anyhow::bail!("Option key '{}' is reserved", key);
    }

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn build_reservation(args: &ReserveArgs) -> anyhow::Result<ReservationRequest> {
    let id = args
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut request = ReservationRequest::new(id);
    for raw in &args.options {
        let (key, value) = parse_option(raw)?;
        request = request.with_option(key, value);
    }
    Ok(request)
}

async fn run_reserve_command(args: ReserveArgs) -> anyhow::Result<()> {
    let request = build_reservation(&args)?;

    let queue = RedisReservationQueue::connect(&args.redis_url)
        .await
        .with_context(|| format!("Failed to connect to {}", args.redis_url))?;
    queue.publish(&args.channel, request.encode()?).await?;

    if args.json {
        let output = ReserveOutput {
            channel: args.channel.clone(),
            reservation: request,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        info!(reservation_id = %request.id, channel = %args.channel, "Reservation published");
        println!("{}", request.id);
    }

    Ok(())
}
