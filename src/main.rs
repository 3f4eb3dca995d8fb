//! Gremlin service CLI.

use anyhow::{anyhow, Result};
use clap::Parser;
use futures_util::stream::{self, StreamExt};
use gremlin_service::{CallContext, CallError, CallHandler, Config, ResultRecord, SharedConfig};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gremlin-service")]
#[command(about = "Fault-injecting call handler for resilience testing")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gremlin.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Run in dry-run mode (log failures without returning them)
    #[arg(long)]
    dry_run: bool,

    /// Number of calls to perform
    #[arg(short = 'n', long, default_value_t = 10)]
    calls: u64,

    /// Maximum calls in flight
    #[arg(short = 'j', long, default_value_t = 1)]
    concurrency: usize,

    /// Per-call timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

fn print_example_config() {
    let example = r#"# Gremlin Service Configuration

settings:
  enabled: true                    # Global kill switch
  dry_run: false                   # Log failures without returning them
  log_injections: true             # Log when failures are injected

service:
  name: "serviceB"                 # Reported in messages and sources
  work_time_ms: 100                # Simulated work per call
  fail_probability: 0.2            # Chance of a simulated failure (0.0-1.0)
  # seed: 42                       # Reproducible failure sequence

identity:
  # override: "pod-1"              # Fixed identity instead of the hostname
  fallback: "unknown-host"         # Used when the hostname cannot be resolved

# Safety limits
safety:
  schedule:                        # Only fail during these windows
    - days: [mon, tue, wed, thu, fri]
      start: "09:00"
      end: "17:00"
      timezone: "UTC"
"#;
    println!("{}", example);
}

fn outcome_line(result: Result<ResultRecord, CallError>) -> serde_json::Value {
    let err = match result {
        Ok(record) => return json!({ "outcome": "success", "result": record }),
        Err(err) => err,
    };

    let message = err.to_string();
    match err {
        CallError::SimulatedFailure(event) => json!({
            "outcome": "simulated_failure",
            "error": message,
            "event": event,
        }),
        CallError::Canceled { call_count, cause } => json!({
            "outcome": "canceled",
            "error": message,
            "callCount": call_count,
            "cause": cause,
        }),
    }
}

#[cfg(unix)]
fn spawn_reload_handler(config: SharedConfig, path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGHUP handler");
                return;
            }
        };

        while sighup.recv().await.is_some() {
            info!(config = %path.display(), "Received SIGHUP, reloading configuration");
            config.reload(&path);
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_handler(_config: SharedConfig, _path: PathBuf) {
    warn!("SIGHUP config reload not supported on this platform");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        print_example_config();
        return Ok(());
    }

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    info!(config = %args.config.display(), "Loading configuration");
    let mut config = Config::from_file(&args.config)?;

    // Override dry_run if specified on command line
    if args.dry_run {
        config.settings.dry_run = true;
        info!("Dry-run mode enabled via command line");
    }

    // Handle --validate
    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    if args.concurrency == 0 {
        return Err(anyhow!("--concurrency must be at least 1"));
    }

    let shared = SharedConfig::new(config);
    spawn_reload_handler(shared.clone(), args.config.clone());

    let handler = Arc::new(CallHandler::from_config(shared));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, canceling calls in flight");
                shutdown.cancel();
            }
        });
    }

    info!(
        calls = args.calls,
        concurrency = args.concurrency,
        timeout_ms = ?args.timeout_ms,
        "Starting calls"
    );

    let timeout = args.timeout_ms.map(Duration::from_millis);
    let mut outcomes = stream::iter(0..args.calls)
        .take_while(|_| std::future::ready(!shutdown.is_cancelled()))
        .map(|_| {
            let handler = Arc::clone(&handler);
            let mut ctx = CallContext::with_cancellation(shutdown.child_token());
            if let Some(timeout) = timeout {
                ctx = ctx.with_timeout(timeout);
            }
            async move { handler.call(&ctx).await }
        })
        .buffer_unordered(args.concurrency);

    while let Some(result) = outcomes.next().await {
        println!("{}", outcome_line(result));
    }

    let stats = handler.stats();
    info!(
        calls = stats.calls,
        succeeded = stats.succeeded,
        failed = stats.failed,
        canceled = stats.canceled,
        dry_run_failures = stats.dry_run_failures,
        "Calls complete"
    );
    println!("{}", json!({ "stats": stats }));

    Ok(())
}
