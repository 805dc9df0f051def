use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use windowgate::config::AppConfig;
use windowgate::logging::init_tracing;
use windowgate::ratelimit::{Clock, RateLimiter, Sweeper};
use windowgate::replay::{spawn_line_reader, RequestHandler};

/// Replay JSON-lines check requests from stdin through a fixed-window rate limiter.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if args.json_logs {
        config.logging.json = true;
    }
    init_tracing(&config.logging);

    info!("Starting windowgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        instance_id = %config.instance_id,
        sweep_interval_secs = config.sweeper.interval_secs,
        "Configuration loaded"
    );

    let presets = config.preset_table()?;
    info!(presets = ?presets.names(), "Rate limit presets loaded");

    let rate_limiter = Arc::new(RateLimiter::new().with_presets(presets));
    let sweeper = Sweeper::spawn(rate_limiter.clone(), config.sweep_interval())?;
    let handler = RequestHandler::new(rate_limiter.clone());

    tokio::select! {
        result = replay_stdin(&handler) => {
            result?;
            info!("Input closed");
        }
        _ = shutdown_signal() => {}
    }

    sweeper.shutdown().await;
    info!(entries = rate_limiter.len(), "windowgate stopped");
    Ok(())
}

/// Answer each request line on stdin with one decision line on stdout.
async fn replay_stdin<C: Clock>(handler: &RequestHandler<C>) -> anyhow::Result<()> {
    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let output = match handler.handle_line(&line) {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Failed to process request");
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
