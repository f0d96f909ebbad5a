//! `run` command implementation.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::load_config;
use crate::session::{Session, SessionConfig};

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut config = load_config(&args.config)?;

    // Apply CLI overrides
    if let Some(ms) = args.keepalive_ms {
        info!(keepalive_ms = ms, "Overriding keepalive interval from CLI");
        config.dispatcher.keepalive_interval_ms = (ms > 0).then_some(ms);
    }
    if let Some(rate) = args.rate_hz {
        if rate > 0.0 {
            info!(rate_hz = rate, "Overriding source rate from CLI");
            config.source.rate_hz = rate;
        } else {
            warn!(rate_hz = rate, "Ignoring non-positive --rate-hz");
        }
    }
    let metrics_port = args.metrics_port.or(config.observability.metrics_port);

    info!(
        topics = config.topics.len(),
        keepalive_ms = ?config.dispatcher.keepalive_interval_ms,
        broadcast_on_timeout = config.dispatcher.broadcast_on_timeout,
        rate_hz = config.source.rate_hz,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if config.topics.is_empty() {
        warn!("No topics configured - the session will only exercise keepalive");
    }

    if let Some(port) = metrics_port {
        observability::init_metrics_only(port)?;
        info!("Metrics endpoint available on port {}", port);
    }

    let session = Session::new(SessionConfig {
        config,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
    });

    info!("Starting session...");
    let stats = session.run(shutdown_signal()).await?;

    info!(
        events_sent = stats.events_sent,
        wakeups = stats.consumers.total_wakeups,
        coalesced = stats.dispatcher.coalesced_count,
        duration_secs = stats.duration.as_secs_f64(),
        "Session completed"
    );
    stats.print_summary();

    info!("notifycond finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires, so the session then runs
/// until its duration elapses.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::NotifyCondConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Dispatcher:");
    match config.dispatcher.keepalive_interval_ms {
        Some(ms) => println!("  Keepalive: {} ms", ms),
        None => println!("  Keepalive: disabled"),
    }
    println!(
        "  Broadcast on timeout: {}",
        config.dispatcher.broadcast_on_timeout
    );

    println!("\nSource ({:?}):", config.source.kind);
    println!("  Rate: {} Hz", config.source.rate_hz);
    if let Some(ms) = config.source.resync_every_ms {
        println!("  Resync every: {} ms", ms);
    }

    println!("\nTopics ({}):", config.topics.len());
    for topic in &config.topics {
        println!("  - {} (weight {})", topic.name, topic.weight);
    }

    println!();
}
