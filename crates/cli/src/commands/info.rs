//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::load_config;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    dispatcher: DispatcherInfo,
    source: SourceInfo,
    topic_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    topics: Vec<TopicInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_port: Option<u16>,
}

#[derive(Serialize)]
struct DispatcherInfo {
    keepalive_ms: Option<u64>,
    broadcast_on_timeout: bool,
}

#[derive(Serialize)]
struct SourceInfo {
    kind: String,
    rate_hz: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    resync_every_ms: Option<u64>,
    latency_ms: u64,
}

#[derive(Serialize)]
struct TopicInfo {
    name: String,
    weight: u32,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(&args.config)?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn build_config_info(config: &contracts::NotifyCondConfig, args: &InfoArgs) -> ConfigInfo {
    let topics = if args.topics {
        config
            .topics
            .iter()
            .map(|t| TopicInfo {
                name: t.name.clone(),
                weight: t.weight,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        dispatcher: DispatcherInfo {
            keepalive_ms: config.dispatcher.keepalive_interval_ms,
            broadcast_on_timeout: config.dispatcher.broadcast_on_timeout,
        },
        source: SourceInfo {
            kind: format!("{:?}", config.source.kind),
            rate_hz: config.source.rate_hz,
            resync_every_ms: config.source.resync_every_ms,
            latency_ms: config.source.latency_ms,
        },
        topic_count: config.topics.len(),
        topics,
        metrics_port: config.observability.metrics_port,
    }
}

fn print_config_info(config: &contracts::NotifyCondConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               notifycond Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Dispatcher");
    println!("   ├─ Version: {:?}", config.version);
    match config.dispatcher.keepalive_interval_ms {
        Some(ms) => println!("   ├─ Keepalive: {} ms", ms),
        None => println!("   ├─ Keepalive: disabled"),
    }
    println!(
        "   └─ Broadcast on timeout: {}",
        config.dispatcher.broadcast_on_timeout
    );

    let source = &config.source;
    println!("\n📡 Source ({:?})", source.kind);
    println!("   ├─ Rate: {} Hz", source.rate_hz);
    match source.resync_every_ms {
        Some(ms) => println!("   ├─ Resync every: {} ms", ms),
        None => println!("   ├─ Resync: never"),
    }
    println!("   ├─ Latency: {} ms", source.latency_ms);
    println!("   └─ Event capacity: {}", source.event_capacity);

    println!("\n📬 Topics ({})", config.topics.len());
    if args.topics {
        for (i, topic) in config.topics.iter().enumerate() {
            let is_last = i == config.topics.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!("   {} {} (weight {})", prefix, topic.name, topic.weight);
        }
    }

    if let Some(port) = config.observability.metrics_port {
        println!("\n📈 Metrics port: {}", port);
    }

    println!();
}
