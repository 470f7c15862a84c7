//! Channel throughput bench
//!
//! Usage:
//!   channel-bench --channel work
//!   channel-bench --config config/channels.toml --channel orders --messages 100000 --producers 4

use anyhow::{bail, Context, Result};
use clap::Parser;
use message_channels::{
    handler_fn, ChannelRegistry, ChannelType, ChannelsConfig, HandleOutcome, Message,
    MessageChannel, Timeout,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = r#"
[executor]
workers = 4
thread_name = "bench-worker"

[channels.work]
type = "queue"
capacity = 1024

[channels.direct]
type = "direct"

[channels.async]
type = "executor"

[channels.broadcast]
type = "publish_subscribe"

[channels.prio]
type = "priority"
capacity = 1024

[channels.local]
type = "thread_local"
"#;

#[derive(Parser, Debug)]
#[command(name = "channel-bench")]
#[command(about = "Pump messages through a configured channel and report throughput")]
#[command(version)]
struct Args {
    /// Path to channel configuration file; a built-in set of channels is used when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Name of the channel to exercise
    #[arg(long, default_value = "work")]
    channel: String,

    /// Total number of messages to send
    #[arg(short, long, default_value_t = 10_000)]
    messages: u64,

    /// Number of producer threads
    #[arg(short, long, default_value_t = 1)]
    producers: u64,

    /// Subscribers attached to push channels (at least one)
    #[arg(long, default_value_t = 1)]
    subscribers: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => ChannelsConfig::from_file(std::path::Path::new(path))
            .with_context(|| format!("loading {path}"))?,
        None => ChannelsConfig::from_toml(DEFAULT_CONFIG)?,
    };
    let channel_type = config
        .get_channel(&args.channel)
        .map(|c| c.channel_type)
        .with_context(|| format!("channel '{}' is not configured", args.channel))?;

    let registry = ChannelRegistry::from_config(&config).map_err(|e| {
        error!("Failed to build channels: {}", e);
        e
    })?;
    let channel = registry
        .get(&args.channel)
        .with_context(|| format!("channel '{}' was not built", args.channel))?;

    if args.producers == 0 {
        bail!("at least one producer is required");
    }

    info!(
        channel = %args.channel,
        kind = channel_type.name(),
        messages = args.messages,
        producers = args.producers,
        "Starting bench"
    );

    let delivered = Arc::new(AtomicU64::new(0));
    let started = Instant::now();
    let (subscribers, expected) = delivery_plan(channel_type, args.messages, args.subscribers);

    if let Some(subscribable) = channel.as_subscribable() {
        for index in 0..subscribers {
            let counter = Arc::clone(&delivered);
            subscribable.subscribe(handler_fn(format!("bench-{index}"), move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(HandleOutcome::Accepted)
            }));
        }
    }

    let consumer = (channel.as_pollable().is_some() && channel_type != ChannelType::ThreadLocal)
        .then(|| spawn_consumer(Arc::clone(&channel), Arc::clone(&delivered), expected));

    let producers: Vec<_> = (0..args.producers)
        .map(|producer| {
            let channel = Arc::clone(&channel);
            let delivered = Arc::clone(&delivered);
            let share = args.messages / args.producers
                + u64::from(producer < args.messages % args.producers);
            let drain_locally = channel_type == ChannelType::ThreadLocal;
            std::thread::spawn(move || produce(channel.as_ref(), producer, share, drain_locally, &delivered))
        })
        .collect();

    let mut failures = 0u64;
    for producer in producers {
        match producer.join() {
            Ok(failed) => failures += failed,
            Err(_) => bail!("producer thread panicked"),
        }
    }
    if let Some(consumer) = consumer {
        if consumer.join().is_err() {
            bail!("consumer thread panicked");
        }
    }

    // Asynchronous handlers may still be running
    let deadline = Instant::now() + Duration::from_secs(10);
    while delivered.load(Ordering::Relaxed) < expected - failures.min(expected) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let elapsed = started.elapsed();
    let count = delivered.load(Ordering::Relaxed);
    info!(
        delivered = count,
        failures,
        elapsed_ms = elapsed.as_millis() as u64,
        per_sec = (count as f64 / elapsed.as_secs_f64()) as u64,
        "Bench finished"
    );
    if let Some(stats) = channel.as_configurable().map(|c| c.stats()) {
        info!(
            sent = stats.send_count,
            send_errors = stats.send_error_count,
            received = stats.receive_count,
            "Channel statistics"
        );
    }

    registry.shutdown();
    if count < expected {
        warn!(missing = expected - count, "Not every message was delivered");
    }
    Ok(())
}

/// Subscribers to attach (at least one) and the deliveries they should see
fn delivery_plan(channel_type: ChannelType, messages: u64, requested_subscribers: usize) -> (usize, u64) {
    let subscribers = requested_subscribers.max(1);
    let expected = if channel_type == ChannelType::PublishSubscribe {
        messages * subscribers as u64
    } else {
        messages
    };
    (subscribers, expected)
}

fn produce(
    channel: &dyn MessageChannel,
    producer: u64,
    count: u64,
    drain_locally: bool,
    delivered: &AtomicU64,
) -> u64 {
    let mut failures = 0;
    for sequence in 0..count {
        match channel.send(Message::new((producer, sequence))) {
            Ok(true) => {}
            Ok(false) => failures += 1,
            Err(e) => {
                warn!("Send failed: {}", e);
                failures += 1;
            }
        }
        if drain_locally {
            if let Some(pollable) = channel.as_pollable() {
                while pollable.receive_timeout(Timeout::Immediate).is_some() {
                    delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
    failures
}

fn spawn_consumer(
    channel: Arc<dyn MessageChannel>,
    delivered: Arc<AtomicU64>,
    expected: u64,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let Some(pollable) = channel.as_pollable() else {
            return;
        };
        while delivered.load(Ordering::Relaxed) < expected {
            match pollable.receive_timeout(Timeout::After(Duration::from_secs(1))) {
                Some(_) => {
                    delivered.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    warn!("Consumer idle for 1s, stopping");
                    break;
                }
            }
        }
    })
}

fn init_logging(args: &Args) -> Result<()> {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    if args.json_logs {
        tracing_subscriber::fmt().json().with_max_level(log_level).init();
    } else {
        tracing_subscriber::fmt().with_max_level(log_level).init();
    }

    Ok(())
}
