//! hostbeatd - Host telemetry agent daemon.
//!
//! Tails service log files and samples system metrics, publishing both as
//! line-delimited JSON through local named-pipe channels. A fan-in
//! aggregator merges the per-metric streams into one envelope per tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use hostbeat_core::logs::{LogPipeline, LogSourceSpec};
use hostbeat_core::metrics::{
    Aggregator, CpuSampler, DiskSampler, MemorySampler, NetworkSampler, Sampler,
};
use hostbeat_core::traits::RealFs;

/// Host telemetry agent daemon.
#[derive(Parser)]
#[command(name = "hostbeatd", about = "Host telemetry agent daemon", version)]
struct Args {
    /// Sampling and flush interval in seconds.
    #[arg(short, long, default_value = "2")]
    interval: u64,

    /// Directory holding the named-pipe channels.
    #[arg(short, long, default_value = "./fifo")]
    channel_dir: PathBuf,

    /// Log source as PATH=SERVICE. Repeatable; replaces the default set.
    #[arg(long, value_name = "PATH=SERVICE", value_parser = parse_log_source)]
    log_file: Vec<LogSourceSpec>,

    /// Mount point reported by the disk sampler.
    #[arg(long, default_value = "/")]
    mount_point: String,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Parses a PATH=SERVICE pair into a log source spec.
fn parse_log_source(s: &str) -> Result<LogSourceSpec, String> {
    let (path, service) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("invalid log source '{}': expected PATH=SERVICE", s))?;
    if path.is_empty() || service.is_empty() {
        return Err(format!(
            "invalid log source '{}': path and service must be non-empty",
            s
        ));
    }
    Ok(LogSourceSpec::new(path, service))
}

/// Log files followed when no --log-file is given.
fn default_log_sources() -> Vec<LogSourceSpec> {
    vec![
        LogSourceSpec::new("/var/log/node/app.log", "node"),
        LogSourceSpec::new("/var/log/redis/redis.log", "redis"),
        LogSourceSpec::new("/var/log/mysql/mysql.log", "mysql"),
    ]
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("hostbeatd={}", level).parse().unwrap())
        .add_directive(format!("hostbeat_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("hostbeatd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, channels={}, mount={}, proc={}",
        args.interval,
        args.channel_dir.display(),
        args.mount_point,
        args.proc_path
    );

    let sources = if args.log_file.is_empty() {
        default_log_sources()
    } else {
        args.log_file.clone()
    };
    for source in &sources {
        info!("Log source: {} ({})", source.path.display(), source.service);
    }

    let interval = Duration::from_secs(args.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let samplers: Vec<Box<dyn Sampler>> = vec![
        Box::new(CpuSampler::new(RealFs, &args.proc_path)),
        Box::new(MemorySampler::new(RealFs, &args.proc_path)),
        Box::new(DiskSampler::new(&args.mount_point)),
        Box::new(NetworkSampler::new(RealFs, &args.proc_path)),
    ];
    let mut aggregator = Aggregator::new(samplers, &args.channel_dir);

    let mut log_pipeline = LogPipeline::new(sources, args.channel_dir.join("logs.fifo"));

    let logs_running = running.clone();
    let logs_handle = std::thread::Builder::new()
        .name("logs".to_string())
        .spawn(move || log_pipeline.run(&logs_running, interval));

    let metrics_running = running.clone();
    let metrics_handle = std::thread::Builder::new()
        .name("metrics".to_string())
        .spawn(move || aggregator.run(&metrics_running, interval));

    let mut exit_code = 0;

    match logs_handle {
        Ok(handle) => match handle.join() {
            Ok(Ok(())) => info!("Log pipeline finished"),
            Ok(Err(e)) => error!("Log pipeline failed: {}", e),
            Err(_) => error!("Log pipeline thread panicked"),
        },
        Err(e) => error!("Failed to spawn log pipeline thread: {}", e),
    }

    match metrics_handle {
        Ok(handle) => match handle.join() {
            Ok(Ok(())) => info!("Metrics pipeline finished"),
            Ok(Err(e)) => {
                error!("Metrics pipeline failed: {}", e);
                exit_code = 1;
            }
            Err(_) => {
                error!("Metrics pipeline thread panicked");
                exit_code = 1;
            }
        },
        Err(e) => {
            error!("Failed to spawn metrics pipeline thread: {}", e);
            exit_code = 1;
        }
    }

    info!("Shutdown complete");
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::parse_log_source;

    #[test]
    fn parse_log_source_splits_on_last_equals() {
        let spec = parse_log_source("/var/log/app=1.log=web").unwrap();
        assert_eq!(spec.path.to_str().unwrap(), "/var/log/app=1.log");
        assert_eq!(spec.service, "web");
    }

    #[test]
    fn parse_log_source_rejects_malformed_pairs() {
        assert!(parse_log_source("/var/log/app.log").is_err());
        assert!(parse_log_source("=web").is_err());
        assert!(parse_log_source("/var/log/app.log=").is_err());
    }
}
