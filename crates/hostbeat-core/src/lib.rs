//! hostbeat-core — shared library for the hostbeat host-telemetry agent.
//!
//! Provides:
//! - `channel` — non-blocking named-pipe (FIFO) endpoints with lazy reconnect
//! - `buffer` — bounded output buffer between producers and a channel
//! - `logs` — log file tailing, JSON record encoding, delivery pipeline
//! - `metrics` — per-kind system samplers and the fan-in aggregator
//! - `traits` — filesystem abstraction for testing without a real `/proc`
//!
//! The agent runs two independent units: the log pipeline
//! (`logs::LogPipeline`) and the metrics pipeline
//! (`metrics::aggregator::Aggregator`). They share nothing but a cooperative
//! stop flag.

pub mod buffer;
pub mod channel;
pub mod logs;
pub mod metrics;
pub mod traits;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Sleeps for `interval`, waking early if the stop flag is cleared.
///
/// Sleeps in 100ms slices so a stop request is observed promptly while the
/// in-flight tick still completes before the caller re-checks the flag.
pub fn sleep_interruptible(interval: Duration, running: &AtomicBool) {
    let slice = Duration::from_millis(100);
    let mut remaining = interval;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let sleep_time = remaining.min(slice);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
}
