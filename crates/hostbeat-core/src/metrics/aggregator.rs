//! Fan-in aggregator for the metric producers.
//!
//! Ticks on a fixed interval: triggers every sampler (each publishes its own
//! record to its private channel), then reads each channel once with a
//! bounded wait and republishes one merged envelope to the primary channel.
//! A slow or disconnected producer degrades its field to `{}` without
//! stalling the others or delaying the tick.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::channel::{FifoChannel, WriteOutcome};
use crate::metrics::Sampler;
use crate::sleep_interruptible;

/// Bounded wait for one per-metric channel read, per tick.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// One sampler together with its private channel.
struct MetricProducer {
    sampler: Box<dyn Sampler>,
    channel: FifoChannel,
}

/// Merges the per-metric channels into one envelope per tick.
pub struct Aggregator {
    producers: Vec<MetricProducer>,
    primary: FifoChannel,
    tick: u64,
    read_timeout: Duration,
}

impl Aggregator {
    /// Creates an aggregator over `samplers`, with one FIFO per sampler named
    /// `<name>.fifo` under `channel_dir`, plus the primary `primary.fifo`.
    pub fn new(samplers: Vec<Box<dyn Sampler>>, channel_dir: impl AsRef<Path>) -> Self {
        let dir = channel_dir.as_ref();
        let producers = samplers
            .into_iter()
            .map(|sampler| {
                let path = dir.join(format!("{}.fifo", sampler.name()));
                MetricProducer {
                    sampler,
                    channel: FifoChannel::new(path),
                }
            })
            .collect();
        Self {
            producers,
            primary: FifoChannel::new(dir.join("primary.fifo")),
            tick: 0,
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Runs the tick loop until the stop flag clears.
    ///
    /// Provisioning the FIFO structure must succeed before the loop starts;
    /// that failure is escalated to the caller. Per-sampler failures after
    /// that are contained to their tick.
    pub fn run(&mut self, running: &AtomicBool, interval: Duration) -> std::io::Result<()> {
        for producer in &self.producers {
            producer.channel.provision()?;
        }
        self.primary.provision()?;

        info!(
            "metrics pipeline started ({} samplers)",
            self.producers.len()
        );

        while running.load(Ordering::SeqCst) {
            self.tick();
            sleep_interruptible(interval, running);
        }

        info!("metrics pipeline stopped after {} ticks", self.tick);
        for producer in &mut self.producers {
            producer.channel.force_close();
        }
        self.primary.force_close();
        Ok(())
    }

    /// One aggregation cycle: sample, publish, fan in, republish.
    pub fn tick(&mut self) {
        // Phase one: every producer samples and publishes to its own channel.
        for producer in &mut self.producers {
            producer.channel.ensure_open();
            match producer.sampler.sample() {
                Ok(mut record) => {
                    record.push('\n');
                    match producer.channel.write(record.as_bytes()) {
                        WriteOutcome::Sent(n) if n == record.len() => {}
                        WriteOutcome::Sent(n) => {
                            // A record within PIPE_BUF never splits on a
                            // non-blocking FIFO write; a larger one can. The
                            // torn head would be glued onto the next tick's
                            // line, so drop the connection and the fragment
                            // with it.
                            debug!(
                                "{} record torn ({}/{} bytes), resetting channel",
                                producer.sampler.name(),
                                n,
                                record.len()
                            );
                            producer.channel.force_close();
                        }
                        WriteOutcome::Busy | WriteOutcome::Disconnected => debug!(
                            "{} record dropped: channel not writable",
                            producer.sampler.name()
                        ),
                    }
                }
                Err(e) => {
                    warn!("{} sample failed: {}", producer.sampler.name(), e);
                }
            }
        }

        // Phase two: one bounded read per channel, no retry within the tick.
        let mut fragments: Vec<(&'static str, String)> =
            Vec::with_capacity(self.producers.len());
        for producer in &mut self.producers {
            let fragment = producer
                .channel
                .read_line_timeout(self.read_timeout)
                .unwrap_or_else(|| "{}".to_string());
            fragments.push((producer.sampler.name(), fragment));
        }

        let envelope = build_envelope(unix_now(), self.tick, &fragments);

        self.primary.ensure_open();
        match self.primary.write(envelope.as_bytes()) {
            WriteOutcome::Sent(_) => {}
            WriteOutcome::Busy | WriteOutcome::Disconnected => {
                debug!("aggregate envelope dropped: primary channel not writable");
            }
        }

        self.tick += 1;
    }

    /// Tick counter, monotonically increasing from zero.
    pub fn ticks(&self) -> u64 {
        self.tick
    }
}

/// Assembles the combined envelope from already-encoded fragments.
fn build_envelope(timestamp: u64, count: u64, fragments: &[(&'static str, String)]) -> String {
    let mut envelope = String::with_capacity(256);
    envelope.push('{');
    let _ = write!(envelope, "\"timestamp\":{timestamp},\"count\":{count}");
    for (name, fragment) in fragments {
        let _ = write!(envelope, ",\"{name}\":{fragment}");
    }
    envelope.push('}');
    envelope.push('\n');
    envelope
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
