//! Network throughput sampler.
//!
//! Sums receive/transmit byte counters across all non-loopback interfaces in
//! `/proc/net/dev` and reports the byte rate since the previous sample. The
//! first sample only seeds the counters and is flagged as baseline.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::metrics::parser::{NetTotals, parse_net_dev};
use crate::metrics::{SampleError, Sampler};
use crate::traits::FileSystem;

/// Wire record for one network sample.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkRecord {
    pub rx_bytes_per_sec: u64,
    pub tx_bytes_per_sec: u64,
    pub baseline: bool,
}

/// Samples network throughput from `/proc/net/dev`.
pub struct NetworkSampler<F: FileSystem> {
    fs: F,
    proc_path: String,
    prev: Option<(NetTotals, Instant)>,
}

impl<F: FileSystem> NetworkSampler<F> {
    /// Creates a sampler reading from `<proc_path>/net/dev`.
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            prev: None,
        }
    }

    /// Folds the current totals into the sampler state and produces the
    /// record, dividing counter deltas by the elapsed wall time.
    fn advance(&mut self, curr: NetTotals, elapsed_secs: f64) -> NetworkRecord {
        let record = match self.prev {
            None => NetworkRecord {
                rx_bytes_per_sec: 0,
                tx_bytes_per_sec: 0,
                baseline: true,
            },
            Some((prev, _)) => {
                let rate = |curr_bytes: u64, prev_bytes: u64| -> u64 {
                    if elapsed_secs <= 0.0 {
                        return 0;
                    }
                    (curr_bytes.saturating_sub(prev_bytes) as f64 / elapsed_secs) as u64
                };
                NetworkRecord {
                    rx_bytes_per_sec: rate(curr.rx_bytes, prev.rx_bytes),
                    tx_bytes_per_sec: rate(curr.tx_bytes, prev.tx_bytes),
                    baseline: false,
                }
            }
        };
        self.prev = Some((curr, Instant::now()));
        record
    }
}

impl<F: FileSystem> Sampler for NetworkSampler<F> {
    fn name(&self) -> &'static str {
        "network"
    }

    fn sample(&mut self) -> Result<String, SampleError> {
        let path = format!("{}/net/dev", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        let curr = parse_net_dev(&content)?;
        let elapsed = self
            .prev
            .map(|(_, at)| at.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let record = self.advance(curr, elapsed);
        Ok(serde_json::to_string(&record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockFs;

    fn totals(rx: u64, tx: u64) -> NetTotals {
        NetTotals {
            rx_bytes: rx,
            tx_bytes: tx,
        }
    }

    #[test]
    fn first_sample_is_baseline_with_zero_rates() {
        let mut sampler = NetworkSampler::new(MockFs::new(), "/proc");
        let record = sampler.advance(totals(1000, 2000), 0.0);

        assert!(record.baseline);
        assert_eq!(record.rx_bytes_per_sec, 0);
        assert_eq!(record.tx_bytes_per_sec, 0);
    }

    #[test]
    fn second_sample_reports_rates() {
        let mut sampler = NetworkSampler::new(MockFs::new(), "/proc");
        sampler.advance(totals(1000, 2000), 0.0);
        let record = sampler.advance(totals(5000, 8000), 2.0);

        assert!(!record.baseline);
        assert_eq!(record.rx_bytes_per_sec, 2000);
        assert_eq!(record.tx_bytes_per_sec, 3000);
    }

    #[test]
    fn counter_reset_reports_zero_not_garbage() {
        let mut sampler = NetworkSampler::new(MockFs::new(), "/proc");
        sampler.advance(totals(5000, 5000), 0.0);
        let record = sampler.advance(totals(100, 100), 1.0);

        assert_eq!(record.rx_bytes_per_sec, 0);
        assert_eq!(record.tx_bytes_per_sec, 0);
    }

    #[test]
    fn sample_reads_net_dev() {
        let mut fs = MockFs::new();
        fs.add_file(
            "/proc/net/dev",
            "Inter-| Receive |Transmit\n\
             face |bytes packets errs drop fifo frame compressed multicast|bytes packets errs drop fifo colls carrier compressed\n\
             lo: 9 9 0 0 0 0 0 0 9 9 0 0 0 0 0 0\n\
             eth0: 100 1 0 0 0 0 0 0 200 1 0 0 0 0 0 0\n",
        );

        let mut sampler = NetworkSampler::new(fs, "/proc");
        let json = sampler.sample().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["baseline"], true);
        assert_eq!(parsed["rx_bytes_per_sec"], 0);
    }
}
