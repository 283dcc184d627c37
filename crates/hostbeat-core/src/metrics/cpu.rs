//! CPU usage sampler.
//!
//! Reads the aggregate counter line of `/proc/stat` and reports usage as the
//! non-idle share of the counter delta since the previous sample. The first
//! sample only seeds the delta and is flagged as baseline.

use std::path::Path;

use serde::Serialize;

use crate::metrics::parser::{CpuCounters, parse_cpu_stat};
use crate::metrics::{SampleError, Sampler, round2};
use crate::traits::FileSystem;

/// Wire record for one CPU sample.
#[derive(Debug, Clone, Serialize)]
pub struct CpuRecord {
    pub cpu_percent: f64,
    pub total: u64,
    pub idle: u64,
    pub baseline: bool,
}

/// Samples CPU usage from `/proc/stat`.
pub struct CpuSampler<F: FileSystem> {
    fs: F,
    proc_path: String,
    prev: Option<CpuCounters>,
}

impl<F: FileSystem> CpuSampler<F> {
    /// Creates a sampler reading from `<proc_path>/stat`.
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            prev: None,
        }
    }

    /// Folds the current counters into the sampler state and produces the
    /// record. Usage is `(Δtotal − Δidle) / Δtotal`, zero when the counters
    /// did not advance.
    fn advance(&mut self, curr: CpuCounters) -> CpuRecord {
        let record = match self.prev {
            None => CpuRecord {
                cpu_percent: 0.0,
                total: curr.total(),
                idle: curr.idle_total(),
                baseline: true,
            },
            Some(prev) => {
                let delta_total = curr.total().saturating_sub(prev.total());
                let delta_idle = curr.idle_total().saturating_sub(prev.idle_total());
                let cpu_percent = if delta_total == 0 {
                    0.0
                } else {
                    let busy = delta_total.saturating_sub(delta_idle);
                    round2(busy as f64 / delta_total as f64 * 100.0)
                };
                CpuRecord {
                    cpu_percent,
                    total: curr.total(),
                    idle: curr.idle_total(),
                    baseline: false,
                }
            }
        };
        self.prev = Some(curr);
        record
    }
}

impl<F: FileSystem> Sampler for CpuSampler<F> {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn sample(&mut self) -> Result<String, SampleError> {
        let path = format!("{}/stat", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        let curr = parse_cpu_stat(&content)?;
        let record = self.advance(curr);
        Ok(serde_json::to_string(&record)?)
    }
}
