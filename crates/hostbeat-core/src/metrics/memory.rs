//! Memory usage sampler.
//!
//! Every sample is a complete instantaneous snapshot of `/proc/meminfo`;
//! there is no baseline concept.

use std::path::Path;

use serde::Serialize;

use crate::metrics::parser::{MemCounters, parse_meminfo};
use crate::metrics::{SampleError, Sampler, round2};
use crate::traits::FileSystem;

/// Wire record for one memory sample.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRecord {
    pub used_percent: f64,
    pub used_gb: f64,
    pub total_gb: f64,
    pub available_gb: f64,
    pub swap_used_percent: f64,
    pub swap_used_gb: f64,
    pub swap_total_gb: f64,
}

impl MemoryRecord {
    fn from_counters(mem: MemCounters) -> Self {
        let used_kb = mem.total_kb.saturating_sub(mem.available_kb);
        let swap_used_kb = mem.swap_total_kb.saturating_sub(mem.swap_free_kb);

        let used_percent = if mem.total_kb == 0 {
            0.0
        } else {
            used_kb as f64 / mem.total_kb as f64 * 100.0
        };
        let swap_used_percent = if mem.swap_total_kb == 0 {
            0.0
        } else {
            swap_used_kb as f64 / mem.swap_total_kb as f64 * 100.0
        };

        Self {
            used_percent: round2(used_percent),
            used_gb: round2(kb_to_gb(used_kb)),
            total_gb: round2(kb_to_gb(mem.total_kb)),
            available_gb: round2(kb_to_gb(mem.available_kb)),
            swap_used_percent: round2(swap_used_percent),
            swap_used_gb: round2(kb_to_gb(swap_used_kb)),
            swap_total_gb: round2(kb_to_gb(mem.swap_total_kb)),
        }
    }
}

fn kb_to_gb(kb: u64) -> f64 {
    kb as f64 / 1024.0 / 1024.0
}

/// Samples memory usage from `/proc/meminfo`.
pub struct MemorySampler<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> MemorySampler<F> {
    /// Creates a sampler reading from `<proc_path>/meminfo`.
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }
}

impl<F: FileSystem> Sampler for MemorySampler<F> {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn sample(&mut self) -> Result<String, SampleError> {
        let path = format!("{}/meminfo", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        let mem = parse_meminfo(&content)?;
        Ok(serde_json::to_string(&MemoryRecord::from_counters(mem))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockFs;

    #[test]
    fn snapshot_math() {
        let mem = MemCounters {
            total_kb: 16 * 1024 * 1024,     // 16 GB
            available_kb: 12 * 1024 * 1024, // 12 GB
            swap_total_kb: 4 * 1024 * 1024, // 4 GB
            swap_free_kb: 3 * 1024 * 1024,  // 3 GB
        };
        let record = MemoryRecord::from_counters(mem);

        assert_eq!(record.total_gb, 16.0);
        assert_eq!(record.used_gb, 4.0);
        assert_eq!(record.available_gb, 12.0);
        assert_eq!(record.used_percent, 25.0);
        assert_eq!(record.swap_total_gb, 4.0);
        assert_eq!(record.swap_used_gb, 1.0);
        assert_eq!(record.swap_used_percent, 25.0);
    }

    #[test]
    fn zero_totals_avoid_division() {
        let record = MemoryRecord::from_counters(MemCounters::default());
        assert_eq!(record.used_percent, 0.0);
        assert_eq!(record.swap_used_percent, 0.0);
    }

    #[test]
    fn sample_reads_meminfo() {
        let mut fs = MockFs::new();
        fs.add_file(
            "/proc/meminfo",
            "MemTotal: 2097152 kB\nMemAvailable: 1048576 kB\nSwapTotal: 0 kB\nSwapFree: 0 kB\n",
        );

        let mut sampler = MemorySampler::new(fs, "/proc");
        let json = sampler.sample().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["total_gb"], 2.0);
        assert_eq!(parsed["used_percent"], 50.0);
        assert_eq!(parsed["swap_used_percent"], 0.0);
    }

    #[test]
    fn missing_meminfo_is_an_error() {
        let mut sampler = MemorySampler::new(MockFs::new(), "/proc");
        assert!(matches!(sampler.sample(), Err(SampleError::Io(_))));
    }
}
