//! Disk usage sampler.
//!
//! Shells out to `df -h` for a single mount point and parses the second
//! output line. The used percentage is recomputed from the size fields
//! rather than trusting the utility's own column.

use std::process::Command;

use serde::Serialize;

use crate::metrics::parser::{DiskUsage, parse_df};
use crate::metrics::{SampleError, Sampler, round2};

/// Wire record for one disk sample.
#[derive(Debug, Clone, Serialize)]
pub struct DiskRecord {
    pub used_percent: f64,
    pub used_gb: u64,
    pub total_gb: u64,
    pub free_gb: u64,
}

impl DiskRecord {
    fn from_usage(disk: DiskUsage) -> Self {
        let used_percent = if disk.total_gb == 0 {
            0.0
        } else {
            round2(disk.used_gb as f64 / disk.total_gb as f64 * 100.0)
        };
        Self {
            used_percent,
            used_gb: disk.used_gb,
            total_gb: disk.total_gb,
            free_gb: disk.free_gb,
        }
    }
}

/// Samples filesystem usage for one mount point via `df`.
pub struct DiskSampler {
    mount_point: String,
}

impl DiskSampler {
    /// Creates a sampler for `mount_point`.
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
        }
    }
}

impl Sampler for DiskSampler {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn sample(&mut self) -> Result<String, SampleError> {
        let output = Command::new("df")
            .arg("-h")
            .arg(&self.mount_point)
            .output()?;

        if !output.status.success() {
            return Err(SampleError::Unavailable(format!(
                "df {} exited with {}",
                self.mount_point, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let disk = parse_df(&stdout)?;
        Ok(serde_json::to_string(&DiskRecord::from_usage(disk))?)
    }
}
