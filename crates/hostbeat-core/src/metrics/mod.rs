//! System metric samplers and the fan-in aggregator.
//!
//! Four sampler kinds (CPU, memory, disk, network) implement one capability
//! interface: each reads its backing source once per tick and returns a JSON
//! fragment. Rate-based samplers carry their own previous-sample state; the
//! first observation only seeds it and is flagged as baseline.

pub mod aggregator;
pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;
pub mod parser;

use std::io;

pub use aggregator::Aggregator;
pub use cpu::CpuSampler;
pub use disk::DiskSampler;
pub use memory::MemorySampler;
pub use network::NetworkSampler;

/// Error from a single sampling attempt.
///
/// Never fatal: the caller logs it and skips the tick, leaving the sampler's
/// previous state intact.
#[derive(Debug)]
pub enum SampleError {
    /// The backing data source could not be read.
    Io(io::Error),
    /// The data source content was malformed.
    Parse(String),
    /// The external utility was missing or reported failure.
    Unavailable(String),
    /// The record could not be serialized.
    Encode(serde_json::Error),
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::Io(e) => write!(f, "read failed: {e}"),
            SampleError::Parse(msg) => write!(f, "parse failed: {msg}"),
            SampleError::Unavailable(msg) => write!(f, "source unavailable: {msg}"),
            SampleError::Encode(e) => write!(f, "encode failed: {e}"),
        }
    }
}

impl std::error::Error for SampleError {}

impl From<io::Error> for SampleError {
    fn from(e: io::Error) -> Self {
        SampleError::Io(e)
    }
}

impl From<serde_json::Error> for SampleError {
    fn from(e: serde_json::Error) -> Self {
        SampleError::Encode(e)
    }
}

impl From<parser::ParseError> for SampleError {
    fn from(e: parser::ParseError) -> Self {
        SampleError::Parse(e.message)
    }
}

/// A periodic metric producer.
///
/// `sample()` reads the backing source once, updates internal state, and
/// returns the metric's JSON object (no trailing newline). Expected absence
/// of data is reported as an error result, never a panic.
pub trait Sampler: Send {
    /// Stable name, used as the field key in the aggregate envelope.
    fn name(&self) -> &'static str;

    /// Takes one sample.
    fn sample(&mut self) -> Result<String, SampleError>;
}

/// Rounds to two decimal places, matching the wire format's precision.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
