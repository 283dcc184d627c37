//! Parsers for the samplers' backing data sources.
//!
//! Pure functions over string content (`/proc/stat`, `/proc/meminfo`,
//! `/proc/net/dev`, `df -h` output) so they are testable with fixtures.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Cumulative CPU counters from the aggregate `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuCounters {
    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Idle time: idle + iowait.
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_stat(content: &str) -> Result<CpuCounters, ParseError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| ParseError::new("missing aggregate cpu line"))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|s| s.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ParseError::new("invalid cpu counter"))?;

    if fields.len() < 8 {
        return Err(ParseError::new(format!(
            "not enough cpu fields: expected 8, got {}",
            fields.len()
        )));
    }

    Ok(CpuCounters {
        user: fields[0],
        nice: fields[1],
        system: fields[2],
        idle: fields[3],
        iowait: fields[4],
        irq: fields[5],
        softirq: fields[6],
        steal: fields[7],
    })
}

/// Memory counters from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemCounters {
    pub total_kb: u64,
    pub available_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

/// Parses `/proc/meminfo`, requiring all four fields the sampler consumes.
pub fn parse_meminfo(content: &str) -> Result<MemCounters, ParseError> {
    let parse_kb = |line: &str| -> Option<u64> {
        line.split_whitespace().nth(1).and_then(|s| s.parse().ok())
    };

    let mut total = None;
    let mut available = None;
    let mut swap_total = None;
    let mut swap_free = None;

    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            total = parse_kb(line);
        } else if line.starts_with("MemAvailable:") {
            available = parse_kb(line);
        } else if line.starts_with("SwapTotal:") {
            swap_total = parse_kb(line);
        } else if line.starts_with("SwapFree:") {
            swap_free = parse_kb(line);
        }
    }

    match (total, available, swap_total, swap_free) {
        (Some(total_kb), Some(available_kb), Some(swap_total_kb), Some(swap_free_kb)) => {
            Ok(MemCounters {
                total_kb,
                available_kb,
                swap_total_kb,
                swap_free_kb,
            })
        }
        _ => Err(ParseError::new("missing fields in meminfo")),
    }
}

/// Byte totals summed over all non-loopback interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetTotals {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Parses `/proc/net/dev`, summing receive/transmit byte counters across all
/// interfaces except `lo`.
pub fn parse_net_dev(content: &str) -> Result<NetTotals, ParseError> {
    let mut totals = NetTotals::default();
    let mut seen_any = false;

    for line in content.lines() {
        // Header lines carry a '|' separator.
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        let Some((iface, rest)) = line.split_once(':') else {
            continue;
        };
        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 9 {
            continue;
        }

        seen_any = true;
        if iface.trim() == "lo" {
            continue;
        }

        let rx: u64 = values[0].parse().unwrap_or(0);
        let tx: u64 = values[8].parse().unwrap_or(0);
        totals.rx_bytes += rx;
        totals.tx_bytes += tx;
    }

    if !seen_any {
        return Err(ParseError::new("no interface lines in net dev table"));
    }
    Ok(totals)
}

/// Filesystem usage for one mount point, in whole gigabytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_gb: u64,
    pub used_gb: u64,
    pub free_gb: u64,
}

/// Parses `df -h` output for a single mount point.
///
/// Only the second line is trusted (filesystem, size, used, avail, percent,
/// mount); size fields get their trailing unit suffix stripped before
/// numeric conversion, and any fractional part is truncated. The utility's
/// own percentage column is ignored.
pub fn parse_df(output: &str) -> Result<DiskUsage, ParseError> {
    let line = output
        .lines()
        .nth(1)
        .ok_or_else(|| ParseError::new("missing data line in df output"))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(ParseError::new(format!(
            "not enough df fields: expected 6, got {}",
            fields.len()
        )));
    }

    Ok(DiskUsage {
        total_gb: parse_size_field(fields[1]),
        used_gb: parse_size_field(fields[2]),
        free_gb: parse_size_field(fields[3]),
    })
}

/// Strips a trailing unit suffix and converts the leading integer part.
fn parse_size_field(s: &str) -> u64 {
    let s = s.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let end = s
        .as_bytes()
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(s.len());
    s[..end].parse().unwrap_or(0)
}
