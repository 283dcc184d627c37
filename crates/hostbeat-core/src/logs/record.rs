//! JSON record encoding for tailed log lines.
//!
//! Each raw line becomes one `LogRecord`: a timestamp, the source's service
//! tag, a heuristic severity, the sanitized message, an optional pid pulled
//! out of the line, and the local hostname.

use chrono::Local;
use serde::Serialize;

/// One encoded log line.
///
/// Serialized with serde_json; `pid` is omitted entirely when absent.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub service: String,
    pub level: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub host: String,
}

impl LogRecord {
    /// Builds a record for a raw `line` from `service`, stamped with the
    /// current local time.
    pub fn from_line(service: &str, host: &str, line: &str) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            service: service.to_string(),
            level: detect_level(line),
            message: sanitize(line),
            pid: extract_pid(line),
            host: host.to_string(),
        }
    }

    /// Serializes the record as a newline-terminated JSON line.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Heuristic severity: case-insensitive substring match, ERROR before WARN
/// before INFO, defaulting to UNKNOWN.
pub fn detect_level(line: &str) -> &'static str {
    let lower = line.to_ascii_lowercase();
    if lower.contains("error") {
        "ERROR"
    } else if lower.contains("warn") {
        "WARN"
    } else if lower.contains("info") {
        "INFO"
    } else {
        "UNKNOWN"
    }
}

/// Pulls a pid out of a log line.
///
/// Tries a `pid=` / `pid:` marker followed by a decimal run, then a leading
/// bracketed decimal (`[1234] ...`). Returns `None` when neither matches.
pub fn extract_pid(line: &str) -> Option<u32> {
    for marker in ["pid=", "pid:"] {
        if let Some(idx) = line.find(marker) {
            return parse_decimal_run(&line[idx + marker.len()..]);
        }
    }

    if let Some(rest) = line.strip_prefix('[')
        && let Some(end) = rest.find(']')
        && !rest[..end].is_empty()
        && rest[..end].bytes().all(|b| b.is_ascii_digit())
    {
        return rest[..end].parse().ok();
    }

    None
}

fn parse_decimal_run(s: &str) -> Option<u32> {
    let digits: &str = {
        let end = s
            .as_bytes()
            .iter()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(s.len());
        &s[..end]
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Drops control bytes below 0x20 other than `\n`, `\r` and `\t`.
///
/// The survivors get their two-character escapes from serde_json when the
/// record is serialized, so an emitted message never carries a raw control
/// byte or unescaped `"` / `\`.
pub fn sanitize(line: &str) -> String {
    line.chars()
        .filter(|&c| c >= '\u{20}' || c == '\n' || c == '\r' || c == '\t')
        .collect()
}

/// Best-effort local hostname, "unknown" on failure.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "unknown".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_priority_and_case() {
        assert_eq!(detect_level("connection ERROR on socket"), "ERROR");
        assert_eq!(detect_level("Error: warning suppressed"), "ERROR");
        assert_eq!(detect_level("Warning: disk nearly full"), "WARN");
        assert_eq!(detect_level("info: started"), "INFO");
        assert_eq!(detect_level("something happened"), "UNKNOWN");
    }

    #[test]
    fn pid_from_marker() {
        assert_eq!(extract_pid("worker pid=4312 restarted"), Some(4312));
        assert_eq!(extract_pid("pid:77 ready"), Some(77));
        assert_eq!(extract_pid("pid=oops"), None);
    }

    #[test]
    fn pid_from_leading_bracket() {
        assert_eq!(extract_pid("[1234] starting up"), Some(1234));
        assert_eq!(extract_pid("[12a4] starting up"), None);
        assert_eq!(extract_pid("prefix [1234] not leading"), None);
        assert_eq!(extract_pid("no pid here"), None);
    }

    #[test]
    fn sanitize_drops_raw_control_bytes() {
        let line = "a\x01b\x1fc\td\ne";
        assert_eq!(sanitize(line), "abc\td\ne");
    }

    #[test]
    fn emitted_json_has_no_unescaped_specials() {
        let record = LogRecord::from_line("node", "host1", "say \"hi\"\\ \x02end\tok");
        let json = record.to_json_line().unwrap();

        // Raw control bytes below 0x20 never survive, except the trailing
        // record newline itself.
        let body = json.trim_end_matches('\n');
        assert!(body.bytes().all(|b| b >= 0x20));
        assert!(body.contains("\\\"hi\\\""));
        assert!(body.contains("\\t"));
    }

    #[test]
    fn pid_field_omitted_when_absent() {
        let record = LogRecord::from_line("redis", "host1", "plain message");
        let json = record.to_json_line().unwrap();
        assert!(!json.contains("\"pid\""));

        let record = LogRecord::from_line("redis", "host1", "[99] message");
        let json = record.to_json_line().unwrap();
        assert!(json.contains("\"pid\":99"));
    }

    #[test]
    fn message_round_trips_through_json() {
        let original = "mixed \"quotes\" and \\slashes\\ and\ttabs";
        let record = LogRecord::from_line("mysql", "host1", original);
        let json = record.to_json_line().unwrap();

        let parsed: serde_json::Value = serde_json::from_str(json.trim_end()).unwrap();
        assert_eq!(parsed["message"].as_str().unwrap(), original);
        assert_eq!(parsed["service"], "mysql");
        assert_eq!(parsed["host"], "host1");
    }

    #[test]
    fn timestamp_carries_zone_offset() {
        let record = LogRecord::from_line("node", "h", "x");
        let ts = &record.timestamp;
        // ISO-8601 with a "±HH:MM" offset suffix.
        assert_eq!(ts.as_bytes()[ts.len() - 3], b':');
        let offset_sign = ts.as_bytes()[ts.len() - 6];
        assert!(offset_sign == b'+' || offset_sign == b'-');
        assert!(ts.contains('T'));
    }
}
