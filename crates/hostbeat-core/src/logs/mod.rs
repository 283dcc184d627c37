//! Log collection pipeline.
//!
//! Tails a fixed set of log files, encodes each new line as a JSON record,
//! and delivers the records through a bounded output buffer into a
//! non-blocking FIFO channel. A slow or absent consumer never blocks the
//! tailers; the buffer bounds memory growth while the channel is down.

pub mod record;
pub mod tailer;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::buffer::{MAX_OUTBUF, OutBuffer};
use crate::channel::FifoChannel;
use crate::sleep_interruptible;

use record::LogRecord;
use tailer::LogTailer;

/// One log file to tail and the service tag to stamp its lines with.
#[derive(Debug, Clone)]
pub struct LogSourceSpec {
    pub path: PathBuf,
    pub service: String,
}

impl LogSourceSpec {
    pub fn new(path: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
        }
    }
}

/// Tails all configured sources and publishes encoded lines to one channel.
pub struct LogPipeline {
    sources: Vec<LogTailer>,
    out: OutBuffer,
    channel: FifoChannel,
    host: String,
}

impl LogPipeline {
    /// Creates the pipeline for `specs`, publishing to the FIFO at
    /// `channel_path`. No file or channel is opened yet.
    pub fn new(specs: Vec<LogSourceSpec>, channel_path: impl Into<PathBuf>) -> Self {
        let sources = specs
            .into_iter()
            .map(|s| LogTailer::new(s.path, s.service))
            .collect();
        Self {
            sources,
            out: OutBuffer::new(MAX_OUTBUF),
            channel: FifoChannel::new(channel_path),
            host: record::hostname(),
        }
    }

    /// Runs the polling loop until the stop flag clears.
    ///
    /// Provisioning the channel FIFO must succeed before the loop starts;
    /// that failure is escalated to the caller. Everything after that is
    /// contained per tick and per source.
    pub fn run(&mut self, running: &AtomicBool, interval: Duration) -> std::io::Result<()> {
        self.channel.provision()?;
        self.channel.ensure_open();

        // Missing files are retried each tick; a failed initial open is not
        // fatal to the pipeline.
        for src in &mut self.sources {
            if let Err(e) = src.try_open() {
                warn!("log source {}: open failed: {}", src.path().display(), e);
            }
        }

        info!("log pipeline started ({} sources)", self.sources.len());

        while running.load(Ordering::SeqCst) {
            self.tick();
            sleep_interruptible(interval, running);
        }

        info!("log pipeline stopped");
        self.channel.force_close();
        for src in &mut self.sources {
            src.close();
        }
        Ok(())
    }

    /// One polling cycle over every source, finishing with a buffer flush.
    pub fn tick(&mut self) {
        self.channel.ensure_open();

        for src in &mut self.sources {
            if !src.is_open() {
                if src.try_open().is_err() {
                    continue;
                }
                debug!("log source {}: opened", src.path().display());
            }

            src.check_rotation();

            match src.poll() {
                Ok(lines) => {
                    for line in lines {
                        Self::handle_line(
                            &mut self.out,
                            &mut self.channel,
                            &self.host,
                            src.service(),
                            &line,
                        );
                    }
                }
                Err(e) => {
                    // Contained: this source's cursor and buffer are intact
                    // for the next tick; other sources proceed.
                    warn!("log source {}: poll failed: {}", src.path().display(), e);
                }
            }
        }

        self.out.flush(&mut self.channel);
    }

    /// Encodes one line and pushes it toward the channel.
    ///
    /// Drains already-buffered data first so ordering is preserved, then
    /// appends the new record and flushes opportunistically. When the buffer
    /// is at capacity the record is dropped, not split.
    fn handle_line(
        out: &mut OutBuffer,
        channel: &mut FifoChannel,
        host: &str,
        service: &str,
        line: &str,
    ) {
        let record = LogRecord::from_line(service, host, line);
        let json = match record.to_json_line() {
            Ok(json) => json,
            Err(e) => {
                warn!("log record encoding failed: {}", e);
                return;
            }
        };

        if channel.ensure_open() {
            out.flush(channel);
        }

        if !out.append(json.as_bytes()) {
            debug!("log record from {} dropped: output buffer full", service);
            return;
        }

        out.flush(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spec(path: &std::path::Path, service: &str) -> LogSourceSpec {
        LogSourceSpec {
            path: path.to_path_buf(),
            service: service.to_string(),
        }
    }

    #[test]
    fn tick_delivers_encoded_lines_to_channel() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("app.log");
        std::fs::write(&log_path, "old\n").unwrap();

        let mut pipeline = LogPipeline::new(
            vec![spec(&log_path, "node")],
            dir.path().join("logs.fifo"),
        );
        pipeline.channel.provision().unwrap();
        assert!(pipeline.channel.ensure_open());
        pipeline.sources[0].try_open().unwrap();

        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap();
        writeln!(f, "ERROR pid=42 something broke").unwrap();
        drop(f);

        pipeline.tick();

        let line = pipeline
            .channel
            .read_line_timeout(Duration::from_millis(200))
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["service"], "node");
        assert_eq!(parsed["level"], "ERROR");
        assert_eq!(parsed["pid"], 42);
        assert_eq!(parsed["message"], "ERROR pid=42 something broke");
    }

    #[test]
    fn missing_source_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.log");
        std::fs::write(&present, "").unwrap();

        let mut pipeline = LogPipeline::new(
            vec![
                spec(&dir.path().join("absent.log"), "ghost"),
                spec(&present, "node"),
            ],
            dir.path().join("logs.fifo"),
        );
        assert!(pipeline.channel.ensure_open());
        pipeline.sources[1].try_open().unwrap();

        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&present)
            .unwrap();
        writeln!(f, "still flowing").unwrap();
        drop(f);

        pipeline.tick();

        let line = pipeline
            .channel
            .read_line_timeout(Duration::from_millis(200))
            .unwrap();
        assert!(line.contains("\"service\":\"node\""));
    }

    #[test]
    fn lines_buffer_while_channel_down() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("app.log");
        std::fs::write(&log_path, "").unwrap();

        // Block the FIFO path with a regular file so the channel cannot open.
        let fifo_path = dir.path().join("logs.fifo");
        std::fs::write(&fifo_path, "in the way").unwrap();

        let mut pipeline =
            LogPipeline::new(vec![spec(&log_path, "node")], &fifo_path);
        pipeline.sources[0].try_open().unwrap();

        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap();
        writeln!(f, "buffered while down").unwrap();
        drop(f);

        pipeline.tick();
        assert!(pipeline.out.pending() > 0);

        // Consumer side comes up: clear the obstruction and reconnect.
        std::fs::remove_file(&fifo_path).unwrap();
        pipeline.channel.reset_throttle();
        pipeline.tick();

        let line = pipeline
            .channel
            .read_line_timeout(Duration::from_millis(200))
            .unwrap();
        assert!(line.contains("buffered while down"));
        assert_eq!(pipeline.out.pending(), 0);
    }
}
