//! Incremental file tailer with rotation detection and partial-line
//! buffering.
//!
//! Tracks one log file across polling cycles: a byte cursor marks how far the
//! file has been consumed, complete lines are split off as they arrive, and a
//! partial trailing line is carried over to the next poll. Rotation is
//! detected by the file shrinking below the cursor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Bytes read from the file per read call.
const READ_CHUNK: usize = 4096;

/// Tails a single log file, surfacing complete lines as they are appended.
///
/// Lifecycle: `CLOSED -> OPEN` on a successful `try_open`, back to `CLOSED`
/// on rotation or close. The first open seeks to end-of-file so only new
/// lines surface; every later open starts from offset zero.
pub struct LogTailer {
    path: PathBuf,
    service: String,
    file: Option<File>,
    offset: u64,
    pending: Vec<u8>,
    opened_before: bool,
}

impl LogTailer {
    /// Creates a closed tailer for `path`, tagged with `service`.
    pub fn new(path: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
            file: None,
            offset: 0,
            pending: Vec::new(),
            opened_before: false,
        }
    }

    /// Returns the tailed file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the service tag attached to lines from this file.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns `true` while holding an open handle.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Opens (or reopens) the file.
    ///
    /// The very first successful open positions the cursor at end-of-file;
    /// later opens (after rotation or a missing-file retry) start at zero.
    pub fn try_open(&mut self) -> io::Result<()> {
        let file = File::open(&self.path)?;
        self.offset = if self.opened_before {
            0
        } else {
            file.metadata()?.len()
        };
        self.opened_before = true;
        self.file = Some(file);
        Ok(())
    }

    /// Closes the handle, keeping the cursor and partial-line buffer.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Detects truncation/rotation: if the stored cursor exceeds the file's
    /// current size, the handle is closed and reopened from offset zero.
    ///
    /// A missing file is left alone; the open handle still reads whatever
    /// the writer appends until reopen succeeds elsewhere.
    pub fn check_rotation(&mut self) {
        if self.file.is_none() {
            return;
        }
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return;
        };
        if self.offset > meta.len() {
            self.close();
            self.pending.clear();
            let _ = self.try_open();
        }
    }

    /// Reads everything appended since the last poll and returns the
    /// complete lines found.
    ///
    /// Reads in fixed-size chunks until no more data is pending, never
    /// blocking. On error the cursor and partial-line buffer are left
    /// unchanged for the next attempt.
    pub fn poll(&mut self) -> io::Result<Vec<String>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        file.seek(SeekFrom::Start(self.offset))?;

        let mut fresh: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => fresh.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        // Only a clean read commits the cursor and buffer.
        self.offset += fresh.len() as u64;
        self.pending.extend_from_slice(&fresh);
        Ok(self.split_complete_lines())
    }

    /// Splits every complete line off the partial buffer and compacts it,
    /// leaving any unterminated tail in place.
    fn split_complete_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        for i in 0..self.pending.len() {
            if self.pending[i] == b'\n' {
                let line = String::from_utf8_lossy(&self.pending[start..i]).into_owned();
                lines.push(line);
                start = i + 1;
            }
        }
        if start > 0 {
            self.pending.drain(..start);
        }
        lines
    }
}
