//! Non-blocking named-pipe (FIFO) channel endpoints.
//!
//! A `FifoChannel` is one end of a local point-to-point byte transport with
//! best-effort delivery: writes never block the producer, a missing consumer
//! drops data instead of stalling, and a broken endpoint reconnects lazily on
//! a throttled cadence.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

/// Minimum interval between reconnect attempts for an unconnected endpoint.
/// Avoids busy-looping on ENXIO-class errors while a consumer is absent.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum bytes consumed by a single bounded read.
const READ_BUF: usize = 512;

/// Outcome of a non-blocking channel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The pipe accepted this many bytes (may be fewer than offered).
    Sent(usize),
    /// The pipe is full; retry the unsent remainder later.
    Busy,
    /// No connected transport; nothing was written.
    Disconnected,
}

/// A single-writer, single-reader FIFO endpoint with lazy reconnect.
///
/// A closed endpoint is always represented as `fd: None`, never a stale
/// descriptor. All operations on a closed endpoint are no-ops.
pub struct FifoChannel {
    path: PathBuf,
    fd: Option<OwnedFd>,
    last_attempt: Option<Instant>,
    read_pending: Vec<u8>,
}

impl FifoChannel {
    /// Creates an unconnected endpoint for the FIFO at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fd: None,
            last_attempt: None,
            read_pending: Vec::new(),
        }
    }

    /// Returns the FIFO path this endpoint targets.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the endpoint currently holds an open descriptor.
    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    /// Creates the FIFO (and its parent directory) if it does not exist.
    ///
    /// Errors if the path exists but is not a FIFO, or if provisioning fails.
    pub fn provision(&self) -> io::Result<()> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => {
                if meta.file_type().is_fifo() {
                    return Ok(());
                }
                Err(io::Error::other(format!(
                    "{} exists but is not a FIFO",
                    self.path.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                mkfifo(&self.path, 0o644)
            }
            Err(e) => Err(e),
        }
    }

    /// Opens the FIFO non-blockingly, provisioning it first if needed.
    ///
    /// Idempotent: returns `true` immediately when already connected.
    /// A failed attempt leaves the endpoint unconnected and throttles the
    /// next attempt to at most one per `RECONNECT_INTERVAL`.
    pub fn ensure_open(&mut self) -> bool {
        if self.fd.is_some() {
            return true;
        }

        if let Some(last) = self.last_attempt
            && last.elapsed() < RECONNECT_INTERVAL
        {
            return false;
        }
        self.last_attempt = Some(Instant::now());

        match self.try_open() {
            Ok(fd) => {
                self.fd = Some(fd);
                true
            }
            Err(e) => {
                debug!("channel {}: open failed: {}", self.path.display(), e);
                false
            }
        }
    }

    fn try_open(&self) -> io::Result<OwnedFd> {
        self.provision()?;

        let c_path = CString::new(self.path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;

        // O_RDWR so opening never blocks or fails on a missing peer.
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd is a freshly opened, valid descriptor we own.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Writes as many bytes as the pipe will take, without blocking.
    ///
    /// A would-block result pauses draining (`Busy`); any other write failure
    /// force-closes the endpoint so the next `ensure_open` reconnects fresh.
    pub fn write(&mut self, bytes: &[u8]) -> WriteOutcome {
        let Some(fd) = &self.fd else {
            return WriteOutcome::Disconnected;
        };
        if bytes.is_empty() {
            return WriteOutcome::Sent(0);
        }

        let n = unsafe { libc::write(fd.as_raw_fd(), bytes.as_ptr().cast(), bytes.len()) };
        if n >= 0 {
            return WriteOutcome::Sent(n as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return WriteOutcome::Busy;
        }

        debug!("channel {}: write failed: {}", self.path.display(), err);
        self.force_close();
        WriteOutcome::Disconnected
    }

    /// Waits up to `timeout` for a complete line and returns it with the
    /// trailing newline stripped, or `None` on timeout, disconnection, or
    /// empty read.
    ///
    /// Every byte read from the pipe is retained: data past the first
    /// newline is served to subsequent calls without touching the fd again,
    /// and an unterminated tail stays buffered until its newline arrives.
    pub fn read_line_timeout(&mut self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_buffered_line() {
                return Some(line);
            }
            let fd = self.fd.as_ref()?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut pfd = libc::pollfd {
                fd: fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let timeout_ms = remaining.as_millis().min(i32::MAX as u128) as i32;
            let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ready <= 0 || pfd.revents & libc::POLLIN == 0 {
                return None;
            }

            let mut buf = [0u8; READ_BUF];
            let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if n <= 0 {
                return None;
            }
            self.read_pending.extend_from_slice(&buf[..n as usize]);
        }
    }

    /// Splits the first complete line off the read-side residue buffer.
    fn take_buffered_line(&mut self) -> Option<String> {
        let i = self.read_pending.iter().position(|&b| b == b'\n')?;
        let line = String::from_utf8_lossy(&self.read_pending[..i]).into_owned();
        self.read_pending.drain(..=i);
        Some(line)
    }

    /// Drops the descriptor, putting the endpoint back in the unconnected
    /// state. The next `ensure_open` attempts a fresh connection. Read-side
    /// residue belongs to the dropped connection and is discarded with it.
    pub fn force_close(&mut self) {
        self.fd = None;
        self.read_pending.clear();
    }

    /// Forgets the last reconnect attempt so tests can retry immediately.
    #[cfg(test)]
    pub(crate) fn reset_throttle(&mut self) {
        self.last_attempt = None;
    }
}

fn mkfifo(path: &Path, mode: libc::mode_t) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_creates_fifo_and_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("test.fifo");

        let channel = FifoChannel::new(&path);
        channel.provision().unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());

        // Idempotent
        channel.provision().unwrap();
    }

    #[test]
    fn provision_rejects_non_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regular.txt");
        std::fs::write(&path, "not a fifo").unwrap();

        let channel = FifoChannel::new(&path);
        assert!(channel.provision().is_err());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = FifoChannel::new(dir.path().join("rt.fifo"));

        assert!(channel.ensure_open());
        assert_eq!(
            channel.write(b"{\"a\":1}\n"),
            WriteOutcome::Sent(8)
        );

        let line = channel.read_line_timeout(Duration::from_millis(200));
        assert_eq!(line.as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn disconnected_write_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = FifoChannel::new(dir.path().join("closed.fifo"));

        assert_eq!(channel.write(b"dropped"), WriteOutcome::Disconnected);
        assert!(!channel.is_open());
    }

    #[test]
    fn batched_writes_yield_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = FifoChannel::new(dir.path().join("batch.fifo"));
        assert!(channel.ensure_open());

        // Two records land in the pipe before the first read.
        assert_eq!(
            channel.write(b"{\"a\":1}\n{\"b\":2}\n"),
            WriteOutcome::Sent(16)
        );

        let timeout = Duration::from_millis(200);
        assert_eq!(
            channel.read_line_timeout(timeout).as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(
            channel.read_line_timeout(timeout).as_deref(),
            Some("{\"b\":2}")
        );
        assert!(channel.read_line_timeout(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn unterminated_tail_waits_for_its_newline() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = FifoChannel::new(dir.path().join("tail.fifo"));
        assert!(channel.ensure_open());

        assert_eq!(channel.write(b"{\"a\":"), WriteOutcome::Sent(5));
        assert!(channel.read_line_timeout(Duration::from_millis(50)).is_none());

        assert_eq!(channel.write(b"1}\nrest"), WriteOutcome::Sent(7));
        assert_eq!(
            channel.read_line_timeout(Duration::from_millis(200)).as_deref(),
            Some("{\"a\":1}")
        );
    }

    #[test]
    fn read_times_out_on_empty_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = FifoChannel::new(dir.path().join("empty.fifo"));
        assert!(channel.ensure_open());

        let start = Instant::now();
        let line = channel.read_line_timeout(Duration::from_millis(50));
        assert!(line.is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn reconnect_succeeds_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked.fifo");
        std::fs::write(&blocker, "regular file in the way").unwrap();

        let mut channel = FifoChannel::new(&blocker);
        assert!(!channel.ensure_open());
        assert!(!channel.is_open());

        // Replace the blocking file with nothing; after the throttle window
        // a fresh attempt provisions the FIFO.
        std::fs::remove_file(&blocker).unwrap();
        channel.reset_throttle();
        assert!(channel.ensure_open());
        assert!(channel.is_open());
    }
}
