/// TCP transport: newline-delimited text lines over a single stream.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::channel::{SendOutcome, Transport};
use super::lock;
use crate::error::{ExchangeError, Result};

/// Default pause between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Default upper bound on the total time spent retrying.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Default cap on one received line, excluding its terminator.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

/// Bounded, fixed-interval retry for the connecting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Open a stream to `addr`, retrying while the listener is not bound yet.
///
/// Only "connection refused" is retried. Every other error aborts at once.
/// Once `policy.max_wait` has elapsed the call fails with
/// [`ExchangeError::ConnectionTimeout`].
pub fn connect_with_retry(addr: &str, policy: &RetryPolicy) -> Result<TcpStream> {
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match TcpStream::connect(addr) {
            Ok(stream) => {
                tracing::info!(addr, attempt, "Connected to peer");
                return Ok(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                let waited = started.elapsed();
                if waited >= policy.max_wait {
                    tracing::warn!(addr, attempt, ?waited, "Giving up on connection");
                    return Err(ExchangeError::ConnectionTimeout {
                        addr: addr.to_string(),
                        waited,
                    });
                }
                let pause = policy.delay.min(policy.max_wait - waited);
                tracing::debug!(addr, attempt, ?pause, "Connection refused, retrying");
                thread::sleep(pause);
            }
            Err(e) => {
                tracing::error!(addr, attempt, "Connection failed: {}", e);
                return Err(e.into());
            }
        }
    }
}

/// A TCP-based transport endpoint.
///
/// Owns the connection, a buffered reader and writer over clones of it, and
/// (on the listening side) the listener it was accepted from. All of them are
/// released together by [`Transport::close`], at most once.
pub struct TcpTransport {
    peer_addr: String,
    max_line_len: usize,
    reader: Mutex<Option<BufReader<TcpStream>>>,
    writer: Mutex<Option<BufWriter<TcpStream>>>,
    stream: Mutex<Option<TcpStream>>,
    listener: Mutex<Option<TcpListener>>,
}

impl TcpTransport {
    /// Connect to a listening peer, retrying per `policy`.
    pub fn connect(addr: &str, policy: &RetryPolicy) -> Result<Self> {
        tracing::info!("Connecting to peer at {}", addr);
        let stream = connect_with_retry(addr, policy)?;
        Self::from_stream(stream, None)
    }

    /// Wrap an established stream. `listener` is kept alive until close.
    pub fn from_stream(stream: TcpStream, listener: Option<TcpListener>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);

        Ok(Self {
            peer_addr,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            stream: Mutex::new(Some(stream)),
            listener: Mutex::new(listener),
        })
    }

    /// Reject received lines longer than `max_line_len` bytes.
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    fn release(&self) -> Vec<String> {
        let mut failures = Vec::new();

        if let Some(mut writer) = lock(&self.writer).take() {
            if let Err(e) = writer.flush() {
                failures.push(format!("flush writer: {}", e));
            }
        }

        lock(&self.reader).take();

        if let Some(stream) = lock(&self.stream).take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                // The peer already tore the connection down.
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => failures.push(format!("shutdown stream: {}", e)),
            }
        }

        if let Some(listener) = lock(&self.listener).take() {
            tracing::debug!(addr = ?listener.local_addr().ok(), "Releasing listener");
        }

        failures
    }
}

fn not_open() -> ExchangeError {
    ExchangeError::Transport(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "TCP transport already closed",
    ))
}

impl Transport for TcpTransport {
    fn send_line(&self, line: &str) -> Result<SendOutcome> {
        if line.contains(['\n', '\r']) {
            return Err(ExchangeError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "message must be a single line",
            )));
        }

        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or_else(not_open)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        Ok(SendOutcome::Delivered)
    }

    fn recv_line(&self) -> Result<Option<String>> {
        let mut guard = lock(&self.reader);
        let reader = guard.as_mut().ok_or_else(not_open)?;

        // Room for the longest allowed line plus "\r\n".
        let budget = self.max_line_len as u64 + 2;
        let mut line = String::new();
        let read = reader.by_ref().take(budget).read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        let unterminated = !line.ends_with('\n') && read as u64 == budget;
        if trimmed > self.max_line_len || unterminated {
            return Err(ExchangeError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line from {} exceeds {} bytes", self.peer_addr, self.max_line_len),
            )));
        }

        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn close(&self) -> Result<()> {
        let failures = self.release();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExchangeError::ResourceRelease(failures.join("; ")))
        }
    }

    fn description(&self) -> String {
        format!("TCP channel to {}", self.peer_addr)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for failure in self.release() {
            tracing::warn!(peer = %self.peer_addr, "Cleanup on drop: {}", failure);
        }
    }
}

/// TCP listener that accepts exactly one peer connection.
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    /// Start listening on the given port on all interfaces.
    pub fn bind(port: u16) -> Result<Self> {
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&addr)?;
        tracing::info!("TCP listener bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept a single connection (blocking). The listener moves into the
    /// returned transport and is released when it closes.
    pub fn accept(self) -> Result<TcpTransport> {
        let (stream, addr) = self.listener.accept()?;
        tracing::info!("Accepted connection from {}", addr);
        TcpTransport::from_stream(stream, Some(self.listener))
    }

    /// Get the local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
