/// Transport trait abstraction shared by the socket and queue realizations.

use crate::error::Result;

/// What happened to a line handed to [`Transport::send_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The line reached the peer (or the peer's receive buffer).
    Delivered,
    /// Nothing was sent; the payload was empty.
    Skipped,
}

/// A duplex, ordered channel of text lines between exactly two peers.
///
/// Implementations never reorder, duplicate or drop lines within one
/// direction. Both calls block: `send_line` until the line is handed off,
/// `recv_line` until a line is available.
pub trait Transport: Send + Sync {
    /// Send one line to the peer. The line must not contain a newline.
    fn send_line(&self, line: &str) -> Result<SendOutcome>;

    /// Receive the next line from the peer (blocking).
    ///
    /// Returns `Ok(None)` once the peer has closed its side.
    fn recv_line(&self) -> Result<Option<String>>;

    /// Release the underlying resources. Calling it more than once is a no-op.
    fn close(&self) -> Result<()>;

    /// Human-readable description used in logs.
    fn description(&self) -> String;
}
