/// In-memory transport over two rendezvous channels, one per direction.

use std::sync::Mutex;

use crossbeam_channel::{bounded, Receiver, Sender};

use super::channel::{SendOutcome, Transport};
use super::lock;
use crate::error::{ExchangeError, Result};

/// One endpoint of a queue pair.
///
/// Each direction is a zero-capacity channel: `send_line` returns only after
/// the other endpoint has taken the line, so at most one message is ever in
/// flight per direction.
pub struct QueueTransport {
    name: String,
    outbox: Mutex<Option<Sender<String>>>,
    inbox: Mutex<Option<Receiver<String>>>,
}

impl QueueTransport {
    /// Create two connected endpoints. `a`'s outbox is `b`'s inbox and vice versa.
    pub fn pair(a: &str, b: &str) -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = bounded(0);
        let (b_to_a_tx, b_to_a_rx) = bounded(0);

        (
            Self::new(a, a_to_b_tx, b_to_a_rx),
            Self::new(b, b_to_a_tx, a_to_b_rx),
        )
    }

    fn new(name: &str, outbox: Sender<String>, inbox: Receiver<String>) -> Self {
        Self {
            name: name.to_string(),
            outbox: Mutex::new(Some(outbox)),
            inbox: Mutex::new(Some(inbox)),
        }
    }
}

fn closed_error() -> ExchangeError {
    ExchangeError::Transport(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "queue endpoint already closed",
    ))
}

impl Transport for QueueTransport {
    fn send_line(&self, line: &str) -> Result<SendOutcome> {
        if line.is_empty() {
            tracing::debug!(endpoint = %self.name, "Empty payload, skip sending");
            return Ok(SendOutcome::Skipped);
        }

        let outbox = lock(&self.outbox);
        let sender = outbox.as_ref().ok_or_else(closed_error)?;
        sender.send(line.to_string()).map_err(|_| {
            ExchangeError::Transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("{}: receiving endpoint was dropped", self.name),
            ))
        })?;

        Ok(SendOutcome::Delivered)
    }

    fn recv_line(&self) -> Result<Option<String>> {
        let inbox = lock(&self.inbox);
        let receiver = inbox.as_ref().ok_or_else(closed_error)?;
        // Disconnection means every sender is gone: the peer has closed.
        Ok(receiver.recv().ok())
    }

    fn close(&self) -> Result<()> {
        lock(&self.outbox).take();
        lock(&self.inbox).take();
        Ok(())
    }

    fn description(&self) -> String {
        format!("queue endpoint {}", self.name)
    }
}
