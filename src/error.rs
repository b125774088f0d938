/// Error taxonomy shared by the transports, peers and coordinator.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Invalid parameters; raised before any peer loop starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The connector exhausted its retry window without reaching the listener.
    #[error("timed out connecting to {addr} after {waited:?}")]
    ConnectionTimeout { addr: String, waited: Duration },

    /// Any other read, write, bind, accept or connect failure.
    #[error("transport I/O error: {0}")]
    Transport(#[from] std::io::Error),

    /// The remote side went away before this peer reached its stop condition.
    #[error("{peer} disconnected after {received} of {expected} messages")]
    Disconnected {
        peer: String,
        received: u32,
        expected: u32,
    },

    /// Closing a connection or stream failed during cleanup.
    #[error("failed to release transport resources: {0}")]
    ResourceRelease(String),

    /// A peer thread panicked before handing back its result.
    #[error("peer thread {0} panicked")]
    PeerPanicked(String),
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
