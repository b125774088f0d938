/// Peer roles and the payload convention used by the exchange.
///
/// The transports treat lines as opaque; only this module knows how the
/// next payload is derived from the previous one.

use std::fmt;

/// Which side of the exchange a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends the first message unprompted, then only replies.
    Initiator,
    /// Only ever replies to received messages.
    Responder,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }

    /// Whether this role opens the exchange.
    pub fn sends_first(self) -> bool {
        matches!(self, Role::Initiator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The Initiator's opening payload: `"<initial> 0"`.
pub fn initial_payload(initial_message: &str) -> String {
    reply_payload(initial_message, 0)
}

/// The reply to `received` after `received_count` messages have arrived.
pub fn reply_payload(received: &str, received_count: u32) -> String {
    format!("{} {}", received, received_count)
}
