/// Peer lifecycle states.
///
/// ```text
///  Created ──run──▶ AwaitingTransport ──transport ready──▶ Running
///     │                     │                                │
///     └─────────────────────┴──────── error / done ──────────┴──▶ Stopped
/// ```
///
/// `Stopped` is terminal; a peer runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Constructed with its fixed parameters; nothing has happened yet.
    Created,
    /// Waiting for the transport to be established (connect or accept).
    AwaitingTransport,
    /// Exchanging messages.
    Running,
    /// Loop exited, normally or on error. Resources released.
    Stopped,
}

impl PeerState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: PeerState) -> bool {
        use PeerState::*;
        matches!(
            (self, next),
            (Created, AwaitingTransport)
                | (AwaitingTransport, Running)
                | (Created, Stopped)
                | (AwaitingTransport, Stopped)
                | (Running, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == PeerState::Stopped
    }
}
