/// A single participant in the exchange and its turn-taking loop.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::comms::channel::{SendOutcome, Transport};
use crate::comms::lock;
use crate::error::{ExchangeError, Result};
use crate::protocol::message::{initial_payload, reply_payload, Role};
use crate::protocol::state::PeerState;

/// Fixed parameters of one peer, set once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Used in logs and stats only.
    pub name: String,
    pub role: Role,
    /// Number of messages this peer sends and receives before stopping.
    pub stop_condition: u32,
    /// Log every message at INFO instead of TRACE.
    pub verbose: bool,
    /// The opening message. Required for the Initiator, ignored otherwise.
    pub initial_message: Option<String>,
}

impl PeerConfig {
    pub fn initiator(name: &str, stop_condition: u32, verbose: bool, initial_message: &str) -> Self {
        Self {
            name: name.to_string(),
            role: Role::Initiator,
            stop_condition,
            verbose,
            initial_message: Some(initial_message.to_string()),
        }
    }

    pub fn responder(name: &str, stop_condition: u32, verbose: bool) -> Self {
        Self {
            name: name.to_string(),
            role: Role::Responder,
            stop_condition,
            verbose,
            initial_message: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stop_condition < 1 {
            return Err(ExchangeError::Configuration(format!(
                "stop condition for {} must be at least 1, got {}",
                self.name, self.stop_condition
            )));
        }
        if self.role == Role::Initiator && self.initial_message.is_none() {
            return Err(ExchangeError::Configuration(format!(
                "initiator {} needs an initial message",
                self.name
            )));
        }
        Ok(())
    }
}

/// Final (or in-flight) counters of one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStats {
    pub name: String,
    pub role: Role,
    pub sent: u32,
    pub received: u32,
}

impl fmt::Display for PeerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sent {} messages and received {} messages",
            self.name, self.sent, self.received
        )
    }
}

/// One side of the exchange.
///
/// Counters are only changed by the peer's own send and receive operations,
/// each of which runs under `op_lock` so the I/O and its counter update form
/// one step. Counters can be read from other threads at any time.
pub struct Peer {
    config: PeerConfig,
    state: Mutex<PeerState>,
    op_lock: Mutex<()>,
    sent: AtomicU32,
    received: AtomicU32,
}

impl Peer {
    pub fn new(config: PeerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(PeerState::Created),
            op_lock: Mutex::new(()),
            sent: AtomicU32::new(0),
            received: AtomicU32::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> PeerState {
        *lock(&self.state)
    }

    pub fn sent_count(&self) -> u32 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn received_count(&self) -> u32 {
        self.received.load(Ordering::SeqCst)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> PeerStats {
        PeerStats {
            name: self.config.name.clone(),
            role: self.config.role,
            sent: self.sent_count(),
            received: self.received_count(),
        }
    }

    /// Run the peer to completion.
    ///
    /// `establish` produces the transport (connect, accept, or hand over a
    /// ready queue endpoint). Whatever happens afterwards, the transport is
    /// closed exactly once and the peer ends in [`PeerState::Stopped`]. A
    /// failure to close is logged and never replaces the loop's own result.
    pub fn run<T, F>(&self, establish: F) -> Result<PeerStats>
    where
        T: Transport,
        F: FnOnce() -> Result<T>,
    {
        let span = tracing::info_span!("peer", name = %self.config.name, role = %self.config.role);
        let _enter = span.enter();

        self.transition(PeerState::AwaitingTransport)?;

        let transport = match establish() {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!("Transport setup failed: {}", e);
                self.transition(PeerState::Stopped)?;
                return Err(e);
            }
        };

        self.transition(PeerState::Running)?;
        tracing::info!(transport = %transport.description(), "Transport ready");

        let outcome = self.exchange(&transport);

        if let Err(e) = transport.close() {
            tracing::warn!("Failed to release transport cleanly: {}", e);
        }
        self.transition(PeerState::Stopped)?;

        match &outcome {
            Ok(()) => self.log_event("stopped", None),
            Err(e) => tracing::error!(
                sent = self.sent_count(),
                received = self.received_count(),
                "Stopped on error: {}",
                e
            ),
        }

        outcome.map(|()| self.stats())
    }

    /// The turn-taking loop. A reply is only ever sent after a receive, except
    /// for the Initiator's opening message.
    fn exchange<T: Transport>(&self, transport: &T) -> Result<()> {
        let stop = self.config.stop_condition;

        if self.config.role.sends_first() {
            let initial = self.config.initial_message.as_deref().unwrap_or_default();
            self.send(transport, &initial_payload(initial))?;
        }

        while self.received_count() < stop {
            let (message, received) = self.receive(transport)?;
            if self.sent_count() < stop {
                self.send(transport, &reply_payload(&message, received))?;
            }
            // Otherwise this was the final message, which gets no reply.
        }

        Ok(())
    }

    /// Block for the next message and count it. Returns the message with the
    /// updated received count.
    fn receive<T: Transport>(&self, transport: &T) -> Result<(String, u32)> {
        let _op = lock(&self.op_lock);

        let message = match transport.recv_line()? {
            Some(message) => message,
            None => {
                return Err(ExchangeError::Disconnected {
                    peer: self.config.name.clone(),
                    received: self.received_count(),
                    expected: self.config.stop_condition,
                })
            }
        };

        let received = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        self.log_event("read message", Some(&message));
        Ok((message, received))
    }

    /// Hand one message to the transport and count it if it was delivered.
    fn send<T: Transport>(&self, transport: &T, message: &str) -> Result<SendOutcome> {
        let _op = lock(&self.op_lock);

        let outcome = transport.send_line(message)?;
        match outcome {
            SendOutcome::Delivered => {
                self.sent.fetch_add(1, Ordering::SeqCst);
                self.log_event("sent message", Some(message));
            }
            SendOutcome::Skipped => self.log_event("has no message to send, skip sending", None),
        }
        Ok(outcome)
    }

    fn transition(&self, next: PeerState) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.can_transition_to(next) {
            return Err(ExchangeError::Configuration(format!(
                "peer {} cannot move from {:?} to {:?}; a peer runs only once",
                self.config.name, *state, next
            )));
        }
        tracing::debug!(from = ?*state, to = ?next, "State change");
        *state = next;
        Ok(())
    }

    fn log_event(&self, event: &str, message: Option<&str>) {
        let sent = self.sent_count();
        let received = self.received_count();
        let payload = message.unwrap_or_default();
        if self.config.verbose {
            tracing::info!(sent, received, payload, "{}", event);
        } else {
            tracing::trace!(sent, received, payload, "{}", event);
        }
    }
}
