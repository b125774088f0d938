/// Exchange coordinator: wires peers to transports, runs them, collects counters.

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use crate::comms::queue::QueueTransport;
use crate::comms::tcp::{RetryPolicy, TcpTransport, TcpTransportListener, DEFAULT_MAX_LINE_LEN};
use crate::error::{ExchangeError, Result};

use super::peer::{Peer, PeerConfig, PeerStats};

pub const INITIATOR_THREAD: &str = "InitiatorThread";
pub const RESPONDER_THREAD: &str = "ResponderThread";
pub const SOCKET_INITIATOR: &str = "SocketInitiator";
pub const SOCKET_RESPONDER: &str = "SocketResponder";

/// Validated parameters handed to the core, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    pub stop_condition: u32,
    pub verbose: bool,
    pub initial_message: String,
    /// Host the initiator connects to (socket runs only).
    pub host: String,
    /// Port to listen on or connect to (socket runs only). 0 lets the OS pick
    /// when the listener and connector run in the same process.
    pub port: u16,
    pub retry: RetryPolicy,
    /// Longest line accepted from a socket peer, excluding the terminator.
    pub max_line_len: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            stop_condition: 20,
            verbose: true,
            initial_message: "Hi".to_string(),
            host: "localhost".to_string(),
            port: 8081,
            retry: RetryPolicy::default(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl ExchangeConfig {
    fn initiator(&self, name: &str) -> PeerConfig {
        PeerConfig::initiator(name, self.stop_condition, self.verbose, &self.initial_message)
    }

    fn responder(&self, name: &str) -> PeerConfig {
        PeerConfig::responder(name, self.stop_condition, self.verbose)
    }

    fn connect_addr(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }
}

/// Final counters of both peers of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    pub initiator: PeerStats,
    pub responder: PeerStats,
}

impl ExchangeReport {
    /// Both peers sent and received exactly `stop_condition` messages.
    pub fn is_complete(&self, stop_condition: u32) -> bool {
        [&self.initiator, &self.responder]
            .iter()
            .all(|s| s.sent == stop_condition && s.received == stop_condition)
    }
}

impl fmt::Display for ExchangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.initiator)?;
        write!(f, "{}", self.responder)
    }
}

/// Run both peers as threads in this process over a queue pair.
pub fn run_threaded(config: &ExchangeConfig) -> Result<ExchangeReport> {
    let initiator = Peer::new(config.initiator(INITIATOR_THREAD))?;
    let responder = Peer::new(config.responder(RESPONDER_THREAD))?;
    let (initiator_end, responder_end) = QueueTransport::pair(INITIATOR_THREAD, RESPONDER_THREAD);

    tracing::info!(
        stop_condition = config.stop_condition,
        initial_message = %config.initial_message,
        "Starting threaded exchange"
    );

    run_pair(
        &initiator,
        move || Ok(initiator_end),
        &responder,
        move || Ok(responder_end),
    )
}

/// Host the Responder in this process: listen on `config.port`, accept one
/// connection and reply until the stop condition is met.
pub fn run_socket_responder(config: &ExchangeConfig) -> Result<PeerStats> {
    let peer = Peer::new(config.responder(SOCKET_RESPONDER))?;
    let port = config.port;
    let limit = config.max_line_len;
    peer.run(move || {
        let transport = TcpTransportListener::bind(port)?.accept()?;
        Ok(transport.with_max_line_len(limit))
    })
}

/// Host the Responder on a listener that is already bound.
pub fn run_socket_responder_on(
    config: &ExchangeConfig,
    listener: TcpTransportListener,
) -> Result<PeerStats> {
    let peer = Peer::new(config.responder(SOCKET_RESPONDER))?;
    let limit = config.max_line_len;
    peer.run(move || Ok(listener.accept()?.with_max_line_len(limit)))
}

/// Host the Initiator in this process: connect to `config.host:config.port`
/// with bounded retry and open the exchange.
pub fn run_socket_initiator(config: &ExchangeConfig) -> Result<PeerStats> {
    let peer = Peer::new(config.initiator(SOCKET_INITIATOR))?;
    let addr = config.connect_addr(config.port);
    let retry = config.retry;
    let limit = config.max_line_len;
    peer.run(move || Ok(TcpTransport::connect(&addr, &retry)?.with_max_line_len(limit)))
}

/// Harness running both socket peers in this process and merging their
/// counters. The listener is bound before either peer starts.
///
/// If the initiator cannot connect, the responder is still parked in
/// `accept`; a loopback connection releases it so both threads can be joined
/// and the initiator's error returned.
pub fn run_socket_pair(config: &ExchangeConfig) -> Result<ExchangeReport> {
    let initiator = Peer::new(config.initiator(SOCKET_INITIATOR))?;
    let responder = Peer::new(config.responder(SOCKET_RESPONDER))?;

    let listener = TcpTransportListener::bind(config.port)?;
    let port = listener.local_addr()?.port();
    let addr = config.connect_addr(port);
    let retry = config.retry;
    let limit = config.max_line_len;

    tracing::info!(port, stop_condition = config.stop_condition, "Starting socket pair exchange");

    run_pair(
        &initiator,
        move || match TcpTransport::connect(&addr, &retry) {
            Ok(transport) => Ok(transport.with_max_line_len(limit)),
            Err(e) => {
                wake_listener(port);
                Err(e)
            }
        },
        &responder,
        move || Ok(listener.accept()?.with_max_line_len(limit)),
    )
}

/// Connect to our own listener and hang up at once, so a blocked `accept`
/// returns and its peer sees the connection close.
fn wake_listener(port: u16) {
    let local = SocketAddr::from(([127, 0, 0, 1], port));
    match TcpStream::connect_timeout(&local, Duration::from_secs(1)) {
        Ok(stream) => drop(stream),
        Err(e) => tracing::warn!(port, "Could not release waiting listener: {}", e),
    }
}

/// Start both peers on their own threads and wait for both to stop.
fn run_pair<TI, FI, TR, FR>(
    initiator: &Peer,
    establish_initiator: FI,
    responder: &Peer,
    establish_responder: FR,
) -> Result<ExchangeReport>
where
    TI: crate::comms::Transport,
    FI: FnOnce() -> Result<TI> + Send,
    TR: crate::comms::Transport,
    FR: FnOnce() -> Result<TR> + Send,
{
    let (initiator_result, responder_result) = thread::scope(|s| {
        let responder_handle = thread::Builder::new()
            .name(responder.name().to_string())
            .spawn_scoped(s, || responder.run(establish_responder));
        let initiator_handle = thread::Builder::new()
            .name(initiator.name().to_string())
            .spawn_scoped(s, || initiator.run(establish_initiator));

        // Joining establishes that each peer's final counters are visible here.
        (
            join(initiator.name(), initiator_handle),
            join(responder.name(), responder_handle),
        )
    });

    match (initiator_result, responder_result) {
        (Ok(initiator), Ok(responder)) => {
            let report = ExchangeReport { initiator, responder };
            tracing::info!(
                initiator_sent = report.initiator.sent,
                initiator_received = report.initiator.received,
                responder_sent = report.responder.sent,
                responder_received = report.responder.received,
                "Exchange complete"
            );
            Ok(report)
        }
        (Err(e), other) | (other, Err(e)) => {
            if let Err(second) = other {
                tracing::warn!("Other peer also failed: {}", second);
            }
            Err(e)
        }
    }
}

fn join(
    name: &str,
    spawned: std::io::Result<thread::ScopedJoinHandle<'_, Result<PeerStats>>>,
) -> Result<PeerStats> {
    spawned?
        .join()
        .map_err(|_| ExchangeError::PeerPanicked(name.to_string()))?
}
