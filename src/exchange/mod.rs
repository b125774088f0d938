pub mod coordinator;
pub mod peer;

pub use coordinator::{
    run_socket_initiator, run_socket_pair, run_socket_responder, run_socket_responder_on,
    run_threaded, ExchangeConfig, ExchangeReport,
};
pub use peer::{Peer, PeerConfig, PeerStats};
