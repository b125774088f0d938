pub mod message;
pub mod state;

pub use message::Role;
pub use state::PeerState;
