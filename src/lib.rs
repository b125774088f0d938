pub mod comms;
pub mod config;
pub mod error;
pub mod exchange;
pub mod protocol;

pub use error::{ExchangeError, Result};
