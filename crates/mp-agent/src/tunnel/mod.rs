//! Channel management for connecting to the remote endpoint

mod connector;
pub mod memory;
mod reconnect;

pub use connector::{install_crypto_provider, WebSocketDialer};
pub use reconnect::ExponentialBackoff;
