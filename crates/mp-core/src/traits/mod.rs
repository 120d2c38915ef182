//! Core trait definitions

mod channel;

pub use channel::{ChannelConnection, Dialer, MessageSink, MessageSource};
