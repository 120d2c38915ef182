//! mp-agent: stdio-to-WebSocket bridge for mcp-pipe
//!
//! The agent connects out to a remote WebSocket endpoint, spawns a local
//! command, and pipes channel messages to the command's stdin and its
//! stdout lines back to the channel. Dropped connections are retried with
//! exponential backoff.

pub mod pipe;
pub mod process;
pub mod session;
pub mod supervisor;
pub mod tunnel;

pub use session::{Session, SessionEnd, SessionOutcome, SessionSettings};
pub use supervisor::{Supervisor, SupervisorEvent};
