//! Host-facing command contract and the JSON bridge for presentation shells.

pub mod channel;
pub mod contract;
pub mod stdio;

pub use channel::{HostCommandClient, HostCommandServer, command_channel};
pub use contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
