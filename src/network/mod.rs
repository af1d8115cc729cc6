//! Network layer: TCP server and the plain-text client protocol.

pub mod protocol;
pub mod server;

pub use protocol::{read_message, write_message, Command, ProtocolError};
pub use server::{GameServer, ServerConfig, ServerError};
