//! # Duelhall Server
//!
//! A turn-based game server. Clients connect over TCP, log in under a
//! unique name, and are paired into two-party sessions, either with each
//! other through a waiting lobby or with a server-local training player.
//! The server owns the authoritative game state, judges every move, and
//! synchronizes the strict turn alternation between the two participants.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │   GameServer    │
//!                    │  (accept loop)  │
//!                    └────────┬────────┘
//!                             │ one task per connection
//!              ┌──────────────┼──────────────┐
//!              ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ protocol │   │ protocol │   │ protocol │
//!        │  driver  │   │  driver  │   │  driver  │
//!        └────┬─────┘   └────┬─────┘   └────┬─────┘
//!             │   registries, lobby         │
//!             └────────────┬────────────────┘
//!                          ▼
//!                    ┌───────────┐     ┌───────────┐
//!                    │  Session  │────▶│ GameRules │
//!                    │ (exchange)│     │ (pluggable)│
//!                    └─────┬─────┘     └───────────┘
//!                          ▼
//!                   ┌─────────────┐
//!                   │ MoveChannel │
//!                   │ (rendezvous)│
//!                   └─────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - `core`: session token derivation
//! - `game`: the [`game::GameRules`] trait, the bundled pick-up game and
//!   the training players
//! - `session`: sessions, the move rendezvous channel, player endpoints,
//!   registries and the comment log
//! - `network`: the TCP server and the length-prefixed plain-text protocol

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

use std::time::Duration;

pub mod core;
pub mod game;
pub mod network;
pub mod session;

pub use network::{GameServer, ServerConfig, ServerError};
pub use session::{Session, SessionError, SessionOptions};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-move deadline applied when neither the server configuration nor the
/// `WAIT_GAME` options ask for one.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(100);

/// Maximum length of a client name.
pub const MAX_NAME_LEN: usize = 20;
