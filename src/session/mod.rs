//! Turn Synchronization Core
//!
//! Everything between the wire protocol and the game rules:
//!
//! - `channel`: the pairwise move rendezvous primitive
//! - `session`: one active two-party match and its turn exchange
//! - `player`: remote vs bot participant endpoints
//! - `registry`: process-wide name → live-object maps
//! - `comments`: bounded in-session comment log

pub mod channel;
pub mod comments;
pub mod player;
pub mod registry;
pub mod session;

pub use channel::{ChannelError, MoveChannel};
pub use comments::{CommentQueue, MAX_COMMENTS};
pub use player::{MoveSource, Player};
pub use registry::{Registry, RegistryError};
pub use session::{Session, SessionError, SessionOptions};
