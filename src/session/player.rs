//! Player Endpoints
//!
//! A participant in a session is either a remote endpoint (backed by a real
//! network connection whose task suspends while waiting) or a bot (a
//! server-local move source computed synchronously, never suspending). The
//! session drives both through the same [`Player`] surface and switches on
//! the [`MoveSource`] variant where the behavior differs.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::core::SessionToken;
use crate::game::Bot;

/// How a participant produces moves.
pub enum MoveSource {
    /// Backed by a network connection; moves arrive through the Move
    /// Channel and retrieving them suspends the requesting task.
    Remote(RemoteEndpoint),
    /// Server-local; moves are computed in-line on the calling task.
    Bot(Mutex<Box<dyn Bot>>),
}

/// The blocking half of a remote participant: a one-shot readiness signal
/// fired when a session attaches itself to the player.
pub struct RemoteEndpoint {
    ready: Notify,
}

/// One participant, remote or bot.
pub struct Player {
    name: String,
    source: MoveSource,
    /// Token of the session this player is currently attached to.
    session: Mutex<Option<SessionToken>>,
}

impl Player {
    /// Create a remote (blocking) participant.
    pub fn new_remote(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            source: MoveSource::Remote(RemoteEndpoint { ready: Notify::new() }),
            session: Mutex::new(None),
        })
    }

    /// Create a bot (synchronous) participant.
    pub fn new_bot(name: impl Into<String>, bot: Box<dyn Bot>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            source: MoveSource::Bot(Mutex::new(bot)),
            session: Mutex::new(None),
        })
    }

    /// Player name, unique across live endpoints.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether waiting is involved when this player's move is retrieved.
    pub fn is_remote(&self) -> bool {
        matches!(self.source, MoveSource::Remote(_))
    }

    /// Token of the current session, if any.
    pub async fn session(&self) -> Option<SessionToken> {
        self.session.lock().await.clone()
    }

    /// Whether this player is currently attached to the given session.
    pub async fn is_attached_to(&self, token: &str) -> bool {
        self.session.lock().await.as_deref() == Some(token)
    }

    /// Attach this player to a session and, for remote endpoints, release
    /// the task blocked in [`wait_for_session`](Self::wait_for_session).
    pub async fn attach(&self, token: &str) {
        *self.session.lock().await = Some(token.to_string());
        if let MoveSource::Remote(endpoint) = &self.source {
            endpoint.ready.notify_one();
        }
    }

    /// Detach from the given session. No-op when attached elsewhere, so a
    /// late finalization cannot tear a player out of its next session.
    pub async fn detach_from(&self, token: &str) {
        let mut session = self.session.lock().await;
        if session.as_deref() == Some(token) {
            *session = None;
        }
    }

    /// Block until a session attaches itself to this player.
    ///
    /// Returns immediately if the attachment already happened (the readiness
    /// signal stores one permit). For bots this is a no-op: they never wait.
    pub async fn wait_for_session(&self) {
        if let MoveSource::Remote(endpoint) = &self.source {
            endpoint.ready.notified().await;
        }
    }

    /// Compute a bot move from the game data string. `None` for remote
    /// players, whose moves come through the Move Channel instead.
    pub async fn bot_move(&self, game_data: &str) -> Option<String> {
        match &self.source {
            MoveSource::Bot(bot) => Some(bot.lock().await.choose_move(game_data)),
            MoveSource::Remote(_) => None,
        }
    }
}
