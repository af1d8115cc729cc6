//! Game Rules Module
//!
//! The session core is game-agnostic: everything specific to one game lives
//! behind the [`GameRules`] trait. A rules object owns the board state of a
//! single match, judges each submitted move, and renders the plain-text data
//! strings the wire protocol ships to clients.
//!
//! ## Module Structure
//!
//! - `pickup`: the bundled stick pick-up game
//! - `bots`: training players (server-local opponents)

pub mod bots;
pub mod pickup;

pub use bots::{training_player, Bot};
pub use pickup::PickUp;

/// Result of judging one move.
///
/// Wire codes follow the client protocol: 0 continues the game, positive
/// wins, negative loses. An illegal move is a normal `Lose` outcome with an
/// explanatory message, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The game goes on; the turn passes to the opponent.
    Continue,
    /// Winning move: the player who played it wins the game.
    Win,
    /// Losing move (illegal move, or a move that loses by the rules).
    Lose,
}

impl Outcome {
    /// Integer code sent over the wire.
    pub fn wire_code(self) -> i32 {
        match self {
            Self::Continue => 0,
            Self::Win => 1,
            Self::Lose => -1,
        }
    }
}

/// The most recently accepted move and its judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    /// Raw move payload, exactly as the player sent it.
    pub payload: String,
    /// How the rules judged it.
    pub outcome: Outcome,
    /// Explanation shipped with non-continue outcomes (may be empty).
    pub message: String,
}

/// Per-game rule logic, pluggable into a session.
///
/// Implementations mutate their own board state in [`apply`](Self::apply)
/// and are driven strictly in turn order by the session, so they need no
/// internal synchronization.
pub trait GameRules: Send {
    /// Play `payload` for the current turn owner and judge it.
    fn apply(&mut self, payload: &str) -> (Outcome, String);

    /// Plain-text game data sent in answer to `GET_GAME_DATA`.
    fn game_data(&self) -> String;

    /// Size string sent right after the session token, telling the client
    /// how to dimension its buffers before asking for the data itself.
    fn data_size(&self) -> String;

    /// Human-readable board rendering for `DISP_GAME`.
    fn display(&self) -> String;
}
