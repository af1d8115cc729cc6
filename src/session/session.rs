//! Session / Turn Exchange
//!
//! One [`Session`] is one active two-party match. It accepts a move from the
//! current turn owner, judges it through the pluggable [`GameRules`], hands
//! control to the opponent (remote endpoint or local bot) and reports the
//! result back to the submitter.
//!
//! Synchronization model: the two participating tasks rendezvous through the
//! session's [`MoveChannel`]; everything else lives behind short critical
//! sections that are never held across an await. Strict turn alternation
//! means the two tasks never mutate the same field concurrently, so no
//! broader lock is needed around game state.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::{derive_token, random_seed, SessionToken, MAX_SEED};
use crate::game::{GameRules, MoveRecord, Outcome};
use crate::session::channel::{ChannelError, MoveChannel};
use crate::session::comments::CommentQueue;
use crate::session::player::Player;
use crate::session::registry::Registry;
use crate::DEFAULT_TURN_TIMEOUT;

/// Session errors.
///
/// Forfeitures (timeout, disconnect) and illegal moves are *not* errors:
/// they are ordinary outcomes reported through [`Outcome`]. Errors are
/// protocol violations and failed creations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// A player cannot enter two sessions at once.
    #[error("Player '{0}' already plays in a game")]
    AlreadyInSession(String),

    /// Both participants are the same player.
    #[error("Cannot play against yourself")]
    SelfPlay,

    /// Seed outside the 24-bit range.
    #[error("The 'seed' value must be between 0 and {MAX_SEED} (got {0})")]
    InvalidSeed(u32),

    /// The player is not a participant of this session.
    #[error("Player '{0}' does not play in this game")]
    NotInSession(String),

    /// A move was submitted out of turn.
    #[error("It is not '{0}'s turn to play")]
    NotYourTurn(String),

    /// A retrieval was attempted on the requester's own turn.
    #[error("'{0}' cannot ask for a move on its own turn")]
    OwnTurn(String),

    /// The session already reached a terminal outcome.
    #[error("The game is already finished")]
    Finished,

    /// Rendezvous protocol violation.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Creation-time options, parsed from the `WAIT_GAME` command.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Game seed (same seed, same board). Random when absent.
    pub seed: Option<u32>,
    /// Per-move deadline. [`DEFAULT_TURN_TIMEOUT`] when absent.
    pub timeout: Option<Duration>,
    /// Which creation argument starts (0 or 1). Random when absent.
    pub first: Option<usize>,
}

/// Turn bookkeeping, mutated only by the two participating tasks.
struct TurnState {
    /// Index of the participant whose move is expected next.
    turn: usize,
    /// Most recently accepted move.
    last_move: Option<MoveRecord>,
    /// When the current turn started; only consulted on the bot path,
    /// which has no external waiter to enforce the deadline.
    last_move_at: Instant,
    /// Set once, by whichever task finalizes the session first.
    finished: bool,
}

/// One active two-party match.
pub struct Session {
    token: OnceLock<SessionToken>,
    seed: u32,
    players: [Arc<Player>; 2],
    deadline: Duration,
    channel: MoveChannel,
    state: Mutex<TurnState>,
    rules: Mutex<Box<dyn GameRules>>,
    comments: Mutex<CommentQueue>,
    registry: Arc<Registry<Session>>,
}

impl Session {
    /// Create a session between two unattached players and register it.
    ///
    /// Participant order is randomized unless `options.first` pins it; the
    /// player at index 0 always starts. Attaching the players (which
    /// releases their tasks blocked in `wait_for_session`) is the last step,
    /// after the session is fully registered.
    pub async fn create<F>(
        player_a: Arc<Player>,
        player_b: Arc<Player>,
        options: SessionOptions,
        rules_for_seed: F,
        sessions: Arc<Registry<Session>>,
    ) -> Result<Arc<Self>, SessionError>
    where
        F: FnOnce(u32) -> Box<dyn GameRules>,
    {
        if Arc::ptr_eq(&player_a, &player_b) {
            return Err(SessionError::SelfPlay);
        }
        for player in [&player_a, &player_b] {
            if player.session().await.is_some() {
                return Err(SessionError::AlreadyInSession(player.name().to_string()));
            }
        }

        let seed = match options.seed {
            Some(seed) if seed <= MAX_SEED => seed,
            Some(seed) => return Err(SessionError::InvalidSeed(seed)),
            None => random_seed(),
        };

        let players = match options.first {
            Some(0) => [player_a, player_b],
            Some(_) => [player_b, player_a],
            None if rand::random() => [player_a, player_b],
            None => [player_b, player_a],
        };

        let session = Arc::new(Self {
            token: OnceLock::new(),
            seed,
            deadline: options.timeout.unwrap_or(DEFAULT_TURN_TIMEOUT),
            channel: MoveChannel::new(),
            state: Mutex::new(TurnState {
                turn: 0,
                last_move: None,
                last_move_at: Instant::now(),
                finished: false,
            }),
            rules: Mutex::new(rules_for_seed(seed)),
            comments: Mutex::new(CommentQueue::new()),
            players,
            registry: sessions.clone(),
        });

        let name0 = session.players[0].name().to_string();
        let name1 = session.players[1].name().to_string();
        let token = sessions
            .register_generated(|| derive_token(seed, &name0, &name1), session.clone())
            .await;
        let _ = session.token.set(token);

        info!(
            token = %session.token(),
            player0 = %name0,
            player1 = %name1,
            seed = session.seed,
            "session starts"
        );

        session.players[0].attach(session.token()).await;
        session.players[1].attach(session.token()).await;

        Ok(session)
    }

    /// Session token (registry key).
    pub fn token(&self) -> &str {
        self.token.get().map(String::as_str).unwrap_or("")
    }

    /// Game seed.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Per-move deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// The two participants, in play order.
    pub fn players(&self) -> &[Arc<Player>; 2] {
        &self.players
    }

    fn player_index(&self, player: &Arc<Player>) -> Result<usize, SessionError> {
        self.players
            .iter()
            .position(|p| Arc::ptr_eq(p, player))
            .ok_or_else(|| SessionError::NotInSession(player.name().to_string()))
    }

    /// Whether it is `player`'s turn to submit a move.
    pub async fn is_turn(&self, player: &Arc<Player>) -> bool {
        match self.player_index(player) {
            Ok(index) => self.state.lock().await.turn == index,
            Err(_) => false,
        }
    }

    /// Game data string for `GET_GAME_DATA`.
    pub async fn game_data(&self) -> String {
        self.rules.lock().await.game_data()
    }

    /// Data-size string sent right after the token.
    pub async fn data_size(&self) -> String {
        self.rules.lock().await.data_size()
    }

    /// Board rendering plus the comment log, for `DISP_GAME`.
    pub async fn display(&self, player: &Arc<Player>) -> Result<String, SessionError> {
        let viewer = self.player_index(player)?;
        let board = self.rules.lock().await.display();
        let comments = self
            .comments
            .lock()
            .await
            .render(viewer, [self.players[0].name(), self.players[1].name()]);
        Ok(format!("{board}\n{comments}"))
    }

    /// Record a comment from `player`.
    pub async fn send_comment(&self, player: &Arc<Player>, text: &str) -> Result<(), SessionError> {
        let author = self.player_index(player)?;
        info!(token = %self.token(), player = %player.name(), comment = %text, "comment");
        self.comments.lock().await.push(author, text);
        Ok(())
    }

    /// Accept a move from the current turn owner.
    ///
    /// Judges the move, records it, hands control to the opponent and only
    /// returns once the who-plays-next bookkeeping is settled, so the
    /// submitter can never race a duplicate move past the opponent.
    pub async fn submit_move(
        self: &Arc<Self>,
        submitter: &Arc<Player>,
        payload: &str,
    ) -> Result<(Outcome, String), SessionError> {
        let me = self.player_index(submitter)?;
        let opp = 1 - me;
        {
            let state = self.state.lock().await;
            if state.finished {
                return Err(SessionError::Finished);
            }
            if state.turn != me {
                return Err(SessionError::NotYourTurn(submitter.name().to_string()));
            }
        }

        // the opponent may have walked away between turns
        if !self.players[opp].is_attached_to(self.token()).await {
            let message = "Opponent has disconnected".to_string();
            self.end_of_game(me, &message).await;
            return Ok((Outcome::Win, message));
        }

        let opponent_is_remote = self.players[opp].is_remote();

        // a bot opponent never waits on us, so police the deadline ourselves
        if !opponent_is_remote {
            let elapsed = self.state.lock().await.last_move_at.elapsed();
            if elapsed > self.deadline {
                self.end_of_game(opp, "Timeout").await;
                return Ok((Outcome::Lose, "Timeout!".to_string()));
            }
        }

        info!(token = %self.token(), player = %submitter.name(), %payload, "plays");
        let (outcome, message) = self.rules.lock().await.apply(payload);
        let record = MoveRecord {
            payload: payload.to_string(),
            outcome,
            message: message.clone(),
        };
        {
            let mut state = self.state.lock().await;
            state.last_move = Some(record.clone());
        }

        if opponent_is_remote {
            self.channel.publish(record)?;

            // second rendezvous phase: wait until the opponent consumed the
            // move and settled the turn. Bounded: an opponent that never
            // retrieves forfeits instead of deadlocking us.
            debug!(token = %self.token(), "waiting for move-consumed acknowledgment");
            match self.channel.await_ack(self.deadline).await {
                Ok(()) => {}
                Err(ChannelError::Timeout) => {
                    self.end_of_game(me, "Timeout").await;
                    return Ok((Outcome::Win, "Timeout!".to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let mut state = self.state.lock().await;
            state.last_move_at = Instant::now();
            if outcome == Outcome::Continue {
                state.turn = opp;
            }
        }

        match outcome {
            Outcome::Continue => {}
            Outcome::Win => self.end_of_game(me, &message).await,
            Outcome::Lose => self.end_of_game(opp, &message).await,
        }

        Ok((outcome, message))
    }

    /// Retrieve the opponent's move for `requester`.
    ///
    /// Waits (bounded by the deadline) when the turn owner is a remote
    /// endpoint; pulls the move synchronously when it is a bot.
    pub async fn retrieve_move(
        self: &Arc<Self>,
        requester: &Arc<Player>,
    ) -> Result<MoveRecord, SessionError> {
        let me = self.player_index(requester)?;
        let owner_index = {
            let state = self.state.lock().await;
            if state.finished {
                return Err(SessionError::Finished);
            }
            if state.turn == me {
                return Err(SessionError::OwnTurn(requester.name().to_string()));
            }
            state.turn
        };
        let owner = &self.players[owner_index];

        // lazy disconnect detection: the turn owner is gone
        if !owner.is_attached_to(self.token()).await {
            let message = "Opponent has disconnected".to_string();
            self.end_of_game(me, &message).await;
            return Ok(MoveRecord {
                payload: String::new(),
                outcome: Outcome::Lose,
                message,
            });
        }

        if owner.is_remote() {
            self.retrieve_remote_move(me).await
        } else {
            self.retrieve_bot_move(me, owner_index).await
        }
    }

    /// Remote turn owner: rendezvous through the Move Channel.
    async fn retrieve_remote_move(self: &Arc<Self>, me: usize) -> Result<MoveRecord, SessionError> {
        debug!(token = %self.token(), "waiting for opponent's move");
        match self.channel.take(self.deadline).await {
            Ok(record) => {
                // settle the turn before acknowledging, so neither task can
                // observe stale who-plays-next bookkeeping once released
                {
                    let mut state = self.state.lock().await;
                    if record.outcome == Outcome::Continue {
                        state.turn = 1 - state.turn;
                    }
                }
                self.channel.acknowledge()?;

                match record.outcome {
                    Outcome::Continue => {}
                    Outcome::Win => self.end_of_game(1 - me, &record.message).await,
                    Outcome::Lose => self.end_of_game(me, &record.message).await,
                }
                Ok(record)
            }
            Err(ChannelError::Timeout) => {
                // the turn owner failed to move in time and forfeits
                self.end_of_game(me, "Timeout").await;
                let stale = self.state.lock().await.last_move.clone();
                Ok(MoveRecord {
                    payload: stale.map(|m| m.payload).unwrap_or_default(),
                    outcome: Outcome::Lose,
                    message: "Timeout!".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Bot turn owner: compute and judge the move in-line, no suspension.
    async fn retrieve_bot_move(
        self: &Arc<Self>,
        me: usize,
        owner_index: usize,
    ) -> Result<MoveRecord, SessionError> {
        let owner = &self.players[owner_index];
        let game_data = self.rules.lock().await.game_data();
        let payload = match owner.bot_move(&game_data).await {
            Some(payload) => payload,
            None => return Err(SessionError::NotYourTurn(owner.name().to_string())),
        };

        info!(token = %self.token(), player = %owner.name(), %payload, "plays");
        let (outcome, message) = self.rules.lock().await.apply(&payload);
        let record = MoveRecord {
            payload,
            outcome,
            message: message.clone(),
        };
        {
            let mut state = self.state.lock().await;
            state.last_move = Some(record.clone());
            state.last_move_at = Instant::now();
            if outcome == Outcome::Continue {
                state.turn = me;
            }
        }

        match outcome {
            Outcome::Continue => {}
            Outcome::Win => self.end_of_game(owner_index, &message).await,
            Outcome::Lose => self.end_of_game(me, &message).await,
        }

        Ok(record)
    }

    /// Finalize the session: detach both participants, unregister, report
    /// the winner. Idempotent; both tasks may race into it.
    pub async fn end_of_game(&self, winner: usize, message: &str) {
        {
            let mut state = self.state.lock().await;
            if state.finished {
                return;
            }
            state.finished = true;
        }

        info!(
            token = %self.token(),
            winner = %self.players[winner].name(),
            loser = %self.players[1 - winner].name(),
            %message,
            "session finished"
        );

        self.players[0].detach_from(self.token()).await;
        self.players[1].detach_from(self.token()).await;
        self.registry.unregister(self.token()).await;
    }

    /// Handle one participant walking away mid-session.
    ///
    /// When the remaining side is a live endpoint, the whole session ends
    /// with it winning by forfeit. When the remaining side is a bot the game
    /// cannot continue and is discarded without a winner.
    pub async fn partial_end(&self, leaver: &Arc<Player>) {
        let Ok(leaver_index) = self.player_index(leaver) else {
            return;
        };
        let remaining = 1 - leaver_index;

        if self.players[remaining].is_remote() {
            self.end_of_game(remaining, "Opponent has disconnected").await;
        } else {
            let already_finished = {
                let mut state = self.state.lock().await;
                std::mem::replace(&mut state.finished, true)
            };
            if already_finished {
                return;
            }
            info!(token = %self.token(), leaver = %leaver.name(), "session discarded");
            self.players[0].detach_from(self.token()).await;
            self.players[1].detach_from(self.token()).await;
            self.registry.unregister(self.token()).await;
        }
    }
}

// manual impl: the rules and bot trait objects have no Debug
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token())
            .field("seed", &self.seed)
            .field("players", &[self.players[0].name(), self.players[1].name()])
            .finish_non_exhaustive()
    }
}
