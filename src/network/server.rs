//! TCP Game Server
//!
//! Accept loop and per-connection protocol driver. Every client connection
//! runs on its own task; the tasks share the player and session registries
//! and the pairing lobby, and nothing else.
//!
//! The connection state machine follows the wire protocol: log in with
//! `CLIENT_NAME`, then repeatedly wait for a game, send its data, and serve
//! in-game commands until the session reaches a terminal outcome.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::game::{training_player, GameRules, PickUp};
use crate::network::protocol::{read_message, write_message, Command, ProtocolError};
use crate::session::{Player, Registry, RegistryError, Session, SessionError};
use crate::DEFAULT_TURN_TIMEOUT;

/// Builds the rules object for a new session from its seed.
pub type RulesFactory = Arc<dyn Fn(u32) -> Box<dyn GameRules> + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Default per-move deadline for sessions that do not set one.
    pub turn_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1234".parse().unwrap(),
            max_connections: 1000,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind or accept.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Everything a connection task needs, cloneable per connection.
#[derive(Clone)]
struct ConnectionCtx {
    players: Arc<Registry<Player>>,
    sessions: Arc<Registry<Session>>,
    lobby: Arc<Mutex<VecDeque<Arc<Player>>>>,
    rules: RulesFactory,
    turn_timeout: Duration,
}

/// Per-connection failure. Protocol and session errors are reported to the
/// offending client; none of them outlive the connection.
#[derive(Debug, thiserror::Error)]
enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("The training player '{0}' is not valid")]
    UnknownTrainingPlayer(String),
}

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    players: Arc<Registry<Player>>,
    sessions: Arc<Registry<Session>>,
    lobby: Arc<Mutex<VecDeque<Arc<Player>>>>,
    rules: RulesFactory,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server running the bundled pick-up game.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_rules(config, Arc::new(|seed| Box::new(PickUp::from_seed(seed))))
    }

    /// Create a server with a custom rules factory.
    pub fn with_rules(config: ServerConfig, rules: RulesFactory) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            players: Arc::new(Registry::new()),
            sessions: Arc::new(Registry::new()),
            lobby: Arc::new(Mutex::new(VecDeque::new())),
            rules,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Live player registry.
    pub fn players(&self) -> &Arc<Registry<Player>> {
        &self.players
    }

    /// Live session registry.
    pub fn sessions(&self) -> &Arc<Registry<Session>> {
        &self.sessions
    }

    /// Ask the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let ctx = ConnectionCtx {
            players: self.players.clone(),
            sessions: self.sessions.clone(),
            lobby: self.lobby.clone(),
            rules: self.rules.clone(),
            turn_timeout: self.config.turn_timeout,
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::Relaxed) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.connections.fetch_add(1, Ordering::Relaxed);
                            let ctx = ctx.clone();
                            let connections = self.connections.clone();
                            tokio::spawn(async move {
                                handle_client(stream, addr, ctx).await;
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
            }
        }
    }
}

/// Best-effort error reply; the connection is going away anyway.
async fn reject<W>(writer: &mut W, message: &str)
where
    W: AsyncWrite + Unpin,
{
    let _ = write_message(writer, message).await;
}

/// Drive one client connection from login to disconnect.
async fn handle_client(mut stream: TcpStream, addr: SocketAddr, ctx: ConnectionCtx) {
    let (mut reader, mut writer) = stream.split();

    let player = match login(&mut reader, &mut writer, &ctx, addr).await {
        Ok(player) => player,
        Err(e) => {
            debug!(%addr, error = %e, "client rejected before login");
            return;
        }
    };

    match run_client(&mut reader, &mut writer, &player, &ctx).await {
        Err(ClientError::Protocol(ProtocolError::Disconnected)) => {
            debug!(player = %player.name(), %addr, "client disconnected");
        }
        Err(e) => {
            info!(player = %player.name(), %addr, error = %e, "protocol error");
            reject(&mut writer, &e.to_string()).await;
        }
        Ok(()) => {}
    }

    // a session in flight is forfeited (or discarded, against a bot)
    if let Some(token) = player.session().await {
        if let Some(session) = ctx.sessions.get(&token).await {
            session.partial_end(&player).await;
        }
    }
    ctx.lobby.lock().await.retain(|p| !Arc::ptr_eq(p, &player));
    ctx.players.unregister(player.name()).await;
    info!(player = %player.name(), %addr, "connection closed");
}

/// Handle `CLIENT_NAME` and register the player.
async fn login<R, W>(
    reader: &mut R,
    writer: &mut W,
    ctx: &ConnectionCtx,
    addr: SocketAddr,
) -> Result<Arc<Player>, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = read_message(reader).await?;
    let name = match Command::parse(&line) {
        Ok(Command::ClientName(name)) => name,
        Ok(_) => {
            reject(writer, "Bad protocol, should start with CLIENT_NAME").await;
            return Err(ProtocolError::UnknownCommand(line).into());
        }
        Err(e) => {
            reject(writer, &e.to_string()).await;
            return Err(e.into());
        }
    };

    let player = Player::new_remote(&name);
    if let Err(e) = ctx.players.register(&name, player.clone()).await {
        reject(
            writer,
            &format!("A client with the same name ('{name}') is already connected!"),
        )
        .await;
        return Err(e.into());
    }

    write_message(writer, "OK").await?;
    info!(player = %name, %addr, "logged in");
    Ok(player)
}

/// Outer loop: wait for a game, send its data, serve it, repeat.
async fn run_client<R, W>(
    reader: &mut R,
    writer: &mut W,
    player: &Arc<Player>,
    ctx: &ConnectionCtx,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let session = wait_game(reader, writer, player, ctx).await?;
        send_game_data(reader, writer, player, &session).await?;

        while player.is_attached_to(session.token()).await {
            serve_game_command(reader, writer, player, &session).await?;
        }
    }
}

/// Handle `WAIT_GAME`: pair through the lobby or create a training match,
/// then block until a session is attached and announce it.
async fn wait_game<R, W>(
    reader: &mut R,
    writer: &mut W,
    player: &Arc<Player>,
    ctx: &ConnectionCtx,
) -> Result<Arc<Session>, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = read_message(reader).await?;
    let (bot, options) = match Command::parse(&line) {
        Ok(Command::WaitGame { bot, options }) => (bot, options),
        Ok(_) => {
            reject(writer, "Bad protocol, should send 'WAIT_GAME' command").await;
            return Err(ProtocolError::UnknownCommand(line).into());
        }
        Err(e) => {
            reject(writer, &e.to_string()).await;
            return Err(e.into());
        }
    };
    let options = options.into_session_options(ctx.turn_timeout);

    if let Some(kind) = bot {
        let Some(bot) = training_player(&kind) else {
            let e = ClientError::UnknownTrainingPlayer(kind);
            reject(writer, &e.to_string()).await;
            return Err(e);
        };
        let bot_player = Player::new_bot(format!("{}-vs-{}", kind.to_lowercase(), player.name()), bot);
        let rules = ctx.rules.clone();
        if let Err(e) = Session::create(
            player.clone(),
            bot_player,
            options,
            move |seed| rules(seed),
            ctx.sessions.clone(),
        )
        .await
        {
            reject(writer, &e.to_string()).await;
            return Err(e.into());
        }
    } else {
        let mut lobby = ctx.lobby.lock().await;
        let partner = loop {
            match lobby.pop_front() {
                // a waiter may have disconnected or been paired meanwhile
                Some(p) if ctx.players.contains(p.name()).await && p.session().await.is_none() => {
                    break Some(p);
                }
                Some(_) => continue,
                None => break None,
            }
        };
        match partner {
            Some(partner) => {
                drop(lobby);
                let rules = ctx.rules.clone();
                if let Err(e) = Session::create(
                    partner,
                    player.clone(),
                    options,
                    move |seed| rules(seed),
                    ctx.sessions.clone(),
                )
                .await
                {
                    reject(writer, &e.to_string()).await;
                    return Err(e.into());
                }
            }
            None => {
                lobby.push_back(player.clone());
            }
        }
    }

    write_message(writer, "OK").await?;

    player.wait_for_session().await;
    let token = player.session().await.ok_or(ProtocolError::Disconnected)?;
    let session = ctx
        .sessions
        .get(&token)
        .await
        .ok_or(ProtocolError::Disconnected)?;

    write_message(writer, session.token()).await?;
    write_message(writer, &session.data_size().await).await?;
    Ok(session)
}

/// Handle `GET_GAME_DATA`: board data plus the who-starts marker.
async fn send_game_data<R, W>(
    reader: &mut R,
    writer: &mut W,
    player: &Arc<Player>,
    session: &Arc<Session>,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = read_message(reader).await?;
    if !matches!(Command::parse(&line), Ok(Command::GetGameData)) {
        reject(writer, "Bad protocol, should send 'GET_GAME_DATA' command").await;
        return Err(ProtocolError::UnknownCommand(line).into());
    }

    write_message(writer, "OK").await?;
    write_message(writer, &session.game_data().await).await?;
    let starts = if session.is_turn(player).await { "0" } else { "1" };
    write_message(writer, starts).await?;
    Ok(())
}

/// Serve one in-game command.
async fn serve_game_command<R, W>(
    reader: &mut R,
    writer: &mut W,
    player: &Arc<Player>,
    session: &Arc<Session>,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = read_message(reader).await?;
    let command = match Command::parse(&line) {
        Ok(command) => command,
        Err(e) => {
            reject(writer, &e.to_string()).await;
            return Err(e.into());
        }
    };

    match command {
        Command::GetMove => {
            if session.is_turn(player).await {
                write_message(writer, "It's our turn to play, so we cannot ask for a move!")
                    .await?;
                return Ok(());
            }
            write_message(writer, "OK").await?;
            match session.retrieve_move(player).await {
                Ok(record) => {
                    write_message(writer, &record.payload).await?;
                    write_message(writer, &record.outcome.wire_code().to_string()).await?;
                }
                // the session was torn down while we were reading
                Err(SessionError::Finished) => {
                    write_message(writer, "").await?;
                    write_message(writer, "-1").await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::PlayMove(payload) => {
            if !player.is_attached_to(session.token()).await {
                // the game already ended under us (timeout forfeiture)
                write_message(writer, "OK").await?;
                write_message(writer, "-1").await?;
                write_message(writer, "Timeout!").await?;
                return Ok(());
            }
            if !session.is_turn(player).await {
                write_message(writer, "It's not our turn to play, so we cannot play a move!")
                    .await?;
                return Ok(());
            }
            write_message(writer, "OK").await?;
            match session.submit_move(player, &payload).await {
                Ok((outcome, message)) => {
                    write_message(writer, &outcome.wire_code().to_string()).await?;
                    write_message(writer, &message).await?;
                }
                Err(SessionError::Finished) => {
                    write_message(writer, "-1").await?;
                    write_message(writer, "Timeout!").await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::DispGame => {
            write_message(writer, "OK").await?;
            let rendering = session.display(player).await?;
            write_message(writer, &rendering).await?;
        }
        Command::SendComment(text) => {
            write_message(writer, "OK").await?;
            session.send_comment(player, &text).await?;
        }
        Command::ClientName(_) | Command::WaitGame { .. } | Command::GetGameData => {
            reject(writer, "Bad protocol, command not valid during a game").await;
            return Err(ProtocolError::UnknownCommand(line).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    async fn start_server() -> (Arc<GameServer>, SocketAddr) {
        let server = Arc::new(GameServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = server.clone();
        tokio::spawn(async move {
            serving.serve(listener).await.unwrap();
        });
        (server, addr)
    }

    struct TestClient {
        stream: TcpStream,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
            }
        }

        async fn send(&mut self, message: &str) {
            write_message(&mut self.stream, message).await.unwrap();
        }

        async fn recv(&mut self) -> String {
            read_message(&mut self.stream).await.unwrap()
        }

        async fn login(addr: SocketAddr, name: &str) -> Self {
            let mut client = Self::connect(addr).await;
            client.send(&format!("CLIENT_NAME {name}")).await;
            assert_eq!(client.recv().await, "OK");
            client
        }

        /// Join a game, fetch its data, return whether we start.
        async fn join(&mut self, wait_game: &str) -> bool {
            self.send(wait_game).await;
            assert_eq!(self.recv().await, "OK");
            let token = self.recv().await;
            assert_eq!(token.len(), 12);
            let _data_size = self.recv().await;

            self.send("GET_GAME_DATA").await;
            assert_eq!(self.recv().await, "OK");
            let _data = self.recv().await;
            self.recv().await == "0"
        }

        /// Play "take 1" moves until the game ends; returns the final code.
        async fn play_out(&mut self, mut my_turn: bool) -> i32 {
            loop {
                if my_turn {
                    self.send("PLAY_MOVE 1").await;
                    assert_eq!(self.recv().await, "OK");
                    let code: i32 = self.recv().await.parse().unwrap();
                    let _message = self.recv().await;
                    if code != 0 {
                        return code;
                    }
                } else {
                    self.send("GET_MOVE").await;
                    assert_eq!(self.recv().await, "OK");
                    let _move = self.recv().await;
                    let code: i32 = self.recv().await.parse().unwrap();
                    if code != 0 {
                        return code;
                    }
                }
                my_turn = !my_turn;
            }
        }
    }

    #[tokio::test]
    async fn test_login_and_name_collision() {
        let (server, addr) = start_server().await;

        let _alice = TestClient::login(addr, "alice").await;
        assert_eq!(server.players().len().await, 1);

        let mut imposter = TestClient::connect(addr).await;
        imposter.send("CLIENT_NAME alice").await;
        let answer = imposter.recv().await;
        assert!(answer.contains("already connected"));
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected() {
        let (_server, addr) = start_server().await;

        let mut client = TestClient::connect(addr).await;
        client.send("CLIENT_NAME spaced name").await;
        let answer = client.recv().await;
        assert!(answer.contains("invalid"));
    }

    #[tokio::test]
    async fn test_unknown_training_player_is_rejected() {
        let (_server, addr) = start_server().await;

        let mut client = TestClient::login(addr, "alice").await;
        client.send("WAIT_GAME DO_EVERYTHING").await;
        let answer = client.recv().await;
        assert!(answer.contains("not valid"));
    }

    #[tokio::test]
    async fn test_full_bot_game() {
        let (server, addr) = start_server().await;

        let mut client = TestClient::login(addr, "alice").await;
        let starts = client.join("WAIT_GAME GREEDY seed=3").await;
        let code = client.play_out(starts).await;
        assert_ne!(code, 0);

        // terminal outcome removed the session; the player can queue again
        assert_eq!(server.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn test_two_clients_are_paired_and_play_out() {
        let (server, addr) = start_server().await;

        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        let alice_task = tokio::spawn(async move {
            let starts = alice.join("WAIT_GAME seed=5").await;
            (starts, alice.play_out(starts).await)
        });
        // tiny delay so alice reaches the lobby first
        tokio::time::sleep(Duration::from_millis(50)).await;
        let bob_task = tokio::spawn(async move {
            let starts = bob.join("WAIT_GAME").await;
            (starts, bob.play_out(starts).await)
        });

        let (alice_starts, alice_code) = alice_task.await.unwrap();
        let (bob_starts, bob_code) = bob_task.await.unwrap();

        // exactly one of them started, and both saw the same terminal result
        assert_ne!(alice_starts, bob_starts);
        assert_ne!(alice_code, 0);
        assert_ne!(bob_code, 0);
        assert_eq!(server.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_mid_game_forfeits_to_remaining() {
        let (server, addr) = start_server().await;

        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        let alice_task = tokio::spawn(async move {
            alice.join("WAIT_GAME seed=5").await;
            alice
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        bob.join("WAIT_GAME").await;
        let alice = alice_task.await.unwrap();

        // bob walks away mid-game
        drop(bob);

        // wait for the server to notice the disconnect and finalize
        for _ in 0..100 {
            if server.sessions().len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.sessions().len().await, 0);
        drop(alice);
    }

    #[tokio::test]
    async fn test_comments_and_display() {
        let (_server, addr) = start_server().await;

        let mut client = TestClient::login(addr, "alice").await;
        client.join("WAIT_GAME GREEDY seed=3").await;

        client.send("SEND_COMMENT nice board").await;
        assert_eq!(client.recv().await, "OK");

        client.send("DISP_GAME").await;
        assert_eq!(client.recv().await, "OK");
        let rendering = client.recv().await;
        assert!(rendering.contains("sticks"));
        assert!(rendering.contains("[you] nice board"));
    }
}
