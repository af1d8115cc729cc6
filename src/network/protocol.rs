//! Wire Protocol
//!
//! Plain-text client protocol. Every message, in both directions, is framed
//! as a 4-digit ASCII decimal byte-length header followed by that many
//! UTF-8 payload bytes. Commands are single messages; answers are one or
//! more messages (an `OK`, then command-specific payloads).

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::session::SessionOptions;
use crate::MAX_NAME_LEN;

/// Bytes in the length header.
pub const HEADER_LEN: usize = 4;

/// Largest payload the 4-digit header can describe.
pub const MAX_MESSAGE_LEN: usize = 9999;

/// Wire protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer closed the connection.
    #[error("Connection lost")]
    Disconnected,

    /// Transport-level failure.
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// The length header was not 4 ASCII digits.
    #[error("Malformed message header")]
    BadHeader,

    /// The payload was not valid UTF-8.
    #[error("Message is not valid UTF-8")]
    InvalidUtf8,

    /// The payload does not fit the 4-digit header.
    #[error("Message too long ({0} bytes)")]
    MessageTooLong(usize),

    /// Unrecognized or out-of-sequence command.
    #[error("Bad protocol, unknown command '{0}'")]
    UnknownCommand(String),

    /// Client name outside the allowed alphabet or length.
    #[error("The name is invalid (max {MAX_NAME_LEN} characters in [a-zA-Z0-9_])")]
    InvalidName,

    /// Malformed `key=value` option.
    #[error("The '{key}' value is invalid ('{key}={value}')")]
    InvalidOption {
        /// Option key.
        key: String,
        /// Offending value.
        value: String,
    },
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Disconnected
        } else {
            Self::Io(e)
        }
    }
}

/// Read one length-prefixed message.
pub async fn read_message<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let header = std::str::from_utf8(&header).map_err(|_| ProtocolError::BadHeader)?;
    let len: usize = header.parse().map_err(|_| ProtocolError::BadHeader)?;

    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload).await?;
    }
    String::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Write one length-prefixed message.
pub async fn write_message<W>(writer: &mut W, message: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let payload = message.as_bytes();
    if payload.len() > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLong(payload.len()));
    }

    let header = format!("{:04}", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CLIENT_NAME <name>`: log in under a unique name.
    ClientName(String),
    /// `WAIT_GAME [bot] [key=value…]`: enter the lobby, or request a
    /// training match against the named bot.
    WaitGame {
        /// Training player name, if any.
        bot: Option<String>,
        /// Creation options (`seed=`, `timeout=` in seconds).
        options: WireOptions,
    },
    /// `GET_GAME_DATA`: fetch the board data and the who-starts marker.
    GetGameData,
    /// `GET_MOVE`: retrieve the opponent's move.
    GetMove,
    /// `PLAY_MOVE <payload>`: submit a move.
    PlayMove(String),
    /// `DISP_GAME`: fetch the board rendering and comments.
    DispGame,
    /// `SEND_COMMENT <text>`: send a comment to the session.
    SendComment(String),
}

/// Options carried by `WAIT_GAME`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireOptions {
    /// Game seed.
    pub seed: Option<u32>,
    /// Per-move deadline, in whole seconds on the wire.
    pub timeout: Option<Duration>,
}

impl WireOptions {
    /// Convert to session options, falling back to the server default
    /// deadline when the client did not ask for one.
    pub fn into_session_options(self, default_timeout: Duration) -> SessionOptions {
        SessionOptions {
            seed: self.seed,
            timeout: Some(self.timeout.unwrap_or(default_timeout)),
            first: None,
        }
    }
}

impl Command {
    /// Parse one message into a command.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("CLIENT_NAME ") {
            return Ok(Self::ClientName(validate_name(name)?));
        }
        if let Some(rest) = line.strip_prefix("WAIT_GAME") {
            return parse_wait_game(rest.trim());
        }
        if line == "GET_GAME_DATA" {
            return Ok(Self::GetGameData);
        }
        if line == "GET_MOVE" {
            return Ok(Self::GetMove);
        }
        if let Some(payload) = line.strip_prefix("PLAY_MOVE ") {
            return Ok(Self::PlayMove(payload.to_string()));
        }
        if line == "DISP_GAME" {
            return Ok(Self::DispGame);
        }
        if let Some(text) = line.strip_prefix("SEND_COMMENT ") {
            return Ok(Self::SendComment(text.to_string()));
        }
        Err(ProtocolError::UnknownCommand(line.to_string()))
    }
}

/// Check the `CLIENT_NAME` alphabet and length.
pub fn validate_name(name: &str) -> Result<String, ProtocolError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(ProtocolError::InvalidName)
    }
}

fn parse_wait_game(rest: &str) -> Result<Command, ProtocolError> {
    let mut terms = rest.split_whitespace().peekable();

    let bot = match terms.peek() {
        Some(term) if !term.contains('=') => {
            let name = (*term).to_string();
            terms.next();
            Some(name)
        }
        _ => None,
    };

    let mut options = WireOptions::default();
    for term in terms {
        let (key, value) = term.split_once('=').ok_or_else(|| ProtocolError::InvalidOption {
            key: term.to_string(),
            value: String::new(),
        })?;
        let invalid = || ProtocolError::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "seed" => options.seed = Some(value.parse().map_err(|_| invalid())?),
            "timeout" => {
                let secs: u64 = value.parse().map_err(|_| invalid())?;
                options.timeout = Some(Duration::from_secs(secs));
            }
            _ => return Err(invalid()),
        }
    }

    Ok(Command::WaitGame { bot, options })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_framing_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_message(&mut client, "CLIENT_NAME alice").await.unwrap();
        let received = read_message(&mut server).await.unwrap();
        assert_eq!(received, "CLIENT_NAME alice");
    }

    #[tokio::test]
    async fn test_framing_empty_message() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_message(&mut client, "").await.unwrap();
        assert_eq!(read_message(&mut server).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_framing_counts_bytes_not_chars() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_message(&mut client, "coup é").await.unwrap();
        assert_eq!(read_message(&mut server).await.unwrap(), "coup é");
    }

    #[tokio::test]
    async fn test_framing_rejects_oversized_message() {
        let (mut client, _server) = tokio::io::duplex(256);
        let big = "x".repeat(MAX_MESSAGE_LEN + 1);

        let err = write_message(&mut client, &big).await.unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLong(_)));
    }

    #[tokio::test]
    async fn test_closed_peer_reads_as_disconnected() {
        let (client, mut server) = tokio::io::duplex(256);
        drop(client);

        let err = read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Disconnected));
    }

    #[tokio::test]
    async fn test_garbage_header_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);
        use tokio::io::AsyncWriteExt;
        client.write_all(b"12ab").await.unwrap();

        let err = read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::BadHeader));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("GET_MOVE").unwrap(), Command::GetMove);
        assert_eq!(Command::parse("GET_GAME_DATA").unwrap(), Command::GetGameData);
        assert_eq!(Command::parse("DISP_GAME").unwrap(), Command::DispGame);
        assert_eq!(
            Command::parse("PLAY_MOVE 5 0").unwrap(),
            Command::PlayMove("5 0".to_string())
        );
        assert_eq!(
            Command::parse("SEND_COMMENT good luck").unwrap(),
            Command::SendComment("good luck".to_string())
        );
    }

    #[test]
    fn test_parse_client_name() {
        assert_eq!(
            Command::parse("CLIENT_NAME alice_42").unwrap(),
            Command::ClientName("alice_42".to_string())
        );
        assert!(matches!(
            Command::parse("CLIENT_NAME bad name"),
            Err(ProtocolError::InvalidName)
        ));
        assert!(matches!(
            Command::parse(&format!("CLIENT_NAME {}", "x".repeat(MAX_NAME_LEN + 1))),
            Err(ProtocolError::InvalidName)
        ));
    }

    #[test]
    fn test_parse_wait_game_variants() {
        assert_eq!(
            Command::parse("WAIT_GAME").unwrap(),
            Command::WaitGame {
                bot: None,
                options: WireOptions::default()
            }
        );
        assert_eq!(
            Command::parse("WAIT_GAME seed=42 timeout=10").unwrap(),
            Command::WaitGame {
                bot: None,
                options: WireOptions {
                    seed: Some(42),
                    timeout: Some(Duration::from_secs(10)),
                }
            }
        );
        assert_eq!(
            Command::parse("WAIT_GAME GREEDY seed=7").unwrap(),
            Command::WaitGame {
                bot: Some("GREEDY".to_string()),
                options: WireOptions {
                    seed: Some(7),
                    timeout: None,
                }
            }
        );
    }

    #[test]
    fn test_parse_wait_game_bad_options() {
        assert!(matches!(
            Command::parse("WAIT_GAME seed=banana"),
            Err(ProtocolError::InvalidOption { key, .. }) if key == "seed"
        ));
        assert!(matches!(
            Command::parse("WAIT_GAME color=blue"),
            Err(ProtocolError::InvalidOption { key, .. }) if key == "color"
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            Command::parse("MAKE_ME_WIN"),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }
}
