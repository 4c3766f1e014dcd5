//! Controller transports
//!
//! A [`Transport`] is a request/response channel to one motion controller: one
//! command string goes out, one reply string (or a typed error) comes back. The
//! [`Connector`] trait opens transports from a gclib-style open string such as
//! `"192.168.1.19 -s ALL"`, which lets the adapter be exercised against a
//! [`MockTransport`] without hardware.
//!
//! ## Galil reply framing
//!
//! Commands are terminated by `\r`. The controller answers with optional data
//! followed by `:` when the command was accepted, or with a lone `?` when it was
//! rejected. Bytes with the high bit set are unsolicited messages interleaved
//! with replies; they are dropped before framing.

pub mod mock;
pub mod tcp;

pub use mock::{MockConnector, MockFailure, MockReply, MockTransport};
pub use tcp::{TcpConnector, TcpTransport};

use crate::error::{AppResult, WavefinderError};
use async_trait::async_trait;
use std::fmt;

/// Default Galil command port.
pub const DEFAULT_PORT: u16 = 23;

/// Generic async command channel to a controller
#[async_trait]
pub trait Transport: Send {
    /// Short description for logs (e.g. `tcp 192.168.1.19:23`)
    fn name(&self) -> &str;

    /// Send one command and wait for its reply data.
    async fn command(&mut self, command: &str) -> AppResult<String>;

    /// Close the channel; later commands fail with [`WavefinderError::NotConnected`].
    async fn close(&mut self) -> AppResult<()>;
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport for `open_string`.
    async fn open(&self, open_string: &OpenString) -> AppResult<Box<dyn Transport>>;
}

/// Which unsolicited record types the connection asks for (`-s` option).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// All unsolicited traffic
    All,
    /// No unsolicited traffic
    None,
    /// `MG` messages only
    Messages,
    /// `DR` data records only
    DataRecords,
    /// `EI` interrupts only
    Interrupts,
}

impl Subscription {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ALL" => Some(Subscription::All),
            "NONE" => Some(Subscription::None),
            "MG" => Some(Subscription::Messages),
            "DR" => Some(Subscription::DataRecords),
            "EI" => Some(Subscription::Interrupts),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Subscription::All => "ALL",
            Subscription::None => "NONE",
            Subscription::Messages => "MG",
            Subscription::DataRecords => "DR",
            Subscription::Interrupts => "EI",
        }
    }
}

/// Parsed gclib-style open string: `<host>[:port] [-s ALL]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenString {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Requested unsolicited traffic, if any
    pub subscription: Option<Subscription>,
}

impl OpenString {
    /// The string used by the adapter for a controller address: `"<address> -s ALL"`.
    pub fn for_address(address: &str) -> String {
        format!("{} -s ALL", address.trim())
    }

    /// Parse an open string.
    pub fn parse(text: &str) -> AppResult<Self> {
        let mut tokens = text.split_whitespace();
        let target = tokens.next().ok_or_else(|| {
            WavefinderError::Configuration("Open string has no controller address".into())
        })?;

        let (host, port) = match target.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    WavefinderError::Configuration(format!("Invalid port in '{target}'"))
                })?;
                (host.to_string(), port)
            }
            None => (target.to_string(), DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(WavefinderError::Configuration(format!(
                "Invalid controller address '{target}'"
            )));
        }

        let mut subscription = None;
        while let Some(option) = tokens.next() {
            match option {
                "-s" | "--subscribe" => {
                    let value = tokens.next().ok_or_else(|| {
                        WavefinderError::Configuration(format!("Option '{option}' needs a value"))
                    })?;
                    subscription = Some(Subscription::parse(value).ok_or_else(|| {
                        WavefinderError::Configuration(format!(
                            "Unknown subscription '{value}' (expected ALL, NONE, MG, DR or EI)"
                        ))
                    })?);
                }
                other => {
                    return Err(WavefinderError::Configuration(format!(
                        "Unsupported open option '{other}'"
                    )))
                }
            }
        }

        Ok(Self {
            host,
            port,
            subscription,
        })
    }

    /// `host:port` for socket connection
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for OpenString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_PORT {
            write!(f, "{}", self.host)?;
        } else {
            write!(f, "{}:{}", self.host, self.port)?;
        }
        if let Some(sub) = self.subscription {
            write!(f, " -s {}", sub.as_str())?;
        }
        Ok(())
    }
}

/// One framed controller reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command accepted; trimmed reply data (may be empty)
    Accepted(String),
    /// Command rejected with `?`
    Rejected,
}

/// Drop unsolicited bytes (high bit set) from a received chunk.
pub fn strip_unsolicited(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().copied().filter(|b| *b < 0x80).collect()
}

/// Frame the first complete reply in `buffer`.
///
/// Returns the reply and the number of bytes it consumed, or `None` when more
/// bytes are needed.
pub fn parse_reply(buffer: &[u8]) -> Option<(Reply, usize)> {
    let end = buffer.iter().position(|b| *b == b':' || *b == b'?')?;
    let reply = if buffer[end] == b'?' {
        Reply::Rejected
    } else {
        Reply::Accepted(String::from_utf8_lossy(&buffer[..end]).trim().to_string())
    };
    Some((reply, end + 1))
}

/// Split a `TC1` reply (`"1 Unrecognized command"`) into code and text.
pub fn parse_error_code(reply: &str) -> (u16, String) {
    let reply = reply.trim();
    match reply.split_once(char::is_whitespace) {
        Some((code, message)) => match code.parse() {
            Ok(code) => (code, message.trim().to_string()),
            Err(_) => (0, reply.to_string()),
        },
        None => (reply.parse().unwrap_or(0), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_string_for_address() {
        assert_eq!(OpenString::for_address("192.168.1.19"), "192.168.1.19 -s ALL");
    }

    #[test]
    fn test_parse_open_string() {
        let open = OpenString::parse("192.168.1.19 -s ALL").unwrap();
        assert_eq!(open.host, "192.168.1.19");
        assert_eq!(open.port, DEFAULT_PORT);
        assert_eq!(open.subscription, Some(Subscription::All));
        assert_eq!(open.to_string(), "192.168.1.19 -s ALL");

        let open = OpenString::parse("localhost:5023").unwrap();
        assert_eq!(open.socket_address(), "localhost:5023");
        assert_eq!(open.subscription, None);
    }

    #[test]
    fn test_parse_open_string_errors() {
        assert!(OpenString::parse("").is_err());
        assert!(OpenString::parse("10.0.0.1 -s").is_err());
        assert!(OpenString::parse("10.0.0.1 -s SOME").is_err());
        assert!(OpenString::parse("10.0.0.1 -d").is_err());
        assert!(OpenString::parse("10.0.0.1:http").is_err());
    }

    #[test]
    fn test_parse_reply_accepted() {
        let (reply, used) = parse_reply(b" 1234\r\n:").unwrap();
        assert_eq!(reply, Reply::Accepted("1234".into()));
        assert_eq!(used, 8);

        let (reply, _) = parse_reply(b":").unwrap();
        assert_eq!(reply, Reply::Accepted(String::new()));
    }

    #[test]
    fn test_parse_reply_rejected_and_partial() {
        assert_eq!(parse_reply(b"?").unwrap(), (Reply::Rejected, 1));
        assert!(parse_reply(b" 12").is_none());
    }

    #[test]
    fn test_strip_unsolicited() {
        let mut chunk = vec![b' ', b'5'];
        chunk.extend("hi".bytes().map(|b| b | 0x80));
        chunk.push(b':');
        assert_eq!(strip_unsolicited(&chunk), b" 5:".to_vec());
    }

    #[test]
    fn test_parse_error_code() {
        assert_eq!(
            parse_error_code(" 1 Unrecognized command\r\n"),
            (1, "Unrecognized command".to_string())
        );
        assert_eq!(parse_error_code("57"), (57, String::new()));
        assert_eq!(parse_error_code("oops"), (0, "oops".to_string()));
    }
}
