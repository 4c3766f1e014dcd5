//! Galil ASCII protocol over TCP
//!
//! Replaces the vendor gclib connection with a plain socket speaking the
//! controller's command port protocol. Rejected commands are followed by a
//! `TC1` query so the error carries the controller's own code and message.

use super::{
    parse_error_code, parse_reply, strip_unsolicited, Connector, OpenString, Reply, Transport,
};
use crate::error::{AppResult, WavefinderError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// TCP transport to a Galil controller
pub struct TcpTransport {
    name: String,
    stream: Option<TcpStream>,
    timeout: Duration,
    pending: Vec<u8>,
    /// Replies the controller still owes for abandoned commands
    owed: usize,
}

impl TcpTransport {
    /// Connect to the controller named by `open_string`.
    ///
    /// Both the socket connect and every later command are bounded by `timeout`.
    pub async fn open(open_string: &OpenString, timeout: Duration) -> AppResult<Self> {
        let socket = open_string.socket_address();
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&socket))
            .await
            .map_err(|_| WavefinderError::ConnectionFailed {
                address: open_string.to_string(),
                reason: format!("no answer within {} ms", timeout.as_millis()),
            })?
            .map_err(|e| WavefinderError::ConnectionFailed {
                address: open_string.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        debug!(address = %socket, "Galil TCP connection open");
        Ok(Self {
            name: format!("tcp {socket}"),
            stream: Some(stream),
            timeout,
            pending: Vec::new(),
            owed: 0,
        })
    }

    /// Write `command` and read its reply.
    ///
    /// Replies still owed to commands that timed out or were cancelled
    /// after their write are read and discarded first, so every reply is
    /// matched to the command that caused it.
    async fn exchange(&mut self, command: &str) -> AppResult<Reply> {
        while self.owed > 0 {
            let late = self.read_reply().await?;
            self.owed -= 1;
            debug!(transport = %self.name, reply = ?late, "Discarded late reply");
        }

        let stream = self.stream.as_mut().ok_or(WavefinderError::NotConnected)?;
        stream.write_all(format!("{command}\r").as_bytes()).await?;
        self.owed += 1;

        let reply = self.read_reply().await?;
        self.owed -= 1;
        Ok(reply)
    }

    async fn read_reply(&mut self) -> AppResult<Reply> {
        let mut chunk = [0u8; 512];
        loop {
            if let Some((reply, used)) = parse_reply(&self.pending) {
                self.pending.drain(..used);
                return Ok(reply);
            }
            let stream = self.stream.as_mut().ok_or(WavefinderError::NotConnected)?;
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                self.stream = None;
                self.owed = 0;
                self.pending.clear();
                return Err(WavefinderError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "controller closed the connection",
                )));
            }
            self.pending.extend(strip_unsolicited(&chunk[..read]));
        }
    }

    async fn exchange_with_timeout(&mut self, command: &str) -> AppResult<Reply> {
        tokio::time::timeout(self.timeout, self.exchange(command))
            .await
            .map_err(|_| {
                debug!(transport = %self.name, command, owed = self.owed, "Reply overdue");
                WavefinderError::Timeout {
                    command: command.to_string(),
                }
            })?
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn command(&mut self, command: &str) -> AppResult<String> {
        trace!(transport = %self.name, command, "send");
        match self.exchange_with_timeout(command).await? {
            Reply::Accepted(data) => Ok(data),
            Reply::Rejected => {
                let (code, message) = match self.exchange_with_timeout("TC1").await {
                    Ok(Reply::Accepted(data)) => parse_error_code(&data),
                    _ => (0, "unknown error".to_string()),
                };
                Err(WavefinderError::CommandRejected {
                    command: command.to_string(),
                    code,
                    message,
                })
            }
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
            debug!(transport = %self.name, "Galil TCP connection closed");
        }
        Ok(())
    }
}

/// Opens [`TcpTransport`]s with a fixed timeout
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    /// Create a connector whose transports use `timeout` per command.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, open_string: &OpenString) -> AppResult<Box<dyn Transport>> {
        Ok(Box::new(TcpTransport::open(open_string, self.timeout).await?))
    }
}
