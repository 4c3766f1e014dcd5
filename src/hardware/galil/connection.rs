//! Shared controller connection

use crate::error::{AppResult, WavefinderError};
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

/// Cheaply clonable handle to one open controller transport.
///
/// All axes of a controller share the same handle; the mutex keeps exactly one
/// command in flight per controller.
#[derive(Clone)]
pub struct GalilConnection {
    address: Arc<str>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
}

impl GalilConnection {
    /// Wrap an open transport.
    pub fn new(address: &str, transport: Box<dyn Transport>) -> Self {
        Self {
            address: Arc::from(address),
            transport: Arc::new(Mutex::new(transport)),
        }
    }

    /// Controller address this connection was opened for
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one command and return its reply data.
    pub async fn command(&self, command: &str) -> AppResult<String> {
        let reply = self.transport.lock().await.command(command).await?;
        trace!(address = %self.address, command, reply = %reply, "galil command");
        Ok(reply)
    }

    /// Send a command whose reply is a single number.
    pub async fn command_f64(&self, command: &str) -> AppResult<f64> {
        let reply = self.command(command).await?;
        reply.trim().parse::<f64>().map_err(|_| {
            WavefinderError::Protocol(format!("Expected a number in reply to '{command}', got '{reply}'"))
        })
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> AppResult<()> {
        self.transport.lock().await.close().await
    }
}

impl fmt::Debug for GalilConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GalilConnection")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
