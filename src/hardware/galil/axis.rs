//! Single controller channel

use super::GalilConnection;
use crate::config::is_valid_channel;
use crate::error::{AppResult, WavefinderError};
use tracing::{debug, info};

/// One motion channel (`A`..`H`) on a Galil controller.
///
/// Positions and distances are in encoder counts.
#[derive(Debug, Clone)]
pub struct GalilAxis {
    name: String,
    channel: char,
    connection: GalilConnection,
}

impl GalilAxis {
    /// Bind `name` to `channel` on an open connection.
    pub fn new(name: &str, channel: &str, connection: GalilConnection) -> AppResult<Self> {
        if !is_valid_channel(channel) {
            return Err(WavefinderError::Configuration(format!(
                "Invalid channel '{channel}' for axis '{name}'"
            )));
        }
        let channel = channel.chars().next().ok_or_else(|| {
            WavefinderError::Configuration(format!("Empty channel for axis '{name}'"))
        })?;
        Ok(Self {
            name: name.to_string(),
            channel,
            connection,
        })
    }

    /// Operator-facing name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel letter
    pub fn channel(&self) -> char {
        self.channel
    }

    /// Current encoder position (`TP`)
    pub async fn position(&self) -> AppResult<i64> {
        let counts = self
            .connection
            .command_f64(&format!("TP{}", self.channel))
            .await?;
        Ok(counts.round() as i64)
    }

    /// Whether a motion is in progress (`MG _BG`)
    pub async fn is_moving(&self) -> AppResult<bool> {
        let flag = self
            .connection
            .command_f64(&format!("MG _BG{}", self.channel))
            .await?;
        Ok(flag != 0.0)
    }

    /// Move by `counts` from the current position.
    pub async fn move_relative(&self, counts: i64) -> AppResult<()> {
        self.connection
            .command(&format!("PR{}={}", self.channel, counts))
            .await?;
        self.begin().await?;
        info!(axis = %self.name, counts, "relative move started");
        Ok(())
    }

    /// Move to an absolute position.
    pub async fn move_absolute(&self, position: i64) -> AppResult<()> {
        self.connection
            .command(&format!("PA{}={}", self.channel, position))
            .await?;
        self.begin().await?;
        info!(axis = %self.name, position, "absolute move started");
        Ok(())
    }

    /// Decelerate to a stop.
    pub async fn stop(&self) -> AppResult<()> {
        self.connection
            .command(&format!("ST{}", self.channel))
            .await?;
        info!(axis = %self.name, "stop");
        Ok(())
    }

    /// Set slew speed in counts per second.
    pub async fn set_speed(&self, counts_per_second: u32) -> AppResult<()> {
        self.connection
            .command(&format!("SP{}={}", self.channel, counts_per_second))
            .await?;
        debug!(axis = %self.name, counts_per_second, "speed set");
        Ok(())
    }

    async fn begin(&self) -> AppResult<()> {
        self.connection
            .command(&format!("BG{}", self.channel))
            .await
            .map(|_| ())
    }
}
