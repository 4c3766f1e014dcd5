//! Mock controller transport for testing and simulation
//!
//! This transport simulates a Galil controller without hardware. It provides:
//! - Channel-aware simulation of position, relative/absolute moves and stop
//! - Scripted replies for individual commands
//! - Simulated latency
//! - Controllable failure injection
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep one handle while the adapter owns
//! another.

use super::{Connector, OpenString, Transport};
use crate::error::{AppResult, WavefinderError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Most recent commands kept in the call log
pub const CALL_LOG_CAPACITY: usize = 256;

/// Scripted answer for one command
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Accept with this reply data
    Data(String),
    /// Reject as the controller would (`?`), with this code and message
    Reject(u16, String),
    /// Never answer within the timeout
    Timeout,
    /// Answer with data that does not parse as a number
    Garbage,
}

/// Failure to inject on the next command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Next command times out
    Timeout,
    /// Next command fails with a broken connection
    Disconnect,
}

#[derive(Debug, Default)]
struct SimAxis {
    position: i64,
    pending: Option<Motion>,
    speed: u32,
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    Relative(i64),
    Absolute(i64),
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    latency: Duration,
    axes: BTreeMap<char, SimAxis>,
    scripted: HashMap<String, MockReply>,
    next_failure: Option<MockFailure>,
    call_log: VecDeque<String>,
}

/// Mock controller transport
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a connected mock with no axes.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..Default::default()
            })),
        }
    }

    /// Create a mock whose controller has the given channels, e.g. `"ABD"`.
    pub fn with_axes(channels: &str) -> Self {
        let mock = Self::new();
        {
            let mut state = mock.lock();
            for ch in channels.chars() {
                state.axes.insert(ch, SimAxis::default());
            }
        }
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set simulated latency per command
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Script the reply to an exact command string
    pub fn script(&self, command: &str, reply: MockReply) {
        self.lock().scripted.insert(command.to_string(), reply);
    }

    /// Inject a failure for the next command
    pub fn inject_next_failure(&self, failure: MockFailure) {
        self.lock().next_failure = Some(failure);
    }

    /// Simulated encoder position of a channel
    pub fn position(&self, channel: char) -> Option<i64> {
        self.lock().axes.get(&channel).map(|a| a.position)
    }

    /// Move a simulated axis directly (as if pushed by hand)
    pub fn set_position(&self, channel: char, position: i64) {
        if let Some(axis) = self.lock().axes.get_mut(&channel) {
            axis.position = position;
        }
    }

    /// Whether the transport is open
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Get the call log, oldest first.
    ///
    /// Only the last [`CALL_LOG_CAPACITY`] commands are kept.
    pub fn call_log(&self) -> Vec<String> {
        self.lock().call_log.iter().cloned().collect()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        self.lock().call_log.clear();
    }

    fn simulate(state: &mut MockState, command: &str) -> AppResult<String> {
        if let Some(reply) = state.scripted.get(command) {
            return match reply {
                MockReply::Data(data) => Ok(data.clone()),
                MockReply::Reject(code, message) => Err(rejected(command, *code, message)),
                MockReply::Timeout => Err(WavefinderError::Timeout {
                    command: command.to_string(),
                }),
                MockReply::Garbage => Ok("#?!".to_string()),
            };
        }

        let unrecognized = || rejected(command, 1, "Unrecognized command");

        // MG _BGx reports whether the axis is in motion
        if let Some(rest) = command.strip_prefix("MG _BG") {
            let ch = single_channel(rest).ok_or_else(unrecognized)?;
            return match state.axes.get(&ch) {
                Some(_) => Ok("0.0000".to_string()),
                None => Err(unrecognized()),
            };
        }

        if command.len() < 3 || !command.is_char_boundary(2) {
            return Err(unrecognized());
        }
        let (opcode, rest) = command.split_at(2);
        let (channel, argument) = match rest.split_once('=') {
            Some((ch, arg)) => (ch, Some(arg)),
            None => (rest, None),
        };
        let ch = single_channel(channel).ok_or_else(unrecognized)?;
        let axis = state.axes.get_mut(&ch).ok_or_else(unrecognized)?;
        let number = || {
            argument
                .and_then(|a| a.trim().parse::<i64>().ok())
                .ok_or_else(|| rejected(command, 2, "Bad argument"))
        };

        match opcode {
            "TP" if argument.is_none() => Ok(axis.position.to_string()),
            "PR" => {
                axis.pending = Some(Motion::Relative(number()?));
                Ok(String::new())
            }
            "PA" => {
                axis.pending = Some(Motion::Absolute(number()?));
                Ok(String::new())
            }
            "SP" => {
                axis.speed = u32::try_from(number()?)
                    .map_err(|_| rejected(command, 2, "Bad argument"))?;
                Ok(String::new())
            }
            "BG" if argument.is_none() => {
                // moves complete instantly in simulation
                match axis.pending.take() {
                    Some(Motion::Relative(delta)) => axis.position += delta,
                    Some(Motion::Absolute(target)) => axis.position = target,
                    None => {}
                }
                Ok(String::new())
            }
            "ST" if argument.is_none() => {
                axis.pending = None;
                Ok(String::new())
            }
            _ => Err(unrecognized()),
        }
    }
}

fn single_channel(text: &str) -> Option<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

fn rejected(command: &str, code: u16, message: &str) -> WavefinderError {
    WavefinderError::CommandRejected {
        command: command.to_string(),
        code,
        message: message.to_string(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn command(&mut self, command: &str) -> AppResult<String> {
        let latency = {
            let mut state = self.lock();
            if state.call_log.len() == CALL_LOG_CAPACITY {
                state.call_log.pop_front();
            }
            state.call_log.push_back(command.to_string());
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if !state.connected {
            return Err(WavefinderError::NotConnected);
        }
        match state.next_failure.take() {
            Some(MockFailure::Timeout) => Err(WavefinderError::Timeout {
                command: command.to_string(),
            }),
            Some(MockFailure::Disconnect) => {
                state.connected = false;
                Err(WavefinderError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "mock connection reset",
                )))
            }
            None => Self::simulate(&mut state, command),
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        self.lock().connected = false;
        Ok(())
    }
}

/// Connector handing out clones of one [`MockTransport`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    transport: MockTransport,
    refuse: Option<String>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    /// Connector that always opens `transport`
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            refuse: None,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connector whose open attempts all fail with `reason`
    pub fn refusing(transport: MockTransport, reason: &str) -> Self {
        Self {
            refuse: Some(reason.to_string()),
            ..Self::new(transport)
        }
    }

    /// Open strings seen so far
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, open_string: &OpenString) -> AppResult<Box<dyn Transport>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(open_string.to_string());
        match &self.refuse {
            Some(reason) => Err(WavefinderError::ConnectionFailed {
                address: open_string.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(Box::new(self.transport.clone())),
        }
    }
}
