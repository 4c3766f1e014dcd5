//! Monochromator capability surface
//!
//! The panel talks to a monochromator only through [`Monochromator`]: cached
//! fields that are cheap to read every tick, and async calls that go to the
//! device. [`SimulatedMonochromator`] implements it for `--simulate` runs and
//! for tests.

use crate::config::MonochromatorConfig;
use crate::error::{AppResult, WavefinderError};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Device status as reported by the monochromator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum MonochromatorStatus {
    /// Idle and healthy
    #[default]
    Ok = 0,
    /// Executing a command
    Busy = 1,
    /// Faulted
    Error = 2,
}

impl MonochromatorStatus {
    /// Number of status codes; display tables are sized by this.
    pub const COUNT: usize = 3;

    /// Every status, in code order
    pub const ALL: [MonochromatorStatus; Self::COUNT] = [
        MonochromatorStatus::Ok,
        MonochromatorStatus::Busy,
        MonochromatorStatus::Error,
    ];

    /// Numeric status code, also the display table index
    pub fn code(self) -> usize {
        self as usize
    }

    /// Status for a numeric code
    pub fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }
}

/// What the monochromator panel needs from a device.
#[async_trait]
pub trait Monochromator: Send + Sync {
    /// Last known status (no device round-trip)
    fn status(&self) -> MonochromatorStatus;

    /// Last known wavelength in nm (no device round-trip)
    fn current_wavelength(&self) -> f64;

    /// Wavelength the operator asked for, in nm
    fn target_wavelength(&self) -> f64;

    /// Record a new target wavelength in nm
    fn set_target_wavelength(&self, nm: f64);

    /// Read the serial number; `0` means the device did not report one
    async fn get_sn(&self) -> AppResult<u32>;

    /// Read the wavelength from the device, refreshing the cached value
    async fn get_current_wavelength(&self) -> AppResult<f64>;

    /// Move one step towards longer wavelengths
    async fn step_up(&self) -> AppResult<()>;

    /// Move one step towards shorter wavelengths
    async fn step_down(&self) -> AppResult<()>;
}

#[derive(Debug)]
struct SimState {
    status: MonochromatorStatus,
    current_nm: f64,
    target_nm: f64,
    steps_in_flight: usize,
}

/// In-process monochromator with configurable step size and latency
#[derive(Debug)]
pub struct SimulatedMonochromator {
    serial: u32,
    step_nm: f64,
    latency: Duration,
    state: Mutex<SimState>,
}

impl SimulatedMonochromator {
    /// New device idle at `initial_nm`
    pub fn new(serial: u32, initial_nm: f64, step_nm: f64) -> Self {
        Self {
            serial,
            step_nm,
            latency: Duration::from_millis(50),
            state: Mutex::new(SimState {
                status: MonochromatorStatus::Ok,
                current_nm: initial_nm,
                target_nm: initial_nm,
                steps_in_flight: 0,
            }),
        }
    }

    /// Build from the `[monochromator]` configuration section
    pub fn from_config(config: &MonochromatorConfig) -> Self {
        Self::new(
            config.serial_number,
            config.initial_wavelength_nm,
            config.step_nm,
        )
    }

    /// Set the simulated time every device call takes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Force a status, e.g. to show a fault
    pub fn set_status(&self, status: MonochromatorStatus) {
        self.lock().status = status;
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn step(&self, delta_nm: f64) -> AppResult<()> {
        {
            let mut state = self.lock();
            if state.status == MonochromatorStatus::Error {
                return Err(WavefinderError::Instrument(
                    "monochromator is faulted".into(),
                ));
            }
            state.status = MonochromatorStatus::Busy;
            state.steps_in_flight += 1;
        }
        let busy = BusyGuard(self);
        tokio::time::sleep(self.latency).await;
        {
            let mut state = self.lock();
            state.current_nm += delta_nm;
            debug!(wavelength_nm = state.current_nm, "simulated monochromator stepped");
        }
        drop(busy);
        Ok(())
    }
}

/// Ends one step, finished or cancelled; the last one returns the device to `Ok`.
struct BusyGuard<'a>(&'a SimulatedMonochromator);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.steps_in_flight = state.steps_in_flight.saturating_sub(1);
        if state.steps_in_flight == 0 && state.status == MonochromatorStatus::Busy {
            state.status = MonochromatorStatus::Ok;
        }
    }
}

#[async_trait]
impl Monochromator for SimulatedMonochromator {
    fn status(&self) -> MonochromatorStatus {
        self.lock().status
    }

    fn current_wavelength(&self) -> f64 {
        self.lock().current_nm
    }

    fn target_wavelength(&self) -> f64 {
        self.lock().target_nm
    }

    fn set_target_wavelength(&self, nm: f64) {
        self.lock().target_nm = nm;
    }

    async fn get_sn(&self) -> AppResult<u32> {
        tokio::time::sleep(self.latency).await;
        Ok(self.serial)
    }

    async fn get_current_wavelength(&self) -> AppResult<f64> {
        tokio::time::sleep(self.latency).await;
        Ok(self.lock().current_nm)
    }

    async fn step_up(&self) -> AppResult<()> {
        self.step(self.step_nm).await
    }

    async fn step_down(&self) -> AppResult<()> {
        self.step(-self.step_nm).await
    }
}
