//! Core library for the wavefinder operator application.
//!
//! Wavefinder drives a monochromator and a set of gimbal axes on a Galil
//! motion controller. Each device is refreshed by its own
//! [`UpdateLoop`](cyclic::UpdateLoop) on a Tokio runtime, while the egui
//! panels in [`gui`] render the mirrored state and start device commands as
//! tracked tasks.
//!
//! ```text
//! UpdateLoop ──► Cyclic::update() ──► device query ──► panel view
//! button     ──► TaskSet::spawn() ──► device command
//! ```

pub mod config;
pub mod cyclic;
pub mod error;
pub mod gui;
pub mod hardware;
pub mod logging;
pub mod tasks;
pub mod transport;

pub use error::{AppResult, WavefinderError};
