//! Tracing subscriber setup for the binary
//!
//! `RUST_LOG` takes precedence over the configured level. Without it, our own
//! crate logs at the configured level and dependencies (egui, winit, wgpu)
//! only at `warn`.

use crate::error::{AppResult, WavefinderError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter directive used when `RUST_LOG` is not set
pub fn default_filter(level: &str) -> String {
    format!("warn,wavefinder={level}")
}

fn env_filter(level: &str) -> AppResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_filter(level)).map_err(|e| {
            WavefinderError::Configuration(format!("Invalid log level '{level}': {e}"))
        }),
    }
}

/// Install the global subscriber.
///
/// A subscriber that is already installed (as in tests) is left in place.
pub fn init(level: &str, json: bool) -> AppResult<()> {
    let filter = env_filter(level)?;
    let layer = if json {
        fmt::layer()
            .json()
            .with_thread_names(true)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .or_else(|e| {
            if e.to_string().contains("already been set") {
                Ok(())
            } else {
                Err(WavefinderError::Configuration(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        })
}
