//! Galil multi-axis motion controller adapter
//!
//! [`GalilAdapter`] owns one controller connection and the set of named axes
//! that answered the discovery probe at construction time.
//!
//! ## Discovery
//!
//! Every configured `(name, channel)` pair is probed with `TP<channel>` in
//! configuration order. Each probe is isolated:
//!
//! | probe result               | outcome                | construction |
//! |----------------------------|------------------------|--------------|
//! | reply accepted             | `Present`, axis added  | continues    |
//! | command rejected (`?`)     | `NotFound`             | continues    |
//! | timeout / unparsable reply | `Failed`               | continues    |
//! | invalid channel letter     | `Failed`               | continues    |
//! | any other error            | -                      | aborts       |
//!
//! Opening the connection happens before any probe; if it fails nothing is probed.

mod axis;
mod connection;

pub use axis::GalilAxis;
pub use connection::GalilConnection;

use crate::config::is_valid_channel;
use crate::cyclic::{Cyclic, UpdateLoop};
use crate::error::{AppResult, WavefinderError};
use crate::transport::{Connector, OpenString};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of probing one configured axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Channel answered; the axis is in the registry
    Present,
    /// Controller has no such channel
    NotFound,
    /// Probe failed for another expected reason
    Failed(String),
}

/// Discovery record for one configured axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisDiscovery {
    /// Configured axis name
    pub name: String,
    /// Configured channel
    pub channel: String,
    /// What the probe found
    pub outcome: DiscoveryOutcome,
}

/// Name → axis mapping, kept in discovery order
#[derive(Debug, Clone, Default)]
pub struct AxisRegistry {
    axes: Vec<GalilAxis>,
}

impl AxisRegistry {
    /// Add an axis; returns false (and keeps the first) if the name is taken.
    fn insert(&mut self, axis: GalilAxis) -> bool {
        if self.contains(axis.name()) {
            return false;
        }
        self.axes.push(axis);
        true
    }

    /// Axis by name
    pub fn get(&self, name: &str) -> Option<&GalilAxis> {
        self.axes.iter().find(|a| a.name() == name)
    }

    /// Whether an axis with this name was discovered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names in discovery order
    pub fn names(&self) -> Vec<&str> {
        self.axes.iter().map(GalilAxis::name).collect()
    }

    /// Axes in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &GalilAxis> {
        self.axes.iter()
    }

    /// Number of discovered axes
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    /// True when no axis was discovered
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

/// Interface adapter between the application and one Galil controller
#[derive(Debug)]
pub struct GalilAdapter {
    address: String,
    connection: GalilConnection,
    axes: AxisRegistry,
    discovery: Vec<AxisDiscovery>,
}

impl GalilAdapter {
    /// Connect to the controller at `address` and discover the named axes.
    ///
    /// # Arguments
    /// * `connector` - opens the transport (TCP for hardware, mock in tests)
    /// * `address` - controller address, e.g. `"192.168.1.19"`
    /// * `axis_names` - `(name, channel)` pairs, e.g.
    ///   `[("gimbal 1 elevation", "A"), ("gimbal 2 azimuth", "D")]`
    ///
    /// # Errors
    /// Fails if the connection cannot be opened, or if a probe fails in a way
    /// that is not specific to its axis (e.g. the connection drops).
    pub async fn connect<C>(
        connector: &C,
        address: &str,
        axis_names: &[(String, String)],
    ) -> AppResult<Self>
    where
        C: Connector + ?Sized,
    {
        let open_string = OpenString::parse(&OpenString::for_address(address))?;

        info!(address, "Connecting to Galil controller");
        let transport = connector.open(&open_string).await?;
        let connection = GalilConnection::new(address, transport);
        info!(address, "Galil controller connected");

        let mut axes = AxisRegistry::default();
        let mut discovery = Vec::with_capacity(axis_names.len());
        for (name, channel) in axis_names {
            let outcome = probe_axis(&connection, name, channel).await?;
            if outcome == DiscoveryOutcome::Present {
                let axis = GalilAxis::new(name, channel, connection.clone())?;
                if !axes.insert(axis) {
                    warn!(axis = %name, "Duplicate axis name, keeping the first");
                }
            }
            discovery.push(AxisDiscovery {
                name: name.clone(),
                channel: channel.clone(),
                outcome,
            });
        }

        info!(
            address,
            found = axes.len(),
            configured = axis_names.len(),
            "Galil axis discovery complete"
        );

        Ok(Self {
            address: address.to_string(),
            connection,
            axes,
            discovery,
        })
    }

    /// Controller address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Shared connection used by every axis
    pub fn connection(&self) -> &GalilConnection {
        &self.connection
    }

    /// Discovered axes
    pub fn axes(&self) -> &AxisRegistry {
        &self.axes
    }

    /// Discovered axis by name
    pub fn axis(&self, name: &str) -> Option<&GalilAxis> {
        self.axes.get(name)
    }

    /// Per-axis probe results, in configuration order
    pub fn discovery(&self) -> &[AxisDiscovery] {
        &self.discovery
    }

    /// Drive [`Cyclic::update`] at `interval` until the returned loop is stopped.
    pub fn update_loop(self: &Arc<Self>, interval: Duration) -> UpdateLoop {
        UpdateLoop::spawn(format!("galil {}", self.address), Arc::clone(self), interval)
    }

    /// Close the controller connection.
    pub async fn disconnect(&self) -> AppResult<()> {
        info!(address = %self.address, "Disconnecting Galil controller");
        self.connection.close().await
    }
}

#[async_trait]
impl Cyclic for GalilAdapter {
    /// Adapter-level refresh; per-axis state is read by the panels.
    async fn update(&self) -> AppResult<()> {
        Ok(())
    }
}

async fn probe_axis(
    connection: &GalilConnection,
    name: &str,
    channel: &str,
) -> AppResult<DiscoveryOutcome> {
    if !is_valid_channel(channel) {
        warn!(axis = name, channel, "Invalid channel, axis skipped");
        return Ok(DiscoveryOutcome::Failed(format!("invalid channel '{channel}'")));
    }

    match connection.command_f64(&format!("TP{channel}")).await {
        Ok(_) => {
            info!(axis = name, channel, "Axis found");
            Ok(DiscoveryOutcome::Present)
        }
        Err(WavefinderError::CommandRejected { .. }) => {
            info!(axis = name, channel, "Axis not found");
            Ok(DiscoveryOutcome::NotFound)
        }
        Err(e) if e.is_per_axis() => {
            warn!(axis = name, channel, error = %e, "Axis probe failed, axis skipped");
            Ok(DiscoveryOutcome::Failed(e.to_string()))
        }
        Err(e) => Err(e),
    }
}
