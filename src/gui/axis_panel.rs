//! Gimbal axis panel

use super::JogDirection;
use crate::config::GimbalConfig;
use crate::cyclic::{Cyclic, UpdateLoop};
use crate::error::{AppResult, WavefinderError};
use crate::hardware::{GalilAdapter, GalilAxis};
use crate::tasks::TaskSet;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Displayed state of one axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisView {
    /// Axis name
    pub name: String,
    /// Controller channel
    pub channel: char,
    /// Last read position in counts; `None` when the last read failed
    pub position: Option<i64>,
    /// Motion in progress; `None` when the last read failed
    pub moving: Option<bool>,
}

enum Action {
    Jog(String, JogDirection),
    Stop(String),
}

/// Jog and stop controls for the discovered gimbal axes
pub struct AxisPanel {
    config: GimbalConfig,
    axes: Vec<GalilAxis>,
    tasks: TaskSet,
    views: Mutex<Vec<AxisView>>,
}

impl AxisPanel {
    /// Panel for `axes`, in the given order.
    pub fn new(config: GimbalConfig, axes: Vec<GalilAxis>, runtime: Handle) -> Self {
        let views = axes
            .iter()
            .map(|axis| AxisView {
                name: axis.name().to_string(),
                channel: axis.channel(),
                position: None,
                moving: None,
            })
            .collect();
        Self {
            config,
            axes,
            tasks: TaskSet::new("gimbal", runtime),
            views: Mutex::new(views),
        }
    }

    /// Panel for every axis the adapter discovered
    pub fn from_adapter(config: GimbalConfig, adapter: &GalilAdapter, runtime: Handle) -> Self {
        Self::new(config, adapter.axes().iter().cloned().collect(), runtime)
    }

    /// Snapshot of the displayed state
    pub fn views(&self) -> Vec<AxisView> {
        self.lock_views().clone()
    }

    /// Move `axis` one jog step in `direction`.
    pub fn jog(&self, axis: &str, direction: JogDirection) -> AppResult<()> {
        let counts = self.config.jog_step_counts * direction.sign();
        let target = self.find(axis)?.clone();
        self.spawn(format!("jog {axis} {counts}"), async move {
            target.move_relative(counts).await
        })
    }

    /// Stop `axis`.
    pub fn stop(&self, axis: &str) -> AppResult<()> {
        let target = self.find(axis)?.clone();
        self.spawn(format!("stop {axis}"), async move { target.stop().await })
    }

    /// Commands still running
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel running commands and wait for them; returns how many were cancelled.
    pub async fn close(&self) -> usize {
        self.tasks.close().await
    }

    /// Refresh this panel at the configured interval.
    pub fn update_loop(self: &Arc<Self>) -> UpdateLoop {
        UpdateLoop::spawn("gimbal panel", Arc::clone(self), self.config.update_interval())
    }

    /// Draw the panel.
    pub fn ui(&self, ui: &mut egui::Ui) {
        ui.heading("Gimbal");
        ui.separator();

        let views = self.views();
        if views.is_empty() {
            ui.colored_label(egui::Color32::GRAY, "No gimbal axes discovered");
            return;
        }

        let mut actions = Vec::new();
        egui::Grid::new("gimbal_grid")
            .num_columns(5)
            .spacing([10.0, 8.0])
            .striped(true)
            .show(ui, |ui| {
                for view in &views {
                    ui.label(format!("{} ({})", view.name, view.channel));
                    match view.position {
                        Some(counts) => ui.monospace(counts.to_string()),
                        None => ui.colored_label(egui::Color32::RED, "unavailable"),
                    };
                    match view.moving {
                        Some(true) => ui.colored_label(egui::Color32::YELLOW, "● Moving"),
                        Some(false) => ui.colored_label(egui::Color32::GREEN, "● Idle"),
                        None => ui.colored_label(egui::Color32::GRAY, "●"),
                    };
                    ui.horizontal(|ui| {
                        for direction in [JogDirection::Down, JogDirection::Up] {
                            if ui.button(direction.symbol()).clicked() {
                                actions.push(Action::Jog(view.name.clone(), direction));
                            }
                        }
                    });
                    if ui.button("Stop").clicked() {
                        actions.push(Action::Stop(view.name.clone()));
                    }
                    ui.end_row();
                }
            });

        for action in actions {
            // unknown axes are logged by find, refused commands by spawn
            let _ = match action {
                Action::Jog(axis, direction) => self.jog(&axis, direction),
                Action::Stop(axis) => self.stop(&axis),
            };
        }
    }

    fn find(&self, name: &str) -> AppResult<&GalilAxis> {
        self.axes.iter().find(|axis| axis.name() == name).ok_or_else(|| {
            warn!(axis = name, "Unknown gimbal axis");
            WavefinderError::Instrument(format!("Unknown gimbal axis '{name}'"))
        })
    }

    fn spawn<F>(&self, label: String, future: F) -> AppResult<()>
    where
        F: std::future::Future<Output = AppResult<()>> + Send + 'static,
    {
        let result = self.tasks.spawn(label, future);
        if let Err(e) = &result {
            warn!(error = %e, "Gimbal command refused");
        }
        result
    }

    fn lock_views(&self) -> MutexGuard<'_, Vec<AxisView>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn read_axis(axis: &GalilAxis) -> AppResult<(i64, bool)> {
    let position = axis.position().await?;
    let moving = axis.is_moving().await?;
    Ok((position, moving))
}

#[async_trait]
impl Cyclic for AxisPanel {
    /// Read every axis; fails only when no axis could be read.
    async fn update(&self) -> AppResult<()> {
        if self.axes.is_empty() {
            return Ok(());
        }

        let readings = futures::future::join_all(self.axes.iter().map(read_axis)).await;

        let mut last_error = None;
        let mut failed = 0;
        {
            let mut views = self.lock_views();
            for (view, reading) in views.iter_mut().zip(readings) {
                match reading {
                    Ok((position, moving)) => {
                        view.position = Some(position);
                        view.moving = Some(moving);
                    }
                    Err(e) => {
                        debug!(axis = %view.name, error = %e, "Axis read failed");
                        view.position = None;
                        view.moving = None;
                        failed += 1;
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) if failed == self.axes.len() => Err(WavefinderError::Instrument(format!(
                "No gimbal axis could be read: {e}"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::GalilConnection;
    use crate::transport::{MockReply, MockTransport};
    use std::time::Duration;

    fn panel(mock: &MockTransport, axes: &[(&str, &str)]) -> AxisPanel {
        let conn = GalilConnection::new("10.0.0.1", Box::new(mock.clone()));
        let axes = axes
            .iter()
            .map(|(name, ch)| GalilAxis::new(name, ch, conn.clone()).unwrap())
            .collect();
        let config = GimbalConfig {
            jog_step_counts: 250,
            ..Default::default()
        };
        AxisPanel::new(config, axes, Handle::current())
    }

    #[tokio::test]
    async fn test_update_reads_every_axis() {
        let mock = MockTransport::with_axes("AB");
        mock.set_position('B', 1200);
        mock.script("MG _BGB", MockReply::Data("1.0000".into()));
        let panel = panel(&mock, &[("elevation", "A"), ("azimuth", "B")]);

        panel.update().await.unwrap();
        let views = panel.views();
        assert_eq!(views[0].position, Some(0));
        assert_eq!(views[0].moving, Some(false));
        assert_eq!(views[1].position, Some(1200));
        assert_eq!(views[1].moving, Some(true));
    }

    #[tokio::test]
    async fn test_one_failing_axis_does_not_hide_others() {
        let mock = MockTransport::with_axes("AB");
        mock.script("TPA", MockReply::Reject(1, "Unrecognized command".into()));
        let panel = panel(&mock, &[("elevation", "A"), ("azimuth", "B")]);

        panel.update().await.unwrap();
        let views = panel.views();
        assert_eq!(views[0].position, None);
        assert_eq!(views[1].position, Some(0));
    }

    #[tokio::test]
    async fn test_all_axes_failing_is_an_error() {
        let mock = MockTransport::with_axes("A");
        mock.script("TPA", MockReply::Garbage);
        let panel = panel(&mock, &[("elevation", "A")]);
        assert!(panel.update().await.is_err());
    }

    #[tokio::test]
    async fn test_jog_moves_by_configured_step() {
        let mock = MockTransport::with_axes("A");
        let panel = panel(&mock, &[("elevation", "A")]);

        panel.jog("elevation", JogDirection::Up).unwrap();
        panel.jog("elevation", JogDirection::Down).unwrap();
        panel.jog("elevation", JogDirection::Down).unwrap();
        while panel.pending_tasks() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(mock.position('A'), Some(-250));
        assert!(panel.jog("roll", JogDirection::Up).is_err());
    }

    #[tokio::test]
    async fn test_stop_sends_stop_command() {
        let mock = MockTransport::with_axes("C");
        let panel = panel(&mock, &[("roll", "C")]);
        panel.stop("roll").unwrap();
        while panel.pending_tasks() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(mock.call_log(), vec!["STC"]);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_unknown_axis_is_logged() {
        let mock = MockTransport::with_axes("A");
        let panel = panel(&mock, &[("elevation", "A")]);

        assert!(matches!(
            panel.jog("roll", JogDirection::Up),
            Err(WavefinderError::Instrument(_))
        ));
        assert!(panel.stop("pitch").is_err());
        assert!(logs_contain("Unknown gimbal axis"));
        assert!(logs_contain("roll"));
        assert!(logs_contain("pitch"));
        assert!(mock.call_log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_moves() {
        let mock = MockTransport::with_axes("A").with_latency(Duration::from_secs(5));
        let panel = panel(&mock, &[("elevation", "A")]);

        panel.jog("elevation", JogDirection::Up).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(panel.close().await, 1);
        assert_eq!(mock.position('A'), Some(0));
        assert!(panel.stop("elevation").is_err());
    }
}
