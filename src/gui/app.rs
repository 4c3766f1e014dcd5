//! Application window

use super::{AxisPanel, MonochromPanel};
use crate::config::AppConfig;
use crate::cyclic::UpdateLoop;
use crate::hardware::{GalilAdapter, Monochromator};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// `eframe` application hosting the instrument panels.
///
/// Owns the update loops; [`shutdown`](Self::shutdown) (also run on drop)
/// stops them, closes the panels and disconnects the controller.
pub struct WavefinderApp {
    title: String,
    runtime: Handle,
    monochromator: Arc<MonochromPanel>,
    gimbal: Option<Arc<AxisPanel>>,
    adapter: Option<Arc<GalilAdapter>>,
    loops: Vec<UpdateLoop>,
    repaint_interval: Duration,
    shut_down: bool,
}

impl WavefinderApp {
    /// Build the panels and start their update loops on `runtime`.
    ///
    /// `adapter` is `None` when no controller is configured; the gimbal panel
    /// is then omitted.
    pub fn start(
        config: &AppConfig,
        runtime: Handle,
        monochromator: Arc<dyn Monochromator>,
        adapter: Option<Arc<GalilAdapter>>,
    ) -> Self {
        let _context = runtime.enter();

        let mono_panel = Arc::new(MonochromPanel::new(
            config.monochromator.clone(),
            monochromator,
            runtime.clone(),
        ));
        let mut loops = vec![mono_panel.update_loop()];
        let mut repaint_interval = config.monochromator.update_interval();

        let gimbal = adapter.as_ref().map(|adapter| {
            let panel = Arc::new(AxisPanel::from_adapter(
                config.gimbal.clone(),
                adapter,
                runtime.clone(),
            ));
            loops.push(panel.update_loop());
            repaint_interval = repaint_interval.min(config.gimbal.update_interval());
            panel
        });

        if let (Some(adapter), Some(galil)) = (&adapter, &config.galil) {
            loops.push(adapter.update_loop(galil.update_interval()));
        }

        info!(loops = loops.len(), "Panels started");
        Self {
            title: config.application.name.clone(),
            runtime,
            monochromator: mono_panel,
            gimbal,
            adapter,
            loops,
            repaint_interval,
            shut_down: false,
        }
    }

    /// Monochromator panel
    pub fn monochromator(&self) -> &Arc<MonochromPanel> {
        &self.monochromator
    }

    /// Gimbal panel, when a controller is connected
    pub fn gimbal(&self) -> Option<&Arc<AxisPanel>> {
        self.gimbal.as_ref()
    }

    /// Number of update loops still running
    pub fn running_loops(&self) -> usize {
        self.loops.iter().filter(|l| l.is_running()).count()
    }

    /// Stop loops, close panels and disconnect. Safe to call more than once.
    ///
    /// Blocks the calling thread; must not be called from inside the runtime.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!("Shutting down");

        let loops = std::mem::take(&mut self.loops);
        let monochromator = Arc::clone(&self.monochromator);
        let gimbal = self.gimbal.clone();
        let adapter = self.adapter.clone();

        self.runtime.block_on(async move {
            for update_loop in loops {
                update_loop.stop().await;
            }
            monochromator.close().await;
            if let Some(gimbal) = gimbal {
                gimbal.close().await;
            }
            if let Some(adapter) = adapter {
                if let Err(e) = adapter.disconnect().await {
                    warn!(error = %e, "Controller disconnect failed");
                }
            }
        });
    }

    fn status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            match &self.adapter {
                Some(adapter) => {
                    ui.colored_label(egui::Color32::GREEN, "●");
                    ui.label(format!(
                        "Controller {} ({} axes)",
                        adapter.address(),
                        adapter.axes().len()
                    ));
                }
                None => {
                    ui.colored_label(egui::Color32::GRAY, "●");
                    ui.label("No controller configured");
                }
            }
        });
    }
}

impl eframe::App for WavefinderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| self.status_bar(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(egui::RichText::new(&self.title).small().weak());
            self.monochromator.ui(ui);
            if let Some(gimbal) = &self.gimbal {
                ui.add_space(16.0);
                gimbal.ui(ui);
            }
        });

        // panels change from the runtime, not from input
        ctx.request_repaint_after(self.repaint_interval);
    }
}

impl Drop for WavefinderApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AxisDefinition, GalilConfig};
    use crate::hardware::SimulatedMonochromator;
    use crate::transport::{MockConnector, MockTransport};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.galil = Some(GalilConfig {
            address: "10.0.0.1".into(),
            axes: vec![AxisDefinition {
                name: "elevation".into(),
                channel: "A".into(),
            }],
            timeout_ms: 1000,
            update_interval_ms: 1000,
        });
        config
    }

    #[test]
    fn test_start_and_shutdown() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let config = config();
        let mock = MockTransport::with_axes("A");
        let observer = mock.clone();

        let adapter = runtime
            .block_on(GalilAdapter::connect(
                &MockConnector::new(mock),
                "10.0.0.1",
                &config.galil.as_ref().unwrap().axis_names(),
            ))
            .unwrap();
        let device = Arc::new(SimulatedMonochromator::from_config(&config.monochromator));

        let mut app = WavefinderApp::start(
            &config,
            runtime.handle().clone(),
            device,
            Some(Arc::new(adapter)),
        );
        assert_eq!(app.running_loops(), 3);
        assert!(app.gimbal().is_some());

        app.shutdown();
        assert_eq!(app.running_loops(), 0);
        assert!(!observer.is_connected());
        assert!(app.monochromator().jog(crate::gui::JogDirection::Up).is_err());

        // second call is a no-op
        app.shutdown();
    }

    #[test]
    fn test_without_controller() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let config = AppConfig::default();
        let device = Arc::new(SimulatedMonochromator::from_config(&config.monochromator));

        let app = WavefinderApp::start(&config, runtime.handle().clone(), device, None);
        assert!(app.gimbal().is_none());
        assert_eq!(app.running_loops(), 1);
        drop(app);
    }
}
