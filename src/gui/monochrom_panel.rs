//! Monochromator control panel
//!
//! Shows the serial number, a status light and the current wavelength, and
//! lets the operator jog the grating or enter a target wavelength.
//!
//! Refresh happens in two tiers. The first successful [`Cyclic::update`]
//! fetches the serial number and wavelength from the device; every update
//! after that only re-reads the device's cached status and wavelength. The
//! entry buffer belongs to the operator: it is seeded once and only rewritten
//! by the panel when an invalid edit is restored.

use super::{entry_text, format_wavelength, parse_wavelength, style_for, JogDirection};
use crate::config::MonochromatorConfig;
use crate::cyclic::{Cyclic, UpdateLoop};
use crate::error::AppResult;
use crate::hardware::{Monochromator, MonochromatorStatus};
use crate::tasks::TaskSet;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Serial number text until the device reports one
pub const SERIAL_NOT_FOUND: &str = "Not Found";

/// What the panel currently displays
#[derive(Debug, Clone, PartialEq)]
pub struct MonochromView {
    /// Serial number, or [`SERIAL_NOT_FOUND`]
    pub serial: String,
    /// Status driving the light
    pub status: MonochromatorStatus,
    /// Current wavelength, read-only display
    pub wavelength_text: String,
    /// Operator entry buffer
    pub wavelength_entry: String,
    /// The entry has keyboard focus
    pub editing: bool,
}

/// Panel actions collected during a frame, run once the view lock is released
enum Action {
    Jog(JogDirection),
    Go,
    Validate,
}

/// Monochromator panel bound to one device
pub struct MonochromPanel {
    config: MonochromatorConfig,
    device: Arc<dyn Monochromator>,
    tasks: TaskSet,
    view: Mutex<MonochromView>,
    needs_init: AtomicBool,
}

impl MonochromPanel {
    /// Create the panel; display fields start from the device's cached values.
    ///
    /// Jog commands are spawned onto `runtime`.
    pub fn new(config: MonochromatorConfig, device: Arc<dyn Monochromator>, runtime: Handle) -> Self {
        let view = MonochromView {
            serial: SERIAL_NOT_FOUND.to_string(),
            status: device.status(),
            wavelength_text: format_wavelength(device.current_wavelength()),
            wavelength_entry: entry_text(device.target_wavelength()),
            editing: false,
        };
        Self {
            config,
            device,
            tasks: TaskSet::new("monochromator", runtime),
            view: Mutex::new(view),
            needs_init: AtomicBool::new(true),
        }
    }

    /// Snapshot of the displayed state
    pub fn view(&self) -> MonochromView {
        self.lock_view().clone()
    }

    /// Panel configuration
    pub fn config(&self) -> &MonochromatorConfig {
        &self.config
    }

    /// Replace the entry buffer, as typing would.
    pub fn set_wavelength_entry(&self, text: impl Into<String>) {
        self.lock_view().wavelength_entry = text.into();
    }

    /// Step the grating one increment in `direction` as a tracked task.
    ///
    /// # Errors
    /// Refused with [`TasksClosed`](crate::error::WavefinderError::TasksClosed)
    /// once the panel is closed.
    pub fn jog(&self, direction: JogDirection) -> AppResult<()> {
        let device = Arc::clone(&self.device);
        let label = match direction {
            JogDirection::Down => "step down",
            JogDirection::Up => "step up",
        };
        let result = self.tasks.spawn(label, async move {
            match direction {
                JogDirection::Down => device.step_down().await,
                JogDirection::Up => device.step_up().await,
            }
        });
        if let Err(e) = &result {
            warn!(error = %e, "Monochromator jog refused");
        }
        result
    }

    /// Apply the entry buffer as the target wavelength.
    ///
    /// An invalid entry is restored instead. Returns whether the target was set.
    pub fn set_wavelength(&self) -> bool {
        let entry = self.lock_view().wavelength_entry.clone();
        match parse_wavelength(&entry) {
            Some(nm) => {
                self.device.set_target_wavelength(nm);
                info!(wavelength_nm = nm, "Monochromator target set");
                true
            }
            None => {
                self.restore_wavelength_entry();
                false
            }
        }
    }

    /// Reset the entry buffer to the device's target wavelength.
    pub fn restore_wavelength_entry(&self) {
        let target = entry_text(self.device.target_wavelength());
        let mut view = self.lock_view();
        debug!(rejected = %view.wavelength_entry, restored = %target, "Wavelength entry restored");
        view.wavelength_entry = target;
    }

    /// Check the entry buffer when it loses focus; restores it if invalid.
    pub fn validate_wavelength_entry(&self) -> bool {
        let valid = parse_wavelength(&self.lock_view().wavelength_entry).is_some();
        if !valid {
            self.restore_wavelength_entry();
        }
        valid
    }

    /// Jog commands still running
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel running jogs and wait for them; returns how many were cancelled.
    pub async fn close(&self) -> usize {
        let cancelled = self.tasks.close().await;
        info!(cancelled, "Monochromator panel closed");
        cancelled
    }

    /// Refresh this panel at the configured interval.
    pub fn update_loop(self: &Arc<Self>) -> UpdateLoop {
        UpdateLoop::spawn(
            "monochromator panel",
            Arc::clone(self),
            self.config.update_interval(),
        )
    }

    /// Draw the panel.
    pub fn ui(&self, ui: &mut egui::Ui) {
        let mut actions = Vec::new();
        {
            let mut view = self.lock_view();
            let style = style_for(view.status);

            ui.heading("Monochromator");
            ui.separator();

            egui::Grid::new("monochromator_grid")
                .num_columns(4)
                .spacing([10.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Serial #");
                    ui.label(&view.serial);
                    ui.label("");
                    ui.colored_label(style.color, format!("● {}", style.label))
                        .on_hover_text(style.color_name);
                    ui.end_row();

                    ui.label("Wavelength (nm)");
                    ui.label(&view.wavelength_text);
                    ui.label("");
                    let response = ui.add(
                        egui::TextEdit::singleline(&mut view.wavelength_entry).desired_width(64.0),
                    );
                    view.editing = response.has_focus();
                    if response.lost_focus() {
                        actions.push(Action::Validate);
                    }
                    ui.end_row();

                    ui.label("");
                    for direction in [JogDirection::Down, JogDirection::Up] {
                        if ui.button(direction.symbol()).clicked() {
                            actions.push(Action::Jog(direction));
                        }
                    }
                    if ui.button("Go").clicked() {
                        actions.push(Action::Go);
                    }
                    ui.end_row();
                });
        }

        for action in actions {
            match action {
                Action::Jog(direction) => {
                    // refusal is already logged
                    let _ = self.jog(direction);
                }
                Action::Go => {
                    self.set_wavelength();
                }
                Action::Validate => {
                    self.validate_wavelength_entry();
                }
            }
        }
    }

    fn lock_view(&self) -> MutexGuard<'_, MonochromView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Cyclic for MonochromPanel {
    async fn update(&self) -> AppResult<()> {
        if self.needs_init.load(Ordering::Acquire) {
            let serial = self.device.get_sn().await?;
            let nm = self.device.get_current_wavelength().await?;
            {
                let mut view = self.lock_view();
                if serial != 0 {
                    view.serial = serial.to_string();
                }
                if !view.editing {
                    view.wavelength_entry = entry_text(nm);
                }
            }
            self.needs_init.store(false, Ordering::Release);
            info!(serial, wavelength_nm = nm, "Monochromator identified");
        }

        let status = self.device.status();
        let current = format_wavelength(self.device.current_wavelength());
        let mut view = self.lock_view();
        view.status = status;
        view.wavelength_text = current;
        Ok(())
    }
}
