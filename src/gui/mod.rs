//! Operator interface
//!
//! Panels own their display state and a [`TaskSet`](crate::tasks::TaskSet)
//! for device commands started from buttons. Display state is refreshed by an
//! [`UpdateLoop`](crate::cyclic::UpdateLoop) on the Tokio runtime; the egui
//! frame only reads it, so a slow device never blocks rendering.
//!
//! - [`MonochromPanel`]: serial number, status light, wavelength entry and jog
//! - [`AxisPanel`]: position, motion state, jog and stop for each gimbal axis
//! - [`WavefinderApp`]: the `eframe` shell hosting both

pub mod app;
pub mod axis_panel;
pub mod monochrom_panel;
pub mod status;

pub use app::WavefinderApp;
pub use axis_panel::{AxisPanel, AxisView};
pub use monochrom_panel::{MonochromPanel, MonochromView};
pub use status::{style_for, StatusStyle, STATUS_STYLES};

/// Which way a jog button moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    /// `◄`: shorter wavelength / negative counts
    Down,
    /// `►`: longer wavelength / positive counts
    Up,
}

impl JogDirection {
    /// Button caption
    pub fn symbol(self) -> &'static str {
        match self {
            JogDirection::Down => "◄",
            JogDirection::Up => "►",
        }
    }

    /// `-1` or `+1`
    pub fn sign(self) -> i64 {
        match self {
            JogDirection::Down => -1,
            JogDirection::Up => 1,
        }
    }
}

/// Parse an operator-entered wavelength in nm.
///
/// Surrounding whitespace is ignored; only finite numbers are accepted.
pub fn parse_wavelength(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|nm| nm.is_finite())
}

/// Wavelength as shown in the read-only display.
pub fn format_wavelength(nm: f64) -> String {
    format!("{nm:.2}")
}

/// Wavelength as written into the entry box.
///
/// Unrounded, so applying a restored entry leaves the target unchanged.
pub fn entry_text(nm: f64) -> String {
    nm.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wavelength() {
        assert_eq!(parse_wavelength("632.8"), Some(632.8));
        assert_eq!(parse_wavelength("  500 \t"), Some(500.0));
        assert_eq!(parse_wavelength("1e3"), Some(1000.0));
        assert_eq!(parse_wavelength("-1"), Some(-1.0));
        assert_eq!(parse_wavelength(""), None);
        assert_eq!(parse_wavelength("abc"), None);
        assert_eq!(parse_wavelength("500nm"), None);
        assert_eq!(parse_wavelength("NaN"), None);
        assert_eq!(parse_wavelength("inf"), None);
    }

    #[test]
    fn test_format_wavelength() {
        assert_eq!(format_wavelength(500.0), "500.00");
        assert_eq!(format_wavelength(632.816), "632.82");
    }

    #[test]
    fn test_entry_text_is_exact() {
        assert_eq!(entry_text(500.0), "500");
        assert_eq!(entry_text(632.816), "632.816");
        assert_eq!(parse_wavelength(&entry_text(632.816)), Some(632.816));
    }

    #[test]
    fn test_jog_direction() {
        assert_eq!(JogDirection::Down.sign(), -1);
        assert_eq!(JogDirection::Up.sign(), 1);
        assert_eq!(JogDirection::Up.symbol(), "►");
    }
}
