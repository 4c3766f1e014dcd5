//! Status light styling

use crate::hardware::MonochromatorStatus;
use egui::Color32;

/// How one device status is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusStyle {
    /// Light color
    pub color: Color32,
    /// Color name, for logs and tooltips
    pub color_name: &'static str,
    /// Text next to the light
    pub label: &'static str,
}

/// Styles indexed by [`MonochromatorStatus::code`].
///
/// Sized by the status count, so adding a status without a style fails to compile.
pub static STATUS_STYLES: [StatusStyle; MonochromatorStatus::COUNT] = [
    StatusStyle {
        color: Color32::GREEN,
        color_name: "green",
        label: "OK",
    },
    StatusStyle {
        color: Color32::YELLOW,
        color_name: "yellow",
        label: "BUSY",
    },
    StatusStyle {
        color: Color32::RED,
        color_name: "red",
        label: "ERROR",
    },
];

/// Style for a status
pub fn style_for(status: MonochromatorStatus) -> &'static StatusStyle {
    &STATUS_STYLES[status.code()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_status_has_a_style() {
        let labels: Vec<_> = MonochromatorStatus::ALL
            .iter()
            .map(|s| style_for(*s).label)
            .collect();
        assert_eq!(labels, ["OK", "BUSY", "ERROR"]);
    }

    #[test]
    fn test_status_colors() {
        assert_eq!(style_for(MonochromatorStatus::Ok).color, Color32::GREEN);
        assert_eq!(style_for(MonochromatorStatus::Busy).color_name, "yellow");
        assert_eq!(style_for(MonochromatorStatus::Error).color, Color32::RED);
    }
}
