//! Device layer
//!
//! - [`galil`]: Galil multi-axis motion controller, its connection and axes
//! - [`monochromator`]: monochromator capability trait and a simulated device

pub mod galil;
pub mod monochromator;

pub use galil::{AxisDiscovery, AxisRegistry, DiscoveryOutcome, GalilAdapter, GalilAxis, GalilConnection};
pub use monochromator::{Monochromator, MonochromatorStatus, SimulatedMonochromator};
