//! Hardware adapters for the grind-by-weight controller.
//!
//! `sim` runs anywhere and is what tests and `gbw run --sim` use. The HX711
//! scale and the GPIO relay/encoder need a Raspberry Pi and the `hardware`
//! feature.
pub mod encoder;
pub mod error;
pub mod sim;
pub mod util;

#[cfg(feature = "hardware")]
pub mod gpio;
#[cfg(feature = "hardware")]
pub mod hx711;

pub use error::HwError;
pub use sim::{SimAction, SimCfg, SimScript, SimStep, SimWorld, SimulatedControls, SimulatedRelay, SimulatedScale};

#[cfg(feature = "hardware")]
pub use gpio::{ControlPins, GpioControls, GpioRelay};
#[cfg(feature = "hardware")]
pub use hx711::HardwareScale;
