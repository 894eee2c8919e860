#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Text rendition of the controller's display.
//!
//! `TextRenderer` turns a `Snapshot` into a small fixed-width `Frame` laid out
//! like the appliance's 128x64 OLED. `ConsolePresentation` implements the
//! core's overlay hooks by parking a frame in an `OverlaySlot`, and
//! `DisplayTask` refreshes a terminal from the snapshot cell on its own thread.
pub mod console;
pub mod render;

pub use console::{ConsolePresentation, DisplayTask, OverlaySlot};
pub use render::{Frame, TextRenderer};
