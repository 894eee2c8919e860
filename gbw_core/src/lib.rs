#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core grind-by-weight logic (hardware-agnostic).
//!
//! All hardware interactions go through the `gbw_traits` seams (`Scale`,
//! `Relay`, `Controls`, `SettingsStore`) and all time through `Clock`, so the
//! whole appliance runs against simulated parts and a manual clock in tests.
//!
//! ## Architecture
//!
//! - **Sampling**: `WeightSampler` converts raw ADC counts to grams, smooths
//!   them with a Kalman estimator (`filter`) and applies a deadband. `Sampler`
//!   runs it on its own thread and publishes `SamplerEvent`s over a channel.
//! - **History**: `WeightHistory` keeps the last 100 samples for trailing
//!   window queries.
//! - **Dosing**: `DoseController` is the Idle/Grinding/Finished/Failed state
//!   machine driving the `Grinder` actuator and learning the offset.
//! - **Input**: `InputController` decodes encoder turns and click gestures into
//!   menu navigation and parameter edits (`menu`).
//! - **Parameters**: `CalibrationParameters` is the persisted settings cache;
//!   `Persistence` serializes writes to the `SettingsStore`.
//! - **Control loop**: `ControlLoop` owns all of the above on one thread and
//!   publishes a `Snapshot` for the display each tick; `runner::run` wires it
//!   to real threads.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod dosing;
pub mod error;
pub mod filter;
pub mod grinder;
pub mod history;
pub mod hw_error;
pub mod input;
pub mod menu;
pub mod mocks;
pub mod params;
pub mod presentation;
pub mod runner;
pub mod sampler;
pub mod store;
pub mod util;

pub use builder::ControlLoopBuilder;
pub use config::{DosingCfg, FilterCfg, GrinderCfg, InputCfg, SamplerCfg};
pub use dosing::{DoseController, DoseEffects, DoseSession, DoseState, TickInput};
pub use error::{BuildError, FaultReason, GbwError, Report, Result};
pub use filter::KalmanFilter;
pub use grinder::{GrindMode, Grinder};
pub use history::{WeightHistory, WeightSample};
pub use input::{Gesture, InputController, UiState};
pub use menu::{MenuAction, MenuModel};
pub use params::{CalibrationParameters, GrindTrigger};
pub use presentation::{NullPresentation, Presentation, ScaleStatus, Snapshot, SnapshotCell};
pub use runner::{ControlLoop, RunCfg, RunSummary, run};
pub use sampler::{Averaging, Sampler, SamplerCommand, SamplerEvent, WeightSampler};
pub use store::{Persistence, Stored};
