//! Read-only view of the controller for displays.
//!
//! The control loop publishes a `Snapshot` into a `SnapshotCell` once per tick;
//! a display task renders whatever is latest. Short blocking overlays (taring,
//! cup weight confirmation) go through the `Presentation` trait.
use crate::error::FaultReason;
use crate::menu::MenuAction;
use crate::params::GrindTrigger;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleStatus {
    Initializing,
    ScaleError,
    Asleep,
    Idle,
    Grinding,
    Finished,
    Failed(FaultReason),
    InMenu,
    InSubmenu(MenuAction),
    InDebugMenu,
}

/// Menu cursor as the display needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuView {
    pub items: Vec<&'static str>,
    pub selected: usize,
    /// Set while a submenu is open.
    pub editing: Option<MenuAction>,
    /// Reset confirmation toggle.
    pub armed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: Option<Instant>,
    pub scale_status: ScaleStatus,
    pub scale_weight: f32,
    pub set_weight: f32,
    pub cup_weight_empty: Option<f32>,
    pub target_total: Option<f32>,
    pub offset: f32,
    pub cup_weight: f32,
    pub scale_factor: f32,
    pub started_grinding_at: Option<Instant>,
    pub finished_grinding_at: Option<Instant>,
    pub shot_count: u32,
    pub scale_mode: bool,
    pub grind_continuous_mode: bool,
    pub grind_trigger: GrindTrigger,
    pub sleep_timeout_ms: u64,
    pub debug_mode: bool,
    pub menu: Option<MenuView>,
}

impl Default for Snapshot {
    fn default() -> Self {
        let p = crate::params::CalibrationParameters::default();
        Self {
            taken_at: None,
            scale_status: ScaleStatus::Initializing,
            scale_weight: 0.0,
            set_weight: p.target_weight,
            cup_weight_empty: None,
            target_total: None,
            offset: p.offset,
            cup_weight: p.cup_weight,
            scale_factor: p.scale_factor,
            started_grinding_at: None,
            finished_grinding_at: None,
            shot_count: p.shot_count,
            scale_mode: p.scale_mode,
            grind_continuous_mode: p.grind_continuous_mode,
            grind_trigger: p.grind_trigger,
            sleep_timeout_ms: p.sleep_timeout_ms,
            debug_mode: false,
            menu: None,
        }
    }
}

/// Latest snapshot shared between the control loop (writer) and displays (readers).
#[derive(Debug, Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<Mutex<Snapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        match self.inner.lock() {
            Ok(mut g) => *g = snapshot,
            Err(_) => tracing::warn!("snapshot lock poisoned; update dropped"),
        }
    }

    pub fn load(&self) -> Snapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

/// Overlays requested by the input controller during a user action.
pub trait Presentation {
    fn show_taring_message(&mut self);
    fn show_cup_weight_set_screen(&mut self, weight: f32);
    /// One-line transient message (rejected input, restart notices, ...).
    fn show_notice(&mut self, _text: &str) {}
}

/// Presentation that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn show_taring_message(&mut self) {}
    fn show_cup_weight_set_screen(&mut self, _weight: f32) {}
}
