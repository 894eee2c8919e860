//! Rotary encoder and click gestures → menu navigation and parameter edits.
//!
//! Runs inline in the control loop. Clicks go through `ClickDecoder`, which
//! owns the disambiguation timer: a click only becomes a single click once the
//! grace window expires without another click, a second click turns it into a
//! double click, and a fast burst toggles debug mode.
use crate::config::InputCfg;
use crate::history::WeightHistory;
use crate::menu::{BoundParam, DebugAction, MenuAction, MenuModel, wrap};
use crate::params::{CalibrationParameters, GrindTrigger, clamp_offset, keys};
use crate::presentation::{MenuView, Presentation};
use crate::store::Persistence;
use gbw_traits::{InputEvent, SettingValue};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Single,
    Double,
    Multi,
}

#[derive(Debug, Clone)]
pub struct ClickDecoder {
    bounce: Duration,
    grace: Duration,
    burst: u8,
    last_click_at: Option<Instant>,
    pending: u8,
    deadline: Option<Instant>,
}

impl ClickDecoder {
    pub fn new(cfg: &InputCfg) -> Self {
        Self {
            bounce: Duration::from_millis(cfg.bounce_ms),
            grace: Duration::from_millis(cfg.click_grace_ms),
            burst: cfg.burst_clicks,
            last_click_at: None,
            pending: 0,
            deadline: None,
        }
    }

    /// Register a click. Returns a gesture only when a burst completes.
    pub fn on_click(&mut self, now: Instant) -> Option<Gesture> {
        if let Some(last) = self.last_click_at
            && now.saturating_duration_since(last) < self.bounce
        {
            tracing::trace!("click dropped as bounce");
            return None;
        }
        self.last_click_at = Some(now);
        self.pending = self.pending.saturating_add(1);
        self.deadline = Some(now + self.grace);
        if self.pending >= self.burst {
            self.cancel();
            return Some(Gesture::Multi);
        }
        None
    }

    /// Commit pending clicks whose grace window has passed.
    pub fn poll(&mut self, now: Instant) -> Option<Gesture> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        let gesture = match self.pending {
            0 => None,
            1 => Some(Gesture::Single),
            _ => Some(Gesture::Double),
        };
        self.cancel();
        gesture
    }

    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }

    pub fn cancel(&mut self) {
        self.pending = 0;
        self.deadline = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    Main,
    Menu { index: usize },
    Submenu { action: MenuAction, armed: bool },
    DebugMenu { index: usize },
}

/// What the input controller needs to know about the rest of the system.
#[derive(Debug, Clone, Copy)]
pub struct InputContext<'a> {
    pub now: Instant,
    pub weight: f32,
    pub history: &'a WeightHistory,
    /// No significant weight change for the sleep timeout.
    pub asleep: bool,
    /// Dose controller is idle (menu may open, target may change).
    pub dose_idle: bool,
    /// Dose controller sits in `Failed`.
    pub fault_active: bool,
}

/// Requests for the rest of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputEffects {
    pub request_tare: bool,
    pub wake: bool,
    pub clear_fault: bool,
    pub scale_factor: Option<f32>,
}

impl InputEffects {
    fn merge(&mut self, other: InputEffects) {
        self.request_tare |= other.request_tare;
        self.wake |= other.wake;
        self.clear_fault |= other.clear_fault;
        if other.scale_factor.is_some() {
            self.scale_factor = other.scale_factor;
        }
    }
}

pub struct InputController {
    cfg: InputCfg,
    max_offset_g: f32,
    menu: MenuModel,
    ui: UiState,
    clicks: ClickDecoder,
    debug_mode: bool,
    target_save_due: Option<Instant>,
}

impl InputController {
    pub fn new(cfg: InputCfg, max_offset_g: f32) -> Self {
        Self {
            menu: MenuModel::new(&cfg),
            clicks: ClickDecoder::new(&cfg),
            cfg,
            max_offset_g,
            ui: UiState::Main,
            debug_mode: false,
            target_save_due: None,
        }
    }

    pub fn ui(&self) -> UiState {
        self.ui
    }

    pub fn menu(&self) -> &MenuModel {
        &self.menu
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Any menu level is open; suppresses idle-trigger actuation.
    pub fn menu_open(&self) -> bool {
        self.ui != UiState::Main
    }

    pub fn menu_view(&self) -> Option<MenuView> {
        match self.ui {
            UiState::Main => None,
            UiState::Menu { index } => Some(MenuView {
                items: self.menu.visible(self.debug_mode).iter().map(|e| e.label).collect(),
                selected: index,
                editing: None,
                armed: false,
            }),
            UiState::Submenu { action, armed } => {
                let items: Vec<&'static str> =
                    self.menu.visible(self.debug_mode).iter().map(|e| e.label).collect();
                let selected = self
                    .menu
                    .visible(self.debug_mode)
                    .iter()
                    .position(|e| e.action == action)
                    .unwrap_or(0);
                Some(MenuView {
                    items,
                    selected,
                    editing: Some(action),
                    armed,
                })
            }
            UiState::DebugMenu { index } => Some(MenuView {
                items: self.menu.debug_entries().iter().map(|e| e.label).collect(),
                selected: index,
                editing: None,
                armed: false,
            }),
        }
    }

    /// Handle one raw encoder event.
    pub fn on_event(
        &mut self,
        event: InputEvent,
        ctx: &InputContext<'_>,
        params: &mut CalibrationParameters,
        store: &Persistence,
        presentation: &mut dyn Presentation,
    ) -> InputEffects {
        let mut fx = InputEffects::default();
        if ctx.asleep {
            tracing::debug!(?event, "input while asleep; waking");
            fx.wake = true;
            return fx;
        }
        fx.wake = true;
        if ctx.fault_active {
            fx.clear_fault = true;
            self.clicks.cancel();
            return fx;
        }
        match event {
            InputEvent::Rotate(0) => {}
            InputEvent::Rotate(delta) => self.on_rotate(delta, ctx, params),
            InputEvent::Click => {
                if let Some(g) = self.clicks.on_click(ctx.now) {
                    fx.merge(self.on_gesture(g, ctx, params, store, presentation));
                }
            }
        }
        fx
    }

    /// Time-driven work: commit decoded clicks, flush deferred saves.
    pub fn poll(
        &mut self,
        ctx: &InputContext<'_>,
        params: &mut CalibrationParameters,
        store: &Persistence,
        presentation: &mut dyn Presentation,
    ) -> InputEffects {
        let mut fx = InputEffects::default();
        if let Some(g) = self.clicks.poll(ctx.now) {
            fx.merge(self.on_gesture(g, ctx, params, store, presentation));
        }
        if let Some(due) = self.target_save_due
            && ctx.now >= due
        {
            self.target_save_due = None;
            store.save(&[
                (keys::SET_WEIGHT, SettingValue::Float(f64::from(params.target_weight))),
                (keys::OFFSET, SettingValue::Float(f64::from(params.offset))),
            ]);
            tracing::info!(target = params.target_weight, "target weight saved");
        }
        fx
    }

    fn on_rotate(&mut self, delta: i32, ctx: &InputContext<'_>, params: &mut CalibrationParameters) {
        match self.ui {
            UiState::Main => {
                if !ctx.dose_idle {
                    return;
                }
                let next = params.target_weight + delta as f32 * self.cfg.target_step_g;
                params.target_weight = round_tenth(next.clamp(self.cfg.target_min_g, self.cfg.target_max_g));
                params.offset = clamp_offset(params.offset, params.target_weight, self.max_offset_g);
                self.target_save_due = Some(ctx.now + Duration::from_millis(self.cfg.save_delay_ms));
                tracing::debug!(target = params.target_weight, "target weight nudged");
            }
            UiState::Menu { index } => {
                let len = self.menu.visible(self.debug_mode).len();
                self.ui = UiState::Menu {
                    index: wrap(index, delta, len),
                };
            }
            UiState::DebugMenu { index } => {
                let len = self.menu.debug_entries().len();
                self.ui = UiState::DebugMenu {
                    index: wrap(index, delta, len),
                };
            }
            UiState::Submenu { action, armed } => {
                self.edit(action, armed, delta, params);
            }
        }
    }

    fn edit(&mut self, action: MenuAction, armed: bool, delta: i32, params: &mut CalibrationParameters) {
        let flips = delta.unsigned_abs() % 2 == 1;
        match action {
            MenuAction::Offset => {
                let step = self.step_of(BoundParam::Offset);
                let next = round_tenth(params.offset + delta as f32 * step)
                    .clamp(-self.max_offset_g, self.max_offset_g);
                if next.abs() < params.target_weight {
                    params.offset = next;
                } else {
                    tracing::warn!(offset = next, target = params.target_weight, "offset must stay below target");
                }
            }
            MenuAction::SleepTimeout => {
                let step = self.step_of(BoundParam::SleepTimeout) as i64;
                let next = params.sleep_timeout_ms as i64 + i64::from(delta) * step;
                let next = next.clamp(self.cfg.sleep_min_ms as i64, self.cfg.sleep_max_ms as i64);
                params.sleep_timeout_ms = u64::try_from(next).unwrap_or(self.cfg.sleep_min_ms);
            }
            MenuAction::ScaleMode if flips => params.scale_mode = !params.scale_mode,
            MenuAction::GrindMode if flips => {
                params.grind_continuous_mode = !params.grind_continuous_mode;
            }
            MenuAction::GrindTrigger if flips => {
                params.grind_trigger = match params.grind_trigger {
                    GrindTrigger::Button => GrindTrigger::Cup,
                    GrindTrigger::Cup => GrindTrigger::Button,
                };
            }
            MenuAction::Reset if flips => {
                self.ui = UiState::Submenu {
                    action,
                    armed: !armed,
                };
            }
            _ => {}
        }
    }

    fn step_of(&self, param: BoundParam) -> f32 {
        self.menu
            .visible(true)
            .iter()
            .find(|e| e.param == Some(param))
            .map_or(0.0, |e| e.step)
    }

    fn on_gesture(
        &mut self,
        gesture: Gesture,
        ctx: &InputContext<'_>,
        params: &mut CalibrationParameters,
        store: &Persistence,
        presentation: &mut dyn Presentation,
    ) -> InputEffects {
        let mut fx = InputEffects::default();
        match gesture {
            Gesture::Multi => {
                self.debug_mode = !self.debug_mode;
                tracing::info!(debug_mode = self.debug_mode, "debug mode toggled");
                if !self.debug_mode && matches!(self.ui, UiState::DebugMenu { .. }) {
                    self.ui = UiState::Menu { index: 0 };
                }
                if let UiState::Menu { index } = self.ui {
                    let len = self.menu.visible(self.debug_mode).len();
                    self.ui = UiState::Menu {
                        index: index.min(len.saturating_sub(1)),
                    };
                }
            }
            Gesture::Double => {
                if self.ui == UiState::Main && ctx.dose_idle {
                    tracing::info!("manual tare requested");
                    presentation.show_taring_message();
                    fx.request_tare = true;
                }
            }
            Gesture::Single => fx = self.on_select(ctx, params, store, presentation),
        }
        fx
    }

    fn on_select(
        &mut self,
        ctx: &InputContext<'_>,
        params: &mut CalibrationParameters,
        store: &Persistence,
        presentation: &mut dyn Presentation,
    ) -> InputEffects {
        let mut fx = InputEffects::default();
        match self.ui {
            UiState::Main => {
                if ctx.dose_idle {
                    self.ui = UiState::Menu { index: 0 };
                }
            }
            UiState::Menu { index } => {
                let Some(entry) = self.menu.entry(index, self.debug_mode) else {
                    self.ui = UiState::Menu { index: 0 };
                    return fx;
                };
                self.ui = match entry.action {
                    MenuAction::Exit => UiState::Main,
                    MenuAction::DebugMenu => UiState::DebugMenu { index: 0 },
                    action => UiState::Submenu {
                        action,
                        armed: false,
                    },
                };
            }
            UiState::Submenu { action, armed } => {
                fx = self.confirm(action, armed, ctx, params, store, presentation);
                if self.ui == (UiState::Submenu { action, armed }) {
                    self.back_to(action);
                }
            }
            UiState::DebugMenu { index } => {
                match self.menu.debug_entries().get(index).map(|e| e.action) {
                    Some(DebugAction::ZeroShotCount) => {
                        params.shot_count = 0;
                        store.save(&[(keys::SHOT_COUNT, SettingValue::UInt(0))]);
                        tracing::info!("shot count zeroed");
                    }
                    Some(DebugAction::DumpHistory) => {
                        for s in ctx.history.iter() {
                            let age_ms = ctx.now.saturating_duration_since(s.at).as_millis();
                            tracing::info!(age_ms, value = s.value, "history");
                        }
                    }
                    Some(DebugAction::Back) | None => {
                        self.back_to(MenuAction::DebugMenu);
                    }
                }
            }
        }
        fx
    }

    fn back_to(&mut self, action: MenuAction) {
        let index = self
            .menu
            .visible(self.debug_mode)
            .iter()
            .position(|e| e.action == action)
            .unwrap_or(0);
        self.ui = UiState::Menu { index };
    }

    fn confirm(
        &mut self,
        action: MenuAction,
        armed: bool,
        ctx: &InputContext<'_>,
        params: &mut CalibrationParameters,
        store: &Persistence,
        presentation: &mut dyn Presentation,
    ) -> InputEffects {
        let mut fx = InputEffects::default();
        match action {
            MenuAction::CupWeight => {
                if ctx.weight > self.cfg.min_cup_weight_g {
                    params.cup_weight = ctx.weight;
                    store.save(&[(keys::CUP, SettingValue::Float(f64::from(ctx.weight)))]);
                    tracing::info!(cup = ctx.weight, "cup weight set");
                    presentation.show_cup_weight_set_screen(ctx.weight);
                } else {
                    tracing::warn!(
                        weight = ctx.weight,
                        min = self.cfg.min_cup_weight_g,
                        "cup weight rejected: place the empty cup on the scale"
                    );
                    presentation.show_notice("No cup on scale");
                }
            }
            MenuAction::Calibrate => {
                let mass = self.cfg.calibration_mass_g;
                let factor = params.scale_factor * ctx.weight / mass;
                if ctx.weight > 0.0 && mass > 0.0 && factor.is_finite() && factor > 0.0 {
                    params.scale_factor = factor;
                    store.save(&[(keys::CALIBRATION, SettingValue::Float(f64::from(factor)))]);
                    tracing::info!(factor, weight = ctx.weight, mass, "scale calibrated");
                    fx.scale_factor = Some(factor);
                } else {
                    tracing::warn!(weight = ctx.weight, mass, "calibration rejected: no load on scale");
                    presentation.show_notice("Calibration rejected");
                }
            }
            MenuAction::Offset => {
                store.save(&[(keys::OFFSET, SettingValue::Float(f64::from(params.offset)))]);
                tracing::info!(offset = params.offset, "offset saved");
            }
            MenuAction::ScaleMode => {
                store.save(&[(keys::SCALE_MODE, SettingValue::Bool(params.scale_mode))]);
                tracing::info!(scale_mode = params.scale_mode, "scale mode saved");
            }
            MenuAction::GrindMode => {
                store.save(&[(
                    keys::GRIND_MODE,
                    SettingValue::Bool(params.grind_continuous_mode),
                )]);
                tracing::info!(continuous = params.grind_continuous_mode, "grind mode saved");
            }
            MenuAction::GrindTrigger => {
                store.save(&[(
                    keys::GRIND_TRIGGER,
                    SettingValue::Bool(params.grind_trigger.is_button()),
                )]);
                tracing::info!(trigger = ?params.grind_trigger, "grind trigger saved");
            }
            MenuAction::SleepTimeout => {
                let v = i64::try_from(params.sleep_timeout_ms).unwrap_or(i64::MAX);
                store.save(&[(keys::SLEEP_TIME, SettingValue::Int(v))]);
                tracing::info!(sleep_ms = params.sleep_timeout_ms, "sleep timeout saved");
            }
            MenuAction::Reset => {
                if armed {
                    params.reset_to_defaults();
                    params.persist_all(store);
                    fx.scale_factor = Some(params.scale_factor);
                    tracing::info!("settings reset to defaults");
                }
            }
            MenuAction::Info | MenuAction::Exit | MenuAction::DebugMenu => {}
        }
        fx
    }
}

fn round_tenth(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}
