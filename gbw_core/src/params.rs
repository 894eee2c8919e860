//! Persisted dosing parameters and the rules that keep them sane.
//!
//! `CalibrationParameters` is the in-memory cache of everything the appliance
//! remembers across power cycles. It is loaded once at startup (invalid stored
//! values are replaced by defaults and written back) and afterwards mutated by
//! the input controller (user edits) and the dose controller (offset learning).
use crate::config::InputCfg;
use crate::error::{GbwError, Result};
use crate::store::{Persistence, Stored};
use gbw_config::{SettingsPatch, SettingsView};
use gbw_traits::SettingValue;

/// Persisted key names.
pub mod keys {
    pub const CALIBRATION: &str = "calibration";
    pub const SET_WEIGHT: &str = "setWeight";
    pub const OFFSET: &str = "offset";
    pub const CUP: &str = "cup";
    pub const SCALE_MODE: &str = "scaleMode";
    pub const GRIND_MODE: &str = "grindMode";
    pub const SHOT_COUNT: &str = "shotCount";
    pub const SLEEP_TIME: &str = "sleepTime";
    pub const GRIND_TRIGGER: &str = "grindTrigger";
}

pub const DEFAULT_SCALE_FACTOR: f32 = 1396.21;
pub const DEFAULT_TARGET_WEIGHT: f32 = 18.0;
pub const DEFAULT_OFFSET: f32 = -2.5;
pub const DEFAULT_CUP_WEIGHT: f32 = 70.0;
pub const DEFAULT_SLEEP_TIMEOUT_MS: u64 = 60_000;

/// What starts a grind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrindTrigger {
    /// Holding the trigger button.
    Button,
    /// Placing the configured empty cup on the scale.
    Cup,
}

impl GrindTrigger {
    /// Persisted as `grindTrigger` (true = button).
    pub fn from_button(button: bool) -> Self {
        if button {
            GrindTrigger::Button
        } else {
            GrindTrigger::Cup
        }
    }

    pub fn is_button(self) -> bool {
        self == GrindTrigger::Button
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParameters {
    /// ADC counts per gram.
    pub scale_factor: f32,
    pub target_weight: f32,
    /// Learned correction added to the target to compensate grinder coast.
    pub offset: f32,
    /// Empty cup weight used for cup detection.
    pub cup_weight: f32,
    /// Timer-only mode: weigh but never drive the grinder.
    pub scale_mode: bool,
    pub grind_continuous_mode: bool,
    pub grind_trigger: GrindTrigger,
    pub sleep_timeout_ms: u64,
    pub shot_count: u32,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            target_weight: DEFAULT_TARGET_WEIGHT,
            offset: DEFAULT_OFFSET,
            cup_weight: DEFAULT_CUP_WEIGHT,
            scale_mode: false,
            grind_continuous_mode: false,
            grind_trigger: GrindTrigger::Button,
            sleep_timeout_ms: DEFAULT_SLEEP_TIMEOUT_MS,
            shot_count: 0,
        }
    }
}

/// Keep a learned or edited offset usable.
///
/// Clamped to `±bound`; an offset whose magnitude reaches the target is
/// replaced by the default offset (or 0 if even that is too large for the
/// target). Non-finite values become 0.
pub fn clamp_offset(offset: f32, target: f32, bound: f32) -> f32 {
    if !offset.is_finite() {
        return 0.0;
    }
    let v = offset.clamp(-bound.abs(), bound.abs());
    if v.abs() < target {
        v
    } else if DEFAULT_OFFSET.abs() < target && DEFAULT_OFFSET.abs() <= bound.abs() {
        DEFAULT_OFFSET
    } else {
        0.0
    }
}

// Typed read of one key. A value that is present but unreadable, or of the
// wrong type, is recorded in `unreadable` so the default replaces it on disk.
fn typed<T>(
    store: &Persistence,
    key: &'static str,
    conv: impl FnOnce(SettingValue) -> Option<T>,
    unreadable: &mut Vec<&'static str>,
) -> Option<T> {
    match store.lookup(key) {
        Stored::Missing => None,
        Stored::Value(v) => {
            let t = conv(v);
            if t.is_none() {
                tracing::warn!(key, stored = ?v, "stored setting has the wrong type; using default");
                unreadable.push(key);
            }
            t
        }
        Stored::Unreadable => {
            unreadable.push(key);
            None
        }
    }
}

fn valid_factor(f: f32) -> bool {
    f.is_finite() && f > 0.0
}

impl CalibrationParameters {
    /// Load from `store`, falling back to defaults per key. Invalid values are
    /// corrected and the corrected values written back.
    pub fn load(store: &Persistence, max_offset_g: f32) -> Self {
        let d = Self::default();
        let mut unreadable: Vec<&'static str> = Vec::new();
        let mut f = |key: &'static str, default: f32| {
            typed(store, key, |v| v.as_f64().map(|x| x as f32), &mut unreadable).unwrap_or(default)
        };
        let scale_factor = f(keys::CALIBRATION, d.scale_factor);
        let target_weight = f(keys::SET_WEIGHT, d.target_weight);
        let offset = f(keys::OFFSET, d.offset);
        let cup_weight = f(keys::CUP, d.cup_weight);
        let mut b = |key: &'static str, default: bool| {
            typed(store, key, |v| v.as_bool(), &mut unreadable).unwrap_or(default)
        };
        let scale_mode = b(keys::SCALE_MODE, d.scale_mode);
        let grind_continuous_mode = b(keys::GRIND_MODE, d.grind_continuous_mode);
        let grind_trigger = GrindTrigger::from_button(b(keys::GRIND_TRIGGER, d.grind_trigger.is_button()));
        let sleep_timeout_ms = typed(
            store,
            keys::SLEEP_TIME,
            |v| v.as_i64().and_then(|v| u64::try_from(v).ok()),
            &mut unreadable,
        )
        .unwrap_or(d.sleep_timeout_ms);
        let shot_count = typed(store, keys::SHOT_COUNT, |v| v.as_u32(), &mut unreadable)
            .unwrap_or(d.shot_count);

        let mut p = Self {
            scale_factor,
            target_weight,
            offset,
            cup_weight,
            scale_mode,
            grind_continuous_mode,
            grind_trigger,
            sleep_timeout_ms,
            shot_count,
        };

        let mut corrections: Vec<(&str, SettingValue)> = Vec::new();
        if !valid_factor(p.scale_factor) {
            tracing::warn!(
                stored = p.scale_factor,
                default = DEFAULT_SCALE_FACTOR,
                "invalid calibration factor replaced by default"
            );
            p.scale_factor = DEFAULT_SCALE_FACTOR;
            corrections.push((keys::CALIBRATION, SettingValue::Float(f64::from(p.scale_factor))));
        }
        if !p.target_weight.is_finite() || p.target_weight <= 0.0 {
            tracing::warn!(stored = p.target_weight, "invalid target weight replaced by default");
            p.target_weight = DEFAULT_TARGET_WEIGHT;
            corrections.push((keys::SET_WEIGHT, SettingValue::Float(f64::from(p.target_weight))));
        }
        let clamped = clamp_offset(p.offset, p.target_weight, max_offset_g);
        if clamped != p.offset {
            tracing::warn!(stored = p.offset, corrected = clamped, "stored offset out of range");
            p.offset = clamped;
            corrections.push((keys::OFFSET, SettingValue::Float(f64::from(p.offset))));
        }
        if !p.cup_weight.is_finite() {
            p.cup_weight = DEFAULT_CUP_WEIGHT;
            corrections.push((keys::CUP, SettingValue::Float(f64::from(p.cup_weight))));
        }
        for (key, value) in p.entries() {
            if unreadable.contains(&key) && !corrections.iter().any(|(k, _)| *k == key) {
                corrections.push((key, value));
            }
        }
        if !corrections.is_empty() {
            store.save(&corrections);
        }
        tracing::debug!(params = ?p, "calibration parameters loaded");
        p
    }

    fn entries(&self) -> [(&'static str, SettingValue); 9] {
        [
            (keys::CALIBRATION, SettingValue::Float(f64::from(self.scale_factor))),
            (keys::SET_WEIGHT, SettingValue::Float(f64::from(self.target_weight))),
            (keys::OFFSET, SettingValue::Float(f64::from(self.offset))),
            (keys::CUP, SettingValue::Float(f64::from(self.cup_weight))),
            (keys::SCALE_MODE, SettingValue::Bool(self.scale_mode)),
            (keys::GRIND_MODE, SettingValue::Bool(self.grind_continuous_mode)),
            (keys::SHOT_COUNT, SettingValue::UInt(self.shot_count)),
            (
                keys::SLEEP_TIME,
                SettingValue::Int(i64::try_from(self.sleep_timeout_ms).unwrap_or(i64::MAX)),
            ),
            (keys::GRIND_TRIGGER, SettingValue::Bool(self.grind_trigger.is_button())),
        ]
    }

    /// Write every field.
    pub fn persist_all(&self, store: &Persistence) -> bool {
        store.save(&self.entries())
    }

    /// Factory reset. The shot counter survives.
    pub fn reset_to_defaults(&mut self) {
        let shots = self.shot_count;
        *self = Self {
            shot_count: shots,
            ..Self::default()
        };
    }

    /// The flat object served to the configuration page.
    pub fn view(&self) -> SettingsView {
        SettingsView {
            set_weight: self.target_weight,
            offset: self.offset,
            scale_mode: self.scale_mode,
            grind_mode: self.grind_continuous_mode,
        }
    }

    /// Validate and apply a configuration-page patch, persisting changed keys.
    ///
    /// Either every field is applied or none is. Returns whether the patch
    /// carried WiFi credentials (which only take effect after a restart).
    pub fn apply_patch(
        &mut self,
        patch: &SettingsPatch,
        store: &Persistence,
        input: &InputCfg,
        max_offset_g: f32,
    ) -> Result<bool> {
        let target = patch.set_weight.unwrap_or(self.target_weight);
        if !target.is_finite() || target < input.target_min_g || target > input.target_max_g {
            return Err(eyre::Report::new(GbwError::InvalidInput(format!(
                "setWeight must be within [{}, {}] g (got {target})",
                input.target_min_g, input.target_max_g
            ))));
        }
        let offset = patch.offset.unwrap_or(self.offset);
        if !offset.is_finite() || offset.abs() > max_offset_g || offset.abs() >= target {
            return Err(eyre::Report::new(GbwError::InvalidInput(format!(
                "offset must be finite, within ±{max_offset_g} g and smaller than setWeight (got {offset})"
            ))));
        }

        let mut changed: Vec<(&str, SettingValue)> = Vec::new();
        if patch.set_weight.is_some() {
            self.target_weight = target;
            changed.push((keys::SET_WEIGHT, SettingValue::Float(f64::from(target))));
        }
        if patch.offset.is_some() || patch.set_weight.is_some() {
            self.offset = offset;
            changed.push((keys::OFFSET, SettingValue::Float(f64::from(offset))));
        }
        if let Some(v) = patch.scale_mode {
            self.scale_mode = v;
            changed.push((keys::SCALE_MODE, SettingValue::Bool(v)));
        }
        if let Some(v) = patch.grind_mode {
            self.grind_continuous_mode = v;
            changed.push((keys::GRIND_MODE, SettingValue::Bool(v)));
        }
        if !changed.is_empty() {
            store.save(&changed);
            tracing::info!(fields = changed.len(), "settings updated from configuration page");
        }
        let restart = patch.wifi_changed();
        if restart {
            tracing::info!("wifi credentials received; restart required");
        }
        Ok(restart)
    }
}
