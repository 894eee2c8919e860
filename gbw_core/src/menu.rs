//! Menu entries and cursor arithmetic.
use crate::config::InputCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    CupWeight,
    Calibrate,
    Offset,
    ScaleMode,
    GrindMode,
    GrindTrigger,
    SleepTimeout,
    Info,
    Reset,
    Exit,
    DebugMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugAction {
    ZeroShotCount,
    DumpHistory,
    Back,
}

/// Numeric parameter a submenu edits with the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundParam {
    Offset,
    SleepTimeout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuEntry {
    pub label: &'static str,
    pub action: MenuAction,
    pub param: Option<BoundParam>,
    /// Change per encoder detent in the parameter's unit (g or ms).
    pub step: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugEntry {
    pub label: &'static str,
    pub action: DebugAction,
}

#[derive(Debug, Clone)]
pub struct MenuModel {
    entries: Vec<MenuEntry>,
    debug_entries: Vec<DebugEntry>,
}

impl MenuModel {
    pub fn new(cfg: &InputCfg) -> Self {
        let plain = |label, action| MenuEntry {
            label,
            action,
            param: None,
            step: 0.0,
        };
        let entries = vec![
            plain("Cup weight", MenuAction::CupWeight),
            plain("Calibrate", MenuAction::Calibrate),
            MenuEntry {
                label: "Offset",
                action: MenuAction::Offset,
                param: Some(BoundParam::Offset),
                step: cfg.offset_step_g,
            },
            plain("Scale mode", MenuAction::ScaleMode),
            plain("Grinding mode", MenuAction::GrindMode),
            plain("Grind trigger", MenuAction::GrindTrigger),
            MenuEntry {
                label: "Sleep timeout",
                action: MenuAction::SleepTimeout,
                param: Some(BoundParam::SleepTimeout),
                step: cfg.sleep_step_ms as f32,
            },
            plain("Info", MenuAction::Info),
            plain("Reset", MenuAction::Reset),
            plain("Exit", MenuAction::Exit),
            // Must stay last: hidden outside debug mode by truncation.
            plain("Debug menu", MenuAction::DebugMenu),
        ];
        let debug_entries = vec![
            DebugEntry {
                label: "Zero shot count",
                action: DebugAction::ZeroShotCount,
            },
            DebugEntry {
                label: "Dump history",
                action: DebugAction::DumpHistory,
            },
            DebugEntry {
                label: "Back",
                action: DebugAction::Back,
            },
        ];
        Self {
            entries,
            debug_entries,
        }
    }

    /// Entries shown to the user.
    pub fn visible(&self, debug_mode: bool) -> &[MenuEntry] {
        if debug_mode {
            &self.entries
        } else {
            &self.entries[..self.entries.len().saturating_sub(1)]
        }
    }

    pub fn debug_entries(&self) -> &[DebugEntry] {
        &self.debug_entries
    }

    pub fn entry(&self, index: usize, debug_mode: bool) -> Option<&MenuEntry> {
        self.visible(debug_mode).get(index)
    }

    pub fn label_of(&self, action: MenuAction) -> &'static str {
        self.entries
            .iter()
            .find(|e| e.action == action)
            .map_or("", |e| e.label)
    }
}

/// Move a cursor by `delta` over `len` items, wrapping at both ends.
pub fn wrap(index: usize, delta: i32, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let len = len as i64;
    let next = (index as i64 + i64::from(delta)).rem_euclid(len);
    next as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1, 10, 1)]
    #[case(9, 1, 10, 0)]
    #[case(0, -1, 10, 9)]
    #[case(3, -25, 10, 8)]
    #[case(5, 0, 0, 0)]
    fn cursor_wraps(#[case] i: usize, #[case] d: i32, #[case] len: usize, #[case] want: usize) {
        assert_eq!(wrap(i, d, len), want);
    }

    #[test]
    fn debug_entry_hidden_outside_debug_mode() {
        let m = MenuModel::new(&InputCfg::default());
        assert!(m.visible(false).iter().all(|e| e.action != MenuAction::DebugMenu));
        assert_eq!(m.visible(true).last().map(|e| e.action), Some(MenuAction::DebugMenu));
        assert_eq!(m.visible(true).len(), m.visible(false).len() + 1);
    }

    #[test]
    fn bound_entries_carry_steps() {
        let m = MenuModel::new(&InputCfg::default());
        let offset = m.visible(false).iter().find(|e| e.action == MenuAction::Offset);
        assert_eq!(offset.and_then(|e| e.param), Some(BoundParam::Offset));
        assert_eq!(m.label_of(MenuAction::SleepTimeout), "Sleep timeout");
    }
}
