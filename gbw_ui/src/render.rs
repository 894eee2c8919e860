//! Snapshot to text frame.
use gbw_core::presentation::MenuView;
use gbw_core::{GrindTrigger, MenuAction, ScaleStatus, Snapshot};
use std::fmt;
use std::time::Instant;

/// 128 px at 6 px per glyph.
pub const DEFAULT_WIDTH: usize = 21;
pub const LINES: usize = 4;

/// One screenful of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    lines: Vec<String>,
}

impl Frame {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// True when every line is empty (screen off).
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(String::is_empty)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TextRenderer {
    width: usize,
    calibration_mass_g: f32,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            calibration_mass_g: 100.0,
        }
    }
}

impl TextRenderer {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(8),
            ..Self::default()
        }
    }

    /// Mass named on the calibration screen.
    #[must_use]
    pub fn calibration_mass(mut self, grams: f32) -> Self {
        self.calibration_mass_g = grams;
        self
    }

    pub fn frame(&self, lines: &[&str]) -> Frame {
        let mut out: Vec<String> = lines
            .iter()
            .take(LINES)
            .map(|l| l.chars().take(self.width).collect())
            .collect();
        out.resize(LINES, String::new());
        Frame { lines: out }
    }

    fn center(&self, s: &str) -> String {
        let len = s.chars().count();
        if len >= self.width {
            return s.to_string();
        }
        let pad = (self.width - len) / 2;
        format!("{}{s}", " ".repeat(pad))
    }

    fn left_right(&self, left: &str, right: &str) -> String {
        let used = left.chars().count() + right.chars().count();
        let gap = self.width.saturating_sub(used).max(1);
        format!("{left}{}{right}", " ".repeat(gap))
    }

    fn row(selected: bool, label: &str) -> String {
        if selected {
            format!("> {label}")
        } else {
            format!("  {label}")
        }
    }

    pub fn render(&self, s: &Snapshot) -> Frame {
        match s.scale_status {
            ScaleStatus::Initializing => self.frame(&["", "Initializing..."]),
            ScaleStatus::ScaleError => self.frame(&["", "SCALE ERROR"]),
            ScaleStatus::Asleep => self.frame(&[]),
            ScaleStatus::Idle => self.idle(s),
            ScaleStatus::Grinding => {
                let secs = elapsed_secs(s.started_grinding_at, s.taken_at);
                self.progress(s, "Grinding...", secs)
            }
            ScaleStatus::Finished => {
                let secs = elapsed_secs(s.started_grinding_at, s.finished_grinding_at);
                self.progress(s, "Grinding finished", secs)
            }
            ScaleStatus::Failed(reason) => {
                let why = reason.to_string();
                self.frame(&[
                    &self.center("Grinding failed"),
                    &self.center(&why),
                    &self.center("Rotate dial"),
                    &self.center("to exit"),
                ])
            }
            ScaleStatus::InMenu => self.list("Menu", s.menu.as_ref()),
            ScaleStatus::InDebugMenu => self.list("Debug Menu", s.menu.as_ref()),
            ScaleStatus::InSubmenu(action) => self.submenu(action, s),
        }
    }

    fn idle(&self, s: &Snapshot) -> Frame {
        let weight = format!("{:.1}g", s.scale_weight);
        let set = format!("Set: {:.1}g", s.set_weight);
        let mode = if s.scale_mode { "SCALE" } else { "" };
        self.frame(&[
            &self.center("Weight:"),
            &self.center(&weight),
            &self.left_right(&set, mode),
        ])
    }

    fn progress(&self, s: &Snapshot, title: &str, secs: f32) -> Frame {
        let net = s.scale_weight - s.cup_weight_empty.unwrap_or(0.0);
        let line = format!("{net:.1}g -> {:.1}g", s.set_weight);
        let time = format!("{secs:.1}s");
        self.frame(&[&self.center(title), &self.center(&line), &self.center(&time)])
    }

    // Previous, current and next entry, wrapping like the encoder does.
    fn list(&self, title: &str, menu: Option<&MenuView>) -> Frame {
        let Some(m) = menu.filter(|m| !m.items.is_empty()) else {
            return self.frame(&[&self.center(title)]);
        };
        let n = m.items.len();
        let cur = m.selected.min(n - 1);
        let prev = (cur + n - 1) % n;
        let next = (cur + 1) % n;
        self.frame(&[
            &self.center(title),
            &Self::row(false, m.items[prev]),
            &Self::row(true, m.items[cur]),
            &Self::row(false, m.items[next]),
        ])
    }

    fn submenu(&self, action: MenuAction, s: &Snapshot) -> Frame {
        match action {
            MenuAction::CupWeight => {
                let w = format!("{:.1}g", s.scale_weight);
                self.frame(&[
                    &self.center("Cup Weight"),
                    &self.center(&w),
                    "Place cup on scale",
                    "and press button",
                ])
            }
            MenuAction::Calibrate => {
                let place = format!("Place {:.0}g weight", self.calibration_mass_g);
                self.frame(&[
                    &self.center("Calibration"),
                    &self.center(&place),
                    &self.center("on scale and"),
                    &self.center("press button"),
                ])
            }
            MenuAction::Offset => {
                let v = format!("{:.2}g", s.offset);
                self.frame(&[&self.center("Adjust offset"), "", &self.center(&v)])
            }
            MenuAction::ScaleMode => self.frame(&[
                &self.center("Set Scale Mode"),
                &Self::row(!s.scale_mode, "GBW"),
                &Self::row(s.scale_mode, "Scale only"),
            ]),
            MenuAction::GrindMode => self.frame(&[
                &self.center("Set Grinder"),
                &self.center("Start/Stop Mode"),
                &Self::row(s.grind_continuous_mode, "Continuous"),
                &Self::row(!s.grind_continuous_mode, "Impulse"),
            ]),
            MenuAction::GrindTrigger => {
                let mode = match s.grind_trigger {
                    GrindTrigger::Button => "Mode: Button",
                    GrindTrigger::Cup => "Mode: Cup",
                };
                self.frame(&[
                    &self.center("Grind Trigger"),
                    "",
                    &self.center(mode),
                    "Press to confirm",
                ])
            }
            MenuAction::SleepTimeout => {
                let v = format!("{}s", s.sleep_timeout_ms / 1000);
                self.frame(&[&self.center("Sleep timeout"), "", &self.center(&v)])
            }
            MenuAction::Info => {
                let shots = format!("Shot Count: {}", s.shot_count);
                let factor = format!("Scale: {:.2}", s.scale_factor);
                let offset = format!("Offset: {:.2}g", s.offset);
                self.frame(&[&self.center("System Info"), &shots, &factor, &offset])
            }
            MenuAction::Reset => {
                let armed = s.menu.as_ref().is_some_and(|m| m.armed);
                self.frame(&[
                    &self.center("Reset to defaults?"),
                    &Self::row(armed, "Confirm"),
                    &Self::row(!armed, "Cancel"),
                ])
            }
            MenuAction::Exit | MenuAction::DebugMenu => self.list("Menu", s.menu.as_ref()),
        }
    }
}

fn elapsed_secs(from: Option<Instant>, to: Option<Instant>) -> f32 {
    match (from, to) {
        (Some(a), Some(b)) => b.saturating_duration_since(a).as_secs_f32(),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gbw_core::FaultReason;
    use rstest::rstest;
    use std::time::Duration;

    fn snap(status: ScaleStatus) -> Snapshot {
        Snapshot {
            scale_status: status,
            ..Snapshot::default()
        }
    }

    fn menu(items: Vec<&'static str>, selected: usize) -> MenuView {
        MenuView {
            items,
            selected,
            editing: None,
            armed: false,
        }
    }

    #[rstest]
    #[case(ScaleStatus::Initializing, "Initializing...")]
    #[case(ScaleStatus::ScaleError, "SCALE ERROR")]
    #[case(ScaleStatus::Failed(FaultReason::NoIncrease), "weight is not increasing")]
    #[case(ScaleStatus::InSubmenu(MenuAction::Calibrate), "Place 100g weight")]
    #[case(ScaleStatus::InSubmenu(MenuAction::GrindTrigger), "Mode: Button")]
    #[case(ScaleStatus::InSubmenu(MenuAction::SleepTimeout), "60s")]
    fn status_screens(#[case] status: ScaleStatus, #[case] needle: &str) {
        let f = TextRenderer::default().render(&snap(status));
        assert!(f.contains(needle), "{f}");
        assert_eq!(f.lines().len(), LINES);
    }

    #[test]
    fn asleep_is_blank() {
        assert!(TextRenderer::default().render(&snap(ScaleStatus::Asleep)).is_blank());
    }

    #[test]
    fn idle_shows_weight_and_target() {
        let s = Snapshot {
            scale_weight: 71.26,
            set_weight: 18.0,
            scale_mode: true,
            ..snap(ScaleStatus::Idle)
        };
        let f = TextRenderer::default().render(&s);
        assert!(f.lines()[1].trim() == "71.3g", "{f}");
        assert!(f.lines()[2].starts_with("Set: 18.0g"));
        assert!(f.lines()[2].ends_with("SCALE"));
    }

    #[test]
    fn grinding_shows_net_weight_and_elapsed() {
        let t0 = Instant::now();
        let s = Snapshot {
            scale_weight: 80.0,
            cup_weight_empty: Some(70.0),
            set_weight: 18.0,
            started_grinding_at: Some(t0),
            taken_at: Some(t0 + Duration::from_millis(4_250)),
            ..snap(ScaleStatus::Grinding)
        };
        let f = TextRenderer::default().render(&s);
        assert!(f.contains("10.0g -> 18.0g"), "{f}");
        assert!(f.contains("4.2s") || f.contains("4.3s"), "{f}");
    }

    #[test]
    fn finished_shows_grind_duration() {
        let t0 = Instant::now();
        let s = Snapshot {
            started_grinding_at: Some(t0),
            finished_grinding_at: Some(t0 + Duration::from_secs(9)),
            taken_at: Some(t0 + Duration::from_secs(30)),
            ..snap(ScaleStatus::Finished)
        };
        let f = TextRenderer::default().render(&s);
        assert!(f.contains("Grinding finished"));
        assert!(f.contains("9.0s"), "{f}");
    }

    #[test]
    fn menu_wraps_around_selection() {
        let s = Snapshot {
            menu: Some(menu(vec!["Cup weight", "Calibrate", "Exit"], 0)),
            ..snap(ScaleStatus::InMenu)
        };
        let f = TextRenderer::default().render(&s);
        assert_eq!(f.lines()[1], "  Exit");
        assert_eq!(f.lines()[2], "> Cup weight");
        assert_eq!(f.lines()[3], "  Calibrate");
    }

    #[test]
    fn reset_highlights_confirm_when_armed() {
        let mut m = menu(vec!["Reset"], 0);
        m.armed = true;
        let s = Snapshot {
            menu: Some(m),
            ..snap(ScaleStatus::InSubmenu(MenuAction::Reset))
        };
        let f = TextRenderer::default().render(&s);
        assert_eq!(f.lines()[1], "> Confirm");
        assert_eq!(f.lines()[2], "  Cancel");
    }

    #[test]
    fn long_lines_are_clipped() {
        let r = TextRenderer::new(8);
        let f = r.frame(&["0123456789"]);
        assert_eq!(f.lines()[0], "01234567");
    }
}
