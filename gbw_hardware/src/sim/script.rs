//! Timed scenario driving a [`SimWorld`](super::SimWorld).
//!
//! One step per line, `<at_ms> <action> [arg]`, times measured from world
//! creation. `#` starts a comment.
//!
//! ```text
//! 1000  cup 70       # place a 70 g cup
//! 3000  trigger 800  # hold the grind button for 800 ms
//! 9000  rotate -2
//! 9500  click
//! 20000 remove       # take everything off the scale
//! ```
use crate::error::{HwError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimAction {
    /// Put this many grams on the scale (usually the cup).
    Place(f32),
    /// Take everything off the scale.
    RemoveLoad,
    /// Press the grind trigger for this long (ms).
    HoldTrigger(u64),
    Rotate(i32),
    Click,
    /// Load cell stops answering.
    Disconnect,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimStep {
    pub at_ms: u64,
    pub action: SimAction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimScript {
    steps: Vec<SimStep>,
}

impl SimScript {
    pub fn new(mut steps: Vec<SimStep>) -> Self {
        steps.sort_by_key(|s| s.at_ms);
        Self { steps }
    }

    /// Place a cup, press the trigger once, take the cup away.
    pub fn demo() -> Self {
        Self::new(vec![
            SimStep { at_ms: 1_000, action: SimAction::Place(70.0) },
            SimStep { at_ms: 3_000, action: SimAction::HoldTrigger(800) },
            SimStep { at_ms: 20_000, action: SimAction::RemoveLoad },
        ])
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            steps.push(parse_step(line).map_err(|reason| HwError::Script {
                line: idx + 1,
                reason,
            })?);
        }
        Ok(Self::new(steps))
    }

    pub fn steps(&self) -> &[SimStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn parse_step(line: &str) -> std::result::Result<SimStep, String> {
    let mut parts = line.split_whitespace();
    let at = parts.next().ok_or("missing time")?;
    let at_ms = at
        .parse::<u64>()
        .map_err(|_| format!("time must be whole milliseconds, got {at:?}"))?;
    let verb = parts.next().ok_or("missing action")?;
    let arg = parts.next();
    let action = match verb {
        "cup" | "place" => SimAction::Place(number(verb, arg)?),
        "remove" => SimAction::RemoveLoad,
        "trigger" => SimAction::HoldTrigger(number(verb, arg)?),
        "rotate" => SimAction::Rotate(number(verb, arg)?),
        "click" => SimAction::Click,
        "disconnect" => SimAction::Disconnect,
        "reconnect" => SimAction::Reconnect,
        other => return Err(format!("unknown action {other:?}")),
    };
    if let Some(extra) = parts.next() {
        return Err(format!("unexpected {extra:?} after {verb}"));
    }
    Ok(SimStep { at_ms, action })
}

fn number<T: std::str::FromStr>(verb: &str, arg: Option<&str>) -> std::result::Result<T, String> {
    let a = arg.ok_or_else(|| format!("{verb} needs a value"))?;
    a.parse::<T>()
        .map_err(|_| format!("{verb} value {a:?} is not a valid number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_and_orders_steps() {
        let s = SimScript::parse(
            "# warm-up\n\n5000 click\n1000 cup 70.5  # cup\n2000 rotate -3\n3000 trigger 600\n",
        )
        .unwrap();
        assert_eq!(
            s.steps(),
            &[
                SimStep { at_ms: 1000, action: SimAction::Place(70.5) },
                SimStep { at_ms: 2000, action: SimAction::Rotate(-3) },
                SimStep { at_ms: 3000, action: SimAction::HoldTrigger(600) },
                SimStep { at_ms: 5000, action: SimAction::Click },
            ]
        );
    }

    #[rstest]
    #[case("abc click", 1, "time")]
    #[case("100 jump", 1, "unknown action")]
    #[case("100 click\n200 cup", 2, "needs a value")]
    #[case("100 rotate x", 1, "not a valid number")]
    #[case("100 remove now", 1, "unexpected")]
    #[case("\n\n100", 3, "missing action")]
    fn reports_line_of_bad_step(#[case] text: &str, #[case] line: usize, #[case] needle: &str) {
        match SimScript::parse(text) {
            Err(HwError::Script { line: l, reason }) => {
                assert_eq!(l, line);
                assert!(reason.contains(needle), "{reason}");
            }
            other => panic!("expected script error, got {other:?}"),
        }
    }

    #[test]
    fn demo_places_cup_before_trigger() {
        let d = SimScript::demo();
        assert!(matches!(d.steps()[0].action, SimAction::Place(_)));
        assert!(matches!(d.steps()[1].action, SimAction::HoldTrigger(_)));
    }
}
