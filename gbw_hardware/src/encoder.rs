//! Edge decoding for the rotary encoder and its push button.
//!
//! Pure state machines fed with pin levels, so they can be exercised without
//! GPIO access. `gpio::GpioControls` samples the pins and feeds them here.
use gbw_traits::InputEvent;

// Index: previous AB state << 2 | current AB state.
const TRANSITIONS: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Full-step quadrature decoder.
///
/// Counts valid Gray-code transitions and reports one detent every
/// `steps_per_detent` of them. Invalid jumps (both lines changing at once) are
/// ignored.
#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    last: u8,
    accum: i8,
    steps_per_detent: i8,
}

impl QuadratureDecoder {
    pub fn new(a: bool, b: bool) -> Self {
        Self::with_steps(a, b, 4)
    }

    pub fn with_steps(a: bool, b: bool, steps_per_detent: i8) -> Self {
        Self {
            last: state(a, b),
            accum: 0,
            steps_per_detent: steps_per_detent.max(1),
        }
    }

    /// Feed the current pin levels. Returns +1/-1 when a full detent completes.
    pub fn update(&mut self, a: bool, b: bool) -> Option<i32> {
        let cur = state(a, b);
        if cur == self.last {
            return None;
        }
        let step = TRANSITIONS[usize::from((self.last << 2) | cur)];
        self.last = cur;
        self.accum += step;
        if self.accum >= self.steps_per_detent {
            self.accum = 0;
            Some(1)
        } else if self.accum <= -self.steps_per_detent {
            self.accum = 0;
            Some(-1)
        } else {
            None
        }
    }
}

fn state(a: bool, b: bool) -> u8 {
    (u8::from(a) << 1) | u8::from(b)
}

/// Press-edge detector for an active-low button.
#[derive(Debug, Clone, Default)]
pub struct ButtonEdge {
    pressed: bool,
}

impl ButtonEdge {
    /// `level_high` is the raw pin level; pressed pulls the line low.
    pub fn update(&mut self, level_high: bool) -> Option<InputEvent> {
        let pressed = !level_high;
        let edge = pressed && !self.pressed;
        self.pressed = pressed;
        edge.then_some(InputEvent::Click)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Clockwise Gray sequence starting from 11.
    const CW: [(bool, bool); 4] = [(true, false), (false, false), (false, true), (true, true)];

    #[test]
    fn one_detent_per_four_transitions() {
        let mut d = QuadratureDecoder::new(true, true);
        let out: Vec<_> = CW.iter().filter_map(|&(a, b)| d.update(a, b)).collect();
        assert_eq!(out.len(), 1);
        let cw = out[0];

        let mut d = QuadratureDecoder::new(true, true);
        let ccw = [(false, true), (false, false), (true, false), (true, true)];
        let out: Vec<_> = ccw.iter().filter_map(|&(a, b)| d.update(a, b)).collect();
        assert_eq!(out, vec![-cw]);
    }

    #[test]
    fn repeated_levels_do_nothing() {
        let mut d = QuadratureDecoder::new(true, true);
        for _ in 0..10 {
            assert_eq!(d.update(true, true), None);
        }
    }

    #[test]
    fn bounce_back_and_forth_cancels() {
        let mut d = QuadratureDecoder::new(true, true);
        for _ in 0..5 {
            assert_eq!(d.update(true, false), None);
            assert_eq!(d.update(true, true), None);
        }
    }

    #[test]
    fn button_reports_press_edge_once() {
        let mut b = ButtonEdge::default();
        assert_eq!(b.update(true), None);
        assert_eq!(b.update(false), Some(InputEvent::Click));
        assert_eq!(b.update(false), None);
        assert_eq!(b.update(true), None);
        assert_eq!(b.update(false), Some(InputEvent::Click));
    }
}
