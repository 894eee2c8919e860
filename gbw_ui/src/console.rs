//! Terminal display: overlay hooks plus a refresh thread.
use crate::render::{Frame, TextRenderer};
use gbw_core::{Presentation, SnapshotCell};
use gbw_traits::Clock;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long an overlay stays up.
pub const OVERLAY_MS: u64 = 2_000;

/// Latest overlay frame and when it expires. Shared by the presentation
/// (writer, on the control thread) and the display task (reader).
#[derive(Debug, Clone, Default)]
pub struct OverlaySlot {
    inner: Arc<Mutex<Option<(Frame, Instant)>>>,
}

impl OverlaySlot {
    pub fn show(&self, frame: Frame, until: Instant) {
        match self.inner.lock() {
            Ok(mut g) => *g = Some((frame, until)),
            Err(_) => tracing::warn!("overlay lock poisoned; overlay dropped"),
        }
    }

    /// The overlay if it has not expired at `now`.
    pub fn current(&self, now: Instant) -> Option<Frame> {
        let g = self.inner.lock().ok()?;
        g.as_ref()
            .filter(|(_, until)| now < *until)
            .map(|(f, _)| f.clone())
    }
}

/// `Presentation` that parks overlay frames for the display task. Notices are
/// also logged so headless runs still see them.
pub struct ConsolePresentation<C: Clock> {
    renderer: TextRenderer,
    overlays: OverlaySlot,
    clock: C,
}

impl<C: Clock> ConsolePresentation<C> {
    pub fn new(renderer: TextRenderer, overlays: OverlaySlot, clock: C) -> Self {
        Self {
            renderer,
            overlays,
            clock,
        }
    }

    fn overlay(&self, lines: &[&str]) {
        let until = self.clock.now() + Duration::from_millis(OVERLAY_MS);
        self.overlays.show(self.renderer.frame(lines), until);
    }
}

impl<C: Clock> Presentation for ConsolePresentation<C> {
    fn show_taring_message(&mut self) {
        self.overlay(&["", "Taring...", "Please wait"]);
    }

    fn show_cup_weight_set_screen(&mut self, weight: f32) {
        let w = format!("{weight:.1}g");
        self.overlay(&["Cup Weight Set:", "", &w]);
    }

    fn show_notice(&mut self, text: &str) {
        tracing::info!(notice = text, "display notice");
        self.overlay(&["", text]);
    }
}

/// Redraws the terminal whenever the rendered frame changes.
pub struct DisplayTask {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DisplayTask {
    pub fn spawn<W, C>(
        cell: SnapshotCell,
        overlays: OverlaySlot,
        renderer: TextRenderer,
        mut out: W,
        clock: C,
        refresh_hz: u32,
    ) -> std::io::Result<Self>
    where
        W: Write + Send + 'static,
        C: Clock + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let period = Duration::from_millis(gbw_core::util::period_ms(refresh_hz));
        let handle = std::thread::Builder::new()
            .name("display".into())
            .spawn(move || {
                let mut last: Option<Frame> = None;
                while !stop.load(Ordering::Relaxed) {
                    let now = clock.now();
                    let frame = overlays
                        .current(now)
                        .unwrap_or_else(|| renderer.render(&cell.load()));
                    if last.as_ref() != Some(&frame) {
                        if let Err(e) = draw(&mut out, &frame) {
                            tracing::warn!(error = %e, "display write failed; stopping");
                            break;
                        }
                        last = Some(frame);
                    }
                    clock.sleep(period);
                }
            })?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }
}

fn draw(out: &mut impl Write, frame: &Frame) -> std::io::Result<()> {
    writeln!(out, "+---------------------+")?;
    for line in frame.lines() {
        writeln!(out, "|{line:<21}|")?;
    }
    writeln!(out, "+---------------------+")?;
    out.flush()
}

impl Drop for DisplayTask {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gbw_traits::TestClock;

    #[test]
    fn overlays_expire() {
        let clock = TestClock::new();
        let slot = OverlaySlot::default();
        let mut p = ConsolePresentation::new(TextRenderer::default(), slot.clone(), clock.clone());
        p.show_cup_weight_set_screen(71.04);
        let f = slot.current(clock.now()).unwrap();
        assert!(f.contains("71.0g"));
        clock.advance_ms(OVERLAY_MS - 1);
        assert!(slot.current(clock.now()).is_some());
        clock.advance_ms(1);
        assert!(slot.current(clock.now()).is_none());
    }

    #[test]
    fn later_overlay_replaces_earlier() {
        let clock = TestClock::new();
        let slot = OverlaySlot::default();
        let mut p = ConsolePresentation::new(TextRenderer::default(), slot.clone(), clock.clone());
        p.show_taring_message();
        p.show_notice("No cup on scale");
        let f = slot.current(clock.now()).unwrap();
        assert!(f.contains("No cup on scale"));
        assert!(!f.contains("Taring"));
    }

    #[test]
    fn draw_boxes_each_line() {
        let f = TextRenderer::default().frame(&["abc"]);
        let mut buf = Vec::new();
        draw(&mut buf, &f).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert!(text.contains("|abc                  |"));
    }
}
