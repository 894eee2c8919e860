use gbw_core::{ScaleStatus, Snapshot, SnapshotCell};
use gbw_traits::MonotonicClock;
use gbw_ui::{DisplayTask, OverlaySlot, TextRenderer};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Write sink the test can read back.
#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Vec<u8>>>);

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Shared {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

fn wait_for(out: &Shared, needle: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if out.text().contains(needle) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn redraws_on_snapshot_change_only() {
    let cell = SnapshotCell::new();
    let out = Shared::default();
    let task = DisplayTask::spawn(
        cell.clone(),
        OverlaySlot::default(),
        TextRenderer::default(),
        out.clone(),
        MonotonicClock::new(),
        50,
    )
    .unwrap();

    assert!(wait_for(&out, "Initializing..."));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(out.text().matches("Initializing...").count(), 1);

    cell.publish(Snapshot {
        scale_status: ScaleStatus::Idle,
        scale_weight: 12.0,
        ..Snapshot::default()
    });
    assert!(wait_for(&out, "12.0g"));
    drop(task);
}

#[test]
fn overlay_wins_over_snapshot() {
    let overlays = OverlaySlot::default();
    let out = Shared::default();
    overlays.show(
        TextRenderer::default().frame(&["Taring..."]),
        Instant::now() + Duration::from_secs(5),
    );
    let _task = DisplayTask::spawn(
        SnapshotCell::new(),
        overlays,
        TextRenderer::default(),
        out.clone(),
        MonotonicClock::new(),
        50,
    )
    .unwrap();
    assert!(wait_for(&out, "Taring..."));
    assert!(!out.text().contains("Initializing"));
}

#[test]
fn drop_stops_thread_promptly() {
    let task = DisplayTask::spawn(
        SnapshotCell::new(),
        OverlaySlot::default(),
        TextRenderer::default(),
        std::io::sink(),
        MonotonicClock::new(),
        20,
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(30));
    let start = Instant::now();
    drop(task);
    assert!(start.elapsed() < Duration::from_millis(200));
}
