use std::time::Duration;

use gbw_traits::Clock;

use crate::error::{HwError, Result};

/// Poll `is_high` until the line reads low or `timeout` expires on `clock`.
///
/// Sleeps `poll_interval` between checks instead of spinning.
pub fn wait_until_low<C: Clock>(
    clock: &C,
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = clock.now() + timeout;
    while is_high() {
        if clock.now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        clock.sleep(poll_interval);
    }
    Ok(())
}
