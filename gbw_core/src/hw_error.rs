//! Maps `Box<dyn Error>` from trait boundaries to typed `GbwError`.
//!
//! The traits in `gbw_traits` return `Box<dyn Error + Send + Sync>`; this module
//! converts those to the core error enum, with an optional feature-gated path
//! for `gbw_hardware::HwError` downcasting.

use crate::error::GbwError;

/// Map a trait-boundary error to a typed `GbwError`.
///
/// Known hardware error types are downcast first, then the message is inspected.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> GbwError {
    #[cfg(feature = "hardware-errors")]
    {
        use gbw_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::DataReadyTimeout => GbwError::Timeout,
                other => GbwError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        GbwError::Timeout
    } else {
        GbwError::Hardware(s)
    }
}

/// Same as [`map_hw_error`] for boxed trait errors.
pub fn map_boxed(e: &(dyn std::error::Error + Send + Sync + 'static)) -> GbwError {
    map_hw_error(e)
}
