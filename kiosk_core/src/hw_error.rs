//! Maps `Box<dyn Error>` from trait boundaries to typed `KioskError`.
//!
//! The traits in `kiosk_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `kiosk_hardware::HwError` downcasting.

use crate::error::KioskError;

/// Map a trait-boundary error to a typed `KioskError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> KioskError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<kiosk_hardware::error::HwError>() {
            return match hw {
                kiosk_hardware::error::HwError::Unsupported(what) => {
                    KioskError::State(format!("unsupported operation: {what}"))
                }
                other => KioskError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("not supported") {
        KioskError::State(s)
    } else {
        KioskError::Hardware(s)
    }
}

/// Run a best-effort actuator call; failures are logged and reported, never raised.
pub(crate) fn best_effort(
    what: &str,
    who: &str,
    r: kiosk_traits::HwResult<()>,
) -> Option<KioskError> {
    match r {
        Ok(()) => None,
        Err(e) => {
            let mapped = map_hw_error(e.as_ref());
            tracing::warn!(instance = who, action = what, error = %mapped, "actuator call failed");
            Some(mapped)
        }
    }
}
