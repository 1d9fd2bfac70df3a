//! Maps `Box<dyn Error>` from trait boundaries to typed `ActuatorError`.
//!
//! The traits in `actuator_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `actuator_hardware::HwError` downcasting.

use crate::error::ActuatorError;

/// Map a trait-boundary error to a typed `ActuatorError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ActuatorError {
    if let Some(u) = e.downcast_ref::<actuator_traits::Unsupported>() {
        return ActuatorError::Unsupported(u.feature.to_string());
    }

    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<actuator_hardware::error::HwError>() {
            return match hw {
                actuator_hardware::error::HwError::Unsupported(what) => {
                    ActuatorError::Unsupported(what.clone())
                }
                other => ActuatorError::Hardware(other.to_string()),
            };
        }
    }

    ActuatorError::Hardware(e.to_string())
}

/// Convert a boxed driver error straight into an `eyre::Report`.
pub(crate) fn report(e: &(dyn std::error::Error + Send + Sync + 'static)) -> eyre::Report {
    eyre::Report::new(map_hw_error(e))
}
