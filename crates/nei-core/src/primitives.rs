//! # Numerical Primitives
//!
//! Hardcoded runtime constants for the nei engine.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Ionic fractions with an absolute value at or below this threshold are
/// set to exactly zero after every time advance.
pub const MIN_FRACTION: f64 = 1.0e-15;

/// Floor applied to rate coefficients (cm³ s⁻¹) so logarithms stay finite.
pub const MIN_RATE: f64 = 1.0e-300;

/// Largest deviation of the summed ionic fractions from one that a time
/// advance may produce before the step is treated as a numerical failure.
/// Smaller deviations are renormalised away.
pub const MAX_FRACTION_DRIFT: f64 = 1.0e-6;

/// Default tolerance for the sum of ionic fractions.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-15;

/// Smallest tolerance actually applied when validating user supplied
/// fractions.
pub const MIN_EFFECTIVE_TOLERANCE: f64 = 1.0e-12;

/// Default maximum number of time steps.
pub const DEFAULT_MAX_STEPS: usize = 1000;

/// Upper bound on the number of time steps in a single simulation.
///
/// All simulations must be computationally bounded.
pub const MAX_STEPS: usize = 1_000_000;

/// A step ending closer to `time_max` than this fraction of the simulated
/// span is stretched to land on `time_max`.
pub const TIME_LANDING_TOLERANCE: f64 = 1.0e-12;

/// Allowed range of the adaptive time step safety factor.
pub const SAFETY_FACTOR_RANGE: (f64, f64) = (1.0e-3, 1.0e3);

/// Largest relative change of temperature or density allowed within one
/// adaptive time step (before the safety factor is applied).
pub const MAX_RELATIVE_CHANGE: f64 = 0.05;

/// Default temperature grid: log10(T) from 3 to 9 in steps of 0.01.
pub const DEFAULT_LOG_T_MIN: f64 = 3.0;
pub const DEFAULT_LOG_T_MAX: f64 = 9.0;
pub const DEFAULT_LOG_T_STEP: f64 = 0.01;

/// Heaviest supported element (zinc).
pub const MAX_ATOMIC_NUMBER: u8 = 30;

/// Hydrogen ionization potential in electron-volts.
pub const RYDBERG_EV: f64 = 13.605_693;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a run label.
pub const MAX_LABEL_LENGTH: usize = 256;

/// Magic bytes for the binary run format header.
///
/// - File Header = Magic Bytes ("NEIR") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"NEIR";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"NEIR");
    }

    #[test]
    fn default_grid_has_601_nodes() {
        let nodes = ((DEFAULT_LOG_T_MAX - DEFAULT_LOG_T_MIN) / DEFAULT_LOG_T_STEP).round() as usize + 1;
        assert_eq!(nodes, 601);
    }
}
