//! # Shock Jump Conditions
//!
//! Rankine-Hugoniot relations for a hydrodynamic shock in an ideal gas
//! with adiabatic index γ and upstream Mach number M.
//!
//! Handy for building step-function temperature and density profiles of a
//! shocked plasma.

use crate::{NeiError, NumberDensity, Temperature};

fn check(gamma: f64, mach: f64) -> Result<(), NeiError> {
    if !gamma.is_finite() || gamma <= 1.0 {
        return Err(NeiError::InvalidParameter(format!(
            "adiabatic index must be finite and greater than 1, got {}",
            gamma
        )));
    }
    if !mach.is_finite() || mach < 1.0 {
        return Err(NeiError::InvalidParameter(format!(
            "Mach number must be finite and at least 1, got {}",
            mach
        )));
    }
    Ok(())
}

/// Downstream over upstream density: (γ+1)M² / (2 + (γ-1)M²).
pub fn density_ratio(gamma: f64, mach: f64) -> Result<f64, NeiError> {
    check(gamma, mach)?;
    let m2 = mach * mach;
    Ok((gamma + 1.0) * m2 / (2.0 + (gamma - 1.0) * m2))
}

/// Downstream over upstream temperature.
pub fn temperature_ratio(gamma: f64, mach: f64) -> Result<f64, NeiError> {
    check(gamma, mach)?;
    let m2 = mach * mach;
    let gp1 = gamma + 1.0;
    Ok(((gp1 + 2.0 * gamma * (m2 - 1.0)) * (gp1 + (gamma - 1.0) * (m2 - 1.0))) / (gp1 * gp1 * m2))
}

/// Post-shock density.
pub fn rh_density(
    initial: NumberDensity,
    gamma: f64,
    mach: f64,
) -> Result<NumberDensity, NeiError> {
    Ok(NumberDensity::per_cubic_cm(
        initial.as_per_cubic_cm() * density_ratio(gamma, mach)?,
    ))
}

/// Post-shock temperature.
pub fn rh_temperature(initial: Temperature, gamma: f64, mach: f64) -> Result<Temperature, NeiError> {
    Ok(Temperature::kelvin(
        initial.as_kelvin() * temperature_ratio(gamma, mach)?,
    ))
}
