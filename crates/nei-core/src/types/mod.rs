//! # Core Type Definitions
//!
//! This module contains the scalar quantities and the error type shared by
//! every part of the engine:
//! - Physical quantities (`Temperature`, `NumberDensity`, `Time`)
//! - Error types (`NeiError`)
//!
//! ## Units
//!
//! Quantities are stored in a single canonical unit (kelvin, cm⁻³, seconds)
//! and converted at construction time. A value of the wrong kind cannot be
//! passed where another is expected, so no runtime unit checking is needed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kelvin per electron-volt.
pub const KELVIN_PER_EV: f64 = 11_604.518;

// =============================================================================
// QUANTITY TRAIT
// =============================================================================

/// A scalar physical quantity stored in its canonical unit.
///
/// Used by [`crate::profile::Profile`] to interpolate any quantity kind.
pub trait Quantity: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// Wrap a raw value given in the canonical unit.
    fn from_value(value: f64) -> Self;

    /// The raw value in the canonical unit.
    fn value(self) -> f64;

    /// Human readable name of the quantity, used in error messages.
    fn label() -> &'static str;
}

// =============================================================================
// TEMPERATURE
// =============================================================================

/// Electron temperature in kelvin.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(pub f64);

impl Temperature {
    /// Create a temperature from kelvin.
    #[must_use]
    pub const fn kelvin(value: f64) -> Self {
        Self(value)
    }

    /// Create a temperature from an energy in electron-volts.
    #[must_use]
    pub fn from_ev(ev: f64) -> Self {
        Self(ev * KELVIN_PER_EV)
    }

    /// Temperature in kelvin.
    #[must_use]
    pub const fn as_kelvin(self) -> f64 {
        self.0
    }

    /// Thermal energy kT in electron-volts.
    #[must_use]
    pub fn as_ev(self) -> f64 {
        self.0 / KELVIN_PER_EV
    }
}

impl Quantity for Temperature {
    fn from_value(value: f64) -> Self {
        Self(value)
    }

    fn value(self) -> f64 {
        self.0
    }

    fn label() -> &'static str {
        "temperature"
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:e} K", self.0)
    }
}

// =============================================================================
// NUMBER DENSITY
// =============================================================================

/// Number density in particles per cubic centimeter.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NumberDensity(pub f64);

impl NumberDensity {
    /// Create a density from particles per cm³.
    #[must_use]
    pub const fn per_cubic_cm(value: f64) -> Self {
        Self(value)
    }

    /// Create a density from particles per m³.
    #[must_use]
    pub fn per_cubic_m(value: f64) -> Self {
        Self(value * 1.0e-6)
    }

    /// Density in particles per cm³.
    #[must_use]
    pub const fn as_per_cubic_cm(self) -> f64 {
        self.0
    }
}

impl Quantity for NumberDensity {
    fn from_value(value: f64) -> Self {
        Self(value)
    }

    fn value(self) -> f64 {
        self.0
    }

    fn label() -> &'static str {
        "number density"
    }
}

impl std::fmt::Display for NumberDensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:e} cm^-3", self.0)
    }
}

// =============================================================================
// TIME
// =============================================================================

/// A point in time or a duration, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(pub f64);

impl Time {
    /// Create a time from seconds.
    #[must_use]
    pub const fn seconds(value: f64) -> Self {
        Self(value)
    }

    /// Create a time from minutes.
    #[must_use]
    pub fn minutes(value: f64) -> Self {
        Self(value * 60.0)
    }

    /// Create a time from hours.
    #[must_use]
    pub fn hours(value: f64) -> Self {
        Self(value * 3600.0)
    }

    /// Time in seconds.
    #[must_use]
    pub const fn as_seconds(self) -> f64 {
        self.0
    }
}

impl Quantity for Time {
    fn from_value(value: f64) -> Self {
        Self(value)
    }

    fn value(self) -> f64 {
        self.0
    }

    fn label() -> &'static str {
        "time"
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:e} s", self.0)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the nei engine.
///
/// - No silent failures
/// - Use `Result<T, NeiError>` for fallible operations
/// - The engine should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum NeiError {
    /// The element symbol, name or atomic number is not supported.
    #[error("Unknown element: {0}")]
    UnknownElement(String),

    /// Ionic fractions are malformed for the given element.
    #[error("Invalid ionic fractions for {element}: {reason}")]
    InvalidIonicFractions { element: String, reason: String },

    /// An abundance is missing, negative or not finite.
    #[error("Invalid abundance: {0}")]
    InvalidAbundance(String),

    /// A time lies outside the simulated interval or is malformed.
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// A temperature or density profile is malformed.
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// A scalar parameter is outside its allowed range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The temperature lies outside the tabulated range.
    #[error("Temperature {temperature:e} K outside table range [{min:e}, {max:e}] K")]
    TemperatureOutOfRange { temperature: f64, min: f64, max: f64 },

    /// Hydrogen must be one of the simulated elements.
    #[error("Must have H in elements")]
    MissingHydrogen,

    /// Results were requested before the simulation was performed.
    #[error("The simulation has not yet been performed")]
    NotSimulated,

    /// A time step could not be completed.
    #[error("Unable to complete simulation at step {step}: {reason}")]
    SimulationFailed { step: usize, reason: String },

    /// A linear algebra routine failed (shape mismatch, no convergence).
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// Rate coefficient data is missing or malformed.
    #[error("Rate data error: {0}")]
    RateData(String),

    /// The requested run is not in the store.
    #[error("Run not found: {0}")]
    RunNotFound(u64),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
