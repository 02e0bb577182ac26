//! # Rate Coefficients
//!
//! Collisional ionization and radiative recombination coefficients that
//! drive the ionization balance.
//!
//! For an element with atomic number Z the coefficients are two vectors of
//! length Z (units cm³ s⁻¹):
//! - `ionization[q]`: rate out of charge state q into q+1 (q = 0..Z-1)
//! - `recombination[q]`: rate out of charge state q+1 into q (q = 0..Z-1)
//!
//! Two sources are provided:
//! - [`HydrogenicRates`]: an analytic, order-of-magnitude approximation that
//!   needs no external data
//! - [`TabulatedRates`]: coefficients read from a JSON table

use crate::primitives::{MIN_RATE, RYDBERG_EV};
use crate::{Element, NeiError, Temperature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// RATE COEFFICIENTS
// =============================================================================

/// Ionization and recombination coefficients of one element at one temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCoefficients {
    pub ionization: Vec<f64>,
    pub recombination: Vec<f64>,
}

impl RateCoefficients {
    /// Validate lengths against the element and floor every coefficient at `MIN_RATE`.
    pub fn checked(self, element: Element) -> Result<Self, NeiError> {
        let z = element.atomic_number() as usize;
        if self.ionization.len() != z || self.recombination.len() != z {
            return Err(NeiError::RateData(format!(
                "{} needs {} ionization and recombination coefficients, got {} and {}",
                element,
                z,
                self.ionization.len(),
                self.recombination.len()
            )));
        }
        if self
            .ionization
            .iter()
            .chain(&self.recombination)
            .any(|rate| rate.is_nan() || *rate < 0.0)
        {
            return Err(NeiError::RateData(format!(
                "{} has negative or NaN rate coefficients",
                element
            )));
        }
        Ok(Self {
            ionization: self.ionization.into_iter().map(floor_rate).collect(),
            recombination: self.recombination.into_iter().map(floor_rate).collect(),
        })
    }
}

fn floor_rate(rate: f64) -> f64 {
    if rate.is_finite() { rate.max(MIN_RATE) } else { f64::MAX }
}

// =============================================================================
// RATE SOURCE TRAIT
// =============================================================================

/// A provider of rate coefficients.
///
/// Implementors must be `Send + Sync`; eigen tables share them across threads.
pub trait RateSource: Send + Sync + std::fmt::Debug {
    /// Coefficients for `element` at `temperature`.
    fn coefficients(
        &self,
        element: Element,
        temperature: Temperature,
    ) -> Result<RateCoefficients, NeiError>;

    /// Temperature range over which the source is valid, in kelvin.
    fn temperature_range(&self, element: Element) -> Option<(f64, f64)>;
}

// =============================================================================
// HYDROGENIC APPROXIMATION
// =============================================================================

/// Voronov (1997) fit parameters for hydrogen.
const VORONOV_A: f64 = 2.91e-8;
const VORONOV_X: f64 = 0.232;
const VORONOV_K: f64 = 0.39;

/// Analytic rates from a screened hydrogenic model.
///
/// - Ionization potential of an ion with charge q whose outermost electron
///   sits in shell n: χ = Ry · (q+1)² / n²
/// - Collisional ionization: Voronov's hydrogen fit scaled by the number of
///   outer-shell electrons and (Ry/χ)^{3/2}
/// - Radiative recombination: Seaton's hydrogenic approximation
///
/// Good to an order of magnitude for highly charged ions, poorer for
/// near-neutral ones. Use [`TabulatedRates`] for quantitative work.
#[derive(Debug, Clone, Copy, Default)]
pub struct HydrogenicRates;

impl HydrogenicRates {
    /// Ionization potential (eV) of the ion of `element` with charge `charge`.
    #[must_use]
    pub fn ionization_potential(element: Element, charge: usize) -> f64 {
        let (shell, _) = outer_shell(element.atomic_number() as usize - charge);
        let effective = (charge + 1) as f64;
        RYDBERG_EV * effective * effective / (shell * shell) as f64
    }
}

/// Principal quantum number of the outermost occupied shell and its occupancy
/// for an ion with `electrons` bound electrons.
fn outer_shell(electrons: usize) -> (usize, usize) {
    let mut remaining = electrons;
    let mut n = 1;
    loop {
        let capacity = 2 * n * n;
        if remaining <= capacity {
            return (n, remaining);
        }
        remaining -= capacity;
        n += 1;
    }
}

impl RateSource for HydrogenicRates {
    fn coefficients(
        &self,
        element: Element,
        temperature: Temperature,
    ) -> Result<RateCoefficients, NeiError> {
        let t = temperature.as_kelvin();
        if !t.is_finite() || t <= 0.0 {
            return Err(NeiError::InvalidParameter(format!(
                "temperature must be positive, got {}",
                t
            )));
        }
        let kt = temperature.as_ev();
        let z = element.atomic_number() as usize;

        let ionization = (0..z)
            .map(|q| {
                let chi = Self::ionization_potential(element, q);
                let (_, outer_electrons) = outer_shell(z - q);
                let u = chi / kt;
                VORONOV_A
                    * outer_electrons as f64
                    * (RYDBERG_EV / chi).powf(1.5)
                    * u.powf(VORONOV_K)
                    * (-u).exp()
                    / (VORONOV_X + u)
            })
            .collect();

        let recombination = (1..=z)
            .map(|charge| {
                let beta = Self::ionization_potential(element, charge - 1) / kt;
                let phi = 0.4288 + 0.5 * beta.ln() + 0.469 * beta.powf(-1.0 / 3.0);
                2.07e-11 * charge as f64 * phi / t.sqrt()
            })
            .collect();

        RateCoefficients {
            ionization,
            recombination,
        }
        .checked(element)
    }

    fn temperature_range(&self, _element: Element) -> Option<(f64, f64)> {
        None
    }
}

// =============================================================================
// TABULATED RATES
// =============================================================================

/// Rate coefficients of one element on a temperature grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateTable {
    /// Strictly increasing temperatures in kelvin.
    pub temperatures: Vec<f64>,
    /// `ionization[q][i]`: coefficient out of charge q at `temperatures[i]`.
    pub ionization: Vec<Vec<f64>>,
    /// `recombination[q][i]`: coefficient out of charge q+1 at `temperatures[i]`.
    pub recombination: Vec<Vec<f64>>,
}

/// Rate coefficients interpolated from tables, keyed by element.
///
/// JSON layout:
///
/// ```json
/// { "H": { "temperatures": [1e4, 1e5],
///          "ionization": [[5.8e-19, 4.0e-9]],
///          "recombination": [[4.2e-13, 1.0e-13]] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabulatedRates {
    tables: BTreeMap<Element, RateTable>,
}

impl TabulatedRates {
    /// Build from tables, validating their shapes.
    pub fn new(tables: BTreeMap<Element, RateTable>) -> Result<Self, NeiError> {
        for (element, table) in &tables {
            validate_table(*element, table)?;
        }
        Ok(Self { tables })
    }

    /// Parse and validate a JSON rate table.
    pub fn from_json(bytes: &[u8]) -> Result<Self, NeiError> {
        let parsed: Self = serde_json::from_slice(bytes)
            .map_err(|e| NeiError::RateData(format!("Failed to parse rate table: {}", e)))?;
        Self::new(parsed.tables)
    }

    /// Elements covered by the tables.
    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.tables.keys().copied()
    }

    fn table(&self, element: Element) -> Result<&RateTable, NeiError> {
        self.tables
            .get(&element)
            .ok_or_else(|| NeiError::RateData(format!("no rate table for {}", element)))
    }
}

fn validate_table(element: Element, table: &RateTable) -> Result<(), NeiError> {
    let z = element.atomic_number() as usize;
    let n = table.temperatures.len();
    if n < 2 {
        return Err(NeiError::RateData(format!(
            "{} table needs at least two temperatures",
            element
        )));
    }
    if table.temperatures.iter().any(|t| !t.is_finite() || *t <= 0.0)
        || table.temperatures.windows(2).any(|w| w[1] <= w[0])
    {
        return Err(NeiError::RateData(format!(
            "{} temperatures must be positive and strictly increasing",
            element
        )));
    }
    if table.ionization.len() != z || table.recombination.len() != z {
        return Err(NeiError::RateData(format!(
            "{} table needs {} rows of ionization and recombination coefficients",
            element, z
        )));
    }
    if table
        .ionization
        .iter()
        .chain(&table.recombination)
        .any(|row| row.len() != n)
    {
        return Err(NeiError::RateData(format!(
            "{} rows must have one value per temperature ({})",
            element, n
        )));
    }
    Ok(())
}

impl RateSource for TabulatedRates {
    fn coefficients(
        &self,
        element: Element,
        temperature: Temperature,
    ) -> Result<RateCoefficients, NeiError> {
        let table = self.table(element)?;
        let t = temperature.as_kelvin();
        let (min, max) = (table.temperatures[0], table.temperatures[table.temperatures.len() - 1]);
        if !(min..=max).contains(&t) {
            return Err(NeiError::TemperatureOutOfRange {
                temperature: t,
                min,
                max,
            });
        }

        // Bracketing interval [i, i+1] with temperatures[i] <= t.
        let upper = table
            .temperatures
            .partition_point(|&node| node <= t)
            .clamp(1, table.temperatures.len() - 1);
        let lower = upper - 1;
        let (log_lo, log_hi) = (
            table.temperatures[lower].log10(),
            table.temperatures[upper].log10(),
        );
        let weight = (t.log10() - log_lo) / (log_hi - log_lo);

        let interpolate = |row: &Vec<f64>| {
            let lo = row[lower].max(MIN_RATE).log10();
            let hi = row[upper].max(MIN_RATE).log10();
            10f64.powf(lo + weight * (hi - lo))
        };

        RateCoefficients {
            ionization: table.ionization.iter().map(interpolate).collect(),
            recombination: table.recombination.iter().map(interpolate).collect(),
        }
        .checked(element)
    }

    fn temperature_range(&self, element: Element) -> Option<(f64, f64)> {
        self.tables.get(&element).and_then(|table| {
            Some((*table.temperatures.first()?, *table.temperatures.last()?))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn element(symbol: &str) -> Element {
        Element::from_symbol(symbol).expect("element")
    }

    #[test]
    fn hydrogen_potential_is_rydberg() {
        let chi = HydrogenicRates::ionization_potential(Element::HYDROGEN, 0);
        assert!((chi - RYDBERG_EV).abs() < 1e-9);
    }

    #[test]
    fn hydrogen_like_oxygen_potential() {
        // O7+ has one electron in n = 1: 13.6 * 64.
        let chi = HydrogenicRates::ionization_potential(element("O"), 7);
        assert!((chi - RYDBERG_EV * 64.0).abs() < 1e-6);
    }

    #[test]
    fn outer_shell_filling() {
        assert_eq!(outer_shell(1), (1, 1));
        assert_eq!(outer_shell(2), (1, 2));
        assert_eq!(outer_shell(3), (2, 1));
        assert_eq!(outer_shell(10), (2, 8));
        assert_eq!(outer_shell(11), (3, 1));
    }

    #[test]
    fn hydrogen_recombination_near_case_a() {
        // Case A coefficient at 1e4 K is about 4.2e-13 cm^3/s.
        let rates = HydrogenicRates
            .coefficients(Element::HYDROGEN, Temperature::kelvin(1.0e4))
            .expect("rates");
        let alpha = rates.recombination[0];
        assert!((3.5e-13..5.0e-13).contains(&alpha), "alpha = {}", alpha);
    }

    #[test]
    fn ionization_grows_with_temperature() {
        let cold = HydrogenicRates
            .coefficients(Element::HYDROGEN, Temperature::kelvin(1.0e4))
            .expect("cold");
        let hot = HydrogenicRates
            .coefficients(Element::HYDROGEN, Temperature::kelvin(1.0e6))
            .expect("hot");
        assert!(hot.ionization[0] > cold.ionization[0]);
        assert!(hot.recombination[0] < cold.recombination[0]);
    }

    #[test]
    fn coefficient_lengths_match_atomic_number() {
        let rates = HydrogenicRates
            .coefficients(element("Fe"), Temperature::kelvin(1.0e7))
            .expect("iron");
        assert_eq!(rates.ionization.len(), 26);
        assert_eq!(rates.recombination.len(), 26);
        assert!(rates.ionization.iter().all(|&c| c >= MIN_RATE));
    }

    #[test]
    fn non_positive_temperature_rejected() {
        assert!(
            HydrogenicRates
                .coefficients(Element::HYDROGEN, Temperature::kelvin(0.0))
                .is_err()
        );
    }

    fn hydrogen_table_json() -> &'static str {
        r#"{"H": {"temperatures": [1.0e4, 1.0e6],
                  "ionization": [[1.0e-12, 1.0e-8]],
                  "recombination": [[1.0e-13, 1.0e-15]]}}"#
    }

    #[test]
    fn tabulated_interpolates_in_log_space() {
        let rates = TabulatedRates::from_json(hydrogen_table_json().as_bytes()).expect("parse");
        let mid = rates
            .coefficients(Element::HYDROGEN, Temperature::kelvin(1.0e5))
            .expect("mid");
        assert!((mid.ionization[0] / 1.0e-10 - 1.0).abs() < 1e-9);
        assert!((mid.recombination[0] / 1.0e-14 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tabulated_endpoints_are_exact() {
        let rates = TabulatedRates::from_json(hydrogen_table_json().as_bytes()).expect("parse");
        let top = rates
            .coefficients(Element::HYDROGEN, Temperature::kelvin(1.0e6))
            .expect("top");
        assert!((top.ionization[0] / 1.0e-8 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tabulated_out_of_range_rejected() {
        let rates = TabulatedRates::from_json(hydrogen_table_json().as_bytes()).expect("parse");
        let result = rates.coefficients(Element::HYDROGEN, Temperature::kelvin(1.0e7));
        assert!(matches!(result, Err(NeiError::TemperatureOutOfRange { .. })));
        assert_eq!(
            rates.temperature_range(Element::HYDROGEN),
            Some((1.0e4, 1.0e6))
        );
    }

    #[test]
    fn tabulated_missing_element_rejected() {
        let rates = TabulatedRates::from_json(hydrogen_table_json().as_bytes()).expect("parse");
        let result = rates.coefficients(element("He"), Temperature::kelvin(1.0e5));
        assert!(matches!(result, Err(NeiError::RateData(_))));
    }

    #[test]
    fn tabulated_shape_validated() {
        let bad = r#"{"He": {"temperatures": [1.0e4, 1.0e6],
                             "ionization": [[1.0, 1.0]],
                             "recombination": [[1.0, 1.0]]}}"#;
        assert!(matches!(
            TabulatedRates::from_json(bad.as_bytes()),
            Err(NeiError::RateData(_))
        ));

        let decreasing = r#"{"H": {"temperatures": [1.0e6, 1.0e4],
                                   "ionization": [[1.0, 1.0]],
                                   "recombination": [[1.0, 1.0]]}}"#;
        assert!(TabulatedRates::from_json(decreasing.as_bytes()).is_err());
    }
}
