//! # Ionization States
//!
//! Ionic fractions of single elements and of a whole plasma.

use crate::primitives::MIN_EFFECTIVE_TOLERANCE;
use crate::{Abundances, Element, NeiError, NumberDensity, Temperature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SINGLE ELEMENT
// =============================================================================

/// Ionic fractions of one element, neutral first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IonizationState {
    element: Element,
    fractions: Vec<f64>,
}

impl IonizationState {
    /// Validate and wrap ionic fractions.
    ///
    /// - one fraction per charge state
    /// - every fraction finite and within [0, 1]
    /// - the sum within `tol` of one (tolerances below 1e-12 are raised to 1e-12)
    pub fn new(element: Element, fractions: Vec<f64>, tol: f64) -> Result<Self, NeiError> {
        let invalid = |reason: String| NeiError::InvalidIonicFractions {
            element: element.to_string(),
            reason,
        };

        if fractions.len() != element.nstates() {
            return Err(invalid(format!(
                "expected {} fractions, got {}",
                element.nstates(),
                fractions.len()
            )));
        }
        if let Some(bad) = fractions
            .iter()
            .find(|f| !f.is_finite() || **f < 0.0 || **f > 1.0)
        {
            return Err(invalid(format!("fraction {} outside [0, 1]", bad)));
        }
        let sum: f64 = fractions.iter().sum();
        let tol = tol.max(MIN_EFFECTIVE_TOLERANCE);
        if (sum - 1.0).abs() > tol {
            return Err(invalid(format!("fractions sum to {} (tolerance {})", sum, tol)));
        }

        Ok(Self { element, fractions })
    }

    #[must_use]
    pub const fn element(&self) -> Element {
        self.element
    }

    #[must_use]
    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// Average charge Σ q·f_q.
    #[must_use]
    pub fn mean_charge(&self) -> f64 {
        self.fractions
            .iter()
            .enumerate()
            .map(|(q, f)| q as f64 * f)
            .sum()
    }
}

// =============================================================================
// INPUTS
// =============================================================================

/// Initial conditions of a plasma.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inputs {
    /// Explicit ionic fractions per element.
    Fractions(BTreeMap<Element, Vec<f64>>),
    /// Elements only; fractions start at equilibrium with the initial temperature.
    Elements(Vec<Element>),
}

impl Inputs {
    /// The elements named by the inputs, in order of atomic number.
    #[must_use]
    pub fn elements(&self) -> Vec<Element> {
        match self {
            Self::Fractions(map) => map.keys().copied().collect(),
            Self::Elements(list) => {
                let mut elements = list.clone();
                elements.sort_unstable();
                elements.dedup();
                elements
            }
        }
    }
}

// =============================================================================
// PLASMA
// =============================================================================

/// Ionization states of every element in a plasma, with the conditions
/// needed to turn fractions into number densities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IonizationStates {
    states: BTreeMap<Element, IonizationState>,
    abundances: Abundances,
    temperature: Option<Temperature>,
    hydrogen_density: Option<NumberDensity>,
    tol: f64,
}

impl IonizationStates {
    /// Build from explicit fractions.
    ///
    /// `abundances` must cover every element; it is restricted to them.
    pub fn new(
        fractions: BTreeMap<Element, Vec<f64>>,
        abundances: &Abundances,
        temperature: Option<Temperature>,
        hydrogen_density: Option<NumberDensity>,
        tol: f64,
    ) -> Result<Self, NeiError> {
        if fractions.is_empty() {
            return Err(NeiError::InvalidIonicFractions {
                element: "-".to_string(),
                reason: "no elements given".to_string(),
            });
        }
        let elements: Vec<Element> = fractions.keys().copied().collect();
        let abundances = abundances.restricted_to(&elements)?;
        let states = fractions
            .into_iter()
            .map(|(element, f)| IonizationState::new(element, f, tol).map(|s| (element, s)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            states,
            abundances,
            temperature,
            hydrogen_density,
            tol,
        })
    }

    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.states.keys().copied()
    }

    #[must_use]
    pub fn contains(&self, element: Element) -> bool {
        self.states.contains_key(&element)
    }

    #[must_use]
    pub const fn abundances(&self) -> &Abundances {
        &self.abundances
    }

    #[must_use]
    pub const fn temperature(&self) -> Option<Temperature> {
        self.temperature
    }

    #[must_use]
    pub const fn hydrogen_density(&self) -> Option<NumberDensity> {
        self.hydrogen_density
    }

    #[must_use]
    pub const fn tol(&self) -> f64 {
        self.tol
    }

    pub fn state(&self, element: Element) -> Result<&IonizationState, NeiError> {
        self.states
            .get(&element)
            .ok_or_else(|| NeiError::UnknownElement(format!("{} is not in this plasma", element)))
    }

    pub fn ionic_fractions(&self, element: Element) -> Result<&[f64], NeiError> {
        Ok(self.state(element)?.fractions())
    }

    /// Replace the fractions of one element.
    pub fn set_ionic_fractions(
        &mut self,
        element: Element,
        fractions: Vec<f64>,
    ) -> Result<(), NeiError> {
        self.state(element)?;
        let state = IonizationState::new(element, fractions, self.tol)?;
        self.states.insert(element, state);
        Ok(())
    }

    /// Update the temperature and hydrogen density the fractions belong to.
    pub fn set_conditions(&mut self, temperature: Temperature, hydrogen_density: NumberDensity) {
        self.temperature = Some(temperature);
        self.hydrogen_density = Some(hydrogen_density);
    }

    fn require_density(&self) -> Result<NumberDensity, NeiError> {
        self.hydrogen_density.ok_or_else(|| {
            NeiError::InvalidParameter("hydrogen number density is not set".to_string())
        })
    }

    /// Total number density of `element`: n_H · abundance.
    pub fn element_density(&self, element: Element) -> Result<NumberDensity, NeiError> {
        let n_h = self.require_density()?;
        let abundance = self.abundances.get(element).ok_or_else(|| {
            NeiError::InvalidAbundance(format!("no abundance given for {}", element))
        })?;
        Ok(NumberDensity::per_cubic_cm(n_h.as_per_cubic_cm() * abundance))
    }

    /// Number density of every charge state of `element`.
    pub fn number_densities(&self, element: Element) -> Result<Vec<f64>, NeiError> {
        let n_elem = self.element_density(element)?.as_per_cubic_cm();
        Ok(self
            .ionic_fractions(element)?
            .iter()
            .map(|f| n_elem * f)
            .collect())
    }

    /// Electron density from charge neutrality: Σ_elements Σ_q q · n_q.
    pub fn electron_density(&self) -> Result<NumberDensity, NeiError> {
        let mut n_e = 0.0;
        for element in self.states.keys() {
            n_e += self
                .number_densities(*element)?
                .iter()
                .enumerate()
                .map(|(q, n)| q as f64 * n)
                .sum::<f64>();
        }
        Ok(NumberDensity::per_cubic_cm(n_e))
    }
}

// =============================================================================
// TESTS
// =============================================================================
