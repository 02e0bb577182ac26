//! # Simulation Record
//!
//! Step-by-step history of a non-equilibrium ionization run.
//!
//! Each step stores the time, the electron temperature, the hydrogen and
//! electron densities, and the ionic fractions of every element. Number
//! densities are derived from the fractions on demand.

use crate::{Abundances, Element, IonizationStates, NeiError, NumberDensity, Temperature, Time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Time history of a simulation.
///
/// Decoded records are checked for consistency: every series has one entry
/// per step, times strictly increase, and each fraction row has one value
/// per charge state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSimulation")]
pub struct Simulation {
    abundances: Abundances,
    time: Vec<Time>,
    temperature: Vec<Temperature>,
    hydrogen_density: Vec<NumberDensity>,
    electron_density: Vec<NumberDensity>,
    /// Per element, one row of fractions per step.
    fractions: BTreeMap<Element, Vec<Vec<f64>>>,
}

/// Wire shape of [`Simulation`], before the consistency checks.
#[derive(Deserialize)]
#[cfg_attr(test, derive(Serialize))]
pub(crate) struct RawSimulation {
    pub(crate) abundances: Abundances,
    pub(crate) time: Vec<Time>,
    pub(crate) temperature: Vec<Temperature>,
    pub(crate) hydrogen_density: Vec<NumberDensity>,
    pub(crate) electron_density: Vec<NumberDensity>,
    pub(crate) fractions: BTreeMap<Element, Vec<Vec<f64>>>,
}

impl TryFrom<RawSimulation> for Simulation {
    type Error = NeiError;

    fn try_from(raw: RawSimulation) -> Result<Self, NeiError> {
        let invalid = NeiError::DeserializationError;
        let steps = raw.time.len();
        if steps == 0 {
            return Err(invalid("record has no steps".to_string()));
        }
        for (name, len) in [
            ("temperature", raw.temperature.len()),
            ("hydrogen_density", raw.hydrogen_density.len()),
            ("electron_density", raw.electron_density.len()),
        ] {
            if len != steps {
                return Err(invalid(format!("{} has {} entries for {} steps", name, len, steps)));
            }
        }
        if raw.time.iter().any(|t| !t.as_seconds().is_finite())
            || raw.time.windows(2).any(|w| w[1].as_seconds() <= w[0].as_seconds())
        {
            return Err(invalid("times must be finite and strictly increasing".to_string()));
        }
        for (element, rows) in &raw.fractions {
            if rows.len() != steps {
                return Err(invalid(format!(
                    "{} has {} fraction rows for {} steps",
                    element,
                    rows.len(),
                    steps
                )));
            }
            if let Some(row) = rows.iter().find(|row| row.len() != element.nstates()) {
                return Err(invalid(format!(
                    "{} fraction row has {} values, expected {}",
                    element,
                    row.len(),
                    element.nstates()
                )));
            }
        }

        Ok(Self {
            abundances: raw.abundances,
            time: raw.time,
            temperature: raw.temperature,
            hydrogen_density: raw.hydrogen_density,
            electron_density: raw.electron_density,
            fractions: raw.fractions,
        })
    }
}

/// Two steps of hydrogen with only one temperature entry.
#[cfg(test)]
pub(crate) fn mismatched_record() -> RawSimulation {
    RawSimulation {
        abundances: Abundances::solar(),
        time: vec![Time::seconds(0.0), Time::seconds(1.0)],
        temperature: vec![Temperature::kelvin(1.0e6)],
        hydrogen_density: vec![NumberDensity::per_cubic_cm(1.0); 2],
        electron_density: vec![NumberDensity::per_cubic_cm(1.0); 2],
        fractions: BTreeMap::from([(Element::HYDROGEN, vec![vec![0.0, 1.0]; 2])]),
    }
}

impl Simulation {
    /// Start a record from the initial state at `time_start`.
    pub fn new(initial: &IonizationStates, time_start: Time) -> Result<Self, NeiError> {
        let mut record = Self {
            abundances: initial.abundances().clone(),
            time: Vec::new(),
            temperature: Vec::new(),
            hydrogen_density: Vec::new(),
            electron_density: Vec::new(),
            fractions: initial.elements().map(|e| (e, Vec::new())).collect(),
        };
        record.assign(time_start, initial)?;
        Ok(record)
    }

    /// Append a step.
    ///
    /// `states` must hold the same elements as the record and carry a
    /// temperature and hydrogen density.
    pub fn assign(&mut self, time: Time, states: &IonizationStates) -> Result<(), NeiError> {
        let step = self.len();
        let failed = |reason: String| NeiError::SimulationFailed { step, reason };

        let temperature = states
            .temperature()
            .ok_or_else(|| failed("state has no temperature".to_string()))?;
        let hydrogen_density = states
            .hydrogen_density()
            .ok_or_else(|| failed("state has no hydrogen density".to_string()))?;
        if !self.fractions.keys().copied().eq(states.elements()) {
            return Err(failed("state elements differ from the record".to_string()));
        }
        if let Some(last) = self.time.last()
            && time.as_seconds() <= last.as_seconds()
        {
            return Err(failed(format!("time {} does not follow {}", time, last)));
        }
        let electron_density = states.electron_density()?;

        for (element, rows) in &mut self.fractions {
            rows.push(states.ionic_fractions(*element)?.to_vec());
        }
        self.time.push(time);
        self.temperature.push(temperature);
        self.hydrogen_density.push(hydrogen_density);
        self.electron_density.push(electron_density);
        Ok(())
    }

    /// Number of recorded steps, including the initial state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.fractions.keys().copied()
    }

    #[must_use]
    pub const fn abundances(&self) -> &Abundances {
        &self.abundances
    }

    #[must_use]
    pub fn time(&self) -> &[Time] {
        &self.time
    }

    #[must_use]
    pub fn temperature(&self) -> &[Temperature] {
        &self.temperature
    }

    #[must_use]
    pub fn hydrogen_density(&self) -> &[NumberDensity] {
        &self.hydrogen_density
    }

    #[must_use]
    pub fn electron_density(&self) -> &[NumberDensity] {
        &self.electron_density
    }

    /// Number of charge states of `element`.
    pub fn nstates(&self, element: Element) -> Result<usize, NeiError> {
        self.rows(element).map(|_| element.nstates())
    }

    /// Ionic fractions of `element`, one row per step.
    pub fn ionic_fractions(&self, element: Element) -> Result<&[Vec<f64>], NeiError> {
        self.rows(element)
    }

    /// Total number density of `element` at every step.
    pub fn element_density(&self, element: Element) -> Result<Vec<f64>, NeiError> {
        self.rows(element)?;
        let abundance = self.abundances.get(element).ok_or_else(|| {
            NeiError::InvalidAbundance(format!("no abundance given for {}", element))
        })?;
        Ok(self
            .hydrogen_density
            .iter()
            .map(|n| n.as_per_cubic_cm() * abundance)
            .collect())
    }

    /// Number density of every charge state of `element`, one row per step.
    pub fn number_densities(&self, element: Element) -> Result<Vec<Vec<f64>>, NeiError> {
        let n_elem = self.element_density(element)?;
        Ok(self
            .rows(element)?
            .iter()
            .zip(n_elem)
            .map(|(row, n)| row.iter().map(|f| f * n).collect())
            .collect())
    }

    fn rows(&self, element: Element) -> Result<&[Vec<f64>], NeiError> {
        self.fractions
            .get(&element)
            .map(Vec::as_slice)
            .ok_or_else(|| NeiError::UnknownElement(format!("{} was not simulated", element)))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn states(h: [f64; 2], n_h: f64, temperature: f64) -> IonizationStates {
        let mut fractions = BTreeMap::new();
        fractions.insert(Element::HYDROGEN, h.to_vec());
        IonizationStates::new(
            fractions,
            &Abundances::solar(),
            Some(Temperature::kelvin(temperature)),
            Some(NumberDensity::per_cubic_cm(n_h)),
            1e-15,
        )
        .expect("states")
    }

    #[test]
    fn initial_step_recorded() {
        let record = Simulation::new(&states([0.5, 0.5], 10.0, 1.0e4), Time::seconds(0.0))
            .expect("record");
        assert_eq!(record.len(), 1);
        assert_eq!(record.electron_density()[0].as_per_cubic_cm(), 5.0);
        assert_eq!(record.nstates(Element::HYDROGEN).expect("nstates"), 2);
    }

    #[test]
    fn steps_append_in_time_order() {
        let mut record = Simulation::new(&states([1.0, 0.0], 10.0, 1.0e4), Time::seconds(0.0))
            .expect("record");
        record
            .assign(Time::seconds(1.0), &states([0.0, 1.0], 20.0, 2.0e4))
            .expect("step");
        assert_eq!(record.len(), 2);
        assert_eq!(record.ionic_fractions(Element::HYDROGEN).expect("f")[1], vec![0.0, 1.0]);
        assert_eq!(record.number_densities(Element::HYDROGEN).expect("n")[1], vec![0.0, 20.0]);
        assert_eq!(record.element_density(Element::HYDROGEN).expect("n"), vec![10.0, 20.0]);

        let stale = record.assign(Time::seconds(1.0), &states([0.0, 1.0], 20.0, 2.0e4));
        assert!(matches!(stale, Err(NeiError::SimulationFailed { step: 2, .. })));
    }

    #[test]
    fn unknown_element_rejected() {
        let record = Simulation::new(&states([1.0, 0.0], 1.0, 1.0e4), Time::seconds(0.0))
            .expect("record");
        let helium = Element::from_symbol("He").expect("He");
        assert!(record.ionic_fractions(helium).is_err());
        assert!(record.number_densities(helium).is_err());
    }

    #[test]
    fn inconsistent_records_rejected() {
        let json = serde_json::to_string(&mismatched_record()).expect("json");
        let err = serde_json::from_str::<Simulation>(&json).expect_err("mismatched lengths");
        assert!(err.to_string().contains("temperature has 1 entries"), "{}", err);

        let mut short_row = mismatched_record();
        short_row.temperature.push(Temperature::kelvin(1.0e6));
        short_row.fractions.insert(Element::HYDROGEN, vec![vec![1.0], vec![1.0]]);
        let json = serde_json::to_string(&short_row).expect("json");
        assert!(serde_json::from_str::<Simulation>(&json).is_err());

        let mut backwards = mismatched_record();
        backwards.temperature.push(Temperature::kelvin(1.0e6));
        backwards.time.reverse();
        let json = serde_json::to_string(&backwards).expect("json");
        assert!(serde_json::from_str::<Simulation>(&json).is_err());

        let mut consistent = mismatched_record();
        consistent.temperature.push(Temperature::kelvin(1.0e6));
        let json = serde_json::to_string(&consistent).expect("json");
        assert_eq!(serde_json::from_str::<Simulation>(&json).expect("valid").len(), 2);
    }

    #[test]
    fn record_serializes() {
        let record = Simulation::new(&states([0.25, 0.75], 1.0, 1.0e4), Time::seconds(0.0))
            .expect("record");
        let bytes = postcard::to_allocvec(&record).expect("serialize");
        let back: Simulation = postcard::from_bytes(&bytes).expect("deserialize");
        assert_eq!(back, record);
    }
}
