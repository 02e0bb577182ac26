//! # NEI Engine
//!
//! Evolves the ionization state of a plasma through prescribed temperature
//! and density histories.
//!
//! ## Usage
//!
//! ```
//! use nei_core::{Element, Inputs, Nei, NumberDensity, Profile, Temperature, Time};
//!
//! let mut nei = Nei::builder(Inputs::Elements(vec![Element::HYDROGEN]))
//!     .temperature(Profile::Constant(Temperature::kelvin(1.0e6)))
//!     .density(Profile::Constant(NumberDensity::per_cubic_cm(1.0e9)))
//!     .time_max(Time::seconds(10.0))
//!     .dt(Time::seconds(1.0))
//!     .build()?;
//! let results = nei.simulate()?;
//! assert_eq!(results.len(), 11);
//! # Ok::<(), nei_core::NeiError>(())
//! ```
//!
//! ## Time stepping
//!
//! Every step advances each element with the eigen decomposition at the
//! temperature and electron density of the previous step, then records the
//! new state with the temperature and density at the new time. The last
//! step is shortened to land exactly on `time_max`.
//!
//! Fixed steps use `dt`. Adaptive steps limit the relative change of the
//! temperature and density within one step to `0.05 · safety_factor`, with
//! a floor of `(time_max - time_start) / max_steps`.

use crate::eigen::{EigenTable, TemperatureGrid};
use crate::primitives::{
    DEFAULT_MAX_STEPS, DEFAULT_TOLERANCE, MAX_FRACTION_DRIFT, MAX_RELATIVE_CHANGE, MAX_STEPS,
    SAFETY_FACTOR_RANGE, TIME_LANDING_TOLERANCE,
};
use crate::profile::check_increasing;
use crate::rates::{HydrogenicRates, RateSource};
use crate::{
    Abundances, Element, Inputs, IonizationStates, NeiError, NumberDensity, Profile, Quantity,
    Simulation, Temperature, Time,
};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// REPORTS AND QUERIES
// =============================================================================

/// Progress of a single time step, handed to the observer of
/// [`Nei::simulate_with`] before the step is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Index of the step being taken (the initial state is step 0).
    pub step: usize,
    /// Time at the start of the step.
    pub time: Time,
    pub dt: Time,
    pub temperature: Temperature,
    pub electron_density: NumberDensity,
}

/// Where to evaluate equilibrium ionic fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EquilibriumAt {
    Temperature(Temperature),
    /// The electron temperature at this time.
    Time(Time),
    /// The simulation temperature; only defined when it is constant.
    Default,
}

// =============================================================================
// BUILDER
// =============================================================================

#[derive(Debug, Clone)]
enum ProfileInput<Q: Quantity> {
    Profile(Profile<Q>),
    Samples(Vec<Q>),
}

/// Configuration of an [`Nei`] run.
#[derive(Debug, Clone)]
pub struct NeiBuilder {
    inputs: Inputs,
    abundances: Abundances,
    temperature: Option<ProfileInput<Temperature>>,
    density: Option<ProfileInput<NumberDensity>>,
    time_input: Option<Vec<Time>>,
    time_start: Option<Time>,
    time_max: Option<Time>,
    max_steps: usize,
    tol: f64,
    dt: Option<Time>,
    adapt_dt: Option<bool>,
    safety_factor: f64,
    rates: Arc<dyn RateSource>,
    grid: TemperatureGrid,
}

impl NeiBuilder {
    #[must_use]
    pub fn new(inputs: Inputs) -> Self {
        Self {
            inputs,
            abundances: Abundances::solar(),
            temperature: None,
            density: None,
            time_input: None,
            time_start: None,
            time_max: None,
            max_steps: DEFAULT_MAX_STEPS,
            tol: DEFAULT_TOLERANCE,
            dt: None,
            adapt_dt: None,
            safety_factor: 1.0,
            rates: Arc::new(HydrogenicRates),
            grid: TemperatureGrid::default(),
        }
    }

    #[must_use]
    pub fn abundances(mut self, abundances: Abundances) -> Self {
        self.abundances = abundances;
        self
    }

    #[must_use]
    pub fn temperature(mut self, profile: Profile<Temperature>) -> Self {
        self.temperature = Some(ProfileInput::Profile(profile));
        self
    }

    /// Temperatures sampled at the times given by [`Self::time_input`].
    #[must_use]
    pub fn temperature_samples(mut self, samples: Vec<Temperature>) -> Self {
        self.temperature = Some(ProfileInput::Samples(samples));
        self
    }

    #[must_use]
    pub fn density(mut self, profile: Profile<NumberDensity>) -> Self {
        self.density = Some(ProfileInput::Profile(profile));
        self
    }

    /// Hydrogen densities sampled at the times given by [`Self::time_input`].
    #[must_use]
    pub fn density_samples(mut self, samples: Vec<NumberDensity>) -> Self {
        self.density = Some(ProfileInput::Samples(samples));
        self
    }

    #[must_use]
    pub fn time_input(mut self, times: Vec<Time>) -> Self {
        self.time_input = Some(times);
        self
    }

    #[must_use]
    pub const fn time_start(mut self, time: Time) -> Self {
        self.time_start = Some(time);
        self
    }

    #[must_use]
    pub const fn time_max(mut self, time: Time) -> Self {
        self.time_max = Some(time);
        self
    }

    #[must_use]
    pub const fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub const fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    #[must_use]
    pub const fn dt(mut self, dt: Time) -> Self {
        self.dt = Some(dt);
        self
    }

    #[must_use]
    pub const fn adapt_dt(mut self, adapt: bool) -> Self {
        self.adapt_dt = Some(adapt);
        self
    }

    #[must_use]
    pub const fn safety_factor(mut self, factor: f64) -> Self {
        self.safety_factor = factor;
        self
    }

    #[must_use]
    pub fn rates(mut self, rates: Arc<dyn RateSource>) -> Self {
        self.rates = rates;
        self
    }

    #[must_use]
    pub const fn grid(mut self, grid: TemperatureGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Validate the configuration and compute the initial state.
    pub fn build(self) -> Result<Nei, NeiError> {
        if let Some(times) = &self.time_input {
            if times.is_empty() {
                return Err(NeiError::InvalidTime("time_input is empty".to_string()));
            }
            check_increasing(times)?;
        }
        let first_input = self.time_input.as_ref().and_then(|t| t.first().copied());
        let last_input = self.time_input.as_ref().and_then(|t| t.last().copied());

        let time_start = self
            .time_start
            .or(first_input)
            .unwrap_or(Time::seconds(0.0));
        if !time_start.as_seconds().is_finite() {
            return Err(NeiError::InvalidTime("time_start must be finite".to_string()));
        }
        if let Some(first) = first_input
            && time_start.as_seconds() < first.as_seconds()
        {
            return Err(NeiError::InvalidTime(
                "time_start must not be less than min(time_input)".to_string(),
            ));
        }

        let time_max = self.time_max.or(last_input);
        if let Some(max) = time_max {
            if !max.as_seconds().is_finite() {
                return Err(NeiError::InvalidTime("time_max must be finite".to_string()));
            }
            if max.as_seconds() <= time_start.as_seconds() {
                return Err(NeiError::InvalidTime(
                    "time_max must be greater than time_start".to_string(),
                ));
            }
            if let Some(last) = last_input
                && max.as_seconds() > last.as_seconds()
            {
                return Err(NeiError::InvalidTime(
                    "time_max must not be greater than max(time_input)".to_string(),
                ));
            }
        }

        if self.max_steps == 0 || self.max_steps > MAX_STEPS {
            return Err(NeiError::InvalidParameter(format!(
                "max_steps must be between 1 and {}, got {}",
                MAX_STEPS, self.max_steps
            )));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(NeiError::InvalidParameter(format!(
                "tol must be finite and non-negative, got {}",
                self.tol
            )));
        }
        if let Some(dt) = self.dt
            && !(dt.as_seconds().is_finite() && dt.as_seconds() > 0.0)
        {
            return Err(NeiError::InvalidParameter(format!(
                "dt must be positive, got {}",
                dt
            )));
        }
        let adapt_dt = self.adapt_dt.unwrap_or(self.dt.is_none());
        if !adapt_dt && self.dt.is_none() {
            return Err(NeiError::InvalidParameter(
                "a fixed time step needs dt".to_string(),
            ));
        }
        if adapt_dt && time_max.is_none() {
            return Err(NeiError::InvalidTime(
                "adaptive time stepping needs time_max".to_string(),
            ));
        }
        let (low, high) = SAFETY_FACTOR_RANGE;
        if !(low..=high).contains(&self.safety_factor) {
            return Err(NeiError::InvalidParameter(format!(
                "safety factor must lie in [{}, {}], got {}",
                low, high, self.safety_factor
            )));
        }

        let temperature = resolve_profile(self.temperature, self.time_input.as_deref())?;
        let density = resolve_profile(self.density, self.time_input.as_deref())?;
        temperature.validate_over(time_start, time_max)?;
        density.validate_over(time_start, time_max)?;

        let elements = self.inputs.elements();
        if !elements.contains(&Element::HYDROGEN) {
            return Err(NeiError::MissingHydrogen);
        }

        let tables: BTreeMap<Element, EigenTable> = elements
            .iter()
            .map(|&e| (e, EigenTable::new(e, self.grid, Arc::clone(&self.rates))))
            .collect();

        let temperature_init = temperature.at(time_start)?;
        let density_init = density.at(time_start)?;
        let node = self.grid.temperature(self.grid.index_of(temperature_init)?);
        for &element in &elements {
            check_rate_coverage(self.rates.as_ref(), element, node)?;
        }

        let fractions = match self.inputs {
            Inputs::Fractions(map) => map,
            Inputs::Elements(_) => tables
                .iter()
                .map(|(&e, table)| table.equilibrium_state(temperature_init).map(|f| (e, f)))
                .collect::<Result<BTreeMap<_, _>, _>>()?,
        };

        let initial = IonizationStates::new(
            fractions,
            &self.abundances,
            Some(temperature_init),
            Some(density_init),
            self.tol,
        )?;

        Ok(Nei {
            elements,
            initial,
            temperature,
            density,
            time_start,
            time_max,
            max_steps: self.max_steps,
            tol: self.tol,
            dt: self.dt,
            adapt_dt,
            safety_factor: self.safety_factor,
            tables,
            results: None,
            final_state: None,
        })
    }
}

/// The rate source must cover the grid node nearest the initial temperature.
fn check_rate_coverage(
    rates: &dyn RateSource,
    element: Element,
    node: Temperature,
) -> Result<(), NeiError> {
    match rates.temperature_range(element) {
        Some((min, max)) if !(min..=max).contains(&node.as_kelvin()) => {
            Err(NeiError::TemperatureOutOfRange {
                temperature: node.as_kelvin(),
                min,
                max,
            })
        }
        _ => Ok(()),
    }
}

fn resolve_profile<Q: Quantity>(
    input: Option<ProfileInput<Q>>,
    time_input: Option<&[Time]>,
) -> Result<Profile<Q>, NeiError> {
    match input {
        None => Err(NeiError::InvalidProfile(format!("{} is required", Q::label()))),
        Some(ProfileInput::Profile(profile)) => Ok(profile),
        Some(ProfileInput::Samples(values)) => {
            let times = time_input.ok_or_else(|| {
                NeiError::InvalidProfile(format!(
                    "Must define time_input prior to {} samples",
                    Q::label()
                ))
            })?;
            Profile::tabulated(times.to_vec(), values)
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// A configured non-equilibrium ionization run.
#[derive(Debug)]
pub struct Nei {
    elements: Vec<Element>,
    initial: IonizationStates,
    temperature: Profile<Temperature>,
    density: Profile<NumberDensity>,
    time_start: Time,
    time_max: Option<Time>,
    max_steps: usize,
    tol: f64,
    dt: Option<Time>,
    adapt_dt: bool,
    safety_factor: f64,
    tables: BTreeMap<Element, EigenTable>,
    results: Option<Simulation>,
    final_state: Option<IonizationStates>,
}

impl Nei {
    #[must_use]
    pub fn builder(inputs: Inputs) -> NeiBuilder {
        NeiBuilder::new(inputs)
    }

    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    #[must_use]
    pub const fn initial(&self) -> &IonizationStates {
        &self.initial
    }

    #[must_use]
    pub const fn abundances(&self) -> &Abundances {
        self.initial.abundances()
    }

    #[must_use]
    pub const fn time_start(&self) -> Time {
        self.time_start
    }

    #[must_use]
    pub const fn time_max(&self) -> Option<Time> {
        self.time_max
    }

    #[must_use]
    pub const fn max_steps(&self) -> usize {
        self.max_steps
    }

    #[must_use]
    pub const fn tol(&self) -> f64 {
        self.tol
    }

    #[must_use]
    pub const fn dt(&self) -> Option<Time> {
        self.dt
    }

    #[must_use]
    pub const fn adapt_dt(&self) -> bool {
        self.adapt_dt
    }

    #[must_use]
    pub const fn safety_factor(&self) -> f64 {
        self.safety_factor
    }

    pub fn eigen_table(&self, element: Element) -> Result<&EigenTable, NeiError> {
        self.tables
            .get(&element)
            .ok_or_else(|| NeiError::UnknownElement(format!("{} is not in this plasma", element)))
    }

    fn check_time(&self, time: Time) -> Result<(), NeiError> {
        let t = time.as_seconds();
        if t.is_nan() {
            return Err(NeiError::InvalidTime("time is not a number".to_string()));
        }
        if t < self.time_start.as_seconds() {
            return Err(NeiError::InvalidTime(format!(
                "time = {} is less than time_start = {}",
                time, self.time_start
            )));
        }
        if let Some(max) = self.time_max
            && t > max.as_seconds()
        {
            return Err(NeiError::InvalidTime(format!(
                "time = {} is greater than time_max = {}",
                time, max
            )));
        }
        Ok(())
    }

    /// Electron temperature at `time`.
    pub fn electron_temperature(&self, time: Time) -> Result<Temperature, NeiError> {
        self.check_time(time)?;
        self.temperature.at(time)
    }

    /// Hydrogen number density at `time`.
    pub fn hydrogen_number_density(&self, time: Time) -> Result<NumberDensity, NeiError> {
        self.check_time(time)?;
        self.density.at(time)
    }

    /// Equilibrium ionic fractions of every element.
    pub fn equilibrium_ionic_fractions(
        &self,
        at: EquilibriumAt,
    ) -> Result<BTreeMap<Element, Vec<f64>>, NeiError> {
        let temperature = match at {
            EquilibriumAt::Temperature(t) => t,
            EquilibriumAt::Time(time) => self.electron_temperature(time)?,
            EquilibriumAt::Default => match &self.temperature {
                Profile::Constant(t) => *t,
                _ => {
                    return Err(NeiError::InvalidParameter(
                        "a temperature or time is needed when the temperature varies".to_string(),
                    ));
                }
            },
        };
        self.tables
            .iter()
            .map(|(&e, table)| table.equilibrium_state(temperature).map(|f| (e, f)))
            .collect()
    }

    /// Results of the last simulation.
    pub fn results(&self) -> Result<&Simulation, NeiError> {
        self.results.as_ref().ok_or(NeiError::NotSimulated)
    }

    /// Ionization state at the end of the last simulation.
    pub fn final_state(&self) -> Result<&IonizationStates, NeiError> {
        self.final_state.as_ref().ok_or(NeiError::NotSimulated)
    }

    /// Take the results of the last simulation.
    pub fn into_results(self) -> Result<Simulation, NeiError> {
        self.results.ok_or(NeiError::NotSimulated)
    }

    /// Run the simulation.
    pub fn simulate(&mut self) -> Result<&Simulation, NeiError> {
        self.simulate_with(|_| {})
    }

    /// Run the simulation, reporting every step to `observer`.
    ///
    /// Any earlier results are replaced.
    pub fn simulate_with<F>(&mut self, mut observer: F) -> Result<&Simulation, NeiError>
    where
        F: FnMut(&StepReport),
    {
        let mut record = Simulation::new(&self.initial, self.time_start)?;
        let mut state = self.initial.clone();
        let mut time = self.time_start;

        for step in 1..=self.max_steps {
            let remaining = self.time_max.map(|max| max.as_seconds() - time.as_seconds());
            if remaining.is_some_and(|r| r <= 0.0) {
                break;
            }

            let failed = |err: NeiError| NeiError::SimulationFailed {
                step,
                reason: err.to_string(),
            };
            let dt = self.timestep(time, remaining).map_err(failed)?;
            let dt = match remaining {
                Some(r) if r - dt.as_seconds() <= self.landing_slack() => Time::seconds(r),
                _ => dt,
            };
            let temperature = state
                .temperature()
                .ok_or_else(|| failed(NeiError::InvalidProfile("temperature unset".to_string())))?;
            let electron_density = state.electron_density().map_err(failed)?;

            observer(&StepReport {
                step,
                time,
                dt,
                temperature,
                electron_density,
            });

            let new_time = match (self.time_max, remaining) {
                (Some(max), Some(r)) if dt.as_seconds() >= r => max,
                _ => Time::seconds(time.as_seconds() + dt.as_seconds()),
            };

            let mut next = state.clone();
            for (&element, table) in &self.tables {
                let advanced = table
                    .time_advance(
                        state.ionic_fractions(element)?,
                        temperature,
                        electron_density,
                        dt,
                    )
                    .and_then(|raw| renormalise(element, raw))
                    .map_err(failed)?;
                next.set_ionic_fractions(element, advanced).map_err(failed)?;
            }
            next.set_conditions(
                self.electron_temperature(new_time).map_err(failed)?,
                self.hydrogen_number_density(new_time).map_err(failed)?,
            );

            record.assign(new_time, &next)?;
            state = next;
            time = new_time;
        }

        self.final_state = Some(state);
        Ok(self.results.insert(record))
    }

    /// Shortfall below which a step is stretched onto `time_max`.
    fn landing_slack(&self) -> f64 {
        self.time_max.map_or(0.0, |max| {
            TIME_LANDING_TOLERANCE * (max.as_seconds() - self.time_start.as_seconds())
        })
    }

    /// Length of the next step starting at `time`.
    fn timestep(&self, time: Time, remaining: Option<f64>) -> Result<Time, NeiError> {
        if !self.adapt_dt {
            let dt = self
                .dt
                .ok_or_else(|| NeiError::InvalidParameter("dt is not set".to_string()))?
                .as_seconds();
            return Ok(Time::seconds(remaining.map_or(dt, |r| dt.min(r))));
        }

        let (max, remaining) = match (self.time_max, remaining) {
            (Some(max), Some(r)) => (max, r),
            _ => {
                return Err(NeiError::InvalidTime(
                    "adaptive time stepping needs time_max".to_string(),
                ));
            }
        };
        let min_dt = (max.as_seconds() - self.time_start.as_seconds()) / self.max_steps as f64;
        if remaining <= min_dt {
            return Ok(Time::seconds(remaining));
        }

        let probe = Time::seconds(time.as_seconds() + min_dt);
        let rate = relative_rate(
            self.electron_temperature(time)?.as_kelvin(),
            self.electron_temperature(probe)?.as_kelvin(),
            min_dt,
        )
        .max(relative_rate(
            self.hydrogen_number_density(time)?.as_per_cubic_cm(),
            self.hydrogen_number_density(probe)?.as_per_cubic_cm(),
            min_dt,
        ));

        if rate == 0.0 {
            return Ok(Time::seconds(remaining));
        }
        let dt = self.safety_factor * MAX_RELATIVE_CHANGE / rate;
        Ok(Time::seconds(dt.clamp(min_dt, remaining)))
    }
}

/// |x1 - x0| / (x0 · h), infinite when growing from zero.
fn relative_rate(x0: f64, x1: f64, h: f64) -> f64 {
    let change = (x1 - x0).abs();
    if change == 0.0 {
        0.0
    } else if x0 > 0.0 {
        change / (x0 * h)
    } else {
        f64::INFINITY
    }
}

/// Clip round-off negatives and restore unit sum.
fn renormalise(element: Element, mut fractions: Vec<f64>) -> Result<Vec<f64>, NeiError> {
    if fractions.iter().any(|f| !f.is_finite()) {
        return Err(NeiError::NumericalError(format!(
            "non-finite ionic fraction for {}",
            element
        )));
    }
    for f in &mut fractions {
        *f = f.max(0.0);
    }
    let sum: f64 = fractions.iter().sum();
    if (sum - 1.0).abs() > MAX_FRACTION_DRIFT {
        return Err(NeiError::NumericalError(format!(
            "ionic fractions of {} drifted to a sum of {}",
            element, sum
        )));
    }
    for f in &mut fractions {
        *f /= sum;
    }
    Ok(fractions)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TabulatedRates;

    fn helium() -> Element {
        Element::from_symbol("He").expect("He")
    }

    fn seconds(values: &[f64]) -> Vec<Time> {
        values.iter().copied().map(Time::seconds).collect()
    }

    fn hot_plasma() -> NeiBuilder {
        let mut fractions = BTreeMap::new();
        fractions.insert(Element::HYDROGEN, vec![0.5, 0.5]);
        fractions.insert(helium(), vec![0.5, 0.5, 0.0]);
        Nei::builder(Inputs::Fractions(fractions))
            .temperature(Profile::Constant(Temperature::kelvin(1.0e6)))
            .density(Profile::Constant(NumberDensity::per_cubic_cm(1.0e9)))
    }

    #[test]
    fn defaults() {
        let nei = hot_plasma().time_max(Time::seconds(10.0)).build().expect("build");
        assert_eq!(nei.time_start().as_seconds(), 0.0);
        assert_eq!(nei.max_steps(), DEFAULT_MAX_STEPS);
        assert_eq!(nei.tol(), DEFAULT_TOLERANCE);
        assert!(nei.adapt_dt());
        assert_eq!(nei.safety_factor(), 1.0);
        assert_eq!(nei.elements(), &[Element::HYDROGEN, helium()]);

        let fixed = hot_plasma().dt(Time::seconds(1.0)).build().expect("build");
        assert!(!fixed.adapt_dt());
        assert!(fixed.time_max().is_none());
    }

    #[test]
    fn hydrogen_is_required() {
        let result = Nei::builder(Inputs::Elements(vec![helium()]))
            .temperature(Profile::Constant(Temperature::kelvin(1.0e6)))
            .density(Profile::Constant(NumberDensity::per_cubic_cm(1.0)))
            .dt(Time::seconds(1.0))
            .build();
        assert!(matches!(result, Err(NeiError::MissingHydrogen)));
    }

    #[test]
    fn time_window_validated() {
        let backwards = hot_plasma()
            .time_start(Time::seconds(5.0))
            .time_max(Time::seconds(5.0))
            .build();
        assert!(matches!(backwards, Err(NeiError::InvalidTime(_))));

        let before_input = hot_plasma()
            .time_input(seconds(&[1.0, 2.0]))
            .time_start(Time::seconds(0.5))
            .build();
        assert!(matches!(before_input, Err(NeiError::InvalidTime(_))));

        let after_input = hot_plasma()
            .time_input(seconds(&[1.0, 2.0]))
            .time_max(Time::seconds(3.0))
            .build();
        assert!(matches!(after_input, Err(NeiError::InvalidTime(_))));

        let unordered = hot_plasma().time_input(seconds(&[2.0, 1.0])).build();
        assert!(matches!(unordered, Err(NeiError::InvalidTime(_))));
    }

    #[test]
    fn time_window_defaults_to_time_input() {
        let nei = hot_plasma()
            .time_input(seconds(&[2.0, 4.0, 8.0]))
            .build()
            .expect("build");
        assert_eq!(nei.time_start().as_seconds(), 2.0);
        assert_eq!(nei.time_max().map(Time::as_seconds), Some(8.0));
    }

    #[test]
    fn parameters_validated() {
        let max = Time::seconds(10.0);
        assert!(hot_plasma().time_max(max).max_steps(0).build().is_err());
        assert!(hot_plasma().time_max(max).max_steps(MAX_STEPS + 1).build().is_err());
        assert!(hot_plasma().time_max(max).safety_factor(1.0e4).build().is_err());
        assert!(hot_plasma().time_max(max).safety_factor(1.0e-4).build().is_err());
        assert!(hot_plasma().dt(Time::seconds(0.0)).build().is_err());
        assert!(hot_plasma().dt(Time::seconds(-1.0)).build().is_err());
        assert!(hot_plasma().time_max(max).adapt_dt(false).build().is_err());
        assert!(hot_plasma().tol(f64::NAN).time_max(max).build().is_err());
        // Adaptive stepping without an end time
        assert!(hot_plasma().build().is_err());
    }

    #[test]
    fn rate_table_must_cover_initial_temperature() {
        let table = r#"{"H": {"temperatures": [1.0e4, 1.0e6],
                              "ionization": [[1.0e-12, 1.0e-8]],
                              "recombination": [[1.0e-13, 1.0e-15]]}}"#;
        let rates: Arc<dyn RateSource> =
            Arc::new(TabulatedRates::from_json(table.as_bytes()).expect("table"));
        let plasma = |kelvin: f64| {
            let mut fractions = BTreeMap::new();
            fractions.insert(Element::HYDROGEN, vec![0.5, 0.5]);
            Nei::builder(Inputs::Fractions(fractions))
                .temperature(Profile::Constant(Temperature::kelvin(kelvin)))
                .density(Profile::Constant(NumberDensity::per_cubic_cm(1.0e9)))
                .dt(Time::seconds(1.0))
                .rates(Arc::clone(&rates))
                .build()
        };
        assert!(plasma(1.0e5).is_ok());
        assert!(matches!(
            plasma(1.0e7),
            Err(NeiError::TemperatureOutOfRange { min, max, .. }) if min == 1.0e4 && max == 1.0e6
        ));
    }

    #[test]
    fn profiles_required() {
        let result = Nei::builder(Inputs::Elements(vec![Element::HYDROGEN]))
            .dt(Time::seconds(1.0))
            .build();
        assert!(matches!(result, Err(NeiError::InvalidProfile(_))));
    }

    #[test]
    fn samples_need_time_input() {
        let result = hot_plasma()
            .temperature_samples(vec![Temperature::kelvin(1.0e4), Temperature::kelvin(1.0e5)])
            .dt(Time::seconds(1.0))
            .build();
        assert!(matches!(result, Err(NeiError::InvalidProfile(_))));

        let mismatched = hot_plasma()
            .time_input(seconds(&[0.0, 1.0, 2.0]))
            .temperature_samples(vec![Temperature::kelvin(1.0e4), Temperature::kelvin(1.0e5)])
            .build();
        assert!(matches!(mismatched, Err(NeiError::InvalidProfile(_))));
    }

    #[test]
    fn elements_start_in_equilibrium() {
        let nei = Nei::builder(Inputs::Elements(vec![Element::HYDROGEN, helium()]))
            .temperature(Profile::Constant(Temperature::kelvin(2.0e4)))
            .density(Profile::Constant(NumberDensity::per_cubic_cm(1.0e9)))
            .time_max(Time::seconds(1.0))
            .build()
            .expect("build");
        let equilibrium = nei
            .equilibrium_ionic_fractions(EquilibriumAt::Default)
            .expect("equilibrium");
        for (element, expected) in equilibrium {
            assert_eq!(nei.initial().ionic_fractions(element).expect("initial"), expected);
        }
    }

    #[test]
    fn queries_check_time() {
        let nei = hot_plasma().time_max(Time::seconds(10.0)).build().expect("build");
        assert!(nei.electron_temperature(Time::seconds(5.0)).is_ok());
        assert!(nei.electron_temperature(Time::seconds(-1.0)).is_err());
        assert!(nei.hydrogen_number_density(Time::seconds(11.0)).is_err());
        assert!(nei.electron_temperature(Time::seconds(f64::NAN)).is_err());
    }

    #[test]
    fn default_equilibrium_needs_constant_temperature() {
        let nei = hot_plasma()
            .temperature(Profile::function(|t: Time| {
                Temperature::kelvin(1.0e4 * (1.0 + t.as_seconds()))
            }))
            .time_max(Time::seconds(10.0))
            .build()
            .expect("build");
        assert!(nei.equilibrium_ionic_fractions(EquilibriumAt::Default).is_err());
        let at_time = nei
            .equilibrium_ionic_fractions(EquilibriumAt::Time(Time::seconds(1.0)))
            .expect("at time");
        let at_temperature = nei
            .equilibrium_ionic_fractions(EquilibriumAt::Temperature(Temperature::kelvin(2.0e4)))
            .expect("at temperature");
        assert_eq!(at_time, at_temperature);
    }

    #[test]
    fn results_before_simulation() {
        let nei = hot_plasma().time_max(Time::seconds(10.0)).build().expect("build");
        assert!(matches!(nei.results(), Err(NeiError::NotSimulated)));
        assert!(matches!(nei.final_state(), Err(NeiError::NotSimulated)));
    }

    #[test]
    fn fixed_steps_land_on_time_max() {
        let mut nei = hot_plasma()
            .time_max(Time::seconds(100.0))
            .dt(Time::seconds(30.0))
            .build()
            .expect("build");
        let results = nei.simulate().expect("simulate");
        let times: Vec<f64> = results.time().iter().map(|t| t.as_seconds()).collect();
        assert_eq!(times, vec![0.0, 30.0, 60.0, 90.0, 100.0]);
    }

    #[test]
    fn fixed_steps_land_without_extra_step() {
        let mut nei = Nei::builder(Inputs::Elements(vec![Element::HYDROGEN]))
            .temperature(Profile::Constant(Temperature::kelvin(1.0e5)))
            .density(Profile::Constant(NumberDensity::per_cubic_cm(1.0e9)))
            .time_max(Time::seconds(1.0))
            .dt(Time::seconds(0.1))
            .build()
            .expect("build");
        let mut steps = Vec::new();
        let results = nei
            .simulate_with(|report| steps.push(report.dt.as_seconds()))
            .expect("simulate");
        assert_eq!(results.len(), 11);
        assert_eq!(results.time().last().map(|t| t.as_seconds()), Some(1.0));
        assert_eq!(steps.len(), 10);
        assert!(steps.iter().all(|dt| (dt - 0.1).abs() < 1e-9), "{:?}", steps);
    }

    #[test]
    fn fixed_steps_stop_at_max_steps() {
        let mut nei = hot_plasma()
            .dt(Time::seconds(1.0))
            .max_steps(7)
            .build()
            .expect("build");
        assert_eq!(nei.simulate().expect("simulate").len(), 8);
    }

    #[test]
    fn fractions_stay_normalised() {
        let mut nei = hot_plasma()
            .time_max(Time::seconds(1.0))
            .dt(Time::seconds(0.01))
            .build()
            .expect("build");
        let results = nei.simulate().expect("simulate");
        for element in [Element::HYDROGEN, helium()] {
            for row in results.ionic_fractions(element).expect("fractions") {
                let sum: f64 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-12, "{} sums to {}", element, sum);
                assert!(row.iter().all(|f| (0.0..=1.0).contains(f)));
            }
        }
    }

    #[test]
    fn relaxes_to_equilibrium() {
        let mut nei = hot_plasma()
            .time_max(Time::seconds(100.0))
            .dt(Time::seconds(10.0))
            .build()
            .expect("build");
        nei.simulate().expect("simulate");
        let equilibrium = nei
            .equilibrium_ionic_fractions(EquilibriumAt::Default)
            .expect("equilibrium");
        let last = nei.final_state().expect("final");
        for (element, expected) in equilibrium {
            let actual = last.ionic_fractions(element).expect("fractions");
            for (a, e) in actual.iter().zip(&expected) {
                assert!((a - e).abs() < 1e-6, "{}: {} vs {}", element, a, e);
            }
        }
    }

    #[test]
    fn constant_profiles_take_one_adaptive_step() {
        let mut nei = hot_plasma().time_max(Time::seconds(50.0)).build().expect("build");
        let results = nei.simulate().expect("simulate");
        assert_eq!(results.len(), 2);
        assert_eq!(results.time()[1].as_seconds(), 50.0);
    }

    #[test]
    fn adaptive_steps_follow_the_ramp() {
        let mut reports = Vec::new();
        let mut nei = hot_plasma()
            .temperature(Profile::function(|t: Time| {
                Temperature::kelvin(1.0e5 + 1.0e4 * t.as_seconds())
            }))
            .time_max(Time::seconds(100.0))
            .max_steps(1000)
            .build()
            .expect("build");
        let results = nei.simulate_with(|r| reports.push(*r)).expect("simulate");

        assert_eq!(results.time().last().map(|t| t.as_seconds()), Some(100.0));
        assert!(results.len() <= 1001);
        assert_eq!(reports.len(), results.len() - 1);
        // The relative heating rate falls as the plasma heats up, so steps grow.
        assert!(reports[0].dt.as_seconds() < reports[reports.len() - 2].dt.as_seconds());
        for report in &reports {
            assert!(report.dt.as_seconds() > 0.0);
        }
    }

    #[test]
    fn observer_sees_every_step() {
        let mut steps = Vec::new();
        let mut nei = hot_plasma()
            .time_max(Time::seconds(5.0))
            .dt(Time::seconds(1.0))
            .build()
            .expect("build");
        nei.simulate_with(|r| steps.push(r.step)).expect("simulate");
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn simulation_is_repeatable() {
        let mut nei = hot_plasma()
            .time_max(Time::seconds(10.0))
            .dt(Time::seconds(1.0))
            .build()
            .expect("build");
        let first = nei.simulate().expect("first").clone();
        let second = nei.simulate().expect("second").clone();
        assert_eq!(first, second);
    }

    #[test]
    fn renormalise_rejects_drift() {
        assert!(renormalise(Element::HYDROGEN, vec![0.5, 0.6]).is_err());
        assert!(renormalise(Element::HYDROGEN, vec![f64::NAN, 1.0]).is_err());
        let fixed = renormalise(Element::HYDROGEN, vec![-1e-14, 1.0]).expect("renormalise");
        assert_eq!(fixed, vec![0.0, 1.0]);
    }
}
