//! # Profiles
//!
//! Time histories of the electron temperature and the hydrogen density.
//!
//! A profile is one of:
//! - a constant value
//! - samples at increasing times, linearly interpolated between them
//! - an arbitrary function of time

use crate::{NeiError, Quantity, Time};
use std::sync::Arc;

/// A shareable function of time.
pub type ProfileFn<Q> = Arc<dyn Fn(Time) -> Q + Send + Sync>;

/// A quantity as a function of time.
#[derive(Clone)]
pub enum Profile<Q: Quantity> {
    Constant(Q),
    /// Built by [`Profile::tabulated`].
    Tabulated(Samples<Q>),
    Function(ProfileFn<Q>),
}

/// Checked samples of a tabulated profile.
#[derive(Debug, Clone)]
pub struct Samples<Q: Quantity> {
    times: Vec<Time>,
    values: Vec<Q>,
}

impl<Q: Quantity> Samples<Q> {
    #[must_use]
    pub fn times(&self) -> &[Time] {
        &self.times
    }

    #[must_use]
    pub fn values(&self) -> &[Q] {
        &self.values
    }

    fn check(&self) -> Result<(), NeiError> {
        if self.times.len() != self.values.len() {
            return Err(NeiError::InvalidProfile(format!(
                "{} {} samples for {} times",
                self.values.len(),
                Q::label(),
                self.times.len()
            )));
        }
        if self.times.is_empty() {
            return Err(NeiError::InvalidProfile(format!(
                "{} profile has no samples",
                Q::label()
            )));
        }
        check_increasing(&self.times)?;
        for value in &self.values {
            check_value(*value)?;
        }
        Ok(())
    }
}

impl<Q: Quantity> std::fmt::Debug for Profile<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Tabulated(samples) => f.debug_tuple("Tabulated").field(samples).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl<Q: Quantity> Profile<Q> {
    /// Samples of the quantity at strictly increasing `times`.
    pub fn tabulated(times: Vec<Time>, values: Vec<Q>) -> Result<Self, NeiError> {
        let samples = Samples { times, values };
        samples.check()?;
        Ok(Self::Tabulated(samples))
    }

    /// Wrap a closure.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Time) -> Q + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Value at `time`.
    ///
    /// Tabulated profiles refuse to extrapolate. Function profiles must
    /// return a finite, non-negative value.
    pub fn at(&self, time: Time) -> Result<Q, NeiError> {
        let t = time.as_seconds();
        if t.is_nan() {
            return Err(NeiError::InvalidTime("time is not a number".to_string()));
        }
        match self {
            Self::Constant(value) => Ok(*value),
            Self::Tabulated(samples) => interpolate(samples, t),
            Self::Function(f) => check_value(f(time)),
        }
    }

    /// Check the profile can be evaluated over `[start, max]`.
    pub fn validate_over(&self, start: Time, max: Option<Time>) -> Result<(), NeiError> {
        match self {
            Self::Constant(value) => check_value(*value).map(|_| ()),
            Self::Tabulated(samples) => samples.check(),
            Self::Function(_) => {
                self.at(start).map_err(|e| invalid_function::<Q>(start, &e))?;
                if let Some(max) = max {
                    self.at(max).map_err(|e| invalid_function::<Q>(max, &e))?;
                }
                Ok(())
            }
        }
    }
}

fn invalid_function<Q: Quantity>(time: Time, err: &NeiError) -> NeiError {
    NeiError::InvalidProfile(format!(
        "invalid {} function at {}: {}",
        Q::label(),
        time,
        err
    ))
}

/// Strictly increasing and finite.
pub(crate) fn check_increasing(times: &[Time]) -> Result<(), NeiError> {
    if times.iter().any(|t| !t.as_seconds().is_finite()) {
        return Err(NeiError::InvalidTime(
            "time_input contains non-finite values".to_string(),
        ));
    }
    if times.windows(2).any(|w| w[1].as_seconds() <= w[0].as_seconds()) {
        return Err(NeiError::InvalidTime(
            "time_input must monotonically increase".to_string(),
        ));
    }
    Ok(())
}

fn check_value<Q: Quantity>(value: Q) -> Result<Q, NeiError> {
    let raw = value.value();
    if raw.is_nan() {
        return Err(NeiError::InvalidProfile(format!("{} is not a number", Q::label())));
    }
    if !raw.is_finite() || raw < 0.0 {
        return Err(NeiError::InvalidProfile(format!(
            "{} must be finite and non-negative, got {}",
            Q::label(),
            raw
        )));
    }
    Ok(value)
}

fn interpolate<Q: Quantity>(samples: &Samples<Q>, t: f64) -> Result<Q, NeiError> {
    let Samples { times, values } = samples;
    let (first, last) = match (times.first(), times.last()) {
        (Some(first), Some(last)) if times.len() == values.len() => {
            (first.as_seconds(), last.as_seconds())
        }
        _ => return Err(samples.check().err().unwrap_or_else(|| mismatch::<Q>())),
    };
    if t < first || t > last {
        return Err(NeiError::InvalidTime(format!(
            "{} s outside the {} profile range [{}, {}] s",
            t,
            Q::label(),
            first,
            last
        )));
    }

    let upper = times.partition_point(|x| x.as_seconds() < t);
    if upper == 0 {
        return Ok(values[0]);
    }
    let (t0, t1) = (times[upper - 1].as_seconds(), times[upper].as_seconds());
    let (v0, v1) = (values[upper - 1].value(), values[upper].value());
    let w = (t - t0) / (t1 - t0);
    Ok(Q::from_value(v0 + w * (v1 - v0)))
}

fn mismatch<Q: Quantity>() -> NeiError {
    NeiError::InvalidProfile(format!("malformed {} samples", Q::label()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NumberDensity, Temperature};

    fn seconds(values: &[f64]) -> Vec<Time> {
        values.iter().copied().map(Time::seconds).collect()
    }

    #[test]
    fn constant_everywhere() {
        let profile = Profile::Constant(Temperature::kelvin(1.0e6));
        assert!(profile.is_constant());
        assert_eq!(profile.at(Time::seconds(1.0e9)).expect("at").as_kelvin(), 1.0e6);
    }

    #[test]
    fn tabulated_interpolates_linearly() {
        let profile = Profile::tabulated(
            seconds(&[0.0, 10.0, 20.0]),
            vec![
                Temperature::kelvin(1.0e4),
                Temperature::kelvin(2.0e4),
                Temperature::kelvin(4.0e4),
            ],
        )
        .expect("profile");
        assert_eq!(profile.at(Time::seconds(0.0)).expect("t0").as_kelvin(), 1.0e4);
        assert_eq!(profile.at(Time::seconds(5.0)).expect("t1").as_kelvin(), 1.5e4);
        assert_eq!(profile.at(Time::seconds(10.0)).expect("t2").as_kelvin(), 2.0e4);
        assert_eq!(profile.at(Time::seconds(15.0)).expect("t3").as_kelvin(), 3.0e4);
        assert_eq!(profile.at(Time::seconds(20.0)).expect("t4").as_kelvin(), 4.0e4);
    }

    #[test]
    fn tabulated_refuses_extrapolation() {
        let profile = Profile::tabulated(
            seconds(&[0.0, 10.0]),
            vec![NumberDensity::per_cubic_cm(1.0), NumberDensity::per_cubic_cm(2.0)],
        )
        .expect("profile");
        assert!(matches!(profile.at(Time::seconds(10.5)), Err(NeiError::InvalidTime(_))));
        assert!(matches!(profile.at(Time::seconds(-1.0)), Err(NeiError::InvalidTime(_))));
    }

    #[test]
    fn tabulated_validation() {
        let one = Temperature::kelvin(1.0);
        assert!(Profile::tabulated(seconds(&[0.0, 1.0]), vec![one]).is_err());
        assert!(Profile::tabulated(seconds(&[0.0, 0.0]), vec![one, one]).is_err());
        assert!(Profile::tabulated(seconds(&[1.0, 0.0]), vec![one, one]).is_err());
        assert!(Profile::tabulated(seconds(&[0.0, 1.0]), vec![one, Temperature::kelvin(-1.0)]).is_err());
        assert!(Profile::<Temperature>::tabulated(vec![], vec![]).is_err());
    }

    #[test]
    fn function_profiles_are_checked() {
        let ramp = Profile::function(|t: Time| Temperature::kelvin(1.0e4 + t.as_seconds()));
        assert_eq!(ramp.at(Time::seconds(5.0)).expect("at").as_kelvin(), 1.0e4 + 5.0);
        assert!(ramp.validate_over(Time::seconds(0.0), Some(Time::seconds(10.0))).is_ok());

        let broken = Profile::function(|t: Time| Temperature::kelvin(1.0 - t.as_seconds()));
        assert!(broken.validate_over(Time::seconds(0.0), Some(Time::seconds(10.0))).is_err());

        let nan = Profile::function(|_| Temperature::kelvin(f64::NAN));
        assert!(matches!(nan.at(Time::seconds(0.0)), Err(NeiError::InvalidProfile(_))));
    }

    #[test]
    fn malformed_samples_rejected() {
        let short = Profile::Tabulated(Samples {
            times: seconds(&[0.0, 10.0]),
            values: vec![Temperature::kelvin(1.0e6)],
        });
        assert!(matches!(short.at(Time::seconds(5.0)), Err(NeiError::InvalidProfile(_))));
        assert!(matches!(
            short.validate_over(Time::seconds(0.0), Some(Time::seconds(10.0))),
            Err(NeiError::InvalidProfile(_))
        ));

        let empty: Profile<Temperature> = Profile::Tabulated(Samples {
            times: vec![],
            values: vec![],
        });
        assert!(matches!(empty.at(Time::seconds(0.0)), Err(NeiError::InvalidProfile(_))));

        let built = Profile::tabulated(seconds(&[0.0, 1.0]), vec![Temperature::kelvin(2.0); 2])
            .expect("profile");
        assert!(matches!(
            &built,
            Profile::Tabulated(samples) if samples.times().len() == samples.values().len()
        ));
    }

    #[test]
    fn nan_time_rejected() {
        let profile = Profile::Constant(Temperature::kelvin(1.0));
        assert!(profile.at(Time::seconds(f64::NAN)).is_err());
    }
}
