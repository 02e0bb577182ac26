//! # Eigenvalue Tables
//!
//! The ionization balance of one element obeys the linear system
//!
//! ```text
//! df/dt = n_e · A(T) · f
//! A[q][q-1] = C[q-1]
//! A[q][q]   = -(C[q] + R[q])
//! A[q][q+1] = R[q+1]
//! ```
//!
//! where C are ionization and R recombination coefficients. For constant
//! temperature and density the solution over a step dt is exact:
//!
//! ```text
//! f(t + dt) = V · exp(Λ · n_e · dt) · V⁻¹ · f(t)
//! ```
//!
//! [`EigenTable`] holds the eigenvalues Λ, eigenvectors V and their inverse
//! on a temperature grid, plus the equilibrium state at each node.
//!
//! ## Decomposition
//!
//! A is tridiagonal with positive off-diagonals, so with
//! `d[q+1] / d[q] = sqrt(C[q] / R[q+1])` the matrix `B = D⁻¹ A D` is
//! symmetric. B is diagonalised with Jacobi rotations and `V = D U`,
//! `V⁻¹ = Uᵀ D⁻¹`. The scale factors span hundreds of decades at low
//! temperature, so they are kept as logarithms and each eigenvector column
//! is normalised to a unit max-norm.
//!
//! ## Fallback
//!
//! Propagating a state far from the node's equilibrium (a hot plasma
//! dropped to 10⁵ K, say) mixes modes whose scale factors differ by many
//! decades and the eigenvector product can lose conservation. Such steps
//! are recomputed as `exp(τA) · f` by scaling and squaring, where every
//! term is non-negative.

use crate::linalg::{Matrix, symmetric_eigen};
use crate::primitives::{
    DEFAULT_LOG_T_MAX, DEFAULT_LOG_T_MIN, DEFAULT_LOG_T_STEP, MAX_FRACTION_DRIFT, MIN_FRACTION,
};
use crate::rates::{RateCoefficients, RateSource};
use crate::{Element, NeiError, NumberDensity, Temperature, Time};
use std::sync::{Arc, OnceLock};

/// Largest exponent applied when undoing the diagonal scaling.
const MAX_EXPONENT: f64 = 700.0;

/// Norm of `h·A` below which the Taylor series is used directly.
const SQUARING_NORM: f64 = 1.0 / 64.0;

/// Terms of the Taylor series of `exp(h·A)`.
const TAYLOR_ORDER: u32 = 6;

/// More squarings than this would underflow the scaled step.
const MAX_SQUARINGS: i32 = 1000;

// =============================================================================
// TEMPERATURE GRID
// =============================================================================

/// A uniform grid in log10(T).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureGrid {
    log_min: f64,
    log_step: f64,
    len: usize,
}

impl TemperatureGrid {
    /// Grid from `10^log_min` to `10^log_max` in steps of `log_step` decades.
    pub fn new(log_min: f64, log_max: f64, log_step: f64) -> Result<Self, NeiError> {
        if !(log_min.is_finite() && log_max.is_finite() && log_step.is_finite())
            || log_step <= 0.0
            || log_max <= log_min
        {
            return Err(NeiError::InvalidParameter(format!(
                "invalid temperature grid: log T from {} to {} step {}",
                log_min, log_max, log_step
            )));
        }
        let len = ((log_max - log_min) / log_step).round() as usize + 1;
        Ok(Self {
            log_min,
            log_step,
            len,
        })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Temperature at node `index`.
    #[must_use]
    pub fn temperature(&self, index: usize) -> Temperature {
        Temperature::kelvin(10f64.powf(self.log_min + index as f64 * self.log_step))
    }

    #[must_use]
    pub fn min(&self) -> Temperature {
        self.temperature(0)
    }

    #[must_use]
    pub fn max(&self) -> Temperature {
        self.temperature(self.len - 1)
    }

    /// Index of the node nearest to `temperature` in log space.
    pub fn index_of(&self, temperature: Temperature) -> Result<usize, NeiError> {
        let t = temperature.as_kelvin();
        let position = (t.log10() - self.log_min) / self.log_step;
        // Half a step of slack at either end, the nearest node is still on the grid.
        if !position.is_finite() || position < -0.5 || position > (self.len - 1) as f64 + 0.5 {
            return Err(NeiError::TemperatureOutOfRange {
                temperature: t,
                min: self.min().as_kelvin(),
                max: self.max().as_kelvin(),
            });
        }
        Ok((position.round().max(0.0) as usize).min(self.len - 1))
    }
}

impl Default for TemperatureGrid {
    fn default() -> Self {
        let len = ((DEFAULT_LOG_T_MAX - DEFAULT_LOG_T_MIN) / DEFAULT_LOG_T_STEP).round() as usize + 1;
        Self {
            log_min: DEFAULT_LOG_T_MIN,
            log_step: DEFAULT_LOG_T_STEP,
            len,
        }
    }
}

// =============================================================================
// EIGEN NODE
// =============================================================================

/// Decomposition of the rate matrix at one temperature.
#[derive(Debug, Clone)]
pub struct EigenNode {
    pub temperature: Temperature,
    /// Eigenvalues (cm³ s⁻¹), non-positive, largest first.
    pub eigenvalues: Vec<f64>,
    /// Right eigenvectors as columns.
    pub eigenvectors: Matrix,
    /// Inverse of `eigenvectors`.
    pub eigenvector_inverses: Matrix,
    /// Equilibrium ionic fractions.
    pub equilibrium: Vec<f64>,
    /// The rate coefficients the decomposition was built from.
    pub coefficients: RateCoefficients,
}

impl EigenNode {
    /// Decompose the rate matrix of `element` at `temperature`.
    pub fn compute(
        element: Element,
        temperature: Temperature,
        rates: &dyn RateSource,
    ) -> Result<Self, NeiError> {
        let coefficients = rates.coefficients(element, temperature)?;
        let ion = &coefficients.ionization;
        let rec = &coefficients.recombination;
        let n = element.nstates();

        let mut log_d = vec![0.0; n];
        for q in 0..n - 1 {
            log_d[q + 1] = log_d[q] + 0.5 * (ion[q].ln() - rec[q].ln());
        }

        let mut b = Matrix::zeros(n, n);
        for q in 0..n {
            let out_up = if q < n - 1 { ion[q] } else { 0.0 };
            let out_down = if q > 0 { rec[q - 1] } else { 0.0 };
            b[(q, q)] = -(out_up + out_down);
            if q < n - 1 {
                let coupling = (0.5 * (ion[q].ln() + rec[q].ln())).exp();
                b[(q, q + 1)] = coupling;
                b[(q + 1, q)] = coupling;
            }
        }

        let eig = symmetric_eigen(&b)?;
        let u = &eig.vectors;

        let mut eigenvectors = Matrix::zeros(n, n);
        let mut eigenvector_inverses = Matrix::zeros(n, n);
        for k in 0..n {
            let log_max = (0..n)
                .filter(|&i| u[(i, k)] != 0.0)
                .map(|i| log_d[i] + u[(i, k)].abs().ln())
                .fold(f64::NEG_INFINITY, f64::max);
            if !log_max.is_finite() {
                return Err(NeiError::NumericalError(format!(
                    "degenerate eigenvector for {} at {}",
                    element, temperature
                )));
            }
            for i in 0..n {
                let uik = u[(i, k)];
                if uik == 0.0 {
                    continue;
                }
                eigenvectors[(i, k)] = uik * (log_d[i] - log_max).min(MAX_EXPONENT).exp();
                eigenvector_inverses[(k, i)] = uik * (log_max - log_d[i]).min(MAX_EXPONENT).exp();
            }
        }

        Ok(Self {
            temperature,
            eigenvalues: eig.values.into_iter().map(|value| value.min(0.0)).collect(),
            eigenvectors,
            eigenvector_inverses,
            equilibrium: equilibrium_from_log_scale(&log_d),
            coefficients,
        })
    }

    /// Advance `fractions` by `dt` at electron density `electron_density`.
    pub fn advance(
        &self,
        fractions: &[f64],
        electron_density: NumberDensity,
        dt: Time,
    ) -> Result<Vec<f64>, NeiError> {
        let tau = electron_density.as_per_cubic_cm() * dt.as_seconds();
        if !tau.is_finite() || tau < 0.0 {
            return Err(NeiError::InvalidParameter(format!(
                "n_e * dt must be finite and non-negative, got {} * {}",
                electron_density, dt
            )));
        }

        let advanced = self.advance_by_eigenvectors(fractions, tau)?;
        let mut advanced = if conserves(fractions, &advanced) {
            advanced
        } else {
            self.advance_by_squaring(fractions, tau)?
        };
        for value in &mut advanced {
            if value.abs() <= MIN_FRACTION {
                *value = 0.0;
            }
        }
        Ok(advanced)
    }

    fn advance_by_eigenvectors(&self, fractions: &[f64], tau: f64) -> Result<Vec<f64>, NeiError> {
        let mut modes = self.eigenvector_inverses.mul_vec(fractions)?;
        for (mode, lambda) in modes.iter_mut().zip(&self.eigenvalues) {
            *mode *= (lambda * tau).exp();
        }
        self.eigenvectors.mul_vec(&modes)
    }

    /// `exp(τA) · f` by scaling and squaring a truncated Taylor series.
    fn advance_by_squaring(&self, fractions: &[f64], tau: f64) -> Result<Vec<f64>, NeiError> {
        let a = self.rate_matrix();
        let n = self.eigenvalues.len();
        let norm = a.max_abs() * tau;
        if !norm.is_finite() {
            return Err(NeiError::NumericalError(format!(
                "rate matrix norm overflows at {} for n_e * dt = {}",
                self.temperature, tau
            )));
        }
        let squarings = if norm > SQUARING_NORM {
            (norm / SQUARING_NORM).log2().ceil() as i32
        } else {
            0
        };
        if squarings > MAX_SQUARINGS {
            return Err(NeiError::NumericalError(format!(
                "n_e * dt = {} too large to propagate at {}",
                tau, self.temperature
            )));
        }
        let h = tau * 0.5f64.powi(squarings);

        let mut propagator = Matrix::identity(n);
        let mut term = Matrix::identity(n);
        for k in 1..=TAYLOR_ORDER {
            term = term.matmul(&a)?;
            term.scale(h / f64::from(k));
            propagator.add_scaled(&term, 1.0)?;
        }
        normalise_columns(&mut propagator);
        for _ in 0..squarings {
            propagator = propagator.matmul(&propagator)?;
            normalise_columns(&mut propagator);
        }
        propagator.mul_vec(fractions)
    }

    /// The rate matrix A (without the electron density).
    fn rate_matrix(&self) -> Matrix {
        let ion = &self.coefficients.ionization;
        let rec = &self.coefficients.recombination;
        let n = self.eigenvalues.len();
        let mut a = Matrix::zeros(n, n);
        for q in 0..n - 1 {
            a[(q, q)] -= ion[q];
            a[(q + 1, q)] += ion[q];
            a[(q + 1, q + 1)] -= rec[q];
            a[(q, q + 1)] += rec[q];
        }
        a
    }
}

/// Columns of `exp(τA)` are distributions: clip negatives and rescale each
/// to unit sum so round-off does not double with every squaring.
fn normalise_columns(propagator: &mut Matrix) {
    let n = propagator.rows();
    for c in 0..n {
        let mut sum = 0.0;
        for r in 0..n {
            let entry = propagator[(r, c)].max(0.0);
            propagator[(r, c)] = entry;
            sum += entry;
        }
        if sum > 0.0 {
            for r in 0..n {
                propagator[(r, c)] /= sum;
            }
        }
    }
}

/// Whether an advanced state kept its total and stayed non-negative.
fn conserves(before: &[f64], after: &[f64]) -> bool {
    let scale: f64 = before.iter().map(|f| f.abs()).sum();
    let drift = (after.iter().sum::<f64>() - before.iter().sum::<f64>()).abs();
    after
        .iter()
        .all(|f| f.is_finite() && *f >= -MAX_FRACTION_DRIFT * scale)
        && drift <= MAX_FRACTION_DRIFT * scale
}

/// Detailed balance gives f[q+1] / f[q] = C[q] / R[q+1] = (d[q+1] / d[q])².
fn equilibrium_from_log_scale(log_d: &[f64]) -> Vec<f64> {
    let log_max = log_d.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let unnormalised: Vec<f64> = log_d
        .iter()
        .map(|&ld| (2.0 * (ld - log_max)).exp())
        .collect();
    let total: f64 = unnormalised.iter().sum();
    unnormalised.into_iter().map(|f| f / total).collect()
}

// =============================================================================
// EIGEN TABLE
// =============================================================================

/// Lazily computed eigen decompositions of one element on a temperature grid.
///
/// Each node is computed on first use. The table is `Send + Sync` and can be
/// shared between threads.
pub struct EigenTable {
    element: Element,
    grid: TemperatureGrid,
    rates: Arc<dyn RateSource>,
    nodes: Vec<OnceLock<EigenNode>>,
}

impl std::fmt::Debug for EigenTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EigenTable")
            .field("element", &self.element)
            .field("grid", &self.grid)
            .field(
                "computed_nodes",
                &self.nodes.iter().filter(|n| n.get().is_some()).count(),
            )
            .finish_non_exhaustive()
    }
}

impl EigenTable {
    /// Create a table for `element`. Nothing is computed until queried.
    #[must_use]
    pub fn new(element: Element, grid: TemperatureGrid, rates: Arc<dyn RateSource>) -> Self {
        Self {
            element,
            grid,
            rates,
            nodes: (0..grid.len()).map(|_| OnceLock::new()).collect(),
        }
    }

    #[must_use]
    pub const fn element(&self) -> Element {
        self.element
    }

    #[must_use]
    pub const fn grid(&self) -> &TemperatureGrid {
        &self.grid
    }

    /// The decomposition at the grid node nearest to `temperature`.
    pub fn node(&self, temperature: Temperature) -> Result<&EigenNode, NeiError> {
        let index = self.grid.index_of(temperature)?;
        let cell = &self.nodes[index];
        if let Some(node) = cell.get() {
            return Ok(node);
        }
        let computed = EigenNode::compute(self.element, self.grid.temperature(index), &*self.rates)?;
        Ok(cell.get_or_init(|| computed))
    }

    /// Equilibrium ionic fractions at `temperature`.
    pub fn equilibrium_state(&self, temperature: Temperature) -> Result<Vec<f64>, NeiError> {
        Ok(self.node(temperature)?.equilibrium.clone())
    }

    pub fn eigenvalues(&self, temperature: Temperature) -> Result<Vec<f64>, NeiError> {
        Ok(self.node(temperature)?.eigenvalues.clone())
    }

    pub fn eigenvectors(&self, temperature: Temperature) -> Result<Matrix, NeiError> {
        Ok(self.node(temperature)?.eigenvectors.clone())
    }

    pub fn eigenvector_inverses(&self, temperature: Temperature) -> Result<Matrix, NeiError> {
        Ok(self.node(temperature)?.eigenvector_inverses.clone())
    }

    /// Advance `fractions` over `dt` at constant `temperature` and `electron_density`.
    pub fn time_advance(
        &self,
        fractions: &[f64],
        temperature: Temperature,
        electron_density: NumberDensity,
        dt: Time,
    ) -> Result<Vec<f64>, NeiError> {
        if fractions.len() != self.element.nstates() {
            return Err(NeiError::InvalidIonicFractions {
                element: self.element.to_string(),
                reason: format!(
                    "expected {} fractions, got {}",
                    self.element.nstates(),
                    fractions.len()
                ),
            });
        }
        self.node(temperature)?
            .advance(fractions, electron_density, dt)
    }
}

// =============================================================================
// TESTS
// =============================================================================
