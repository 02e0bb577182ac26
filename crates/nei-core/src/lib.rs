//! # nei-core
//!
//! Non-equilibrium ionization modeling of astrophysical and laboratory
//! plasmas.
//!
//! Given the temperature and density history of a plasma parcel, the engine
//! evolves the ionic fractions of every element by solving
//! `df/dt = n_e · A(T_e) · f` with precomputed eigen decompositions of the
//! rate matrix `A`.
//!
//! ## Layout
//!
//! - `types`, `atomic`: units, elements, abundances, the error type
//! - `rates`, `eigen`, `linalg`: rate coefficients and their eigen tables
//! - `ionization`, `profile`, `nei`, `simulation`: the time evolution
//! - `shocks`: Rankine-Hugoniot jump conditions
//! - `formats`, `export`, `storage`: persistence of finished runs
//!
//! ## Architectural Constraints
//!
//! - Pure and synchronous: NO async, NO network, NO logging
//! - Every fallible operation returns `Result<_, NeiError>`
//! - Progress is reported through observer callbacks, never printed

// =============================================================================
// MODULES
// =============================================================================

pub mod atomic;
pub mod eigen;
pub mod export;
pub mod formats;
pub mod ionization;
pub mod linalg;
pub mod nei;
pub mod primitives;
pub mod profile;
pub mod rates;
pub mod shocks;
pub mod simulation;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use atomic::{Abundances, Element};
pub use types::{NeiError, NumberDensity, Quantity, Temperature, Time};

// =============================================================================
// RE-EXPORTS: Physics
// =============================================================================

pub use eigen::{EigenNode, EigenTable, TemperatureGrid};
pub use ionization::{Inputs, IonizationState, IonizationStates};
pub use nei::{EquilibriumAt, Nei, NeiBuilder, StepReport};
pub use profile::{Profile, Samples};
pub use rates::{HydrogenicRates, RateCoefficients, RateSource, RateTable, TabulatedRates};
pub use shocks::{rh_density, rh_temperature};
pub use simulation::Simulation;

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use export::{
    CanonicalHeader, canonical_checksum, export_canonical, export_csv, export_json,
    import_canonical, import_json, verify_canonical,
};
pub use formats::{PersistenceHeader, run_from_bytes, run_to_bytes};
pub use storage::{RunId, RunStore, RunSummary};
