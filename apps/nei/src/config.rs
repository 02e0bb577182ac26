//! # Run Configuration
//!
//! TOML description of a simulation, turned into an [`NeiBuilder`].
//!
//! ```toml
//! [plasma]
//! elements = ["H", "He", "O"]
//! abundances = "solar"
//!
//! [temperature]
//! value = 1.0e6
//!
//! [density]
//! value = 1.0e9
//!
//! [time]
//! max = 600.0
//! dt = 10.0
//! ```
//!
//! Temperature and density take either a constant `value` or `values`
//! sampled at `time.input`. Initial fractions may be given per element in
//! `[plasma.fractions]`; otherwise every element starts in equilibrium.

use nei_core::{
    Abundances, Element, HydrogenicRates, Inputs, Nei, NeiBuilder, NeiError, NumberDensity,
    Profile, RateSource, TabulatedRates, Temperature, Time,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maximum size of a run configuration or rate table file (16 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 16 * 1024 * 1024;

fn config_err(e: impl std::fmt::Display) -> NeiError {
    NeiError::InvalidParameter(format!("Invalid run configuration: {}", e))
}

// =============================================================================
// SECTIONS
// =============================================================================

/// A complete run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub plasma: PlasmaConfig,
    pub temperature: SeriesConfig,
    pub density: SeriesConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub rates: RatesConfig,
}

/// `[plasma]`: which elements, how much of each, and where they start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlasmaConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fractions: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub abundances: AbundanceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tol: Option<f64>,
}

/// A named abundance set, a table of linear abundances relative to H, or
/// `{ log = { ... } }` on the astronomical scale (H = 12).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AbundanceConfig {
    Named(String),
    Log { log: BTreeMap<String, f64> },
    Linear(BTreeMap<String, f64>),
}

impl Default for AbundanceConfig {
    fn default() -> Self {
        Self::Named("solar".to_string())
    }
}

/// `[temperature]` and `[density]`: a constant or samples at `time.input`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeriesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
}

/// `[time]`: all in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapt_dt: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_factor: Option<f64>,
}

/// `[rates]`: the built-in hydrogenic model or a JSON rate table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl RatesConfig {
    /// Whether the rates come from a file on disk.
    pub fn reads_file(&self) -> bool {
        self.path.is_some()
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl RunConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, NeiError> {
        toml::from_str(text).map_err(config_err)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, NeiError> {
        Self::from_toml_str(&read_limited(path)?)
    }

    /// Render back to TOML.
    pub fn to_toml_string(&self) -> Result<String, NeiError> {
        toml::to_string(self).map_err(|e| NeiError::SerializationError(e.to_string()))
    }

    /// A commented starting point for new run files.
    pub fn template() -> &'static str {
        TEMPLATE
    }

    /// The rate source named by `[rates]`. Relative paths resolve against `base_dir`.
    pub fn rate_source(&self, base_dir: Option<&Path>) -> Result<Arc<dyn RateSource>, NeiError> {
        match (&self.rates.source, &self.rates.path) {
            (Some(_), Some(_)) => Err(config_err("[rates] takes either source or path")),
            (Some(source), None) if !source.eq_ignore_ascii_case("hydrogenic") => Err(config_err(
                format!("unknown rate source '{}', expected 'hydrogenic'", source),
            )),
            (_, None) => Ok(Arc::new(HydrogenicRates)),
            (None, Some(path)) => {
                let full = match base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                let text = read_limited(&full)?;
                Ok(Arc::new(TabulatedRates::from_json(text.as_bytes())?))
            }
        }
    }

    /// Configure an engine with the given rates.
    pub fn builder(&self, rates: Arc<dyn RateSource>) -> Result<NeiBuilder, NeiError> {
        let mut builder = Nei::builder(self.inputs()?)
            .abundances(self.abundances()?)
            .rates(rates);

        if let Some(input) = &self.time.input {
            builder = builder.time_input(input.iter().map(|&t| Time::seconds(t)).collect());
        }
        builder = match (self.temperature.value, &self.temperature.values) {
            (Some(value), None) => builder.temperature(Profile::Constant(Temperature::kelvin(value))),
            (None, Some(values)) => {
                builder.temperature_samples(values.iter().map(|&v| Temperature::kelvin(v)).collect())
            }
            _ => return Err(config_err("[temperature] needs exactly one of value or values")),
        };
        builder = match (self.density.value, &self.density.values) {
            (Some(value), None) => {
                builder.density(Profile::Constant(NumberDensity::per_cubic_cm(value)))
            }
            (None, Some(values)) => builder
                .density_samples(values.iter().map(|&v| NumberDensity::per_cubic_cm(v)).collect()),
            _ => return Err(config_err("[density] needs exactly one of value or values")),
        };

        let time = &self.time;
        if let Some(start) = time.start {
            builder = builder.time_start(Time::seconds(start));
        }
        if let Some(max) = time.max {
            builder = builder.time_max(Time::seconds(max));
        }
        if let Some(dt) = time.dt {
            builder = builder.dt(Time::seconds(dt));
        }
        if let Some(max_steps) = time.max_steps {
            builder = builder.max_steps(max_steps);
        }
        if let Some(adapt) = time.adapt_dt {
            builder = builder.adapt_dt(adapt);
        }
        if let Some(factor) = time.safety_factor {
            builder = builder.safety_factor(factor);
        }
        if let Some(tol) = self.plasma.tol {
            builder = builder.tol(tol);
        }
        Ok(builder)
    }

    /// Validate everything and build the engine.
    pub fn build(&self, base_dir: Option<&Path>) -> Result<Nei, NeiError> {
        self.builder(self.rate_source(base_dir)?)?.build()
    }

    fn inputs(&self) -> Result<Inputs, NeiError> {
        let plasma = &self.plasma;
        match (plasma.elements.is_empty(), plasma.fractions.is_empty()) {
            (false, true) => Ok(Inputs::Elements(
                plasma
                    .elements
                    .iter()
                    .map(|s| Element::from_symbol(s))
                    .collect::<Result<_, _>>()?,
            )),
            (true, false) => Ok(Inputs::Fractions(
                plasma
                    .fractions
                    .iter()
                    .map(|(s, f)| Ok((Element::from_symbol(s)?, f.clone())))
                    .collect::<Result<_, NeiError>>()?,
            )),
            _ => Err(config_err(
                "[plasma] needs exactly one of elements or fractions",
            )),
        }
    }

    fn abundances(&self) -> Result<Abundances, NeiError> {
        match &self.plasma.abundances {
            AbundanceConfig::Named(name) => Abundances::named(name),
            AbundanceConfig::Log { log } => Abundances::from_log(by_element(log)?),
            AbundanceConfig::Linear(values) => Abundances::from_linear(by_element(values)?),
        }
    }
}

fn by_element(values: &BTreeMap<String, f64>) -> Result<BTreeMap<Element, f64>, NeiError> {
    values
        .iter()
        .map(|(symbol, &value)| Ok((Element::from_symbol(symbol)?, value)))
        .collect()
}

fn read_limited(path: &Path) -> Result<String, NeiError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        NeiError::IoError(format!("Cannot read '{}': {}", path.display(), e))
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(NeiError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_CONFIG_FILE_SIZE
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| NeiError::IoError(format!("Cannot read '{}': {}", path.display(), e)))
}

const TEMPLATE: &str = r#"# nei run configuration

[plasma]
elements = ["H", "He", "O"]
# Start from given fractions instead of equilibrium:
# [plasma.fractions]
# H = [0.5, 0.5]
abundances = "solar"

[temperature]
value = 1.0e6            # K, or `values = [...]` at time.input

[density]
value = 1.0e9            # hydrogen number density, cm^-3

[time]
start = 0.0
max = 600.0
dt = 10.0                # omit for adaptive steps
max_steps = 1000

[rates]
source = "hydrogenic"    # or path = "rates.json"
"#;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn template_builds_and_runs() {
        let config = RunConfig::from_toml_str(RunConfig::template()).expect("parse");
        assert_eq!(config.plasma.elements, vec!["H", "He", "O"]);
        let mut nei = config.build(None).expect("build");
        assert_eq!(nei.simulate().expect("simulate").len(), 61);
    }

    #[test]
    fn log_abundances() {
        let text = r#"
[plasma]
elements = ["H", "He"]
abundances = { log = { H = 12.0, He = 10.93 } }
[temperature]
value = 1.0e6
[density]
value = 1.0e9
[time]
max = 10.0
"#;
        let config = RunConfig::from_toml_str(text).expect("parse");
        assert!(matches!(config.plasma.abundances, AbundanceConfig::Log { .. }));
        let nei = config.build(None).expect("build");
        let helium = nei
            .abundances()
            .get(Element::from_symbol("He").expect("He"))
            .expect("helium abundance");
        assert!((helium - 0.0851).abs() < 1e-4);
    }

    #[test]
    fn unknown_keys_rejected() {
        let text = "[plasma]\nelements = [\"H\"]\ncolour = \"blue\"\n[temperature]\nvalue = 1e6\n[density]\nvalue = 1.0\n";
        assert!(RunConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn sampled_profiles_and_fractions() {
        let text = r#"
[plasma]
abundances = { H = 1.0, He = 0.1 }
[plasma.fractions]
H = [0.5, 0.5]
He = [1.0, 0.0, 0.0]
[temperature]
values = [1.0e4, 1.0e6]
[density]
values = [1.0, 2.0]
[time]
input = [0.0, 100.0]
"#;
        let config = RunConfig::from_toml_str(text).expect("parse");
        let nei = config.build(None).expect("build");
        assert!(nei.adapt_dt());
        assert_eq!(nei.time_max(), Some(Time::seconds(100.0)));
        assert_eq!(
            nei.initial()
                .ionic_fractions(Element::from_symbol("He").expect("He"))
                .expect("fractions"),
            &[1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn series_needs_exactly_one_form() {
        let text = "[plasma]\nelements = [\"H\"]\n[temperature]\nvalue = 1e6\nvalues = [1e6]\n[density]\nvalue = 1.0\n[time]\nmax = 1.0\n";
        let config = RunConfig::from_toml_str(text).expect("parse");
        assert!(matches!(config.build(None), Err(NeiError::InvalidParameter(_))));
    }

    #[test]
    fn plasma_needs_exactly_one_form() {
        let text = "[plasma]\n[temperature]\nvalue = 1e6\n[density]\nvalue = 1.0\n[time]\nmax = 1.0\n";
        let config = RunConfig::from_toml_str(text).expect("parse");
        assert!(config.build(None).is_err());
    }

    #[test]
    fn unknown_rate_source_rejected() {
        let mut config = RunConfig::from_toml_str(RunConfig::template()).expect("parse");
        config.rates.source = Some("chianti".to_string());
        assert!(config.rate_source(None).is_err());
    }

    #[test]
    fn rate_table_path_resolved_against_base_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut file = std::fs::File::create(dir.path().join("rates.json")).expect("create");
        file.write_all(
            br#"{"H": {"temperatures": [1e3, 1e9],
                       "ionization": [[1e-20, 1e-8]],
                       "recombination": [[1e-12, 1e-14]]}}"#,
        )
        .expect("write");

        let text = "[plasma]\nelements = [\"H\"]\n[temperature]\nvalue = 1e5\n[density]\nvalue = 1.0\n[time]\nmax = 10.0\ndt = 1.0\n[rates]\npath = \"rates.json\"\n";
        let config = RunConfig::from_toml_str(text).expect("parse");
        assert!(config.rates.reads_file());
        let mut nei = config.build(Some(dir.path())).expect("build");
        assert_eq!(nei.simulate().expect("simulate").len(), 11);
    }

    #[test]
    fn toml_roundtrip() {
        let config = RunConfig::from_toml_str(RunConfig::template()).expect("parse");
        let text = config.to_toml_string().expect("render");
        assert_eq!(RunConfig::from_toml_str(&text).expect("reparse"), config);
    }
}
