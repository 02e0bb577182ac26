//! # CLI Command Implementations

use super::RunFormat;
use crate::api;
use crate::config::RunConfig;
use nei_core::{
    EigenTable, Element, HydrogenicRates, NeiError, NumberDensity, RateSource, RunId, RunStore,
    RunSummary, Simulation, TabulatedRates, Temperature, TemperatureGrid,
    export::{canonical_checksum, canonical_crypto_hash, export_canonical, export_csv, export_json},
    rh_density, rh_temperature, run_to_bytes,
    shocks::{density_ratio, temperature_ratio},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a JSON rate table (64 MB).
const MAX_RATE_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), NeiError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| NeiError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(NeiError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, NeiError> {
    let canonical = path.canonicalize().map_err(|e| {
        NeiError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(NeiError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path, which must be an existing directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, NeiError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        NeiError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(NeiError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| NeiError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &impl Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SIMULATE COMMAND
// =============================================================================

/// Run the simulation described by a TOML file and store it.
pub fn cmd_simulate(
    db_path: &Path,
    json_mode: bool,
    config_path: &Path,
    output: Option<&Path>,
    format: RunFormat,
    label: Option<&str>,
) -> Result<(), NeiError> {
    let config_path = validate_file_path(config_path)?;
    let validated_output = output.map(validate_output_path).transpose()?;

    let config = RunConfig::load(&config_path)?;
    let mut nei = config.build(config_path.parent())?;

    tracing::info!(
        elements = ?nei.elements(),
        time_start = %nei.time_start(),
        adaptive = nei.adapt_dt(),
        "Starting simulation"
    );
    let started = std::time::Instant::now();
    nei.simulate_with(|report| {
        tracing::debug!(
            step = report.step,
            time = %report.time,
            dt = %report.dt,
            temperature = %report.temperature,
            electron_density = %report.electron_density,
            "Advancing"
        );
    })?;
    let run = nei.into_results()?;
    tracing::info!(
        steps = run.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Simulation finished"
    );

    let mut store = RunStore::open(db_path)?;
    let id = store.insert(&run, label)?;
    let summary = store.summary(id)?;

    if let Some(path) = validated_output {
        let data = encode_run(&run, format)?;
        std::fs::write(&path, &data)
            .map_err(|e| NeiError::IoError(format!("Write file: {}", e)))?;
        tracing::info!("Wrote {} bytes to {:?}", data.len(), path);
    }

    if json_mode {
        print_json(&summary);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn encode_run(run: &Simulation, format: RunFormat) -> Result<Vec<u8>, NeiError> {
    match format {
        RunFormat::Binary => run_to_bytes(run),
        RunFormat::Canonical => export_canonical(run),
        RunFormat::Json => export_json(run).map(String::into_bytes),
        RunFormat::Csv => export_csv(run).map(String::into_bytes),
    }
}

// =============================================================================
// EQUILIBRIUM COMMAND
// =============================================================================

#[derive(Serialize)]
struct EquilibriumOutput {
    element: String,
    temperature: f64,
    fractions: Vec<f64>,
}

/// Print equilibrium ionic fractions of one element.
pub fn cmd_equilibrium(
    json_mode: bool,
    element: &str,
    temperature: f64,
    rates: Option<&Path>,
) -> Result<(), NeiError> {
    let element = Element::from_symbol(element)?;
    let rates: Arc<dyn RateSource> = match rates {
        Some(path) => {
            let path = validate_file_path(path)?;
            validate_file_size(&path, MAX_RATE_FILE_SIZE)?;
            let bytes = std::fs::read(&path)
                .map_err(|e| NeiError::IoError(format!("Read file: {}", e)))?;
            Arc::new(TabulatedRates::from_json(&bytes)?)
        }
        None => Arc::new(HydrogenicRates),
    };

    let table = EigenTable::new(element, TemperatureGrid::default(), rates);
    let fractions = table.equilibrium_state(Temperature::kelvin(temperature))?;

    if json_mode {
        print_json(&EquilibriumOutput {
            element: element.symbol().to_string(),
            temperature,
            fractions,
        });
        return Ok(());
    }

    println!("Equilibrium ionization of {} at {:e} K", element.name(), temperature);
    println!();
    for (charge, fraction) in fractions.iter().enumerate() {
        println!("  {:>2} {:>2}+  {:.6e}", element.symbol(), charge, fraction);
    }
    Ok(())
}

// =============================================================================
// SHOCK COMMAND
// =============================================================================

#[derive(Serialize)]
struct ShockOutput {
    gamma: f64,
    mach: f64,
    density_ratio: f64,
    temperature_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

/// Print Rankine-Hugoniot jump conditions.
pub fn cmd_shock(
    json_mode: bool,
    gamma: f64,
    mach: f64,
    density: Option<f64>,
    temperature: Option<f64>,
) -> Result<(), NeiError> {
    let output = ShockOutput {
        gamma,
        mach,
        density_ratio: density_ratio(gamma, mach)?,
        temperature_ratio: temperature_ratio(gamma, mach)?,
        density: density
            .map(|n| rh_density(NumberDensity::per_cubic_cm(n), gamma, mach))
            .transpose()?
            .map(NumberDensity::as_per_cubic_cm),
        temperature: temperature
            .map(|t| rh_temperature(Temperature::kelvin(t), gamma, mach))
            .transpose()?
            .map(Temperature::as_kelvin),
    };

    if json_mode {
        print_json(&output);
        return Ok(());
    }

    println!("Shock with gamma = {}, Mach = {}", gamma, mach);
    println!("  Density ratio:     {:.6}", output.density_ratio);
    println!("  Temperature ratio: {:.6}", output.temperature_ratio);
    if let Some(n) = output.density {
        println!("  Post-shock density:     {:.6e} cm^-3", n);
    }
    if let Some(t) = output.temperature {
        println!("  Post-shock temperature: {:.6e} K", t);
    }
    Ok(())
}

// =============================================================================
// RUN DATABASE COMMANDS
// =============================================================================

/// List stored runs.
pub fn cmd_runs(db_path: &Path, json_mode: bool) -> Result<(), NeiError> {
    let store = RunStore::open(db_path)?;
    let runs = store.list()?;

    if json_mode {
        print_json(&runs);
        return Ok(());
    }

    println!("nei Runs ({:?})", db_path);
    println!("==========");
    if runs.is_empty() {
        println!("No runs stored");
    }
    for summary in &runs {
        println!(
            "{:>5}  {:<20}  {:>7} steps  {:.3e} s .. {:.3e} s  [{}]",
            summary.id,
            summary.label.as_deref().unwrap_or("-"),
            summary.steps,
            summary.time_start,
            summary.time_end,
            element_list(&summary.elements),
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    summary: &'a RunSummary,
    final_fractions: Vec<(String, Vec<f64>)>,
}

/// Show one run: summary plus the final ionic fractions.
pub fn cmd_show(db_path: &Path, json_mode: bool, id: u64) -> Result<(), NeiError> {
    let store = RunStore::open(db_path)?;
    let id = RunId(id);
    let summary = store.summary(id)?;
    let run = store.get(id)?;

    let mut final_fractions = Vec::new();
    for element in run.elements() {
        if let Some(last) = run.ionic_fractions(element)?.last() {
            final_fractions.push((element.symbol().to_string(), last.clone()));
        }
    }

    if json_mode {
        print_json(&ShowOutput {
            summary: &summary,
            final_fractions,
        });
        return Ok(());
    }

    print_summary(&summary);
    println!();
    println!("Final ionic fractions:");
    for (symbol, fractions) in &final_fractions {
        let formatted: Vec<String> = fractions.iter().map(|f| format!("{:.3e}", f)).collect();
        println!("  {:>2}: {}", symbol, formatted.join(" "));
    }
    Ok(())
}

/// Export one run to a file.
pub fn cmd_export(
    db_path: &Path,
    id: u64,
    output: &Path,
    format: RunFormat,
) -> Result<(), NeiError> {
    let validated_output = validate_output_path(output)?;

    let store = RunStore::open(db_path)?;
    let run = store.get(RunId(id))?;
    let data = encode_run(&run, format)?;
    if format == RunFormat::Canonical {
        println!("Checksum: {}", canonical_checksum(&run));
    }

    std::fs::write(&validated_output, &data)
        .map_err(|e| NeiError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Print the BLAKE3 hash of one run's canonical export.
pub fn cmd_hash(db_path: &Path, json_mode: bool, id: u64) -> Result<(), NeiError> {
    let store = RunStore::open(db_path)?;
    let run = store.get(RunId(id))?;
    let hash = canonical_crypto_hash(&run)?;
    let checksum = canonical_checksum(&run);

    if json_mode {
        print_json(&serde_json::json!({
            "id": id,
            "hash": hash,
            "algorithm": "blake3",
            "checksum": checksum
        }));
    } else {
        println!("BLAKE3:   {}", hash);
        println!("Checksum: {}", checksum);
    }
    Ok(())
}

/// Delete one run.
pub fn cmd_remove(db_path: &Path, id: u64) -> Result<(), NeiError> {
    let mut store = RunStore::open(db_path)?;
    store.remove(RunId(id))?;
    println!("Removed run {}", id);
    Ok(())
}

/// Create an empty run database.
pub fn cmd_init(db_path: &Path, force: bool, template: Option<&Path>) -> Result<(), NeiError> {
    if db_path.exists() {
        if !force {
            return Err(NeiError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| NeiError::IoError(format!("Remove database: {}", e)))?;
    }
    RunStore::open(db_path)?;
    println!("Initialized new run database at {:?}", db_path);

    if let Some(path) = template {
        let path = validate_output_path(path)?;
        if path.exists() && !force {
            return Err(NeiError::IoError(format!(
                "{:?} already exists. Use --force to overwrite.",
                path
            )));
        }
        std::fs::write(&path, RunConfig::template())
            .map_err(|e| NeiError::IoError(format!("Write file: {}", e)))?;
        println!("Wrote run template to {:?}", path);
    }
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(db_path: &Path, host: &str, port: u16) -> Result<(), NeiError> {
    let store = RunStore::open(db_path)?;

    println!("nei Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Database: {:?}", db_path);
    println!();
    println!("Endpoints:");
    println!("  GET    /health            - Health check");
    println!("  GET    /runs              - List runs");
    println!("  GET    /runs/{{id}}         - Show a run");
    println!("  DELETE /runs/{{id}}         - Delete a run");
    println!("  POST   /runs/{{id}}/export  - Canonical export");
    println!("  GET    /runs/{{id}}/hash    - BLAKE3 hash");
    println!("  POST   /simulate          - Run and store a simulation");
    println!("  POST   /equilibrium       - Equilibrium fractions");
    println!("  POST   /shock             - Shock jump conditions");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, store).await
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn element_list(elements: &[Element]) -> String {
    elements
        .iter()
        .map(|e| e.symbol())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_summary(summary: &RunSummary) {
    println!("Run {}", summary.id);
    if let Some(label) = &summary.label {
        println!("  Label:       {}", label);
    }
    println!("  Elements:    {}", element_list(&summary.elements));
    println!("  Steps:       {}", summary.steps);
    println!(
        "  Time:        {:.6e} s .. {:.6e} s",
        summary.time_start, summary.time_end
    );
    println!("  Final T_e:   {:.6e} K", summary.final_temperature);
    println!("  Checksum:    {}", summary.checksum);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("run.toml");
        std::fs::write(
            &path,
            "[plasma]\nelements = [\"H\", \"He\"]\n[temperature]\nvalue = 1e6\n[density]\nvalue = 1e9\n[time]\nmax = 5.0\ndt = 1.0\n",
        )
        .expect("write config");
        path
    }

    #[test]
    fn simulate_stores_and_exports() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("nei.db");
        let config = write_config(dir.path());
        let output = dir.path().join("run.csv");

        cmd_simulate(&db, true, &config, Some(&output), RunFormat::Csv, Some("test"))
            .expect("simulate");

        let store = RunStore::open(&db).expect("open");
        let runs = store.list().expect("list");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].label.as_deref(), Some("test"));
        assert_eq!(runs[0].steps, 6);

        let csv = std::fs::read_to_string(&output).expect("csv");
        assert_eq!(csv.lines().count(), 7);
    }

    #[test]
    fn export_formats_decode() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("nei.db");
        cmd_simulate(&db, true, &write_config(dir.path()), None, RunFormat::Binary, None)
            .expect("simulate");

        let canonical = dir.path().join("run.neix");
        cmd_export(&db, 1, &canonical, RunFormat::Canonical).expect("export");
        let bytes = std::fs::read(&canonical).expect("read");
        let store = RunStore::open(&db).expect("open");
        assert_eq!(
            nei_core::import_canonical(&bytes).expect("import"),
            store.get(RunId(1)).expect("get")
        );
    }

    #[test]
    fn remove_missing_run_fails() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("nei.db");
        cmd_init(&db, false, None).expect("init");
        assert!(matches!(cmd_remove(&db, 7), Err(NeiError::RunNotFound(7))));
    }

    #[test]
    fn init_refuses_existing_database() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("nei.db");
        let template = dir.path().join("run.toml");
        cmd_init(&db, false, Some(&template)).expect("init");
        assert!(RunConfig::load(&template).is_ok());
        assert!(cmd_init(&db, false, None).is_err());
        cmd_init(&db, true, Some(&template)).expect("forced init");
    }

    #[test]
    fn invalid_output_directory_rejected() {
        let dir = tempdir().expect("temp dir");
        let missing = dir.path().join("missing").join("out.bin");
        assert!(validate_output_path(&missing).is_err());
        assert!(validate_file_path(dir.path()).is_err());
    }

    #[test]
    fn physics_commands_validate_input() {
        assert!(cmd_shock(true, 5.0 / 3.0, 2.0, Some(1.0), Some(1.0e4)).is_ok());
        assert!(cmd_shock(true, 1.0, 2.0, None, None).is_err());
        assert!(cmd_equilibrium(true, "O", 1.0e6, None).is_ok());
        assert!(matches!(
            cmd_equilibrium(true, "Xx", 1.0e6, None),
            Err(NeiError::UnknownElement(_))
        ));
    }
}
