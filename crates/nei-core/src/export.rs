//! # Canonical Export Module
//!
//! Deterministic serialization of simulation records for verification and
//! exchange.
//!
//! The run database (`redb`) is not guaranteed to be bit-identical across
//! runs. The canonical export is: a postcard stream of the record, preceded
//! by a header carrying counts and a checksum of the data.
//!
//! Besides the canonical binary form, runs can be exported as JSON and as
//! CSV (one row per step).

use crate::{NeiError, Simulation};
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"NEIX"; // NEI eXport

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum step count accepted by [`import_canonical`].
pub const MAX_IMPORT_STEP_COUNT: u64 = crate::primitives::MAX_STEPS as u64 + 1;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    pub magic: [u8; 4],
    pub version: u8,
    /// Number of recorded steps, including the initial state.
    pub step_count: u64,
    pub element_count: u64,
    /// Checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(step_count: u64, element_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            step_count,
            element_count,
            checksum,
        }
    }

    /// Check magic and version.
    pub fn validate(&self) -> Result<(), NeiError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(NeiError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(NeiError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CHECKSUM
// =============================================================================

/// Deterministic 64-bit checksum of a run.
///
/// Mixes the bit patterns of every number in the record in a fixed order
/// (step-major, elements by atomic number). Identical records always give
/// identical checksums. Not collision resistant: use
/// [`canonical_crypto_hash`] (feature `crypto-hash`) for that.
#[must_use]
pub fn canonical_checksum(run: &Simulation) -> u64 {
    let mut hash: u64 = 0;
    let mut mix = |bits: u64| {
        hash = hash.rotate_left(5) ^ bits;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    };

    for step in 0..run.len() {
        mix(run.time()[step].as_seconds().to_bits());
        mix(run.temperature()[step].as_kelvin().to_bits());
        mix(run.hydrogen_density()[step].as_per_cubic_cm().to_bits());
        mix(run.electron_density()[step].as_per_cubic_cm().to_bits());
    }
    for element in run.elements() {
        mix(u64::from(element.atomic_number()).rotate_left(17));
        if let Some(abundance) = run.abundances().get(element) {
            mix(abundance.to_bits());
        }
        if let Ok(rows) = run.ionic_fractions(element) {
            for value in rows.iter().flatten() {
                mix(value.to_bits());
            }
        }
    }
    hash
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a run to canonical postcard format.
///
/// Format:
/// ```text
/// [header_len: u32 LE] [CanonicalHeader (postcard)] [Simulation (postcard)]
/// ```
pub fn export_canonical(run: &Simulation) -> Result<Vec<u8>, NeiError> {
    let header = CanonicalHeader::new(
        run.len() as u64,
        run.elements().count() as u64,
        canonical_checksum(run),
    );

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| NeiError::SerializationError(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(run)
        .map_err(|e| NeiError::SerializationError(format!("Data: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Import a run from canonical postcard format.
///
/// The header is validated, and the step count bounded, before the record
/// is decoded. The counts and then the checksum are verified afterwards.
pub fn import_canonical(data: &[u8]) -> Result<Simulation, NeiError> {
    if data.len() < 4 {
        return Err(NeiError::DeserializationError("Data too short".to_string()));
    }
    let header_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < 4 + header_len {
        return Err(NeiError::DeserializationError(
            "Data too short for header".to_string(),
        ));
    }

    let header: CanonicalHeader = postcard::from_bytes(&data[4..4 + header_len])
        .map_err(|e| NeiError::DeserializationError(format!("Header: {}", e)))?;
    header.validate()?;

    if header.step_count > MAX_IMPORT_STEP_COUNT {
        return Err(NeiError::DeserializationError(format!(
            "Step count {} exceeds maximum allowed {}",
            header.step_count, MAX_IMPORT_STEP_COUNT
        )));
    }

    let run: Simulation = postcard::from_bytes(&data[4 + header_len..])
        .map_err(|e| NeiError::DeserializationError(format!("Data: {}", e)))?;

    if run.len() as u64 != header.step_count {
        return Err(NeiError::DeserializationError(
            "Step count mismatch".to_string(),
        ));
    }
    if run.elements().count() as u64 != header.element_count {
        return Err(NeiError::DeserializationError(
            "Element count mismatch".to_string(),
        ));
    }
    let computed = canonical_checksum(&run);
    if computed != header.checksum {
        return Err(NeiError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    Ok(run)
}

/// Check that `canonical_data` decodes to exactly `run`.
pub fn verify_canonical(run: &Simulation, canonical_data: &[u8]) -> Result<bool, NeiError> {
    Ok(import_canonical(canonical_data)? == *run)
}

// =============================================================================
// TEXT FORMATS
// =============================================================================

/// Pretty-printed JSON of the full record.
pub fn export_json(run: &Simulation) -> Result<String, NeiError> {
    serde_json::to_string_pretty(run).map_err(|e| NeiError::SerializationError(e.to_string()))
}

/// Read a record written by [`export_json`].
pub fn import_json(data: &str) -> Result<Simulation, NeiError> {
    serde_json::from_str(data).map_err(|e| NeiError::DeserializationError(e.to_string()))
}

/// CSV with one row per step.
///
/// Columns: `time_s`, `temperature_K`, `hydrogen_density_cm3`,
/// `electron_density_cm3`, then one `<symbol>_<charge>` column per charge
/// state of every element.
pub fn export_csv(run: &Simulation) -> Result<String, NeiError> {
    let mut columns = vec![
        "time_s".to_string(),
        "temperature_K".to_string(),
        "hydrogen_density_cm3".to_string(),
        "electron_density_cm3".to_string(),
    ];
    let mut fraction_rows = Vec::new();
    for element in run.elements() {
        for charge in 0..run.nstates(element)? {
            columns.push(format!("{}_{}", element.symbol(), charge));
        }
        fraction_rows.push(run.ionic_fractions(element)?);
    }

    let mut out = columns.join(",");
    out.push('\n');
    for step in 0..run.len() {
        let mut row = vec![
            run.time()[step].as_seconds().to_string(),
            run.temperature()[step].as_kelvin().to_string(),
            run.hydrogen_density()[step].as_per_cubic_cm().to_string(),
            run.electron_density()[step].as_per_cubic_cm().to_string(),
        ];
        for rows in &fraction_rows {
            row.extend(rows[step].iter().map(f64::to_string));
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    Ok(out)
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// BLAKE3 hash of the canonical export, as 64 hex characters.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(run: &Simulation) -> Result<String, NeiError> {
    Ok(compute_blake3_hash(&export_canonical(run)?))
}

/// Check a run against a previously computed BLAKE3 hash.
#[cfg(feature = "crypto-hash")]
pub fn verify_crypto_hash(run: &Simulation, expected_hash: &str) -> Result<bool, NeiError> {
    Ok(canonical_crypto_hash(run)?.eq_ignore_ascii_case(expected_hash))
}

/// BLAKE3 hash of arbitrary bytes, as 64 hex characters.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::mismatched_record;
    use crate::{Abundances, Element, IonizationStates, NumberDensity, Temperature, Time};
    use std::collections::BTreeMap;

    fn states(h: [f64; 2], he: [f64; 3], temperature: f64) -> IonizationStates {
        let mut fractions = BTreeMap::new();
        fractions.insert(Element::HYDROGEN, h.to_vec());
        fractions.insert(Element::from_symbol("He").expect("He"), he.to_vec());
        IonizationStates::new(
            fractions,
            &Abundances::solar(),
            Some(Temperature::kelvin(temperature)),
            Some(NumberDensity::per_cubic_cm(100.0)),
            1e-15,
        )
        .expect("states")
    }

    fn sample_run() -> Simulation {
        let mut run = Simulation::new(&states([1.0, 0.0], [1.0, 0.0, 0.0], 1.0e4), Time::seconds(0.0))
            .expect("run");
        run.assign(Time::seconds(2.5), &states([0.5, 0.5], [0.5, 0.25, 0.25], 2.0e4))
            .expect("step");
        run
    }

    #[test]
    fn canonical_roundtrip() {
        let run = sample_run();
        let data = export_canonical(&run).expect("export");
        let imported = import_canonical(&data).expect("import");
        assert_eq!(imported, run);
        assert!(verify_canonical(&run, &data).expect("verify"));
    }

    #[test]
    fn export_is_deterministic() {
        let a = export_canonical(&sample_run()).expect("a");
        let b = export_canonical(&sample_run()).expect("b");
        assert_eq!(a, b);
        assert_eq!(canonical_checksum(&sample_run()), canonical_checksum(&sample_run()));
    }

    #[test]
    fn checksum_sees_changes() {
        let base = sample_run();
        let mut other = Simulation::new(&states([1.0, 0.0], [1.0, 0.0, 0.0], 1.0e4), Time::seconds(0.0))
            .expect("run");
        other
            .assign(Time::seconds(2.5), &states([0.5, 0.5], [0.25, 0.5, 0.25], 2.0e4))
            .expect("step");
        assert_ne!(canonical_checksum(&base), canonical_checksum(&other));
    }

    #[test]
    fn corrupted_data_rejected() {
        let mut data = export_canonical(&sample_run()).expect("export");
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        assert!(import_canonical(&data).is_err());
    }

    #[test]
    fn wrong_magic_rejected() {
        let header = CanonicalHeader {
            magic: *b"XXXX",
            ..CanonicalHeader::new(1, 1, 0)
        };
        assert!(header.validate().is_err());
    }

    #[test]
    fn oversized_step_count_rejected() {
        let header = CanonicalHeader::new(MAX_IMPORT_STEP_COUNT + 1, 1, 0);
        let header_bytes = postcard::to_allocvec(&header).expect("header");
        let mut data = (header_bytes.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&header_bytes);
        let result = import_canonical(&data);
        assert!(matches!(result, Err(NeiError::DeserializationError(msg)) if msg.contains("exceeds")));
    }

    #[test]
    fn inconsistent_record_rejected() {
        let header = CanonicalHeader::new(2, 1, 0);
        let header_bytes = postcard::to_allocvec(&header).expect("header");
        let mut data = (header_bytes.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&header_bytes);
        data.extend(postcard::to_allocvec(&mismatched_record()).expect("record"));
        assert!(matches!(import_canonical(&data), Err(NeiError::DeserializationError(_))));

        let json = serde_json::to_string(&mismatched_record()).expect("json");
        assert!(matches!(import_json(&json), Err(NeiError::DeserializationError(_))));
    }

    #[test]
    fn short_data_rejected() {
        assert!(import_canonical(&[]).is_err());
        assert!(import_canonical(&[200, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn csv_has_header_and_rows() {
        let csv = export_csv(&sample_run()).expect("csv");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "time_s,temperature_K,hydrogen_density_cm3,electron_density_cm3,H_0,H_1,He_0,He_1,He_2"
        );
        assert!(lines[2].starts_with("2.5,20000,100,"));
        assert!(lines[2].ends_with(",0.5,0.5,0.5,0.25,0.25"));
    }

    #[test]
    fn json_contains_record() {
        let json = export_json(&sample_run()).expect("json");
        assert!(json.contains("\"temperature\""));
        let back = import_json(&json).expect("import");
        assert_eq!(back.len(), 2);
        assert_eq!(back.time()[1].as_seconds(), 2.5);
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn blake3_hash_is_stable() {
        let hash = canonical_crypto_hash(&sample_run()).expect("hash");
        assert_eq!(hash.len(), 64);
        assert!(verify_crypto_hash(&sample_run(), &hash).expect("verify"));
        assert!(!verify_crypto_hash(&sample_run(), &"0".repeat(64)).expect("verify"));
    }
}
