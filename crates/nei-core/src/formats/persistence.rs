//! # Persistence Format
//!
//! Binary serialization for simulation records.
//!
//! Format: Header (5 bytes) + postcard-serialized [`Simulation`].
//! - 4 bytes: Magic ("NEIR")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is parsed.

use crate::{NeiError, Simulation, primitives};

/// Maximum allowed size of a serialized run.
///
/// Validated before deserialization. A zinc run with a million steps is well
/// below this.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 500 * 1024 * 1024; // 500 MB

/// Header length in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all run data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), NeiError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(NeiError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(NeiError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NeiError> {
        if bytes.len() < HEADER_SIZE {
            return Err(NeiError::DeserializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a run to bytes (header + payload).
pub fn run_to_bytes(run: &Simulation) -> Result<Vec<u8>, NeiError> {
    let payload =
        postcard::to_stdvec(run).map_err(|e| NeiError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a run from bytes.
///
/// Checks, in order: minimum size, maximum size, header. Only then is the
/// payload decoded.
pub fn run_from_bytes(bytes: &[u8]) -> Result<Simulation, NeiError> {
    if bytes.len() < HEADER_SIZE {
        return Err(NeiError::DeserializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(NeiError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        NeiError::DeserializationError(format!("Failed to deserialize run data: {}", e))
    })
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

    fn sample_run() -> Simulation {
        let mut fractions = BTreeMap::new();
        fractions.insert(Element::HYDROGEN, vec![0.3, 0.7]);
        let states = IonizationStates::new(
            fractions,
            &Abundances::solar(),
            Some(Temperature::kelvin(1.0e4)),
            Some(NumberDensity::per_cubic_cm(1.0e3)),
            1e-15,
        )
        .expect("states");
        Simulation::new(&states, Time::seconds(0.0)).expect("run")
    }

    #[test]
    fn header_roundtrip() {
        let bytes = PersistenceHeader::new().to_bytes();
        let restored = PersistenceHeader::from_bytes(&bytes).expect("parse header");
        assert_eq!(restored.magic, *primitives::MAGIC_BYTES);
        assert_eq!(restored.version, primitives::FORMAT_VERSION);
    }

    #[test]
    fn bytes_roundtrip_bit_exact() {
        let bytes1 = run_to_bytes(&sample_run()).expect("first serialize");
        let restored = run_from_bytes(&bytes1).expect("deserialize");
        let bytes2 = run_to_bytes(&restored).expect("second serialize");
        assert_eq!(bytes1, bytes2, "save -> load -> save must produce identical bytes");
        assert_eq!(restored, sample_run());
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(run_from_bytes(&bytes).is_err());
    }

    #[test]
    fn future_version_rejected() {
        let mut bytes = run_to_bytes(&sample_run()).expect("serialize");
        bytes[4] = primitives::FORMAT_VERSION + 1;
        assert!(matches!(run_from_bytes(&bytes), Err(NeiError::DeserializationError(_))));
    }

    #[test]
    fn inconsistent_record_rejected() {
        let mut bytes = PersistenceHeader::new().to_bytes().to_vec();
        bytes.extend(postcard::to_stdvec(&mismatched_record()).expect("record"));
        assert!(matches!(run_from_bytes(&bytes), Err(NeiError::DeserializationError(_))));
    }

    #[test]
    fn truncated_payload_rejected() {
        let bytes = run_to_bytes(&sample_run()).expect("serialize");
        assert!(run_from_bytes(&bytes[..bytes.len() / 2]).is_err());
        assert!(run_from_bytes(&bytes[..3]).is_err());
    }
}
