//! # API Request/Response Types
//!
//! JSON structures for the HTTP API.

use crate::config::RunConfig;
use nei_core::{RunId, RunSummary, Simulation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

// =============================================================================
// RUNS
// =============================================================================

/// `GET /runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsResponse {
    pub success: bool,
    pub runs: Vec<RunSummary>,
}

/// `GET /runs/{id}`: the summary and the full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    pub summary: RunSummary,
    pub run: Simulation,
}

/// `DELETE /runs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub success: bool,
    pub id: RunId,
}

// =============================================================================
// SIMULATE
// =============================================================================

/// `POST /simulate`: a run configuration in JSON form.
///
/// Rate tables are not read from the server's disk, so `rates.path` is
/// rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulateRequest {
    pub config: RunConfig,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub success: bool,
    pub summary: RunSummary,
}

// =============================================================================
// EQUILIBRIUM
// =============================================================================

/// `POST /equilibrium`: equilibrium fractions with the hydrogenic rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EquilibriumRequest {
    /// Element symbols, e.g. `["H", "O"]`.
    pub elements: Vec<String>,
    /// Kelvin.
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumResponse {
    pub success: bool,
    pub temperature: f64,
    pub fractions: BTreeMap<String, Vec<f64>>,
}

// =============================================================================
// SHOCK
// =============================================================================

/// `POST /shock`: Rankine-Hugoniot jump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShockRequest {
    pub gamma: f64,
    pub mach: f64,
    #[serde(default)]
    pub density: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShockResponse {
    pub success: bool,
    pub density_ratio: f64,
    pub temperature_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub temperature: Option<f64>,
}

// =============================================================================
// EXPORT AND HASH
// =============================================================================

/// `POST /runs/{id}/export`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: String, // Base64 encoded canonical bytes
    pub checksum: u64,
}

impl ExportResponse {
    pub fn new(data: &[u8], checksum: u64) -> Self {
        Self {
            success: true,
            data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, data),
            checksum,
        }
    }
}

/// `GET /runs/{id}/hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResponse {
    pub success: bool,
    pub hash: String,
    pub algorithm: String,
    pub checksum: u64,
}
