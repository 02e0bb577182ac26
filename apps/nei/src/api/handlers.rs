//! # API Endpoint Handlers

use super::{
    AppState,
    types::{
        EquilibriumRequest, EquilibriumResponse, ErrorResponse, ExportResponse, HashResponse,
        HealthResponse, RemoveResponse, RunResponse, RunsResponse, ShockRequest, ShockResponse,
        SimulateRequest, SimulateResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nei_core::{
    EigenTable, Element, HydrogenicRates, NeiError, NumberDensity, RunId, Simulation, Temperature,
    TemperatureGrid,
    export::{canonical_checksum, canonical_crypto_hash, export_canonical},
    primitives::MAX_ATOMIC_NUMBER,
    rh_density, rh_temperature,
    shocks::{density_ratio, temperature_ratio},
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Largest `max_steps` accepted over HTTP.
pub const MAX_API_STEPS: usize = 100_000;

// =============================================================================
// ERRORS
// =============================================================================

/// A failed request: status code plus a JSON [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<NeiError> for ApiError {
    fn from(err: NeiError) -> Self {
        let status = match &err {
            NeiError::RunNotFound(_) => StatusCode::NOT_FOUND,
            NeiError::SimulationFailed { .. } | NeiError::NumericalError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            NeiError::IoError(_)
            | NeiError::SerializationError(_)
            | NeiError::DeserializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        }
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// HEALTH HANDLER
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// RUN HANDLERS
// =============================================================================

/// List stored runs.
pub async fn list_runs_handler(State(state): State<AppState>) -> ApiResult<RunsResponse> {
    let store = state.store.read().await;
    Ok(Json(RunsResponse {
        success: true,
        runs: store.list()?,
    }))
}

/// Fetch one run with its full record.
pub async fn get_run_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<RunResponse> {
    let store = state.store.read().await;
    let id = RunId(id);
    Ok(Json(RunResponse {
        success: true,
        summary: store.summary(id)?,
        run: store.get(id)?,
    }))
}

/// Delete a run.
pub async fn remove_run_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<RemoveResponse> {
    let mut store = state.store.write().await;
    let id = RunId(id);
    store.remove(id)?;
    tracing::info!(run = %id, "Removed run");
    Ok(Json(RemoveResponse { success: true, id }))
}

// =============================================================================
// SIMULATE HANDLER
// =============================================================================

/// Run a simulation and store the result.
///
/// The solver runs on the blocking pool; the store is locked only to insert.
pub async fn simulate_handler(
    State(state): State<AppState>,
    Json(request): Json<SimulateRequest>,
) -> ApiResult<SimulateResponse> {
    let SimulateRequest { config, label } = request;
    if config.rates.reads_file() {
        return Err(ApiError::bad_request(
            "rates.path is not accepted over HTTP; use the hydrogenic source",
        ));
    }
    if config.time.max_steps.is_some_and(|n| n > MAX_API_STEPS) {
        return Err(ApiError::bad_request(format!(
            "max_steps exceeds the limit of {} for HTTP requests",
            MAX_API_STEPS
        )));
    }

    let run = tokio::task::spawn_blocking(move || -> Result<Simulation, NeiError> {
        let mut nei = config.build(None)?;
        nei.simulate()?;
        nei.into_results()
    })
    .await
    .map_err(|e| ApiError::internal(format!("Simulation task failed: {}", e)))??;

    let mut store = state.store.write().await;
    let id = store.insert(&run, label.as_deref())?;
    let summary = store.summary(id)?;
    tracing::info!(run = %id, steps = summary.steps, "Stored simulation");

    Ok(Json(SimulateResponse {
        success: true,
        summary,
    }))
}

// =============================================================================
// PHYSICS HANDLERS
// =============================================================================

/// Equilibrium ionic fractions at one temperature.
pub async fn equilibrium_handler(
    Json(request): Json<EquilibriumRequest>,
) -> ApiResult<EquilibriumResponse> {
    if request.elements.is_empty() || request.elements.len() > MAX_ATOMIC_NUMBER as usize {
        return Err(ApiError::bad_request(format!(
            "between 1 and {} elements required",
            MAX_ATOMIC_NUMBER
        )));
    }
    let temperature = Temperature::kelvin(request.temperature);
    let rates = Arc::new(HydrogenicRates);

    let mut fractions = BTreeMap::new();
    for symbol in &request.elements {
        let element = Element::from_symbol(symbol)?;
        let table = EigenTable::new(element, TemperatureGrid::default(), rates.clone());
        fractions.insert(element.symbol().to_string(), table.equilibrium_state(temperature)?);
    }

    Ok(Json(EquilibriumResponse {
        success: true,
        temperature: request.temperature,
        fractions,
    }))
}

/// Rankine-Hugoniot jump conditions.
pub async fn shock_handler(Json(request): Json<ShockRequest>) -> ApiResult<ShockResponse> {
    let density = request
        .density
        .map(|n| rh_density(NumberDensity::per_cubic_cm(n), request.gamma, request.mach))
        .transpose()?;
    let temperature = request
        .temperature
        .map(|t| rh_temperature(Temperature::kelvin(t), request.gamma, request.mach))
        .transpose()?;

    Ok(Json(ShockResponse {
        success: true,
        density_ratio: density_ratio(request.gamma, request.mach)?,
        temperature_ratio: temperature_ratio(request.gamma, request.mach)?,
        density: density.map(NumberDensity::as_per_cubic_cm),
        temperature: temperature.map(Temperature::as_kelvin),
    }))
}

// =============================================================================
// EXPORT HANDLERS
// =============================================================================

/// Export a run in the canonical format.
pub async fn export_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<ExportResponse> {
    let run = state.store.read().await.get(RunId(id))?;
    let data = export_canonical(&run)?;
    Ok(Json(ExportResponse::new(&data, canonical_checksum(&run))))
}

/// BLAKE3 hash of a run's canonical export.
pub async fn hash_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<HashResponse> {
    let run = state.store.read().await.get(RunId(id))?;
    Ok(Json(HashResponse {
        success: true,
        hash: canonical_crypto_hash(&run)?,
        algorithm: "blake3".to_string(),
        checksum: canonical_checksum(&run),
    }))
}
