use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::AppState;
use crate::api::middleware::SessionToken;
use crate::api::models::loads::{
    parse_fields, DeviceFieldsRequest, IngestRequest, IngestResponse, LoadsResponse,
    RecordedLoadResponse,
};
use crate::dashboard::{write_loads, Activation, DashboardSession};
use crate::error::{AppError, AuthError, Result};
use crate::models::{Device, DeviceStatus, LoadRecord};
use crate::store::{to_document, DocPath, LOADS_COLLECTION};

pub const INGEST_KEY_HEADER: &str = "x-api-key";

async fn open_session(state: &AppState, token: &str) -> Result<DashboardSession> {
    match DashboardSession::activate(state.auth.as_ref(), state.store.clone(), Some(token)).await? {
        Activation::Active(session) => Ok(session),
        Activation::Redirect(_) => Err(AppError::Auth(AuthError::InvalidSession)),
    }
}

/// GET /api/v1/loads
pub async fn list_loads(
    State(state): State<AppState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<Json<LoadsResponse>> {
    let session = open_session(&state, &token).await?;
    let response = LoadsResponse::from_devices(session.devices());
    session.teardown();
    Ok(Json(response))
}

/// POST /api/v1/loads
///
/// Appends one device built from free-text fields. Omitted fields keep their zero values.
pub async fn add_load(
    State(state): State<AppState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
    Json(fields): Json<DeviceFieldsRequest>,
) -> Result<(StatusCode, Json<LoadsResponse>)> {
    let fields = parse_fields(&fields)?;
    let mut session = open_session(&state, &token).await?;

    for (field, value) in fields {
        session.change_new_device_field(field, value)?;
    }
    session.add().await?;

    info!(uid = %session.identity().uid, devices = session.devices().len(), "load added");
    let response = LoadsResponse::from_devices(session.devices());
    session.teardown();
    Ok((StatusCode::CREATED, Json(response)))
}

/// PUT /api/v1/loads/{index}
pub async fn update_load(
    State(state): State<AppState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
    Path(index): Path<usize>,
    Json(fields): Json<DeviceFieldsRequest>,
) -> Result<Json<LoadsResponse>> {
    let fields = parse_fields(&fields)?;
    let mut session = open_session(&state, &token).await?;

    session.begin_edit(index)?;
    for (field, value) in fields {
        session.change_field(field, value)?;
    }
    session.save().await?;

    info!(uid = %session.identity().uid, index, "load updated");
    let response = LoadsResponse::from_devices(session.devices());
    session.teardown();
    Ok(Json(response))
}

/// Device described by the add-load form. Status defaults to active there.
pub fn record_from_fields(fields: &DeviceFieldsRequest) -> Result<LoadRecord> {
    let mut device = Device {
        status: DeviceStatus::Active,
        ..Device::default()
    };
    for (field, value) in parse_fields(fields)? {
        device.set_field(field, value)?;
    }
    Ok(LoadRecord::from_form(device, Utc::now()))
}

/// POST /api/v1/add-load
///
/// Writes to the `loads` collection only. The dashboard list is not touched.
pub async fn record_load(
    State(state): State<AppState>,
    Extension(identity): Extension<crate::auth::UserIdentity>,
    Json(fields): Json<DeviceFieldsRequest>,
) -> Result<(StatusCode, Json<RecordedLoadResponse>)> {
    let record = record_from_fields(&fields)?;
    let id = state
        .store
        .add_document(LOADS_COLLECTION, to_document(&record)?)
        .await?;

    debug!(uid = %identity.uid, %id, "load recorded");
    Ok((StatusCode::CREATED, Json(RecordedLoadResponse { id })))
}

/// POST /api/v1/ingest/loads
///
/// Replaces the whole device list. Authenticated by the configured ingest key.
pub async fn ingest_loads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<IngestResponse>> {
    let expected = state
        .config
        .ingest
        .api_key
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Ingest is disabled".to_string()))?;

    let provided = headers
        .get(INGEST_KEY_HEADER)
        .and_then(|h| h.to_str().ok());
    if provided != Some(expected) {
        warn!("Ingest request with missing or wrong API key");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    write_loads(state.store.as_ref(), &DocPath::latest_loads(), &payload.loads).await?;

    info!(devices = payload.loads.len(), "device list ingested");
    Ok(Json(IngestResponse {
        accepted: payload.loads.len(),
    }))
}
