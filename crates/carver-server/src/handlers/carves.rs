//! Carve protocol handlers.

use crate::auth::AuthenticatedCaller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::{Json, http::StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use carver_core::{CarveBeginPayload, CarveBlockPayload, CarveListOptions, CarveMetadata, CarveState, ListOptions};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Carve metadata as returned to operators and agents.
///
/// The session id never appears here: it is the upload credential and is
/// disclosed exactly once, in the begin response.
#[derive(Debug, Serialize)]
pub struct CarveResponse {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub host_id: i64,
    pub name: String,
    pub block_count: i64,
    pub block_size: i64,
    pub carve_size: i64,
    pub carve_id: String,
    pub request_id: String,
    pub expired: bool,
    pub max_block: i64,
    pub state: CarveState,
}

impl From<CarveMetadata> for CarveResponse {
    fn from(m: CarveMetadata) -> Self {
        let state = m.state();
        Self {
            id: m.id,
            created_at: m.created_at,
            host_id: m.host_id,
            name: m.name,
            block_count: m.block_count,
            block_size: m.block_size,
            carve_size: m.carve_size,
            carve_id: m.carve_id,
            request_id: m.request_id,
            expired: m.expired,
            max_block: m.max_block,
            state,
        }
    }
}

/// Response for a successful carve begin.
#[derive(Debug, Serialize)]
pub struct CarveBeginResponse {
    /// Upload credential for subsequent block requests.
    pub session_id: String,
    pub carve: CarveResponse,
}

/// Response for a successful block upload.
#[derive(Debug, Serialize)]
pub struct CarveBlockResponse {
    pub success: bool,
    /// Highest block index stored so far.
    pub max_block: i64,
    /// Whether every declared block has now been stored.
    pub complete: bool,
}

/// Response for carve listing.
#[derive(Debug, Serialize)]
pub struct ListCarvesResponse {
    pub carves: Vec<CarveResponse>,
}

/// Response carrying one block's bytes.
#[derive(Debug, Serialize)]
pub struct GetBlockResponse {
    /// Base64-encoded block payload.
    pub data: String,
}

/// Query parameters for carve listing.
///
/// Kept flat because axum's query deserializer cannot see through
/// `#[serde(flatten)]` on numeric fields.
#[derive(Debug, Deserialize)]
pub struct ListCarvesQuery {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub expired: Option<bool>,
}

impl From<ListCarvesQuery> for CarveListOptions {
    fn from(q: ListCarvesQuery) -> Self {
        CarveListOptions {
            list_options: ListOptions {
                page: q.page.unwrap_or(0),
                per_page: q.per_page.unwrap_or(0),
            },
            expired: q.expired.unwrap_or(false),
        }
    }
}

fn authed(caller: &Option<Extension<AuthenticatedCaller>>) -> ApiResult<&AuthenticatedCaller> {
    caller
        .as_ref()
        .map(|Extension(c)| c)
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

/// POST /v1/carves/begin
///
/// Agents declare carve geometry and receive a session id for block uploads.
pub async fn begin_carve(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedCaller>>,
    Json(payload): Json<CarveBeginPayload>,
) -> ApiResult<(StatusCode, Json<CarveBeginResponse>)> {
    let host_id = authed(&caller)?.require_agent()?;

    let carve = state.service.carve_begin(host_id, &payload).await?;
    let session_id = carve.session_id.clone();

    Ok((
        StatusCode::CREATED,
        Json(CarveBeginResponse {
            session_id,
            carve: carve.into(),
        }),
    ))
}

/// POST /v1/carves/blocks
///
/// Authenticated by the session id inside the payload, not by bearer token.
pub async fn upload_block(
    State(state): State<AppState>,
    Json(payload): Json<CarveBlockPayload>,
) -> ApiResult<Json<CarveBlockResponse>> {
    let carve = state.service.carve_block(&payload).await?;

    Ok(Json(CarveBlockResponse {
        success: true,
        max_block: carve.max_block,
        complete: carve.blocks_complete(),
    }))
}

/// GET /v1/carves
pub async fn list_carves(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedCaller>>,
    Query(query): Query<ListCarvesQuery>,
) -> ApiResult<Json<ListCarvesResponse>> {
    authed(&caller)?.require_operator()?;

    let opts: CarveListOptions = query.into();
    let carves = state.service.list_carves(&opts).await?;

    Ok(Json(ListCarvesResponse {
        carves: carves.into_iter().map(Into::into).collect(),
    }))
}

/// GET /v1/carves/{carve_id}
pub async fn get_carve(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedCaller>>,
    Path(carve_id): Path<i64>,
) -> ApiResult<Json<CarveResponse>> {
    authed(&caller)?.require_operator()?;

    let carve = state.service.get_carve(carve_id).await?;
    Ok(Json(carve.into()))
}

/// GET /v1/carves/by-name/{name}
pub async fn get_carve_by_name(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedCaller>>,
    Path(name): Path<String>,
) -> ApiResult<Json<CarveResponse>> {
    authed(&caller)?.require_operator()?;

    let carve = state.service.get_carve_by_name(&name).await?;
    Ok(Json(carve.into()))
}

/// GET /v1/carves/{carve_id}/blocks/{block_id}
pub async fn get_block(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedCaller>>,
    Path((carve_id, block_id)): Path<(i64, i64)>,
) -> ApiResult<Json<GetBlockResponse>> {
    authed(&caller)?.require_operator()?;

    let data = state.service.get_block(carve_id, block_id).await?;
    Ok(Json(GetBlockResponse {
        data: BASE64.encode(&data),
    }))
}
