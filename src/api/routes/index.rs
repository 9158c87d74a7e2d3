//! Index Routes
//!
//! Catalog endpoints.
//!
//! - POST /api/index/list - List indexes, optionally per network
//! - POST /api/index/info - One index with counters
//! - POST /api/index/create - Register an index and allocate its file

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::time::Instant;

use crate::api::dto::{
    CreateIndexRequest, CreateIndexResponse, Envelope, IndexInfoRequest, IndexInfoResponse,
    IndexSummary, ListIndexesRequest, ListIndexesResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{optional_body, ApiJson};
use crate::api::state::AppState;

/// POST /api/index/list
///
/// An empty body lists every network.
pub async fn list_indexes(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<Envelope<ListIndexesResponse>>> {
    let req: ListIndexesRequest = optional_body(&body)?;

    let indexes = state
        .service
        .list_indexes(req.network.as_deref())
        .await
        .into_iter()
        .map(IndexSummary::from)
        .collect();

    Ok(Json(Envelope::ok(ListIndexesResponse { indexes })))
}

/// POST /api/index/info
pub async fn index_info(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<IndexInfoRequest>,
) -> ApiResult<Json<Envelope<IndexInfoResponse>>> {
    let selector = req.selector().map_err(ApiError::invalid_query)?;
    let info = state.service.get_index_info(&selector).await?;
    Ok(Json(Envelope::ok(info.into())))
}

/// POST /api/index/create
///
/// 201 on creation; 409 when the id is already registered on the network.
pub async fn create_index(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateIndexRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<CreateIndexResponse>>)> {
    let started = Instant::now();
    let info = state.service.create_index(req.into_definition()).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(CreateIndexResponse {
            index_id: info.definition.index_id,
            network: info.definition.network,
            file_path: info.definition.file_path,
            duration_ms: started.elapsed().as_millis() as u64,
            response_code: StatusCode::CREATED.as_u16(),
        })),
    ))
}
