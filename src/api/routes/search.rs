//! Search Routes
//!
//! - POST /api/index/search - Evaluate a comparison against one index

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{Envelope, SearchIndexRequest, SearchIndexResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;

/// POST /api/index/search
///
/// Returns the matching txIds in ascending key order.
pub async fn search_index(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SearchIndexRequest>,
) -> ApiResult<Json<Envelope<SearchIndexResponse>>> {
    let request = req.into_request().map_err(ApiError::invalid_query)?;
    let result = state.service.search(&request).await?;

    Ok(Json(Envelope::ok(SearchIndexResponse {
        index_id: result.index_id,
        network: result.network,
        count: result.count,
        idx_data: result.tx_ids,
        duration_ms: result.duration_ms,
    })))
}
