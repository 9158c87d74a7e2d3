//! Insert Routes
//!
//! - POST /api/index/insert - Single record
//! - POST /api/index/insert/batch - Batch of records
//!
//! Both answer with the batch summary. Status: 201 when no record failed,
//! 207 when some failed and others went through, 422 when every record
//! failed.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{BatchInsertRequest, Envelope, InsertRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::pipeline::InsertSummary;

/// POST /api/index/insert
pub async fn insert_single(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<InsertRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<InsertSummary>>)> {
    let batch = req.into_batch().map_err(ApiError::invalid_query)?;
    let summary = state.service.insert_batch(&batch).await?;
    Ok(summary_response(summary))
}

/// POST /api/index/insert/batch
pub async fn insert_batch(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<BatchInsertRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<InsertSummary>>)> {
    if req.records.is_empty() {
        return Err(ApiError::invalid_query("Empty batch"));
    }

    let batch = req.into_batch().map_err(ApiError::invalid_query)?;
    let summary = state.service.insert_batch(&batch).await?;
    Ok(summary_response(summary))
}

/// Status code for a processed batch
pub fn summary_status(summary: &InsertSummary) -> StatusCode {
    if summary.failed == 0 {
        StatusCode::CREATED
    } else if summary.failed < summary.total() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}

fn summary_response(summary: InsertSummary) -> (StatusCode, Json<Envelope<InsertSummary>>) {
    let status = summary_status(&summary);
    let envelope = Envelope {
        success: summary.failed == 0,
        data: summary,
    };
    (status, Json(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_status() {
        let mut summary = InsertSummary {
            inserted: 3,
            skipped: 1,
            ..Default::default()
        };
        assert_eq!(summary_status(&summary), StatusCode::CREATED);

        summary.failed = 1;
        assert_eq!(summary_status(&summary), StatusCode::MULTI_STATUS);

        let all_failed = InsertSummary {
            failed: 2,
            ..Default::default()
        };
        assert_eq!(summary_status(&all_failed), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
