use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState,
    auth::{AdminAccount, CurrentAccount},
    types::{MissingConditionsQuery, UpdateMissingConditionRequest},
};

const ALLOWED_STATUSES: &[&str] = &["pending", "reviewed", "resolved"];

fn passthrough(
    status: reqwest::StatusCode,
    body: serde_json::Value,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if status.is_success() {
        Ok(Json(ApiResponse::success(body)))
    } else {
        Err(ApiError::UpstreamStatus {
            status: status.as_u16(),
            message: body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("AI service request failed")
                .to_string(),
        })
    }
}

/// GET /missing-conditions
/// Paged passthrough to the AI service's unmapped-condition queue.
pub async fn list_missing_conditions(
    State(state): State<Arc<AppState>>,
    CurrentAccount(_): CurrentAccount,
    Query(query): Query<MissingConditionsQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if let Some(status) = query.status.as_deref()
        && !ALLOWED_STATUSES.contains(&status)
    {
        return Err(ApiError::validation(format!(
            "Invalid status: {status}. Allowed: {}",
            ALLOWED_STATUSES.join(", ")
        )));
    }

    let (status, body) = state
        .embedder()
        .missing_conditions(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(20),
            query.status.as_deref(),
        )
        .await
        .map_err(|e| ApiError::ai_service_error(e.to_string()))?;

    passthrough(status, body)
}

/// PATCH /missing-conditions/{id}
pub async fn update_missing_condition(
    State(state): State<Arc<AppState>>,
    AdminAccount(_): AdminAccount,
    Path(id): Path<String>,
    Json(payload): Json<UpdateMissingConditionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !ALLOWED_STATUSES.contains(&payload.status.as_str()) {
        return Err(ApiError::validation(format!(
            "Invalid status: {}. Allowed: {}",
            payload.status,
            ALLOWED_STATUSES.join(", ")
        )));
    }

    let mut body = serde_json::json!({ "status": payload.status });
    if let Some(notes) = payload.admin_notes {
        body["admin_notes"] = serde_json::Value::String(notes);
    }

    let (status, body) = state
        .embedder()
        .update_missing_condition(&id, &body)
        .await
        .map_err(|e| ApiError::ai_service_error(e.to_string()))?;

    passthrough(status, body)
}
