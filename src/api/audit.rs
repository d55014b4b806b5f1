use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState,
    auth::AdminAccount,
    types::{AuditEntryDto, AuditLogQuery},
    validation,
};

const DEFAULT_LIMIT: u64 = 50;

/// GET /audit-logs
/// Most recent first, optionally narrowed to a table and record.
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    AdminAccount(_): AdminAccount,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<ApiResponse<Vec<AuditEntryDto>>>, ApiError> {
    let limit = validation::validate_limit(query.limit.unwrap_or(DEFAULT_LIMIT))?;

    let entries = state
        .store()
        .list_audit(query.table_name, query.record_id, limit)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to query audit log: {e}")))?;

    Ok(Json(ApiResponse::success(
        entries.into_iter().map(AuditEntryDto::from).collect(),
    )))
}
