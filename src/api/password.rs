use axum::{Json, extract::State};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState,
    types::{
        ForgotPasswordRequest, MessageResponse, ResetPasswordRequest, ResetValidationResponse,
        VerifyEmailRequest,
    },
    validation,
};
use crate::db::RESET_PREFIX;
use crate::services::AuditAction;
use serde_json::json;

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";

/// POST /forgot-password
/// Always answers with the same message; whether the email exists is never
/// revealed, and internal failures are swallowed for the same reason.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    let email = payload.email.trim();

    let config = state.config().read().await.clone();

    match state.store().get_account_by_email(email).await {
        Ok(Some(account)) if !account.disabled => {
            let identifier = format!("{RESET_PREFIX}{}", account.email);
            match state
                .store()
                .issue_token(&identifier, config.security.reset_token_ttl_minutes)
                .await
            {
                Ok(token) => {
                    let link =
                        format!("{}/reset-password?token={token}", config.server.public_url);
                    state.notifier().send_reset_link(&account.email, &link).await;
                }
                Err(e) => {
                    tracing::warn!("Failed to issue reset token: {e}");
                }
            }
        }
        Ok(_) => {
            tracing::debug!("Password reset requested for unknown or disabled account");
        }
        Err(e) => {
            tracing::warn!("Password reset lookup failed: {e}");
        }
    }

    Ok(Json(ApiResponse::success(MessageResponse {
        message: FORGOT_PASSWORD_MESSAGE.to_string(),
    })))
}

/// POST /reset-password
/// With `action: "validate"` only checks the token. Otherwise sets the new
/// password and consumes the token, making it single-use.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if payload.token.is_empty() {
        return Err(ApiError::validation("Token is required"));
    }

    let record = state
        .store()
        .find_valid_token(&payload.token)
        .await
        .map_err(|e| ApiError::internal(format!("Token lookup failed: {e}")))?
        .ok_or_else(|| ApiError::validation("Invalid or expired token"))?;

    // Verification tokens share the table; a reset must carry the prefix.
    let Some(email) = record.identifier.strip_prefix(RESET_PREFIX) else {
        return Err(ApiError::validation("Invalid or expired token"));
    };

    if payload.action.as_deref() == Some("validate") {
        let response = ResetValidationResponse {
            valid: true,
            email: email.to_string(),
        };
        return Ok(Json(ApiResponse::success(
            serde_json::to_value(response)
                .map_err(|e| ApiError::internal(format!("Serialization failed: {e}")))?,
        )));
    }

    let Some(password) = payload.password.as_deref() else {
        return Err(ApiError::validation("Password is required"));
    };
    validation::validate_password(password)?;

    let account = state
        .store()
        .get_account_by_email(email)
        .await
        .map_err(|e| ApiError::internal(format!("Account lookup failed: {e}")))?
        .ok_or_else(|| ApiError::validation("Invalid or expired token"))?;

    let same_as_current = state
        .store()
        .password_matches(&account, password)
        .await
        .map_err(|e| ApiError::internal(format!("Password verification error: {e}")))?;
    if same_as_current {
        return Err(ApiError::validation(
            "New password must be different from current password",
        ));
    }

    let security = state.config().read().await.security.clone();
    state
        .store()
        .set_account_password(&account.id, password, &security)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update password: {e}")))?;

    state
        .store()
        .consume_token(&payload.token)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to consume token: {e}")))?;

    state
        .audit()
        .record("accounts", &account.id, AuditAction::Update, None, None, &account.id)
        .await;

    tracing::info!(account_id = %account.id, "Password reset completed");

    Ok(Json(ApiResponse::success(json!({
        "message": "Password has been reset"
    }))))
}

/// POST /verify-email
/// Consumes a verification token and stamps the account as verified.
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.token.is_empty() {
        return Err(ApiError::validation("Token is required"));
    }

    let record = state
        .store()
        .find_valid_token(&payload.token)
        .await
        .map_err(|e| ApiError::internal(format!("Token lookup failed: {e}")))?
        .ok_or_else(|| ApiError::validation("Invalid or expired token"))?;

    // Reset tokens are not valid for verification.
    if record.identifier.starts_with(RESET_PREFIX) {
        return Err(ApiError::validation("Invalid or expired token"));
    }

    let account = state
        .store()
        .mark_email_verified(&record.identifier)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to verify email: {e}")))?;

    if account.is_none() {
        return Err(ApiError::validation("Invalid or expired token"));
    }

    state
        .store()
        .consume_token(&payload.token)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to consume token: {e}")))?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Email verified".to_string(),
    })))
}
