use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_sessions::Session;

use super::{
    ApiError, ApiResponse, AppState,
    types::{AccountDto, ChangePasswordRequest, LoginRequest, MessageResponse},
    validation,
};
use crate::entities::accounts::{self, Role};
use crate::services::AuditAction;

pub const SESSION_ACCOUNT_KEY: &str = "account_id";

/// The authenticated account for the current request, inserted by
/// `require_session`. Role and disabled state are loaded fresh from the
/// store on every request, never trusted from the session.
#[derive(Clone)]
pub struct CurrentAccount(pub accounts::Model);

impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentAccount>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
    }
}

/// Same as `CurrentAccount` but rejects non-admins with 403.
pub struct AdminAccount(pub accounts::Model);

impl<S> FromRequestParts<S> for AdminAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentAccount(account) = CurrentAccount::from_request_parts(parts, state).await?;

        if account.role != Role::Admin {
            return Err(ApiError::insufficient_permissions());
        }

        Ok(Self(account))
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Session gate for every protected route. Checks the cookie, re-loads the
/// account, and rejects disabled or deleted accounts before any handler
/// runs.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let account_id: Option<String> = session
        .get(SESSION_ACCOUNT_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let Some(account_id) = account_id else {
        return Err(ApiError::Unauthorized("Not authenticated".to_string()));
    };

    let account = state
        .store()
        .get_account(&account_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load account: {e}")))?;

    let Some(account) = account else {
        // Account was deleted while the session was live.
        let _ = session.flush().await;
        return Err(ApiError::Unauthorized("Not authenticated".to_string()));
    };

    if account.disabled {
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    tracing::Span::current().record("account_id", &account.id);
    request.extensions_mut().insert(CurrentAccount(account));

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Every failure mode returns the same 401 body so callers cannot tell
/// unknown emails from wrong passwords or disabled accounts.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    if payload.email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let account = state
        .store()
        .verify_credentials(&payload.email, &payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?;

    let Some(account) = account else {
        return Err(ApiError::invalid_credentials());
    };

    // Rotate the session id on privilege change.
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to cycle session: {e}")))?;
    session
        .insert(SESSION_ACCOUNT_KEY, &account.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    tracing::info!(account_id = %account.id, "Login successful");

    Ok(Json(ApiResponse::success(account.into())))
}

/// POST /auth/logout
pub async fn logout(session: Session) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to clear session: {e}")))?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Logged out".to_string(),
    })))
}

/// GET /auth/me
pub async fn get_current_account(
    CurrentAccount(account): CurrentAccount,
) -> Json<ApiResponse<AccountDto>> {
    Json(ApiResponse::success(account.into()))
}

/// PUT /auth/password
/// Change own password after re-verifying the current one.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    CurrentAccount(account): CurrentAccount,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validation::validate_password(&payload.new_password)?;

    if payload.current_password == payload.new_password {
        return Err(ApiError::validation(
            "New password must be different from current password",
        ));
    }

    let matches = state
        .store()
        .password_matches(&account, &payload.current_password)
        .await
        .map_err(|e| ApiError::internal(format!("Password verification error: {e}")))?;

    if !matches {
        return Err(ApiError::validation("Current password is incorrect"));
    }

    let security = state.config().read().await.security.clone();
    state
        .store()
        .set_account_password(&account.id, &payload.new_password, &security)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update password: {e}")))?;

    // Values are never recorded for password changes.
    state
        .audit()
        .record("accounts", &account.id, AuditAction::Update, None, None, &account.id)
        .await;

    tracing::info!(account_id = %account.id, "Password changed");

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}
