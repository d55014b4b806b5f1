use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState,
    auth::{AdminAccount, CurrentAccount},
    types::{AccountDto, CreateAccountRequest, MessageResponse, UpdateAccountRequest},
    validation,
};
use crate::db::{AccountPatch, NewAccount, is_unique_violation};
use crate::entities::accounts::{self, Role};
use crate::services::AuditAction;

/// Snapshot recorded in the audit trail. Deliberately excludes the
/// password hash.
fn audit_snapshot(account: &accounts::Model) -> serde_json::Value {
    serde_json::json!({
        "name": account.name,
        "email": account.email,
        "role": account.role,
        "disabled": account.disabled,
    })
}

/// GET /accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    CurrentAccount(_): CurrentAccount,
) -> Result<Json<ApiResponse<Vec<AccountDto>>>, ApiError> {
    let accounts = state
        .store()
        .list_accounts()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list accounts: {e}")))?;

    Ok(Json(ApiResponse::success(
        accounts.into_iter().map(AccountDto::from).collect(),
    )))
}

/// GET /accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    CurrentAccount(_): CurrentAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let account = state
        .store()
        .get_account(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load account: {e}")))?
        .ok_or_else(|| ApiError::not_found("Account", &id))?;

    Ok(Json(ApiResponse::success(account.into())))
}

/// POST /accounts
/// Creates a collaborator (or admin) and issues an email-verification link.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountDto>>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    let email = validation::validate_email(&payload.email)?.to_string();
    validation::validate_password(&payload.password)?;

    let existing = state
        .store()
        .get_account_by_email(&email)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to check email: {e}")))?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "An account with email {email} already exists"
        )));
    }

    let config = state.config().read().await.clone();

    let account = state
        .store()
        .create_account(
            NewAccount {
                name: payload.name.trim().to_string(),
                email: email.clone(),
                password: payload.password,
                role: payload.role.unwrap_or(Role::Collaborator),
                created_by: Some(admin.id.clone()),
            },
            &config.security,
        )
        .await
        .map_err(|e| {
            // The existence check above races with concurrent creates; the
            // unique index is the arbiter.
            if is_unique_violation(&e) {
                ApiError::Conflict(format!("An account with email {email} already exists"))
            } else {
                ApiError::internal(format!("Failed to create account: {e}"))
            }
        })?;

    send_verification_link(&state, &account, &config).await;

    state
        .audit()
        .record(
            "accounts",
            &account.id,
            AuditAction::Create,
            None,
            Some(audit_snapshot(&account)),
            &admin.id,
        )
        .await;

    tracing::info!(account_id = %account.id, "Account created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(account.into())),
    ))
}

/// PUT /accounts/{id}
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let patch = AccountPatch {
        name: payload.name,
        email: payload.email,
        password: payload.password,
        disabled: payload.disabled,
        role: payload.role,
    };

    if patch.is_empty() {
        return Err(ApiError::validation("No valid fields to update"));
    }

    if let Some(name) = &patch.name
        && name.trim().is_empty()
    {
        return Err(ApiError::validation("Name cannot be empty"));
    }
    if let Some(email) = &patch.email {
        let email = validation::validate_email(email)?;
        let existing = state
            .store()
            .get_account_by_email(email)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to check email: {e}")))?;
        if let Some(existing) = existing
            && existing.id != id
        {
            return Err(ApiError::Conflict(format!(
                "An account with email {email} already exists"
            )));
        }
    }
    if let Some(password) = &patch.password {
        validation::validate_password(password)?;
    }

    let security = state.config().read().await.security.clone();
    let updated = state
        .store()
        .update_account(&id, patch, &admin.id, &security)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("An account with that email already exists".to_string())
            } else {
                ApiError::internal(format!("Failed to update account: {e}"))
            }
        })?;

    let Some((before, after)) = updated else {
        return Err(ApiError::not_found("Account", &id));
    };

    state
        .audit()
        .record(
            "accounts",
            &after.id,
            AuditAction::Update,
            Some(audit_snapshot(&before)),
            Some(audit_snapshot(&after)),
            &admin.id,
        )
        .await;

    Ok(Json(ApiResponse::success(after.into())))
}

/// DELETE /accounts/{id}
/// Cascades to the account's audit entries via the foreign key.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if id == admin.id {
        return Err(ApiError::validation("Cannot delete your own account"));
    }

    let account = state
        .store()
        .get_account(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load account: {e}")))?
        .ok_or_else(|| ApiError::not_found("Account", &id))?;

    // Record before the delete: the FK cascade would drop an entry written
    // afterwards for this actor's own deletion, and the entry references
    // the admin anyway.
    state
        .audit()
        .record(
            "accounts",
            &id,
            AuditAction::Delete,
            Some(audit_snapshot(&account)),
            None,
            &admin.id,
        )
        .await;

    let deleted = state
        .store()
        .delete_account(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to delete account: {e}")))?;

    if !deleted {
        return Err(ApiError::not_found("Account", &id));
    }

    tracing::info!(account_id = %id, "Account deleted");

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Account deleted".to_string(),
    })))
}

/// POST /accounts/{id}/resend-verification
/// Re-issues the verification token, superseding any outstanding one.
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    AdminAccount(_): AdminAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let account = state
        .store()
        .get_account(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load account: {e}")))?
        .ok_or_else(|| ApiError::not_found("Account", &id))?;

    if account.email_verified.is_some() {
        return Err(ApiError::validation("Email is already verified"));
    }

    let config = state.config().read().await.clone();
    send_verification_link(&state, &account, &config).await;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Verification email sent".to_string(),
    })))
}

async fn send_verification_link(
    state: &AppState,
    account: &accounts::Model,
    config: &crate::config::Config,
) {
    let token = match state
        .store()
        .issue_token(
            &account.email,
            config.security.verification_token_ttl_minutes,
        )
        .await
    {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(email = %account.email, "Failed to issue verification token: {e}");
            return;
        }
    };

    let link = format!("{}/verify-email?token={token}", config.server.public_url);
    state
        .notifier()
        .send_verification_link(&account.email, &link)
        .await;
}
