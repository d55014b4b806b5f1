use serde::{Deserialize, Serialize};

use crate::db::AuditEntryWithActor;
use crate::entities::accounts::{self, Role};
use crate::entities::documents;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Account as exposed over the API. Never carries the password hash.
#[derive(Debug, Serialize)]
pub struct AccountDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub disabled: bool,
    pub email_verified: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<accounts::Model> for AccountDto {
    fn from(model: accounts::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            disabled: model.disabled,
            email_verified: model.email_verified,
            created_by: model.created_by,
            updated_by: model.updated_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentDto {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub file_url: String,
    pub file_type: String,
    pub embedding_status: documents::EmbeddingStatus,
    pub uploaded_at: String,
    pub last_edited: String,
}

impl From<documents::Model> for DocumentDto {
    fn from(model: documents::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            category: model.category,
            file_url: model.file_url,
            file_type: model.file_type,
            embedding_status: model.embedding_status,
            uploaded_at: model.uploaded_at,
            last_edited: model.last_edited,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryDto {
    pub id: i64,
    pub table_name: String,
    pub record_id: String,
    pub action: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub actor_id: String,
    pub actor_name: String,
    pub actor_email: String,
    pub created_at: String,
}

impl From<AuditEntryWithActor> for AuditEntryDto {
    fn from(row: AuditEntryWithActor) -> Self {
        let parse = |raw: Option<String>| {
            raw.and_then(|s| serde_json::from_str(&s).ok())
        };

        Self {
            id: row.entry.id,
            table_name: row.entry.table_name,
            record_id: row.entry.record_id,
            action: row.entry.action,
            old_values: parse(row.entry.old_values),
            new_values: parse(row.entry.new_values),
            actor_id: row.entry.actor_id,
            actor_name: row.actor_name,
            actor_email: row.actor_email,
            created_at: row.entry.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub disabled: Option<bool>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Reset endpoint doubles as a token validity probe: `action: "validate"`
/// checks the token without consuming it.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetValidationResponse {
    pub valid: bool,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MissingConditionsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMissingConditionRequest {
    pub status: String,
    pub admin_notes: Option<String>,
}
