use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState,
    auth::{AdminAccount, CurrentAccount},
    types::{DocumentDto, MessageResponse},
    validation,
};
use crate::clients::embedder::EmbedFile;
use crate::db::{DocumentPatch, NewDocument};
use crate::entities::documents::{self, EmbeddingStatus};
use crate::services::AuditAction;

fn audit_snapshot(doc: &documents::Model) -> serde_json::Value {
    serde_json::json!({
        "name": doc.name,
        "description": doc.description,
        "category": doc.category,
        "file_type": doc.file_type,
        "file_url": doc.file_url,
    })
}

/// One uploaded file plus the metadata fields from the same multipart form.
#[derive(Default)]
struct UploadForm {
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    files: Vec<UploadedFile>,
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
    {
        let Some(field_name) = field.name().map(ToString::to_string) else {
            continue;
        };

        match field_name.as_str() {
            "name" | "description" | "category" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Invalid field {field_name}: {e}")))?;
                match field_name.as_str() {
                    "name" => form.name = Some(value),
                    "description" => form.description = Some(value),
                    _ => form.category = Some(value),
                }
            }
            "file" | "files" => {
                let file_name = field
                    .file_name()
                    .map(ToString::to_string)
                    .ok_or_else(|| ApiError::validation("File field is missing a file name"))?;
                let content_type = field.content_type().map(ToString::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read file: {e}")))?;

                if bytes.is_empty() {
                    return Err(ApiError::validation(format!("File {file_name} is empty")));
                }

                form.files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Stores one file and creates its metadata row. The embedding call happens
/// separately so bulk uploads can batch it.
async fn store_document(
    state: &AppState,
    file: &UploadedFile,
    name: String,
    description: String,
    category: String,
    extension: &str,
) -> Result<documents::Model, ApiError> {
    let storage_key = format!("documents/{}.{extension}", uuid::Uuid::new_v4());

    state
        .storage()
        .put(&storage_key, &file.bytes)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store file: {e}")))?;

    let public_url = state.config().read().await.server.public_url.clone();
    let file_url = format!("{public_url}/files/{storage_key}");

    state
        .store()
        .create_document(NewDocument {
            name,
            description,
            category,
            storage_key,
            file_url,
            file_type: extension.to_string(),
        })
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create document: {e}")))
}

/// Forwards files to the AI service and settles the embedding status of the
/// given documents. Indexing failures never fail the upload.
async fn embed_and_settle(state: &AppState, files: Vec<EmbedFile>, document_ids: &[String]) {
    for id in document_ids {
        if let Err(e) = state
            .store()
            .set_document_embedding_status(id, EmbeddingStatus::Processing)
            .await
        {
            tracing::warn!(document_id = %id, "Failed to mark document processing: {e}");
        }
    }

    let status = match state.embedder().embed_files(files).await {
        Ok(()) => EmbeddingStatus::Completed,
        Err(e) => {
            tracing::warn!("Embedding failed: {e}");
            EmbeddingStatus::Failed
        }
    };

    settle_all(state, document_ids, status).await;
}

async fn settle_all(state: &AppState, ids: &[String], status: EmbeddingStatus) {
    for id in ids {
        if let Err(e) = state
            .store()
            .set_document_embedding_status(id, status)
            .await
        {
            tracing::warn!(document_id = %id, "Failed to settle embedding status: {e}");
        }
    }
}

fn content_type_for(file: &UploadedFile) -> String {
    file.content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    CurrentAccount(_): CurrentAccount,
) -> Result<Json<ApiResponse<Vec<DocumentDto>>>, ApiError> {
    let documents = state
        .store()
        .list_documents()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list documents: {e}")))?;

    Ok(Json(ApiResponse::success(
        documents.into_iter().map(DocumentDto::from).collect(),
    )))
}

/// GET /documents/{id}
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    CurrentAccount(_): CurrentAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DocumentDto>>, ApiError> {
    let document = state
        .store()
        .get_document(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load document: {e}")))?
        .ok_or_else(|| ApiError::not_found("Document", &id))?;

    Ok(Json(ApiResponse::success(document.into())))
}

/// POST /documents
/// Single upload: metadata fields plus one file in a multipart form.
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<DocumentDto>>), ApiError> {
    let form = read_upload_form(multipart).await?;

    let name = form
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Name is required"))?;
    let description = form
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Description is required"))?;
    let category = form
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Category is required"))?;

    let [file] = form.files.as_slice() else {
        return Err(ApiError::validation("Exactly one file is required"));
    };

    let extension = validation::validate_document_file(&file.file_name, file.content_type.as_deref())?;

    let document = store_document(&state, file, name, description, category, &extension).await?;

    embed_and_settle(
        &state,
        vec![EmbedFile {
            file_name: file.file_name.clone(),
            content_type: content_type_for(file),
            bytes: file.bytes.clone(),
        }],
        std::slice::from_ref(&document.id),
    )
    .await;

    state
        .audit()
        .record(
            "documents",
            &document.id,
            AuditAction::Create,
            None,
            Some(audit_snapshot(&document)),
            &admin.id,
        )
        .await;

    // Reload for the settled embedding status.
    let document = state
        .store()
        .get_document(&document.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to reload document: {e}")))?
        .ok_or_else(|| ApiError::internal("Document vanished during upload"))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(document.into())),
    ))
}

/// POST /documents/bulk
/// All files are validated before anything is stored; one bad file rejects
/// the whole batch. Each file becomes its own document named after the
/// file, and the batch is embedded with a single upstream call.
pub async fn bulk_create_documents(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Vec<DocumentDto>>>), ApiError> {
    let form = read_upload_form(multipart).await?;

    if form.files.is_empty() {
        return Err(ApiError::validation("At least one file is required"));
    }

    let category = form
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Category is required"))?;

    let mut extensions = Vec::with_capacity(form.files.len());
    let mut invalid = Vec::new();
    for file in &form.files {
        match validation::validate_document_file(&file.file_name, file.content_type.as_deref()) {
            Ok(ext) => extensions.push(ext),
            Err(_) => invalid.push(file.file_name.clone()),
        }
    }
    if !invalid.is_empty() {
        return Err(ApiError::validation(format!(
            "Unsupported file types: {}",
            invalid.join(", ")
        )));
    }

    let mut created = Vec::with_capacity(form.files.len());
    let mut embed_files = Vec::with_capacity(form.files.len());

    for (file, extension) in form.files.iter().zip(&extensions) {
        let base_name = file
            .file_name
            .rsplit_once('.')
            .map_or(file.file_name.as_str(), |(stem, _)| stem)
            .to_string();

        let document = store_document(
            &state,
            file,
            base_name,
            String::new(),
            category.clone(),
            extension,
        )
        .await?;

        embed_files.push(EmbedFile {
            file_name: file.file_name.clone(),
            content_type: content_type_for(file),
            bytes: file.bytes.clone(),
        });
        created.push(document);
    }

    let ids: Vec<String> = created.iter().map(|d| d.id.clone()).collect();
    embed_and_settle(&state, embed_files, &ids).await;

    for document in &created {
        state
            .audit()
            .record(
                "documents",
                &document.id,
                AuditAction::Create,
                None,
                Some(audit_snapshot(document)),
                &admin.id,
            )
            .await;
    }

    let mut dtos = Vec::with_capacity(ids.len());
    for id in &ids {
        let document = state
            .store()
            .get_document(id)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to reload document: {e}")))?
            .ok_or_else(|| ApiError::internal("Document vanished during upload"))?;
        dtos.push(document.into());
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::success(dtos))))
}

/// PUT /documents/{id}
/// Metadata update with an optional replacement file. A new file gets new
/// storage coordinates; the old object is removed best-effort.
pub async fn update_document(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<DocumentDto>>, ApiError> {
    let existing = state
        .store()
        .get_document(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load document: {e}")))?
        .ok_or_else(|| ApiError::not_found("Document", &id))?;

    let form = read_upload_form(multipart).await?;

    let mut patch = DocumentPatch {
        name: form.name.filter(|n| !n.trim().is_empty()),
        description: form.description,
        category: form.category.filter(|c| !c.trim().is_empty()),
        ..Default::default()
    };

    let replacement = match form.files.as_slice() {
        [] => None,
        [file] => Some(file),
        _ => return Err(ApiError::validation("At most one replacement file is allowed")),
    };

    if let Some(file) = replacement {
        let extension =
            validation::validate_document_file(&file.file_name, file.content_type.as_deref())?;
        let storage_key = format!("documents/{}.{extension}", uuid::Uuid::new_v4());

        state
            .storage()
            .put(&storage_key, &file.bytes)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to store file: {e}")))?;

        if let Err(e) = state.storage().delete(&existing.storage_key).await {
            tracing::warn!(document_id = %id, "Failed to remove replaced file: {e}");
        }

        let public_url = state.config().read().await.server.public_url.clone();
        patch.file_url = Some(format!("{public_url}/files/{storage_key}"));
        patch.storage_key = Some(storage_key);
        patch.file_type = Some(extension);
    } else if patch.name.is_none() && patch.description.is_none() && patch.category.is_none() {
        return Err(ApiError::validation("No valid fields to update"));
    }

    let updated = state
        .store()
        .update_document(&id, patch)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update document: {e}")))?;

    let Some((before, after)) = updated else {
        return Err(ApiError::not_found("Document", &id));
    };

    if let Some(file) = replacement {
        embed_and_settle(
            &state,
            vec![EmbedFile {
                file_name: file.file_name.clone(),
                content_type: content_type_for(file),
                bytes: file.bytes.clone(),
            }],
            std::slice::from_ref(&id),
        )
        .await;
    }

    state
        .audit()
        .record(
            "documents",
            &id,
            AuditAction::Update,
            Some(audit_snapshot(&before)),
            Some(audit_snapshot(&after)),
            &admin.id,
        )
        .await;

    let after = state
        .store()
        .get_document(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to reload document: {e}")))?
        .unwrap_or(after);

    Ok(Json(ApiResponse::success(after.into())))
}

/// DELETE /documents/{id}
/// The metadata row is authoritative: index and storage removal are
/// best-effort, and the row is deleted regardless. A later re-embed
/// reconciles a stale index entry.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let document = state
        .store()
        .get_document(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load document: {e}")))?
        .ok_or_else(|| ApiError::not_found("Document", &id))?;

    if let Err(e) = state.embedder().delete_document(&id).await {
        tracing::warn!(document_id = %id, "Index removal failed: {e}");
    }

    if let Err(e) = state.storage().delete(&document.storage_key).await {
        tracing::warn!(document_id = %id, "Stored file removal failed: {e}");
    }

    let deleted = state
        .store()
        .delete_document(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to delete document: {e}")))?;

    if !deleted {
        return Err(ApiError::not_found("Document", &id));
    }

    state
        .audit()
        .record(
            "documents",
            &id,
            AuditAction::Delete,
            Some(audit_snapshot(&document)),
            None,
            &admin.id,
        )
        .await;

    tracing::info!(document_id = %id, "Document deleted");

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Document deleted".to_string(),
    })))
}

/// POST /documents/re-embed
/// Rebuilds the whole AI index from the documents the service already
/// holds, reconciling it with the primary store. Every document's embedding
/// status is settled on the outcome.
pub async fn re_embed_documents(
    State(state): State<Arc<AppState>>,
    AdminAccount(_): AdminAccount,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let ids: Vec<String> = state
        .store()
        .list_documents()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list documents: {e}")))?
        .into_iter()
        .map(|d| d.id)
        .collect();

    for id in &ids {
        if let Err(e) = state
            .store()
            .set_document_embedding_status(id, EmbeddingStatus::Processing)
            .await
        {
            tracing::warn!(document_id = %id, "Failed to mark document processing: {e}");
        }
    }

    let (status, body) = match state.embedder().re_embed_all().await {
        Ok(ok) => ok,
        Err(e) => {
            settle_all(&state, &ids, EmbeddingStatus::Failed).await;
            return Err(ApiError::ai_service_error(e.to_string()));
        }
    };

    let settled = if status.is_success() {
        EmbeddingStatus::Completed
    } else {
        EmbeddingStatus::Failed
    };
    settle_all(&state, &ids, settled).await;

    if !status.is_success() {
        return Err(ApiError::UpstreamStatus {
            status: status.as_u16(),
            message: body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("Re-embedding failed")
                .to_string(),
        });
    }

    Ok(Json(ApiResponse::success(body)))
}

/// POST /documents/{id}/re-embed
/// Asks the AI service to rebuild the index entry and hands its answer
/// through.
pub async fn re_embed_document(
    State(state): State<Arc<AppState>>,
    AdminAccount(_): AdminAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let document = state
        .store()
        .get_document(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load document: {e}")))?
        .ok_or_else(|| ApiError::not_found("Document", &id))?;

    state
        .store()
        .set_document_embedding_status(&document.id, EmbeddingStatus::Processing)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to mark document processing: {e}")))?;

    let result = state.embedder().re_embed(&document.id).await;

    let (status, body) = match result {
        Ok(ok) => ok,
        Err(e) => {
            let _ = state
                .store()
                .set_document_embedding_status(&document.id, EmbeddingStatus::Failed)
                .await;
            return Err(ApiError::ai_service_error(e.to_string()));
        }
    };

    let settled = if status.is_success() {
        EmbeddingStatus::Completed
    } else {
        EmbeddingStatus::Failed
    };
    state
        .store()
        .set_document_embedding_status(&document.id, settled)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to settle embedding status: {e}")))?;

    if !status.is_success() {
        return Err(ApiError::UpstreamStatus {
            status: status.as_u16(),
            message: body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("Re-embed failed")
                .to_string(),
        });
    }

    Ok(Json(ApiResponse::success(body)))
}
