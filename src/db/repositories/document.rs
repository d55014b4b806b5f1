use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

use crate::entities::documents::{self, EmbeddingStatus};

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub description: String,
    pub category: String,
    pub storage_key: String,
    pub file_url: String,
    pub file_type: String,
}

/// Field mask for document metadata updates; an incoming replacement file
/// shows up as new storage coordinates.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub storage_key: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
}

pub struct DocumentRepository {
    conn: DatabaseConnection,
}

impl DocumentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, new: NewDocument) -> Result<documents::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let model = documents::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(new.name),
            description: Set(new.description),
            category: Set(new.category),
            storage_key: Set(new.storage_key),
            file_url: Set(new.file_url),
            file_type: Set(new.file_type),
            embedding_status: Set(EmbeddingStatus::Pending),
            uploaded_at: Set(now.clone()),
            last_edited: Set(now),
        };

        model
            .insert(&self.conn)
            .await
            .context("Failed to insert document")
    }

    pub async fn get(&self, id: &str) -> Result<Option<documents::Model>> {
        documents::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query document")
    }

    pub async fn list(&self) -> Result<Vec<documents::Model>> {
        documents::Entity::find()
            .order_by_desc(documents::Column::UploadedAt)
            .all(&self.conn)
            .await
            .context("Failed to list documents")
    }

    pub async fn update(
        &self,
        id: &str,
        patch: DocumentPatch,
    ) -> Result<Option<(documents::Model, documents::Model)>> {
        let Some(before) = self.get(id).await? else {
            return Ok(None);
        };

        let mut active: documents::ActiveModel = before.clone().into();

        if let Some(name) = patch.name {
            active.name = Set(name);
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(category) = patch.category {
            active.category = Set(category);
        }
        if let Some(storage_key) = patch.storage_key {
            active.storage_key = Set(storage_key);
        }
        if let Some(file_url) = patch.file_url {
            active.file_url = Set(file_url);
        }
        if let Some(file_type) = patch.file_type {
            active.file_type = Set(file_type);
        }

        active.last_edited = Set(chrono::Utc::now().to_rfc3339());

        let after = active
            .update(&self.conn)
            .await
            .context("Failed to update document")?;

        Ok(Some((before, after)))
    }

    pub async fn set_embedding_status(&self, id: &str, status: EmbeddingStatus) -> Result<()> {
        let Some(doc) = self.get(id).await? else {
            anyhow::bail!("Document not found: {id}");
        };

        let mut active: documents::ActiveModel = doc.into();
        active.embedding_status = Set(status);
        active.update(&self.conn).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = documents::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete document")?;
        Ok(result.rows_affected > 0)
    }
}
