use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, multipart};

/// Client for the external AI service that indexes uploaded documents and
/// tracks conditions it could not map ("missing conditions").
pub struct EmbedderClient {
    client: Client,
    base_url: String,
}

/// One file forwarded to the embedding endpoint.
pub struct EmbedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl EmbedderClient {
    pub fn with_shared_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// POST /embed — forwards document binaries for indexing.
    pub async fn embed_files(&self, files: Vec<EmbedFile>) -> Result<()> {
        let mut form = multipart::Form::new();
        for file in files {
            let part = multipart::Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.content_type)
                .context("Invalid content type for embed upload")?;
            form = form.part("files", part);
        }

        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("Embed request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embed request returned {status}: {body}");
        }

        Ok(())
    }

    /// POST /embed with no files — the service rebuilds its whole index from
    /// the documents it already holds. Returns the upstream status and body
    /// so the API can hand them through.
    pub async fn re_embed_all(&self) -> Result<(StatusCode, serde_json::Value)> {
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .send()
            .await
            .context("Re-embed request failed")?;

        let status = response.status();
        let body = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok((status, body))
    }

    /// POST /documents/{id}/re-embed — asks the service to rebuild the index
    /// entry from the stored file. Returns the upstream status and body so
    /// the API can hand them through.
    pub async fn re_embed(&self, document_id: &str) -> Result<(StatusCode, serde_json::Value)> {
        let response = self
            .client
            .post(format!("{}/documents/{document_id}/re-embed", self.base_url))
            .send()
            .await
            .context("Re-embed request failed")?;

        let status = response.status();
        let body = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok((status, body))
    }

    /// DELETE /documents/{id} — removes the document from the index. A 404
    /// means it was never indexed, which callers treat as already done.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/documents/{document_id}", self.base_url))
            .send()
            .await
            .context("Index delete request failed")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            anyhow::bail!("Index delete returned {status}");
        }

        Ok(())
    }

    /// GET /missing-conditions — paged passthrough.
    pub async fn missing_conditions(
        &self,
        page: u64,
        limit: u64,
        status: Option<&str>,
    ) -> Result<(StatusCode, serde_json::Value)> {
        let mut request = self
            .client
            .get(format!("{}/missing-conditions", self.base_url))
            .query(&[("page", page), ("limit", limit)]);

        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }

        let response = request
            .send()
            .await
            .context("Missing-conditions request failed")?;

        let status = response.status();
        let body = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok((status, body))
    }

    /// PATCH /missing-conditions/{id} — review-state passthrough.
    pub async fn update_missing_condition(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<(StatusCode, serde_json::Value)> {
        let response = self
            .client
            .patch(format!("{}/missing-conditions/{id}", self.base_url))
            .json(body)
            .send()
            .await
            .context("Missing-condition update failed")?;

        let status = response.status();
        let body = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok((status, body))
    }
}
