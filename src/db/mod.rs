use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::entities::accounts::{self, Role};
use crate::entities::documents::{self, EmbeddingStatus};
use crate::entities::verification_tokens;

pub mod migrator;
pub mod repositories;

pub use repositories::account::{AccountPatch, NewAccount, hash_password, is_unique_violation};
pub use repositories::audit::AuditEntryWithActor;
pub use repositories::document::{DocumentPatch, NewDocument};
pub use repositories::token::RESET_PREFIX;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                tokio::fs::File::create(path_str).await?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn account_repo(&self) -> repositories::account::AccountRepository {
        repositories::account::AccountRepository::new(self.conn.clone())
    }

    fn token_repo(&self) -> repositories::token::TokenRepository {
        repositories::token::TokenRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    fn document_repo(&self) -> repositories::document::DocumentRepository {
        repositories::document::DocumentRepository::new(self.conn.clone())
    }

    // ========== Accounts ==========

    pub async fn get_account(&self, id: &str) -> Result<Option<accounts::Model>> {
        self.account_repo().get(id).await
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<accounts::Model>> {
        self.account_repo().get_by_email(email).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<accounts::Model>> {
        self.account_repo().list().await
    }

    pub async fn create_account(
        &self,
        new: NewAccount,
        security: &SecurityConfig,
    ) -> Result<accounts::Model> {
        self.account_repo().create(new, security).await
    }

    pub async fn update_account(
        &self,
        id: &str,
        patch: AccountPatch,
        actor_id: &str,
        security: &SecurityConfig,
    ) -> Result<Option<(accounts::Model, accounts::Model)>> {
        self.account_repo()
            .update(id, patch, actor_id, security)
            .await
    }

    pub async fn delete_account(&self, id: &str) -> Result<bool> {
        self.account_repo().delete(id).await
    }

    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<accounts::Model>> {
        self.account_repo().verify_credentials(email, password).await
    }

    pub async fn password_matches(
        &self,
        account: &accounts::Model,
        password: &str,
    ) -> Result<bool> {
        self.account_repo().password_matches(account, password).await
    }

    pub async fn set_account_password(
        &self,
        id: &str,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.account_repo()
            .set_password(id, new_password, security)
            .await
    }

    pub async fn mark_email_verified(&self, email: &str) -> Result<Option<accounts::Model>> {
        self.account_repo().mark_email_verified(email).await
    }

    // ========== Verification / reset tokens ==========

    pub async fn issue_token(&self, identifier: &str, ttl_minutes: i64) -> Result<String> {
        self.token_repo().issue(identifier, ttl_minutes).await
    }

    pub async fn find_valid_token(
        &self,
        token: &str,
    ) -> Result<Option<verification_tokens::Model>> {
        self.token_repo().find_valid(token).await
    }

    pub async fn consume_token(&self, token: &str) -> Result<()> {
        self.token_repo().consume(token).await
    }

    pub async fn tokens_for_identifier(
        &self,
        identifier: &str,
    ) -> Result<Vec<verification_tokens::Model>> {
        self.token_repo().list_for_identifier(identifier).await
    }

    // ========== Audit log ==========

    pub async fn append_audit(
        &self,
        table_name: &str,
        record_id: &str,
        action: &str,
        old_values: Option<String>,
        new_values: Option<String>,
        actor_id: &str,
    ) -> Result<()> {
        self.audit_repo()
            .append(table_name, record_id, action, old_values, new_values, actor_id)
            .await
    }

    pub async fn list_audit(
        &self,
        table_name: Option<String>,
        record_id: Option<String>,
        limit: u64,
    ) -> Result<Vec<AuditEntryWithActor>> {
        self.audit_repo().list(table_name, record_id, limit).await
    }

    pub async fn count_audit_for_record(&self, table_name: &str, record_id: &str) -> Result<u64> {
        self.audit_repo().count_for_record(table_name, record_id).await
    }

    // ========== Documents ==========

    pub async fn create_document(&self, new: NewDocument) -> Result<documents::Model> {
        self.document_repo().create(new).await
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<documents::Model>> {
        self.document_repo().get(id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<documents::Model>> {
        self.document_repo().list().await
    }

    pub async fn update_document(
        &self,
        id: &str,
        patch: DocumentPatch,
    ) -> Result<Option<(documents::Model, documents::Model)>> {
        self.document_repo().update(id, patch).await
    }

    pub async fn set_document_embedding_status(
        &self,
        id: &str,
        status: EmbeddingStatus,
    ) -> Result<()> {
        self.document_repo().set_embedding_status(id, status).await
    }

    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        self.document_repo().delete(id).await
    }

    /// Used by the `create-admin` maintenance command.
    pub async fn create_admin_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        security: &SecurityConfig,
    ) -> Result<accounts::Model> {
        self.create_account(
            NewAccount {
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                role: Role::Admin,
                created_by: None,
            },
            security,
        )
        .await
    }
}
