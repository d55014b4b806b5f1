use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::accounts::{self, Role};

/// Fields for creating a new account. The password arrives in plaintext and
/// is hashed inside the repository.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub created_by: Option<String>,
}

/// Field mask for partial account updates. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub disabled: Option<bool>,
    pub role: Option<Role>,
}

impl AccountPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.disabled.is_none()
            && self.role.is_none()
    }
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: &str) -> Result<Option<accounts::Model>> {
        accounts::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query account by id")
    }

    /// Case-sensitive exact match, mirroring the login lookup.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<accounts::Model>> {
        accounts::Entity::find()
            .filter(accounts::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query account by email")
    }

    pub async fn list(&self) -> Result<Vec<accounts::Model>> {
        accounts::Entity::find()
            .order_by_desc(accounts::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list accounts")
    }

    pub async fn create(
        &self,
        new: NewAccount,
        security: &SecurityConfig,
    ) -> Result<accounts::Model> {
        let password = new.password;
        let security = security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let model = accounts::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(new.name),
            email: Set(new.email),
            password_hash: Set(Some(password_hash)),
            role: Set(new.role),
            disabled: Set(false),
            email_verified: Set(None),
            created_by: Set(new.created_by.clone()),
            updated_by: Set(new.created_by),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        model
            .insert(&self.conn)
            .await
            .context("Failed to insert account")
    }

    /// Applies a partial update and returns the state before and after.
    pub async fn update(
        &self,
        id: &str,
        patch: AccountPatch,
        actor_id: &str,
        security: &SecurityConfig,
    ) -> Result<Option<(accounts::Model, accounts::Model)>> {
        let Some(before) = self.get(id).await? else {
            return Ok(None);
        };

        let mut active: accounts::ActiveModel = before.clone().into();

        if let Some(name) = patch.name {
            active.name = Set(name);
        }
        if let Some(email) = patch.email {
            active.email = Set(email);
        }
        if let Some(password) = patch.password {
            let security = security.clone();
            let hash = task::spawn_blocking(move || hash_password(&password, &security))
                .await
                .context("Password hashing task panicked")??;
            active.password_hash = Set(Some(hash));
        }
        if let Some(disabled) = patch.disabled {
            active.disabled = Set(disabled);
        }
        if let Some(role) = patch.role {
            active.role = Set(role);
        }

        active.updated_by = Set(Some(actor_id.to_string()));
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let after = active
            .update(&self.conn)
            .await
            .context("Failed to update account")?;

        Ok(Some((before, after)))
    }

    /// Hard delete. Related audit rows where this account is the actor are
    /// removed by FK cascade.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = accounts::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete account")?;
        Ok(result.rows_affected > 0)
    }

    /// Credential check for login. Returns `Ok(None)` for every failure mode
    /// (unknown email, missing hash, disabled account, wrong password) so the
    /// caller cannot distinguish them.
    ///
    /// Argon2 verification runs under `spawn_blocking`: it is CPU-intensive
    /// and would stall the async runtime if run inline.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<accounts::Model>> {
        let Some(account) = self.get_by_email(email).await? else {
            return Ok(None);
        };

        if account.disabled {
            return Ok(None);
        }

        let Some(password_hash) = account.password_hash.clone() else {
            return Ok(None);
        };

        let password = password.to_string();
        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid.then_some(account))
    }

    /// Checks a plaintext password against one account's stored hash.
    /// Used by change-password and reset flows; same failure collapsing as
    /// `verify_credentials` minus the disabled check.
    pub async fn password_matches(&self, account: &accounts::Model, password: &str) -> Result<bool> {
        let Some(password_hash) = account.password_hash.clone() else {
            return Ok(false);
        };

        let password = password.to_string();
        task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")?
    }

    pub async fn set_password(
        &self,
        id: &str,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        let account = self
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Account not found: {id}"))?;

        let password = new_password.to_string();
        let security = security.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let mut active: accounts::ActiveModel = account.into();
        active.password_hash = Set(Some(new_hash));
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn mark_email_verified(&self, email: &str) -> Result<Option<accounts::Model>> {
        let Some(account) = self.get_by_email(email).await? else {
            return Ok(None);
        };

        let mut active: accounts::ActiveModel = account.into();
        active.email_verified = Set(Some(chrono::Utc::now().to_rfc3339()));
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let updated = active.update(&self.conn).await?;
        Ok(Some(updated))
    }
}

/// True when the error chain bottoms out in a unique-constraint violation.
/// For the accounts table that means a duplicate email: the handler-level
/// existence check is not atomic with the insert, so a concurrent duplicate
/// surfaces here instead.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sea_orm::DbErr>()
        .and_then(sea_orm::DbErr::sql_err)
        .is_some_and(|sql| matches!(sql, sea_orm::SqlErr::UniqueConstraintViolation(_)))
}

/// Hash a password using Argon2id with the configured params.
pub fn hash_password(password: &str, security: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        security.argon2_memory_cost_kib,
        security.argon2_time_cost,
        security.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
