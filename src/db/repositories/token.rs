use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::verification_tokens;

/// Identifier prefix that marks a token as a password-reset token, keeping
/// it apart from email-verification tokens in the same table.
pub const RESET_PREFIX: &str = "reset:";

pub struct TokenRepository {
    conn: DatabaseConnection,
}

impl TokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Issues a fresh token for the identifier, superseding any existing
    /// tokens for the same identifier. Returns the token string.
    pub async fn issue(&self, identifier: &str, ttl_minutes: i64) -> Result<String> {
        self.delete_for_identifier(identifier).await?;

        let token = generate_token();
        let expires = (Utc::now() + Duration::minutes(ttl_minutes)).to_rfc3339();

        let model = verification_tokens::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            identifier: Set(identifier.to_string()),
            token: Set(token.clone()),
            expires: Set(expires),
        };

        model
            .insert(&self.conn)
            .await
            .context("Failed to insert verification token")?;

        Ok(token)
    }

    /// Looks a token up and filters out expired ones. Expired rows are left
    /// in place; they are superseded on the next issue for the identifier.
    pub async fn find_valid(&self, token: &str) -> Result<Option<verification_tokens::Model>> {
        let Some(row) = verification_tokens::Entity::find()
            .filter(verification_tokens::Column::Token.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query verification token")?
        else {
            return Ok(None);
        };

        let expires = DateTime::parse_from_rfc3339(&row.expires)
            .context("Malformed token expiry timestamp")?;

        if expires < Utc::now() {
            return Ok(None);
        }

        Ok(Some(row))
    }

    /// Single-use consumption: the row is gone after this returns.
    pub async fn consume(&self, token: &str) -> Result<()> {
        verification_tokens::Entity::delete_many()
            .filter(verification_tokens::Column::Token.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to delete consumed token")?;
        Ok(())
    }

    pub async fn delete_for_identifier(&self, identifier: &str) -> Result<u64> {
        let result = verification_tokens::Entity::delete_many()
            .filter(verification_tokens::Column::Identifier.eq(identifier))
            .exec(&self.conn)
            .await
            .context("Failed to delete tokens for identifier")?;
        Ok(result.rows_affected)
    }

    pub async fn list_for_identifier(
        &self,
        identifier: &str,
    ) -> Result<Vec<verification_tokens::Model>> {
        verification_tokens::Entity::find()
            .filter(verification_tokens::Column::Identifier.eq(identifier))
            .all(&self.conn)
            .await
            .context("Failed to list tokens for identifier")
    }
}

/// Generate a random token (64 character hex string)
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
