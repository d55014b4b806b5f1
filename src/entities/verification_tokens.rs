use sea_orm::entity::prelude::*;

/// Single-use email-verification and password-reset tokens.
///
/// The `identifier` is the plain email for verification tokens and
/// `reset:<email>` for password-reset tokens. Issuing a new token for an
/// identifier supersedes (deletes) older ones; consuming a token deletes it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "verification_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub identifier: String,

    #[sea_orm(unique)]
    pub token: String,

    /// RFC 3339 expiry.
    pub expires: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
