use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Immutable record of one mutation. Rows are appended by the audit
/// recorder and never updated or deleted by the application; the only
/// way a row disappears is the actor account being hard-deleted
/// (FK cascade).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub table_name: String,

    pub record_id: String,

    /// One of CREATE, UPDATE, DELETE.
    pub action: String,

    /// JSON snapshot before the mutation, where applicable.
    pub old_values: Option<String>,

    /// JSON snapshot after the mutation, where applicable.
    pub new_values: Option<String>,

    pub actor_id: String,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::ActorId",
        to = "super::accounts::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
