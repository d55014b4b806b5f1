use anyhow::{Context, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};

use crate::entities::{accounts, audit_log, prelude::*};

/// One audit row joined with its actor. The inner join is what enforces the
/// "audit entry always references a valid actor" invariant on the read path.
#[derive(Debug, Clone)]
pub struct AuditEntryWithActor {
    pub entry: audit_log::Model,
    pub actor_name: String,
    pub actor_email: String,
}

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn append(
        &self,
        table_name: &str,
        record_id: &str,
        action: &str,
        old_values: Option<String>,
        new_values: Option<String>,
        actor_id: &str,
    ) -> Result<()> {
        let model = audit_log::ActiveModel {
            table_name: Set(table_name.to_string()),
            record_id: Set(record_id.to_string()),
            action: Set(action.to_string()),
            old_values: Set(old_values),
            new_values: Set(new_values),
            actor_id: Set(actor_id.to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        AuditLog::insert(model)
            .exec(&self.conn)
            .await
            .context("Failed to append audit entry")?;
        Ok(())
    }

    pub async fn list(
        &self,
        table_name: Option<String>,
        record_id: Option<String>,
        limit: u64,
    ) -> Result<Vec<AuditEntryWithActor>> {
        let mut query = AuditLog::find()
            .find_also_related(Accounts)
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit);

        if let Some(table) = table_name {
            query = query.filter(audit_log::Column::TableName.eq(table));
        }

        if let Some(record) = record_id {
            query = query.filter(audit_log::Column::RecordId.eq(record));
        }

        let rows = query
            .all(&self.conn)
            .await
            .context("Failed to query audit log")?;

        Ok(rows
            .into_iter()
            .filter_map(|(entry, actor)| {
                actor.map(|actor: accounts::Model| AuditEntryWithActor {
                    entry,
                    actor_name: actor.name,
                    actor_email: actor.email,
                })
            })
            .collect())
    }

    pub async fn count_for_record(&self, table_name: &str, record_id: &str) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        AuditLog::find()
            .filter(audit_log::Column::TableName.eq(table_name))
            .filter(audit_log::Column::RecordId.eq(record_id))
            .count(&self.conn)
            .await
            .context("Failed to count audit entries")
    }
}
