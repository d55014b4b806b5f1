use crate::db::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Writes audit entries for mutations. Recording is best-effort: a failed
/// write is logged and swallowed so the primary operation still succeeds.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Store,
}

impl AuditRecorder {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        table_name: &str,
        record_id: &str,
        action: AuditAction,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
        actor_id: &str,
    ) {
        let result = self
            .store
            .append_audit(
                table_name,
                record_id,
                action.as_str(),
                old_values.map(|v| v.to_string()),
                new_values.map(|v| v.to_string()),
                actor_id,
            )
            .await;

        if let Err(e) = result {
            tracing::warn!(
                table_name,
                record_id,
                action = action.as_str(),
                "Failed to record audit entry: {e}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::db::NewAccount;
    use crate::entities::accounts::Role;
    use sea_orm::ConnectionTrait;

    #[tokio::test]
    async fn test_audit_failure_does_not_block_mutations() {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let recorder = AuditRecorder::new(store.clone());

        // Break the audit table entirely.
        store
            .conn
            .execute_unprepared("DROP TABLE audit_log")
            .await
            .unwrap();

        // record() swallows the failure.
        recorder
            .record(
                "accounts",
                "some-id",
                AuditAction::Create,
                None,
                Some(serde_json::json!({"name": "x"})),
                "actor",
            )
            .await;

        // The store is still usable for primary writes.
        let security = SecurityConfig {
            argon2_memory_cost_kib: 64,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..Default::default()
        };
        let created = store
            .create_account(
                NewAccount {
                    name: "After Failure".to_string(),
                    email: "after@example.com".to_string(),
                    password: "password123".to_string(),
                    role: Role::Collaborator,
                    created_by: None,
                },
                &security,
            )
            .await
            .unwrap();
        assert_eq!(created.email, "after@example.com");
    }
}
