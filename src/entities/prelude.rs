pub use super::accounts::Entity as Accounts;
pub use super::audit_log::Entity as AuditLog;
pub use super::documents::Entity as Documents;
pub use super::verification_tokens::Entity as VerificationTokens;
