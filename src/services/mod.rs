pub mod audit;
pub mod notifier;

pub use audit::{AuditAction, AuditRecorder};
pub use notifier::{LogNotifier, Notifier};
