pub mod prelude;

pub mod accounts;
pub mod audit_log;
pub mod documents;
pub mod verification_tokens;
