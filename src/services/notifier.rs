use async_trait::async_trait;

/// Delivery channel for account emails. The default implementation writes
/// the links to the log; operators wire a real mailer in front of the API.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification_link(&self, email: &str, link: &str);

    async fn send_reset_link(&self, email: &str, link: &str);
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification_link(&self, email: &str, link: &str) {
        tracing::info!(email, link, "Verification link issued");
    }

    async fn send_reset_link(&self, email: &str, link: &str) {
        tracing::info!(email, link, "Password reset link issued");
    }
}
