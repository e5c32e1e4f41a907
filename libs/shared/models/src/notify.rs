use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Messaging gateway not configured")]
    NotConfigured,
}

/// Outbound notification collaborator: accepts (contact identifier, rendered
/// text) and attempts delivery. Retry policy, if any, lives outside this core.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, contact: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier that drops everything; used when no gateway is configured and in
/// tests.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_text(&self, contact: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::debug!("Notification to {} skipped (noop notifier)", contact);
        Ok(())
    }
}
