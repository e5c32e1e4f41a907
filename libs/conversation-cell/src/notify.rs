// libs/conversation-cell/src/notify.rs
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use shared_config::AppConfig;
use shared_models::{Notifier, NotifyError};

/// Delivers outbound texts through the external messaging gateway.
pub struct GatewayNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GatewayNotifier {
    /// Returns `None` when the gateway is not configured; callers fall back
    /// to the noop notifier.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if !config.is_messaging_configured() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            base_url: config.messaging_gateway_url.clone(),
            token: config.messaging_gateway_token.clone(),
        })
    }
}

#[async_trait]
impl Notifier for GatewayNotifier {
    async fn send_text(&self, contact: &str, body: &str) -> Result<(), NotifyError> {
        let url = format!("{}/messages", self.base_url);
        debug!("Sending message to {} via gateway", contact);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&json!({
                "to": contact,
                "body": body,
            }))
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::DeliveryFailed(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
