use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_url: String,
    pub storage_api_key: String,
    pub messaging_gateway_url: String,
    pub messaging_gateway_token: String,
    /// Offset of the clinic's operating timezone from UTC, in minutes.
    /// Negative for the Americas (e.g. -360 for UTC-6).
    pub clinic_utc_offset_minutes: i32,
    pub flow_ttl_minutes: i64,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            storage_url: env::var("STORAGE_URL").unwrap_or_else(|_| {
                warn!("STORAGE_URL not set, using empty value");
                String::new()
            }),
            storage_api_key: env::var("STORAGE_API_KEY").unwrap_or_else(|_| {
                warn!("STORAGE_API_KEY not set, using empty value");
                String::new()
            }),
            messaging_gateway_url: env::var("MESSAGING_GATEWAY_URL").unwrap_or_else(|_| {
                warn!("MESSAGING_GATEWAY_URL not set, using empty value");
                String::new()
            }),
            messaging_gateway_token: env::var("MESSAGING_GATEWAY_TOKEN").unwrap_or_else(|_| {
                warn!("MESSAGING_GATEWAY_TOKEN not set, using empty value");
                String::new()
            }),
            clinic_utc_offset_minutes: env::var("CLINIC_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| {
                    warn!("CLINIC_UTC_OFFSET_MINUTES not set, defaulting to -360 (UTC-6)");
                    -360
                }),
            flow_ttl_minutes: env::var("FLOW_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            port: env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.storage_url.is_empty() && !self.storage_api_key.is_empty()
    }

    pub fn is_messaging_configured(&self) -> bool {
        !self.messaging_gateway_url.is_empty() && !self.messaging_gateway_token.is_empty()
    }
}
