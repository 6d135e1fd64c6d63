//! External wake API
//!
//! The gateway asks a Pterodactyl panel to start the game server by sending a
//! `start` power signal. The panel answers `204 No Content` on success.

use crate::config::WakeConfig;
use crate::error::WakeError;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Something that can be asked to start the backend
pub trait WakeApi: Send + Sync {
    /// Send one start request. No retries.
    fn start_server(&self) -> BoxFuture<'_, Result<(), WakeError>>;
}

/// Client for the Pterodactyl client API power endpoint
pub struct PterodactylClient {
    http_client: reqwest::Client,
    power_url: String,
    api_key: String,
}

impl PterodactylClient {
    pub fn new(config: &WakeConfig) -> Result<Self, WakeError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self::with_http_client(config, http_client))
    }

    /// Use a preconfigured HTTP client (custom proxy or TLS settings)
    pub fn with_http_client(config: &WakeConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            power_url: power_url(&config.url, &config.server),
            api_key: config.api_key.clone(),
        }
    }

    pub fn power_url(&self) -> &str {
        &self.power_url
    }

    async fn send_start(&self) -> Result<(), WakeError> {
        let body = serde_json::json!({ "signal": "start" });

        let response = self
            .http_client
            .post(&self.power_url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let text = response.text().await.unwrap_or_default();
            return Err(WakeError::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(url = %self.power_url, "Panel accepted start signal");
        Ok(())
    }
}

impl WakeApi for PterodactylClient {
    fn start_server(&self) -> BoxFuture<'_, Result<(), WakeError>> {
        Box::pin(self.send_start())
    }
}

fn power_url(panel_url: &str, server: &str) -> String {
    format!(
        "{}/api/client/servers/{}/power",
        panel_url.trim_end_matches('/'),
        server
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_url() {
        assert_eq!(
            power_url("https://panel.example.com", "1a2b3c4d"),
            "https://panel.example.com/api/client/servers/1a2b3c4d/power"
        );
    }

    #[test]
    fn test_power_url_trailing_slash() {
        assert_eq!(
            power_url("https://panel.example.com/", "abc"),
            "https://panel.example.com/api/client/servers/abc/power"
        );
    }

    #[test]
    fn test_client_from_config() {
        let config = WakeConfig {
            url: "http://127.0.0.1:8080/".to_string(),
            api_key: "ptlc_test".to_string(),
            server: "abcd".to_string(),
            timeout_secs: 5,
        };
        let client = PterodactylClient::new(&config).unwrap();
        assert_eq!(
            client.power_url(),
            "http://127.0.0.1:8080/api/client/servers/abcd/power"
        );
    }
}
