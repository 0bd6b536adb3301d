//! Real-time media provider integration
//!
//! HTTP client for the Session Credential Issuer: the external service that
//! mints short-lived join tokens for a media channel. The call core invokes
//! it exactly once per accepted call, after the transition is validated and
//! with no storage locks held, under a short timeout so a slow provider can
//! never stall a transition.

use async_trait::async_trait;
use callora_core::{
    traits::{CredentialIssuer, JoinCredential},
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// HTTP implementation of the Session Credential Issuer
pub struct HttpCredentialIssuer {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

/// Request body for a credential issue call
#[derive(Debug, Serialize)]
struct IssueRequest {
    channel_id: Uuid,
}

/// Response body from the issuer
#[derive(Debug, Deserialize)]
struct IssueResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

impl HttpCredentialIssuer {
    /// Create a new issuer client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Issuer endpoint base (e.g., "https://rtc.example.com")
    /// * `api_key` - Optional bearer token for the issuer
    /// * `timeout_ms` - Per-request timeout in milliseconds
    pub fn new(base_url: &str, api_key: Option<String>, timeout_ms: u64) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build issuer client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Full URL of the credential endpoint
    fn issue_url(&self) -> String {
        format!("{}/v1/credentials", self.base_url)
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    #[instrument(skip(self), fields(channel_id = %channel_id))]
    async fn issue(&self, channel_id: Uuid) -> AppResult<JoinCredential> {
        debug!("Requesting join credential for channel {}", channel_id);

        let mut request = self
            .http_client
            .post(self.issue_url())
            .json(&IssueRequest { channel_id });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                error!("Credential issuer timed out for channel {}", channel_id);
                AppError::BackendUnavailable("Credential issuer timed out".to_string())
            } else {
                error!("Credential issuer unreachable: {}", e);
                AppError::BackendUnavailable(format!("Credential issuer unreachable: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            error!("Credential issuer returned HTTP {}", status);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AppError::Config("Credential issuer rejected our API key".to_string())
                }
                _ => AppError::BackendUnavailable(format!(
                    "Credential issuer returned HTTP {}",
                    status
                )),
            });
        }

        let body: IssueResponse = response.json().await.map_err(|e| {
            error!("Failed to parse issuer response: {}", e);
            AppError::Serialization(format!("Invalid issuer response: {}", e))
        })?;

        debug!(
            "Issued credential for channel {} (expires {})",
            channel_id, body.expires_at
        );

        Ok(JoinCredential {
            token: body.token,
            expires_at: body.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let issuer = HttpCredentialIssuer::new("https://rtc.example.com", None, 2000);
        assert!(issuer.is_ok());
    }

    #[test]
    fn test_issue_url_strips_trailing_slash() {
        let issuer = HttpCredentialIssuer::new("https://rtc.example.com/", None, 2000).unwrap();
        assert_eq!(issuer.issue_url(), "https://rtc.example.com/v1/credentials");
    }
}
