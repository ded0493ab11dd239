//! Firebase Cloud Messaging HTTP v1 gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::credentials::{AccessTokenProvider, ServiceAccountKey, ServiceAccountTokenProvider};
use super::{PushError, PushGateway, PushMessage};
use crate::utils::http_client::build_http_client;

const DEFAULT_ENDPOINT: &str = "https://fcm.googleapis.com";
const CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";
const APNS_CATEGORY: &str = "NEW_MESSAGE_CATEGORY";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Settings for [`FcmGateway`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub project_id: String,
    /// Path to the service-account JSON key.
    pub credentials_path: PathBuf,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl FcmConfig {
    pub fn new(project_id: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            credentials_path: credentials_path.into(),
            endpoint: default_endpoint(),
        }
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoint.trim_end_matches('/'),
            self.project_id
        )
    }
}

/// [`PushGateway`] speaking the FCM HTTP v1 API.
pub struct FcmGateway {
    config: FcmConfig,
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl FcmGateway {
    pub fn new(config: FcmConfig, tokens: Arc<dyn AccessTokenProvider>) -> Result<Self, PushError> {
        let client = build_http_client(HTTP_TIMEOUT)
            .map_err(|e| PushError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    /// Load the service-account key named in `config` and build a gateway
    /// that authenticates with it.
    pub async fn from_service_account(config: FcmConfig) -> Result<Self, PushError> {
        let key = ServiceAccountKey::load(&config.credentials_path).await?;
        let tokens = Arc::new(ServiceAccountTokenProvider::new(key)?);
        info!(project_id = %config.project_id, "FCM push gateway configured");
        Self::new(config, tokens)
    }
}

/// Build the `messages:send` request body.
pub fn build_message_body(device_token: &str, message: &PushMessage) -> serde_json::Value {
    let mut data = serde_json::Map::new();
    for (key, value) in &message.data {
        data.insert(key.clone(), json!(value));
    }
    data.insert("click_action".to_string(), json!(CLICK_ACTION));

    json!({
        "message": {
            "token": device_token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": data,
            "android": {
                "notification": {
                    "click_action": CLICK_ACTION,
                },
            },
            "apns": {
                "payload": {
                    "aps": {
                        "category": APNS_CATEGORY,
                    },
                },
            },
        }
    })
}

/// Map a non-success FCM response to a [`PushError`].
fn classify_failure(status: u16, body: &str) -> PushError {
    if status == 404 || body.contains("UNREGISTERED") {
        return PushError::Unregistered;
    }
    match status {
        401 | 403 => PushError::Credential(format!("gateway refused access token ({})", status)),
        429 | 500..=599 => PushError::Transport(format!("gateway unavailable ({})", status)),
        _ => PushError::Rejected {
            status,
            message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        },
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, device_token: &str, message: &PushMessage) -> Result<(), PushError> {
        let access_token = self.tokens.access_token().await?;
        let body = build_message_body(device_token, message);

        let response = self
            .client
            .post(self.config.send_url())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, "FCM message accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let error = classify_failure(status.as_u16(), &text);
        if matches!(error, PushError::Credential(_)) {
            self.tokens.invalidate();
        }
        Err(error)
    }
}
