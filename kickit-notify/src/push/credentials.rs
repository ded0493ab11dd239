//! OAuth2 access tokens for the FCM HTTP v1 API.
//!
//! A Google service account signs a short-lived RS256 JWT assertion and
//! exchanges it for an access token (JWT bearer grant). Tokens are cached
//! until shortly before they expire.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::PushError;
use crate::utils::http_client::build_http_client;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Supplies bearer tokens for the push gateway.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, PushError>;

    /// Drop any cached token, e.g. after the gateway answered 401.
    fn invalidate(&self) {}
}

/// The fields of a service-account JSON key file that are used here.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, PushError> {
        serde_json::from_str(json)
            .map_err(|e| PushError::Configuration(format!("invalid service account key: {}", e)))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PushError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            PushError::Configuration(format!(
                "failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedAccessToken {
    token: String,
    exp_unix: i64,
}

impl CachedAccessToken {
    fn is_fresh(&self, now_unix: i64) -> bool {
        self.exp_unix - TOKEN_EXPIRY_SKEW_SECS > now_unix
    }
}

/// [`AccessTokenProvider`] backed by a service-account key.
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    client: reqwest::Client,
    cache: parking_lot::Mutex<Option<CachedAccessToken>>,
}

impl std::fmt::Debug for ServiceAccountTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenProvider")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokenProvider {
    pub fn new(key: ServiceAccountKey) -> Result<Self, PushError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| PushError::Configuration(format!("invalid service account private key: {}", e)))?;
        let client = build_http_client(HTTP_TIMEOUT)
            .map_err(|e| PushError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            key,
            encoding_key,
            client,
            cache: parking_lot::Mutex::new(None),
        })
    }

    fn build_assertion(&self, now_unix: i64) -> Result<String, PushError> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: FCM_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now_unix,
            exp: now_unix + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| PushError::Credential(format!("failed to sign assertion: {}", e)))
    }

    async fn fetch_token(&self, now_unix: i64) -> Result<CachedAccessToken, PushError> {
        let assertion = self.build_assertion(now_unix)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| PushError::Credential(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Credential(format!(
                "token endpoint returned {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PushError::Credential(format!("invalid token response: {}", e)))?;

        Ok(CachedAccessToken {
            token: token.access_token,
            exp_unix: now_unix + token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
        })
    }

    #[cfg(test)]
    fn seed_cache(&self, token: &str, exp_unix: i64) {
        *self.cache.lock() = Some(CachedAccessToken {
            token: token.to_string(),
            exp_unix,
        });
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, PushError> {
        let now = Utc::now().timestamp();
        if let Some(cached) = self.cache.lock().as_ref()
            && cached.is_fresh(now)
        {
            return Ok(cached.token.clone());
        }

        debug!(client_email = %self.key.client_email, "Refreshing FCM access token");
        match self.fetch_token(now).await {
            Ok(fresh) => {
                let token = fresh.token.clone();
                *self.cache.lock() = Some(fresh);
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh FCM access token");
                Err(e)
            }
        }
    }

    fn invalidate(&self) {
        self.cache.lock().take();
    }
}
