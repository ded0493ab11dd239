//! Push delivery to mobile devices.
//!
//! [`PushDeliveryClient`] is the only entry point the rest of the crate
//! uses. It never fails: every outcome, including misconfiguration, is
//! reported as a [`DeliveryOutcome`].

pub mod client;
pub mod credentials;
pub mod fcm;

pub use client::PushDeliveryClient;
pub use credentials::{AccessTokenProvider, ServiceAccountKey, ServiceAccountTokenProvider};
pub use fcm::{FcmConfig, FcmGateway};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::notification::SubjectRefs;

/// Content of one push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// String-keyed data for client-side deep-linking.
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>, subject: &SubjectRefs) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: subject.to_push_data(),
        }
    }
}

/// Push gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The access token could not be obtained or was refused.
    #[error("credential error: {0}")]
    Credential(String),

    /// The gateway refused the message.
    #[error("rejected by gateway (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The device token is no longer valid.
    #[error("device token is unregistered")]
    Unregistered,

    /// Network failure, timeout or gateway-side 5xx/429.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// An external push service.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, device_token: &str, message: &PushMessage) -> Result<(), PushError>;
}

/// Result of one delivery attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
pub enum DeliveryOutcome {
    Delivered,
    /// The recipient has no active device token.
    NoDevice,
    /// Push credentials are not configured for this deployment.
    NotConfigured,
    CredentialFailed,
    Rejected,
    /// The token was rejected as unregistered and has been deactivated.
    Unregistered,
    TransportFailed,
    /// The device registry could not be read.
    LookupFailed,
}

impl DeliveryOutcome {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CredentialFailed | Self::TransportFailed | Self::LookupFailed
        )
    }
}
