//! Delivery of one push notification to one user.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{DeliveryOutcome, PushError, PushGateway, PushMessage};
use crate::database::repositories::DeviceRepository;
use crate::notification::{SubjectRefs, UserId};

/// Looks up the recipient's device and hands the message to the gateway.
///
/// Never returns an error; failures are logged and reported through
/// [`DeliveryOutcome`].
pub struct PushDeliveryClient {
    devices: Arc<dyn DeviceRepository>,
    /// `None` when push credentials are not configured.
    gateway: Option<Arc<dyn PushGateway>>,
}

impl PushDeliveryClient {
    pub fn new(devices: Arc<dyn DeviceRepository>, gateway: Option<Arc<dyn PushGateway>>) -> Self {
        Self { devices, gateway }
    }

    /// A client that reports every delivery as [`DeliveryOutcome::NotConfigured`].
    pub fn disabled(devices: Arc<dyn DeviceRepository>) -> Self {
        Self::new(devices, None)
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_some()
    }

    pub async fn deliver(
        &self,
        user_id: UserId,
        title: &str,
        body: &str,
        subject: &SubjectRefs,
    ) -> DeliveryOutcome {
        let Some(gateway) = self.gateway.as_ref() else {
            debug!(user_id, "Push gateway not configured; skipping delivery");
            return DeliveryOutcome::NotConfigured;
        };

        let token = match self.devices.active_token(user_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(user_id, "No active device; skipping push");
                return DeliveryOutcome::NoDevice;
            }
            Err(e) => {
                warn!(user_id, error = %e, "Failed to look up device token");
                return DeliveryOutcome::LookupFailed;
            }
        };

        let message = PushMessage::new(title, body, subject);
        match gateway.send(&token, &message).await {
            Ok(()) => {
                debug!(user_id, "Push delivered");
                DeliveryOutcome::Delivered
            }
            Err(PushError::Unregistered) => {
                match self.devices.deactivate(&token).await {
                    Ok(_) => info!(user_id, "Deactivated unregistered device token"),
                    Err(e) => warn!(user_id, error = %e, "Failed to deactivate unregistered device token"),
                }
                DeliveryOutcome::Unregistered
            }
            Err(e @ PushError::Credential(_)) => {
                warn!(user_id, error = %e, "Push credential failure");
                DeliveryOutcome::CredentialFailed
            }
            Err(e @ PushError::Transport(_)) => {
                warn!(user_id, error = %e, "Push transport failure");
                DeliveryOutcome::TransportFailed
            }
            Err(e @ (PushError::Rejected { .. } | PushError::Configuration(_))) => {
                warn!(user_id, error = %e, "Push rejected");
                DeliveryOutcome::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::SqlxDeviceRepository;
    use crate::database::{init_pool_with_size, run_migrations};
    use async_trait::async_trait;

    struct StaticGateway {
        result: fn() -> Result<(), PushError>,
        sent: parking_lot::Mutex<Vec<(String, PushMessage)>>,
    }

    impl StaticGateway {
        fn new(result: fn() -> Result<(), PushError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                sent: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PushGateway for StaticGateway {
        async fn send(&self, device_token: &str, message: &PushMessage) -> Result<(), PushError> {
            self.sent.lock().push((device_token.to_string(), message.clone()));
            (self.result)()
        }
    }

    async fn devices() -> Arc<SqlxDeviceRepository> {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqlxDeviceRepository::new(pool))
    }

    #[tokio::test]
    async fn test_not_configured() {
        let client = PushDeliveryClient::disabled(devices().await);
        assert!(!client.is_configured());
        let outcome = client.deliver(1, "t", "b", &SubjectRefs::default()).await;
        assert_eq!(outcome, DeliveryOutcome::NotConfigured);
    }

    #[tokio::test]
    async fn test_no_device_is_not_an_error() {
        let gateway = StaticGateway::new(|| Ok(()));
        let client = PushDeliveryClient::new(devices().await, Some(gateway.clone()));
        let outcome = client.deliver(1, "t", "b", &SubjectRefs::default()).await;
        assert_eq!(outcome, DeliveryOutcome::NoDevice);
        assert!(gateway.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delivered_with_subject_data() {
        let devices = devices().await;
        devices.register(1, "token-1").await.unwrap();
        let gateway = StaticGateway::new(|| Ok(()));
        let client = PushDeliveryClient::new(devices, Some(gateway.clone()));

        let outcome = client
            .deliver(1, "New notice", "body", &SubjectRefs::meetup(9).with_notice(4))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        let sent = gateway.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "token-1");
        assert_eq!(sent[0].1.data["meetup_id"], "9");
        assert_eq!(sent[0].1.data["notice_id"], "4");
    }

    #[tokio::test]
    async fn test_unregistered_token_is_deactivated() {
        let devices = devices().await;
        devices.register(1, "stale").await.unwrap();
        let gateway = StaticGateway::new(|| Err(PushError::Unregistered));
        let client = PushDeliveryClient::new(devices.clone(), Some(gateway));

        let outcome = client.deliver(1, "t", "b", &SubjectRefs::default()).await;
        assert_eq!(outcome, DeliveryOutcome::Unregistered);
        assert_eq!(devices.active_token(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_credential_and_rejection_are_distinguished() {
        let devices = devices().await;
        devices.register(1, "token-1").await.unwrap();

        let credential = PushDeliveryClient::new(
            devices.clone(),
            Some(StaticGateway::new(|| Err(PushError::Credential("expired".into())))),
        );
        assert_eq!(
            credential.deliver(1, "t", "b", &SubjectRefs::default()).await,
            DeliveryOutcome::CredentialFailed
        );

        let rejected = PushDeliveryClient::new(
            devices.clone(),
            Some(StaticGateway::new(|| {
                Err(PushError::Rejected {
                    status: 400,
                    message: "INVALID_ARGUMENT".into(),
                })
            })),
        );
        assert_eq!(
            rejected.deliver(1, "t", "b", &SubjectRefs::default()).await,
            DeliveryOutcome::Rejected
        );

        // Rejection does not touch the registration.
        assert_eq!(devices.active_token(1).await.unwrap().as_deref(), Some("token-1"));
    }
}
