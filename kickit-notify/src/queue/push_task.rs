//! The `send_push_notification` task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::worker_pool::{TaskError, TaskHandler};
use super::TaskEnvelope;
use crate::notification::{SubjectRefs, UserId};
use crate::push::{DeliveryOutcome, PushDeliveryClient};

pub const PUSH_TASK_NAME: &str = "send_push_notification";

/// Payload published by the dispatcher after a record is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTask {
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub subject: SubjectRefs,
}

/// Runs [`PushTask`]s through the [`PushDeliveryClient`].
pub struct PushDeliveryTaskHandler {
    client: Arc<PushDeliveryClient>,
}

impl PushDeliveryTaskHandler {
    pub fn new(client: Arc<PushDeliveryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskHandler for PushDeliveryTaskHandler {
    fn task_name(&self) -> &'static str {
        PUSH_TASK_NAME
    }

    async fn handle(&self, envelope: &TaskEnvelope) -> Result<(), TaskError> {
        let task: PushTask = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| TaskError::Fatal(format!("invalid push task payload: {}", e)))?;

        let outcome = self
            .client
            .deliver(task.recipient, &task.title, &task.message, &task.subject)
            .await;

        match outcome {
            DeliveryOutcome::Delivered
            | DeliveryOutcome::NoDevice
            | DeliveryOutcome::NotConfigured
            | DeliveryOutcome::Unregistered => Ok(()),
            outcome if outcome.is_retryable() => Err(TaskError::Retryable(outcome.to_string())),
            outcome => Err(TaskError::Fatal(outcome.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::{DeviceRepository, SqlxDeviceRepository};
    use crate::database::{init_pool_with_size, run_migrations};
    use crate::push::{PushError, PushGateway, PushMessage};
    use serde_json::json;

    struct FailingGateway(fn() -> PushError);

    #[async_trait]
    impl PushGateway for FailingGateway {
        async fn send(&self, _token: &str, _message: &PushMessage) -> Result<(), PushError> {
            Err((self.0)())
        }
    }

    async fn handler_with(gateway: Option<Arc<dyn PushGateway>>) -> PushDeliveryTaskHandler {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let devices = Arc::new(SqlxDeviceRepository::new(pool));
        devices.register(1, "token-1").await.unwrap();
        PushDeliveryTaskHandler::new(Arc::new(PushDeliveryClient::new(devices, gateway)))
    }

    fn envelope(payload: serde_json::Value) -> TaskEnvelope {
        TaskEnvelope::new(PUSH_TASK_NAME, payload)
    }

    fn task_payload() -> serde_json::Value {
        serde_json::to_value(PushTask {
            recipient: 1,
            title: "New like".into(),
            message: "bob liked your comment.".into(),
            subject: SubjectRefs::post(1, 2).with_comment(3),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_payload_is_fatal() {
        let handler = handler_with(None).await;
        let result = handler.handle(&envelope(json!({"nope": true}))).await;
        assert!(matches!(result, Err(TaskError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_not_configured_completes() {
        let handler = handler_with(None).await;
        assert!(handler.handle(&envelope(task_payload())).await.is_ok());
    }

    #[tokio::test]
    async fn test_credential_failure_is_retryable() {
        let handler = handler_with(Some(Arc::new(FailingGateway(|| {
            PushError::Credential("expired".into())
        }))))
        .await;
        let result = handler.handle(&envelope(task_payload())).await;
        assert!(matches!(result, Err(TaskError::Retryable(_))));
    }

    #[tokio::test]
    async fn test_rejection_is_terminal() {
        let handler = handler_with(Some(Arc::new(FailingGateway(|| PushError::Rejected {
            status: 400,
            message: "bad".into(),
        }))))
        .await;
        let result = handler.handle(&envelope(task_payload())).await;
        assert!(matches!(result, Err(TaskError::Fatal(_))));
    }

    #[test]
    fn test_task_payload_round_trips_subject() {
        let task: PushTask = serde_json::from_value(task_payload()).unwrap();
        assert_eq!(task.subject.comment_id, Some(3));
        assert_eq!(task.subject.meetup_id, None);
    }
}
