//! Service container for dependency injection.
//!
//! Holds the repositories, the dispatch pipeline and the push worker pool,
//! and manages their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::Result;
use crate::config::EngineConfig;
use crate::database::repositories::{
    SqlxDeviceRepository, SqlxNotificationRepository, SqlxPreferenceRepository, SqlxUserDirectory,
};
use crate::database::{init_pool, run_migrations};
use crate::notification::{DomainEvent, HandleSummary, NotificationDispatcher, NotificationHandlers};
use crate::push::{FcmGateway, PushDeliveryClient, PushGateway};
use crate::queue::{
    ChannelTaskQueue, PushDeliveryTaskHandler, TaskHandler, TaskReceiver, TaskWorkerPool,
    WorkerPoolStats,
};

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all engine services.
pub struct ServiceContainer {
    pub pool: SqlitePool,
    pub users: Arc<SqlxUserDirectory>,
    pub preferences: Arc<SqlxPreferenceRepository>,
    pub notifications: Arc<SqlxNotificationRepository>,
    pub devices: Arc<SqlxDeviceRepository>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub handlers: Arc<NotificationHandlers>,
    pub push_client: Arc<PushDeliveryClient>,
    queue: Arc<ChannelTaskQueue>,
    task_receiver: TaskReceiver,
    worker_pool: TaskWorkerPool,
}

/// Point-in-time view of the push pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStats {
    pub push_configured: bool,
    pub push_queue_available: usize,
    pub push_workers: WorkerPoolStats,
}

impl ServiceContainer {
    /// Wire the services on top of an already migrated pool.
    ///
    /// `gateway` is `None` when push delivery is not configured; records are
    /// still written and push tasks complete as `NotConfigured`.
    pub fn new(
        pool: SqlitePool,
        config: &EngineConfig,
        gateway: Option<Arc<dyn PushGateway>>,
    ) -> Self {
        info!("Initializing service container");

        let users = Arc::new(SqlxUserDirectory::new(pool.clone()));
        let preferences = Arc::new(SqlxPreferenceRepository::new(pool.clone()));
        let notifications = Arc::new(SqlxNotificationRepository::new(pool.clone()));
        let devices = Arc::new(SqlxDeviceRepository::new(pool.clone()));

        let (queue, task_receiver) = ChannelTaskQueue::bounded(config.push_queue_capacity);
        let queue = Arc::new(queue);

        let dispatcher = Arc::new(NotificationDispatcher::new(
            preferences.clone(),
            notifications.clone(),
            queue.clone(),
        ));
        let handlers = Arc::new(NotificationHandlers::new(dispatcher.clone(), users.clone()));

        let push_client = Arc::new(PushDeliveryClient::new(devices.clone(), gateway));
        let worker_pool = TaskWorkerPool::new(config.worker_pool_config());

        info!(
            push_configured = push_client.is_configured(),
            queue_capacity = config.push_queue_capacity,
            "Service container initialized"
        );

        Self {
            pool,
            users,
            preferences,
            notifications,
            devices,
            dispatcher,
            handlers,
            push_client,
            queue,
            task_receiver,
            worker_pool,
        }
    }

    /// Open the database, apply migrations, connect the push gateway and wire
    /// everything.
    pub async fn from_config(config: &EngineConfig) -> Result<Self> {
        let pool = init_pool(&config.database_url).await?;
        run_migrations(&pool).await?;
        let gateway = connect_gateway(config).await;
        Ok(Self::new(pool, config, gateway))
    }

    /// Start consuming push tasks.
    pub fn start(&self) {
        let handlers: Vec<Arc<dyn TaskHandler>> =
            vec![Arc::new(PushDeliveryTaskHandler::new(self.push_client.clone()))];
        self.worker_pool.start(self.task_receiver.clone(), handlers);
    }

    /// Route a domain event through the notification handlers.
    pub async fn handle_event(&self, event: &DomainEvent) -> HandleSummary {
        self.handlers.handle(event).await
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            push_configured: self.push_client.is_configured(),
            push_queue_available: self.queue.available_capacity(),
            push_workers: self.worker_pool.stats(),
        }
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop accepting push tasks, run every queued one, then close the
    /// database pool. Queued pushes are only dropped if the drain outlasts
    /// `timeout`.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        info!("Shutting down services (timeout: {:?})", timeout);

        if !self.worker_pool.stop_with_timeout(timeout).await {
            warn!(
                dropped = self.worker_pool.stats().dropped,
                "Shutdown timeout reached, forcing shutdown"
            );
        }

        info!("Closing database pool...");
        self.pool.close().await;

        info!("Services shut down");
    }
}

/// Build the FCM gateway, or `None` when FCM is not configured or its
/// credentials cannot be loaded.
pub async fn connect_gateway(config: &EngineConfig) -> Option<Arc<dyn PushGateway>> {
    let Some(fcm_config) = config.fcm_config() else {
        info!("FCM_PROJECT_ID not set; push delivery disabled");
        return None;
    };

    match FcmGateway::from_service_account(fcm_config).await {
        Ok(gateway) => Some(Arc::new(gateway)),
        Err(e) => {
            warn!(error = %e, "Failed to configure FCM gateway; push delivery disabled");
            None
        }
    }
}
