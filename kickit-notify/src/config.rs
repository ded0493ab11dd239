//! Engine configuration loaded from environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::push::FcmConfig;
use crate::queue::WorkerPoolConfig;
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:kickit-notify.db?mode=rwc";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_FCM_CREDENTIALS_PATH: &str = "/etc/secrets/firebase.json";

/// Runtime settings for the notification engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database_url: String,
    pub log_dir: PathBuf,
    /// Bound of the push task channel.
    pub push_queue_capacity: usize,
    pub push_workers: usize,
    pub push_max_attempts: u32,
    pub push_task_timeout_secs: u64,
    /// Push delivery is disabled when unset.
    pub fcm_project_id: Option<String>,
    pub fcm_credentials_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            push_queue_capacity: 1024,
            push_workers: 4,
            push_max_attempts: 1,
            push_task_timeout_secs: 30,
            fcm_project_id: None,
            fcm_credentials_path: PathBuf::from(DEFAULT_FCM_CREDENTIALS_PATH),
        }
    }
}

impl EngineConfig {
    /// Load config from the process environment, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `DATABASE_URL`
    /// - `LOG_DIR`
    /// - `PUSH_QUEUE_CAPACITY`, `PUSH_WORKERS`, `PUSH_MAX_ATTEMPTS`, `PUSH_TASK_TIMEOUT_SECS`
    /// - `FCM_PROJECT_ID`, `FCM_CREDENTIALS_PATH`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] but reads values through `lookup`.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("PUSH_QUEUE_CAPACITY") {
            config.push_queue_capacity = parse_positive("PUSH_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = get("PUSH_WORKERS") {
            config.push_workers = parse_positive("PUSH_WORKERS", &v)?;
        }
        if let Some(v) = get("PUSH_MAX_ATTEMPTS") {
            config.push_max_attempts = parse_positive("PUSH_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("PUSH_TASK_TIMEOUT_SECS") {
            config.push_task_timeout_secs = parse_positive("PUSH_TASK_TIMEOUT_SECS", &v)?;
        }
        config.fcm_project_id = get("FCM_PROJECT_ID");
        if let Some(path) = get("FCM_CREDENTIALS_PATH") {
            config.fcm_credentials_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// FCM settings, or `None` when push delivery is not configured.
    pub fn fcm_config(&self) -> Option<FcmConfig> {
        self.fcm_project_id
            .as_deref()
            .map(|project_id| FcmConfig::new(project_id, self.fcm_credentials_path.clone()))
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_workers: self.push_workers,
            task_timeout_secs: self.push_task_timeout_secs,
            max_attempts: self.push_max_attempts,
            ..WorkerPoolConfig::default()
        }
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    match value.parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(Error::config(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}
