//! kickit-notify library crate.
//!
//! Notification dispatch and deduplication for the kickit social backend.
//! Board and meetup services raise [`notification::DomainEvent`]s; the engine
//! resolves recipients, applies preference and dedup rules, stores in-app
//! notifications and hands push delivery to a background worker pool.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;
pub mod push;
pub mod queue;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
