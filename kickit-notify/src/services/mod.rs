//! Service layer module.
//!
//! This module provides the service container that wires the repositories,
//! the notification pipeline and the push workers together.

pub mod container;

pub use container::{ServiceContainer, ServiceStats, connect_gateway};
