//! Repository layer for database access.
//!
//! Every table the engine touches is reached through a trait here so the
//! dispatcher and handlers can run against fakes in tests.

pub mod device;
pub mod notification;
pub mod preference;
pub mod user;

pub use device::*;
pub use notification::*;
pub use preference::*;
pub use user::*;
