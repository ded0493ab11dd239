//! Database models for kickit-notify.
//!
//! These models map directly to the database schema. Conversion into engine
//! types happens here and in the repositories, never further in.

pub mod device;
pub mod notification;
pub mod preference;
pub mod user;

pub use device::*;
pub use notification::*;
pub use preference::*;
pub use user::*;
