//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! notification data model, the `NotificationSource` collaborator trait,
//! the configuration schema and the layered error types.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Delivery Model
//! - A source emits `SourceEvent`s: concrete notifications or a resync sentinel
//! - The dispatcher turns them into `Condition`s held in per-topic, capacity-1 channels

mod config;
mod error;
mod notification;
mod source;

pub use config::*;
pub use error::*;
pub use notification::*;
pub use source::{LocalNotificationSource, NotificationSource};
