//! # Dispatcher
//!
//! Notification dispatch layer over a single `NotificationSource`.
//!
//! Responsibilities:
//! - Own the topic → condition channel map from one control loop
//! - Coalesce deliveries: a channel holds at most one pending condition
//! - Probe the source when the connection sits idle
//! - Shut down so that every channel closes before the source does
//!
//! A blocked `ConditionChannel::recv` is released only by deregistering its
//! topic or closing the dispatcher; there is no per-call timeout.

pub mod channel;
pub mod dispatcher;
pub mod error;
mod event_loop;
pub mod metrics;
mod registry;

pub use channel::{ConditionChannel, Delivery, TryRecvError, CONDITION_CAPACITY};
pub use contracts::{Condition, Notification, NotificationSource, SourceEvent, Topic};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::DispatcherError;
pub use metrics::{DispatcherMetrics, MetricsSnapshot};
pub use registry::DispatcherState;
