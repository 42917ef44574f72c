//! Redis Streams work queue.
//!
//! This crate provides:
//! - At-least-once WorkItem delivery via consumer groups
//! - Visibility timeout enforcement through pending-claim
//! - Receive-count tracking and dead-letter redrive

pub mod error;
pub mod queue;
pub mod work_item;

pub use error::{QueueError, QueueResult};
pub use queue::{QueueConfig, WorkQueue};
pub use work_item::WorkItem;
