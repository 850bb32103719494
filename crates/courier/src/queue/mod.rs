//! # Task queues
//!
//! The bus never creates threads. It hands every dispatch to a
//! [`TaskQueue`], which runs it later in its own execution context.
//!
//! ## Contract
//! - Tasks submitted to one queue run in submission order and never overlap.
//!   A queue may be backed by a pool as long as this holds per queue.
//! - `submit` must not run the task inline: the sticky bus holds its lock
//!   while submitting.
//! - A queue that cannot accept work returns [`QueueRejected`]; the bus
//!   propagates it to the caller of `broadcast`/`register`.
//!
//! ## Provided queues
//! | Queue          | Execution context                                      |
//! |----------------|--------------------------------------------------------|
//! | [`ManualQueue`]| whoever calls `run_pending` (tests, UI-style pumps)    |
//! | `TokioQueue`   | one worker task on a tokio runtime (feature `tokio`)   |

mod manual;
#[cfg(feature = "tokio")]
mod tokio_queue;

pub use manual::ManualQueue;
#[cfg(feature = "tokio")]
pub use tokio_queue::TokioQueue;

use crate::error::QueueRejected;

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Serialized executor the bus schedules dispatch work onto.
pub trait TaskQueue: Send + Sync + 'static {
    /// Accepts `task` for later execution.
    fn submit(&self, task: Task) -> Result<(), QueueRejected>;

    /// Name used in logs and rejections.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
