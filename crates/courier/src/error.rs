//! Error types for the event bus.
//!
//! - [`BusError`] is returned synchronously from bus operations.
//! - [`QueueRejected`] is raised by a [`TaskQueue`](crate::TaskQueue) that
//!   cannot accept more work. It is the only failure that crosses the
//!   broadcast boundary back to the caller.
//! - [`ReceiverFailure`] describes a receiver that returned an error or
//!   panicked during dispatch. It never reaches the broadcaster; it is routed
//!   through the [`ExceptionPolicy`](crate::ExceptionPolicy) and is itself an
//!   event type, so failures can be broadcast on a bus of their own.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// A task queue refused a submission (for example, it has been closed).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("task queue '{queue}' rejected the submission")]
pub struct QueueRejected {
    /// Name of the rejecting queue.
    pub queue: String,
}

impl QueueRejected {
    /// Creates a rejection for the named queue.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
        }
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        "queue_rejected"
    }
}

/// # Errors produced by bus operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The event was refused at the call boundary by a fail-fast filter.
    /// Raised before any state change.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was refused.
        reason: String,
    },

    /// The task queue refused the dispatch (or sticky replay) task.
    #[error(transparent)]
    QueueRejected(#[from] QueueRejected),
}

impl BusError {
    /// Shorthand for [`BusError::InvalidArgument`].
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        BusError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use courier_core::{BusError, QueueRejected};
    ///
    /// let err = BusError::from(QueueRejected::new("main"));
    /// assert_eq!(err.as_label(), "bus_queue_rejected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::InvalidArgument { .. } => "bus_invalid_argument",
            BusError::QueueRejected(_) => "bus_queue_rejected",
        }
    }

    /// True if the error came from the task queue rather than the caller.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BusError::QueueRejected(_))
    }
}

/// A receiver raised while handling an event.
///
/// Cheap to clone: the underlying error is shared.
#[derive(Clone)]
pub struct ReceiverFailure {
    /// Id of the bus that was dispatching.
    pub bus_id: Uuid,
    /// Name of the bus that was dispatching.
    pub bus: String,
    /// Name of the failing receiver.
    pub receiver: String,
    /// True if the receiver panicked rather than returning an error.
    pub panicked: bool,
    /// The error returned by the receiver, or the panic message.
    pub error: Arc<anyhow::Error>,
    /// When the failure was observed.
    pub at: DateTime<Utc>,
}

impl ReceiverFailure {
    pub(crate) fn new(
        bus_id: Uuid,
        bus: &str,
        receiver: &str,
        panicked: bool,
        error: anyhow::Error,
    ) -> Self {
        Self {
            bus_id,
            bus: bus.to_string(),
            receiver: receiver.to_string(),
            panicked,
            error: Arc::new(error),
            at: Utc::now(),
        }
    }

    /// Returns `"receiver_panicked"` or `"receiver_failed"`.
    pub fn as_label(&self) -> &'static str {
        if self.panicked {
            "receiver_panicked"
        } else {
            "receiver_failed"
        }
    }
}

impl fmt::Debug for ReceiverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverFailure")
            .field("bus", &self.bus)
            .field("receiver", &self.receiver)
            .field("panicked", &self.panicked)
            .field("error", &format_args!("{:#}", self.error))
            .field("at", &self.at)
            .finish()
    }
}

impl fmt::Display for ReceiverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.panicked { "panicked" } else { "failed" };
        write!(
            f,
            "receiver '{}' on bus '{}' {}: {:#}",
            self.receiver, self.bus, verb, self.error
        )
    }
}

impl std::error::Error for ReceiverFailure {}

/// Converts a panic payload into an error, keeping the message when it is a
/// string.
pub(crate) fn panic_to_error(payload: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        anyhow::anyhow!("panic: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        anyhow::anyhow!("panic: {msg}")
    } else {
        anyhow::anyhow!("panic with non-string payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(
            BusError::invalid_argument("none").as_label(),
            "bus_invalid_argument"
        );
        let rejected: BusError = QueueRejected::new("q").into();
        assert_eq!(rejected.as_label(), "bus_queue_rejected");
        assert!(rejected.is_rejection());
    }

    #[test]
    fn test_failure_display_names_receiver_and_bus() {
        let failure = ReceiverFailure::new(
            Uuid::new_v4(),
            "orders",
            "audit",
            false,
            anyhow::anyhow!("disk full"),
        );
        assert_eq!(
            failure.to_string(),
            "receiver 'audit' on bus 'orders' failed: disk full"
        );
        assert_eq!(failure.as_label(), "receiver_failed");
    }

    #[test]
    fn test_panic_payloads_keep_message() {
        let err = panic_to_error(Box::new("boom"));
        assert_eq!(err.to_string(), "panic: boom");

        let err = panic_to_error(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "panic: owned boom");

        let err = panic_to_error(Box::new(42_u8));
        assert_eq!(err.to_string(), "panic with non-string payload");
    }
}
