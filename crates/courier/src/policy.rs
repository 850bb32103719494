//! # Exception policies
//!
//! When a receiver returns an error or panics, the dispatch loop builds a
//! [`ReceiverFailure`] and hands it to the bus's [`ExceptionPolicy`]. The
//! policy decides two things independently:
//!
//! - whether the receiver stays registered, and
//! - whether the failure is reported to an exception sink.
//!
//! | Policy                  | Unregister | Report | Remaining receivers |
//! |-------------------------|------------|--------|---------------------|
//! | `Rethrow`               | no         | no     | skipped (panics)    |
//! | `Ignore`                | no         | no     | delivered           |
//! | `Unregister`            | yes        | no     | delivered           |
//! | `Report(sink)`          | no         | yes    | delivered           |
//! | `UnregisterAndReport`   | yes        | yes    | delivered           |
//!
//! The sink is any [`Bus`] of [`ReceiverFailure`] events, so failure
//! monitoring is composed from the same primitive as everything else.
//!
//! ## Rethrow
//! `Rethrow` re-raises the failure as a panic in the task queue's execution
//! context, which abandons the rest of that broadcast. It is only sound for
//! buses with a single receiver, or when the queue is pumped by a caller that
//! wants to observe the panic (see [`ManualQueue::run_pending`]).
//!
//! On a `TokioQueue` nobody observes it: the worker catches the panic, logs
//! it and moves on to the next task. There `Rethrow` acts like `Ignore`,
//! except that the receivers after the failing one miss that broadcast.
//!
//! [`ManualQueue::run_pending`]: crate::ManualQueue::run_pending

use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::bus::{Bus, EventBus};
use crate::error::ReceiverFailure;
use crate::receiver::ReceiverRef;

/// Destination for receiver failures.
pub type ExceptionSink = Arc<dyn Bus<ReceiverFailure>>;

/// What a policy does with a failing receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    /// Remove the receiver from the bus.
    pub unregister: bool,
    /// Broadcast the failure on the exception sink.
    pub report: bool,
}

/// Failure handling for receivers. See the module docs.
#[derive(Clone, Default)]
pub enum ExceptionPolicy {
    /// Re-raise as a panic in the queue's context.
    Rethrow,
    /// Keep the receiver, drop the failure.
    Ignore,
    /// Remove the receiver, drop the failure.
    #[default]
    Unregister,
    /// Keep the receiver, report the failure.
    Report(ExceptionSink),
    /// Remove the receiver and report the failure.
    UnregisterAndReport(ExceptionSink),
}

impl ExceptionPolicy {
    /// The decision this policy makes for every failure.
    pub fn disposition(&self) -> Disposition {
        let (unregister, report) = match self {
            ExceptionPolicy::Rethrow | ExceptionPolicy::Ignore => (false, false),
            ExceptionPolicy::Unregister => (true, false),
            ExceptionPolicy::Report(_) => (false, true),
            ExceptionPolicy::UnregisterAndReport(_) => (true, true),
        };
        Disposition { unregister, report }
    }

    /// The exception sink, if this policy reports.
    pub fn sink(&self) -> Option<&ExceptionSink> {
        match self {
            ExceptionPolicy::Report(sink) | ExceptionPolicy::UnregisterAndReport(sink) => {
                Some(sink)
            }
            _ => None,
        }
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExceptionPolicy::Rethrow => "rethrow",
            ExceptionPolicy::Ignore => "ignore",
            ExceptionPolicy::Unregister => "unregister",
            ExceptionPolicy::Report(_) => "report",
            ExceptionPolicy::UnregisterAndReport(_) => "unregister_and_report",
        }
    }

    pub(crate) fn handle<T>(
        &self,
        bus: &EventBus<T>,
        receiver: &ReceiverRef<T>,
        failure: ReceiverFailure,
    ) where
        T: Send + 'static,
    {
        if let ExceptionPolicy::Rethrow = self {
            panic!("{failure}");
        }

        if self.disposition().unregister {
            bus.unregister(receiver);
        }

        if let Some(sink) = self.sink() {
            let label = failure.as_label();
            if let Err(err) = sink.broadcast(failure) {
                error!(
                    bus = %bus.name(),
                    receiver = %receiver.name(),
                    failure = label,
                    error = %err,
                    "Failed to report receiver failure"
                );
            }
        }
    }
}

impl fmt::Debug for ExceptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
