//! # Receivers
//!
//! A [`Receiver`] is anything that can be called with an event of type `T`.
//! The bus owns no receiver state; callers create receivers, share them as
//! [`ReceiverRef`]s and register them on as many buses as they like.
//!
//! ## Identity
//! A receiver is identified by its allocation: two clones of the same `Arc`
//! are the same receiver, two separately allocated receivers are different
//! even if their contents are equal. Registering a clone of an already
//! registered `Arc` is a no-op.
//!
//! ## Failure
//! A receiver "raises" by returning `Err` or by panicking. Both are caught by
//! the dispatch loop and handed to the bus's exception policy; neither
//! reaches the broadcaster.

use std::fmt;
use std::sync::Arc;

use crate::bus::Bus;

/// Can be called with an event of type `T`.
///
/// Callbacks run in the task queue's execution context, never in the
/// broadcaster's. They should return quickly.
pub trait Receiver<T>: Send + Sync + 'static {
    /// Handles one event.
    ///
    /// `bus` is the outermost bus over the dispatching core: the sticky or
    /// filtered bus the receiver was registered through, if one is alive. It
    /// may be used to broadcast, or to register or unregister receivers
    /// (including this one), from inside the callback.
    fn on_event(&self, bus: &dyn Bus<T>, event: &T) -> anyhow::Result<()>;

    /// Name used in logs and failure reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to a receiver.
pub type ReceiverRef<T> = Arc<dyn Receiver<T>>;

/// Allocation identity of a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(usize);

impl ReceiverId {
    /// Identity of `receiver`.
    pub fn of<T: ?Sized>(receiver: &Arc<T>) -> Self {
        Self(Arc::as_ptr(receiver).cast::<()>() as usize)
    }
}

/// A receiver backed by a closure.
pub struct FnReceiver<F> {
    name: String,
    handler: F,
}

impl<F> FnReceiver<F> {
    /// Wraps `handler` under `name`.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> fmt::Debug for FnReceiver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReceiver").field("name", &self.name).finish()
    }
}

impl<T, F> Receiver<T> for FnReceiver<F>
where
    T: 'static,
    F: Fn(&dyn Bus<T>, &T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_event(&self, bus: &dyn Bus<T>, event: &T) -> anyhow::Result<()> {
        (self.handler)(bus, event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builds a shared receiver from a closure.
///
/// ```
/// use courier_core::{receiver_fn, ReceiverRef};
///
/// let printer: ReceiverRef<String> = receiver_fn("printer", |_bus, ev: &String| {
///     println!("{ev}");
///     Ok(())
/// });
/// assert_eq!(printer.name(), "printer");
/// ```
pub fn receiver_fn<T, F>(name: impl Into<String>, handler: F) -> ReceiverRef<T>
where
    T: 'static,
    F: Fn(&dyn Bus<T>, &T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnReceiver::new(name, handler))
}
