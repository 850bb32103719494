//! # Event filters
//!
//! [`Filtered`] decorates any [`Bus`] with an [`EventFilter`] that inspects
//! each event before it is broadcast. A filter can:
//! - accept the event (`Ok(true)`): it is broadcast as usual,
//! - discard it (`Ok(false)`): nothing is submitted, `broadcast` returns
//!   `Ok(false)`,
//! - fail fast (`Err(..)`): `broadcast` returns the error, typically
//!   [`BusError::InvalidArgument`], before any state change.
//!
//! Filters run on the broadcasting thread and may be called concurrently.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::bus::{Bus, EventBus};
use crate::error::BusError;
use crate::policy::ExceptionSink;
use crate::receiver::ReceiverRef;

/// Decides whether a bus accepts an event.
pub trait EventFilter<T>: Send + Sync + 'static {
    /// Inspects `event`.
    fn accept(&self, event: &T) -> Result<bool, BusError>;
}

impl<T, F> EventFilter<T> for F
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn accept(&self, event: &T) -> Result<bool, BusError> {
        Ok(self(event))
    }
}

/// Silently discards `None` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardNone;

impl<E: 'static> EventFilter<Option<E>> for DiscardNone {
    fn accept(&self, event: &Option<E>) -> Result<bool, BusError> {
        Ok(event.is_some())
    }
}

/// Fails fast on `None` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectNone;

impl<E: 'static> EventFilter<Option<E>> for RejectNone {
    fn accept(&self, event: &Option<E>) -> Result<bool, BusError> {
        match event {
            Some(_) => Ok(true),
            None => Err(BusError::invalid_argument("event must not be None")),
        }
    }
}

/// A bus that filters events before broadcasting them on `inner`.
///
/// Cloning is cheap and yields a handle to the same filtered bus. Receivers
/// on the wrapped core are handed this bus, so events they broadcast pass
/// the filter too.
pub struct Filtered<B, F> {
    shared: Arc<Inner<B, F>>,
}

struct Inner<B, F> {
    bus: B,
    filter: F,
}

impl<B, F> Filtered<B, F> {
    /// Wraps `inner` with `filter`.
    pub fn new<T>(inner: B, filter: F) -> Self
    where
        T: Send + 'static,
        B: Bus<T> + 'static,
        F: EventFilter<T>,
    {
        let shared = Arc::new(Inner { bus: inner, filter });
        let weak: Weak<Inner<B, F>> = Arc::downgrade(&shared);
        let outer: Weak<dyn Bus<T>> = weak;
        shared.bus.core().attach(outer);
        Self { shared }
    }

    /// The wrapped bus.
    pub fn inner(&self) -> &B {
        &self.shared.bus
    }
}

impl<B, F> Clone for Filtered<B, F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: fmt::Debug, F> fmt::Debug for Filtered<B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filtered")
            .field("inner", &self.shared.bus)
            .finish_non_exhaustive()
    }
}

impl<T, B, F> Bus<T> for Inner<B, F>
where
    T: Send + 'static,
    B: Bus<T>,
    F: EventFilter<T>,
{
    fn register(&self, receiver: ReceiverRef<T>) -> Result<bool, BusError> {
        self.bus.register(receiver)
    }

    fn unregister(&self, receiver: &ReceiverRef<T>) -> bool {
        self.bus.unregister(receiver)
    }

    fn broadcast(&self, event: T) -> Result<bool, BusError> {
        if !self.filter.accept(&event)? {
            trace!(bus = %self.bus.core().name(), "Event discarded by filter");
            return Ok(false);
        }
        self.bus.broadcast(event)
    }

    fn exception_sink(&self) -> Option<ExceptionSink> {
        self.bus.exception_sink()
    }

    fn core(&self) -> &EventBus<T> {
        self.bus.core()
    }
}

impl<T, B, F> Bus<T> for Filtered<B, F>
where
    T: Send + 'static,
    B: Bus<T>,
    F: EventFilter<T>,
{
    fn register(&self, receiver: ReceiverRef<T>) -> Result<bool, BusError> {
        self.shared.register(receiver)
    }

    fn unregister(&self, receiver: &ReceiverRef<T>) -> bool {
        self.shared.unregister(receiver)
    }

    fn broadcast(&self, event: T) -> Result<bool, BusError> {
        self.shared.broadcast(event)
    }

    fn exception_sink(&self) -> Option<ExceptionSink> {
        self.shared.exception_sink()
    }

    fn core(&self) -> &EventBus<T> {
        self.shared.core()
    }
}
