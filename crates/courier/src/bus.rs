//! # Event bus
//!
//! [`EventBus`] owns the receiver set of one event type and turns every
//! broadcast into exactly one task on its [`TaskQueue`].
//!
//! ## Architecture
//! ```text
//!  register / unregister                 broadcast(ev)
//!        │                                    │
//!        ▼                                    ▼ load()  (O(1) snapshot)
//!  CopyOnWrite<ReceiverSet> ◄───────── snapshot ─┐
//!   (strategy builds a new set,                  │ submit one task
//!    pointer swap publishes it)                  ▼
//!                                          TaskQueue (serialized)
//!                                                │
//!                              for r in snapshot │
//!                                                ▼
//!                              still registered? ── no ──► skip
//!                                                │ yes
//!                                                ▼
//!                                   r.on_event(outermost, &ev)
//!                                                │ Err / panic
//!                                                ▼
//!                                         ExceptionPolicy
//! ```
//!
//! ## Rules
//! - **Snapshot at call time**: a broadcast delivers only to receivers
//!   registered when `broadcast` was called, even if its task runs later.
//! - **Re-check before every call**: a receiver unregistered after the
//!   snapshot but before its turn is skipped, including when another
//!   receiver of the same broadcast unregistered it.
//! - **Failure isolation**: a failing receiver never stops delivery to the
//!   rest of the snapshot (except under [`ExceptionPolicy::Rethrow`]).
//! - **Non-blocking**: `register`, `unregister` and `broadcast` never wait on
//!   receivers; they swap a pointer or submit a task.
//! - **Dispatch order** is defined by the [`ReceiverSetStrategy`]; the
//!   default is registration order.
//!
//! ## Decorators
//! [`StickyEventBus`] and [`Filtered`](crate::Filtered) attach themselves to
//! the core they wrap. Receivers are handed the most recently attached
//! decorator that is still alive, so a broadcast or registration made from a
//! callback goes through the sticky update, the replay and the filter. A
//! core with no live decorator hands out itself.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::BusConfig;
use crate::cow::CopyOnWrite;
use crate::error::{panic_to_error, BusError, QueueRejected, ReceiverFailure};
use crate::policy::{ExceptionPolicy, ExceptionSink};
use crate::queue::TaskQueue;
use crate::receiver::ReceiverRef;
use crate::sticky::StickyEventBus;
use crate::strategy::{ReceiverSet, ReceiverSetStrategy};

/// Operations shared by every bus flavour (plain, sticky, filtered).
///
/// Object safe, so buses can be stored as `Arc<dyn Bus<T>>`; that is how an
/// [`ExceptionSink`] is held.
pub trait Bus<T>: Send + Sync {
    /// Registers `receiver`.
    ///
    /// Returns `Ok(false)` without side effects if it is already registered.
    fn register(&self, receiver: ReceiverRef<T>) -> Result<bool, BusError>;

    /// Unregisters `receiver`. Returns `false` if it was not registered.
    ///
    /// Once this returns, no further callback reaches the receiver, including
    /// from broadcasts already in flight.
    fn unregister(&self, receiver: &ReceiverRef<T>) -> bool;

    /// Schedules delivery of `event` to the currently registered receivers.
    ///
    /// Returns `Ok(false)` if the event was discarded (by a filter or by
    /// sticky deduplication) and `Ok(true)` otherwise.
    fn broadcast(&self, event: T) -> Result<bool, BusError>;

    /// Where receiver failures are reported, if anywhere.
    fn exception_sink(&self) -> Option<ExceptionSink>;

    /// The underlying plain bus.
    fn core(&self) -> &EventBus<T>;
}

struct Shared<T> {
    id: Uuid,
    name: String,
    receivers: CopyOnWrite<ReceiverSet<T>>,
    strategy: Arc<dyn ReceiverSetStrategy<T>>,
    policy: ExceptionPolicy,
    queue: Arc<dyn TaskQueue>,
    outer: RwLock<Option<Weak<dyn Bus<T>>>>,
}

/// Typed publish/subscribe bus with asynchronous, serialized dispatch.
///
/// Cloning is cheap and yields a handle to the same bus.
pub struct EventBus<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: 'static> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("receivers", &self.shared.receivers.load())
            .field("strategy", &self.shared.strategy.name())
            .field("policy", &self.shared.policy)
            .field("queue", &self.shared.queue.name())
            .finish()
    }
}

impl<T: Send + 'static> EventBus<T> {
    /// Creates a bus with the default configuration: registration-order
    /// dispatch and the [`ExceptionPolicy::Unregister`] policy.
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self::builder(queue).build()
    }

    /// Starts building a bus that dispatches on `queue`.
    pub fn builder(queue: Arc<dyn TaskQueue>) -> EventBusBuilder<T> {
        EventBusBuilder::new(queue)
    }

    /// Unique id of this bus.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Name used in logs and failure reports.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The current receiver snapshot.
    pub fn receivers(&self) -> Arc<ReceiverSet<T>> {
        self.shared.receivers.load()
    }

    /// True if `receiver` is currently registered.
    pub fn is_registered(&self, receiver: &ReceiverRef<T>) -> bool {
        self.shared.receivers.load().contains(receiver)
    }

    /// Number of registered receivers.
    pub fn len(&self) -> usize {
        self.shared.receivers.load().len()
    }

    /// True if no receivers are registered.
    pub fn is_empty(&self) -> bool {
        self.shared.receivers.load().is_empty()
    }

    /// The exception policy this bus was built with.
    pub fn exception_policy(&self) -> &ExceptionPolicy {
        &self.shared.policy
    }

    /// Non-owning handle to this bus.
    pub fn downgrade(&self) -> WeakEventBus<T> {
        WeakEventBus {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// The bus receivers are handed: the live decorator attached last, or
    /// this bus if there is none.
    pub fn outermost(&self) -> Arc<dyn Bus<T>> {
        match self.outer() {
            Some(outer) => outer,
            None => Arc::new(self.clone()),
        }
    }

    /// Makes `outer` the bus handed to receivers. Replaces any earlier
    /// decorator.
    pub(crate) fn attach(&self, outer: Weak<dyn Bus<T>>) {
        *self.shared.outer.write() = Some(outer);
        debug!(bus = %self.shared.name, "Decorator attached");
    }

    fn outer(&self) -> Option<Arc<dyn Bus<T>>> {
        self.shared.outer.read().as_ref().and_then(Weak::upgrade)
    }

    /// Submits a task delivering `event` to `receiver` alone, subject to the
    /// same membership re-check as a broadcast.
    pub(crate) fn deliver_one(
        &self,
        receiver: ReceiverRef<T>,
        event: T,
    ) -> Result<(), QueueRejected> {
        let bus = self.clone();
        self.shared.queue.submit(Box::new(move || {
            let outer = bus.outer();
            let handle: &dyn Bus<T> = match &outer {
                Some(outer) => outer.as_ref(),
                None => &bus,
            };
            bus.dispatch(handle, &receiver, &event)
        }))
    }

    fn deliver(&self, snapshot: &ReceiverSet<T>, event: &T) {
        // Resolved once so every receiver of a broadcast sees the same bus.
        let outer = self.outer();
        let handle: &dyn Bus<T> = match &outer {
            Some(outer) => outer.as_ref(),
            None => self,
        };
        for receiver in snapshot.iter() {
            self.dispatch(handle, receiver, event);
        }
    }

    fn dispatch(&self, handle: &dyn Bus<T>, receiver: &ReceiverRef<T>, event: &T) {
        if !self.is_registered(receiver) {
            trace!(
                bus = %self.shared.name,
                receiver = %receiver.name(),
                "Skipping receiver unregistered since broadcast"
            );
            return;
        }

        let failure = match catch_unwind(AssertUnwindSafe(|| receiver.on_event(handle, event))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => self.failure(receiver, false, err),
            Err(payload) => self.failure(receiver, true, panic_to_error(payload)),
        };

        warn!(
            bus = %self.shared.name,
            receiver = %receiver.name(),
            failure = failure.as_label(),
            policy = self.shared.policy.as_label(),
            error = %failure.error,
            "Receiver failed"
        );
        self.shared.policy.handle(self, receiver, failure);
    }

    fn failure(
        &self,
        receiver: &ReceiverRef<T>,
        panicked: bool,
        err: anyhow::Error,
    ) -> ReceiverFailure {
        ReceiverFailure::new(
            self.shared.id,
            &self.shared.name,
            receiver.name(),
            panicked,
            err,
        )
    }
}

impl<T: Send + 'static> Bus<T> for EventBus<T> {
    fn register(&self, receiver: ReceiverRef<T>) -> Result<bool, BusError> {
        let strategy = &self.shared.strategy;
        let added = self.shared.receivers.update(|current| {
            if current.contains(&receiver) {
                None
            } else {
                Some(strategy.with_added(current, Arc::clone(&receiver)))
            }
        });

        if added {
            debug!(
                bus = %self.shared.name,
                receiver = %receiver.name(),
                "Receiver registered"
            );
        }
        Ok(added)
    }

    fn unregister(&self, receiver: &ReceiverRef<T>) -> bool {
        let strategy = &self.shared.strategy;
        let removed = self.shared.receivers.update(|current| {
            current
                .contains(receiver)
                .then(|| strategy.with_removed(current, receiver))
        });

        if removed {
            debug!(
                bus = %self.shared.name,
                receiver = %receiver.name(),
                "Receiver unregistered"
            );
        }
        removed
    }

    fn broadcast(&self, event: T) -> Result<bool, BusError> {
        let snapshot = self.shared.receivers.load();
        if snapshot.is_empty() {
            trace!(bus = %self.shared.name, "No receivers for event");
            return Ok(true);
        }

        trace!(
            bus = %self.shared.name,
            receiver_count = snapshot.len(),
            "Broadcasting event"
        );
        let bus = self.clone();
        self.shared
            .queue
            .submit(Box::new(move || bus.deliver(&snapshot, &event)))?;
        Ok(true)
    }

    fn exception_sink(&self) -> Option<ExceptionSink> {
        self.shared.policy.sink().cloned()
    }

    fn core(&self) -> &EventBus<T> {
        self
    }
}

/// Non-owning handle to an [`EventBus`].
pub struct WeakEventBus<T> {
    shared: Weak<Shared<T>>,
}

impl<T> WeakEventBus<T> {
    /// The bus, if it is still alive.
    pub fn upgrade(&self) -> Option<EventBus<T>> {
        self.shared.upgrade().map(|shared| EventBus { shared })
    }
}

impl<T> Clone for WeakEventBus<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for WeakEventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEventBus")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

/// Builder for [`EventBus`] and [`StickyEventBus`].
///
/// ```
/// use std::sync::Arc;
/// use courier_core::{EventBus, ManualQueue, ReceiverFailure, TotalOrder};
///
/// let queue = Arc::new(ManualQueue::new("ui"));
/// let failures = EventBus::<ReceiverFailure>::new(queue.clone());
/// let bus = EventBus::<String>::builder(queue)
///     .name("status")
///     .strategy(TotalOrder::by_name())
///     .report_to(failures)
///     .build();
///
/// assert_eq!(bus.name(), "status");
/// assert_eq!(bus.exception_policy().as_label(), "unregister_and_report");
/// ```
pub struct EventBusBuilder<T> {
    queue: Arc<dyn TaskQueue>,
    config: BusConfig,
    strategy: Option<Arc<dyn ReceiverSetStrategy<T>>>,
    policy: Option<ExceptionPolicy>,
    sink: Option<ExceptionSink>,
}

impl<T: Send + 'static> EventBusBuilder<T> {
    fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            queue,
            config: BusConfig::default(),
            strategy: None,
            policy: None,
            sink: None,
        }
    }

    /// Applies a configuration (name, built-in ordering, sticky mode).
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the name used in logs and failure reports.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Uses `strategy` instead of the configured built-in ordering.
    pub fn strategy(mut self, strategy: impl ReceiverSetStrategy<T>) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Sets the exception policy explicitly.
    pub fn exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Reports failures to `sink`. Unless a policy is set explicitly, the bus
    /// uses [`ExceptionPolicy::UnregisterAndReport`].
    pub fn report_to(mut self, sink: impl Bus<ReceiverFailure> + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Builds the bus.
    pub fn build(self) -> EventBus<T> {
        let policy = match (self.policy, self.sink) {
            (Some(policy), _) => policy,
            (None, Some(sink)) => ExceptionPolicy::UnregisterAndReport(sink),
            (None, None) => ExceptionPolicy::default(),
        };
        let strategy = self
            .strategy
            .unwrap_or_else(|| self.config.order.strategy());

        let shared = Shared {
            id: Uuid::new_v4(),
            name: self.config.name,
            receivers: CopyOnWrite::new(ReceiverSet::empty()),
            strategy,
            policy,
            queue: self.queue,
            outer: RwLock::new(None),
        };
        debug!(
            bus = %shared.name,
            bus_id = %shared.id,
            strategy = shared.strategy.name(),
            policy = shared.policy.as_label(),
            queue = %shared.queue.name(),
            "Event bus created"
        );
        EventBus {
            shared: Arc::new(shared),
        }
    }

    /// Builds a sticky bus using the configured [`StickyMode`].
    ///
    /// [`StickyMode`]: crate::StickyMode
    pub fn build_sticky(self) -> StickyEventBus<T>
    where
        T: Clone + PartialEq,
    {
        let mode = self.config.sticky;
        StickyEventBus::with_mode(self.build(), mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ManualQueue;
    use crate::receiver::receiver_fn;
    use crate::strategy::TotalOrder;
    use parking_lot::Mutex;

    fn setup() -> (Arc<ManualQueue>, EventBus<String>) {
        let queue = Arc::new(ManualQueue::new("test"));
        let bus = EventBus::new(queue.clone());
        (queue, bus)
    }

    fn recorder(name: &str, log: &Arc<Mutex<Vec<String>>>) -> ReceiverRef<String> {
        let log = Arc::clone(log);
        let tag = name.to_string();
        receiver_fn(name, move |_, ev: &String| {
            log.lock().push(format!("{tag}:{ev}"));
            Ok(())
        })
    }

    #[test]
    fn test_register_is_idempotent() {
        let (_queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let r = recorder("r", &log);

        assert!(bus.register(r.clone()).unwrap());
        assert!(!bus.register(r.clone()).unwrap());
        assert_eq!(bus.len(), 1);

        assert!(bus.unregister(&r));
        assert!(!bus.unregister(&r));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_broadcast_is_asynchronous() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register(recorder("r", &log)).unwrap();

        assert!(bus.broadcast("x".into()).unwrap());
        assert!(log.lock().is_empty());
        assert_eq!(queue.len(), 1);

        queue.run_pending();
        assert_eq!(*log.lock(), ["r:x"]);
    }

    #[test]
    fn test_empty_bus_submits_nothing() {
        let (queue, bus) = setup();
        assert!(bus.broadcast("x".into()).unwrap());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_one_task_per_broadcast() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register(recorder("a", &log)).unwrap();
        bus.register(recorder("b", &log)).unwrap();

        bus.broadcast("x".into()).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_insertion_order_is_default() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["c", "a", "b"] {
            bus.register(recorder(name, &log)).unwrap();
        }

        bus.broadcast("x".into()).unwrap();
        queue.run_pending();
        assert_eq!(*log.lock(), ["c:x", "a:x", "b:x"]);
    }

    #[test]
    fn test_total_order_strategy() {
        let queue = Arc::new(ManualQueue::new("test"));
        let bus = EventBus::<String>::builder(queue.clone())
            .strategy(TotalOrder::by_name())
            .build();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["c", "a", "b"] {
            bus.register(recorder(name, &log)).unwrap();
        }

        bus.broadcast("x".into()).unwrap();
        queue.run_pending();
        assert_eq!(*log.lock(), ["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn test_snapshot_excludes_later_registrations() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register(recorder("early", &log)).unwrap();

        bus.broadcast("x".into()).unwrap();
        bus.register(recorder("late", &log)).unwrap();
        queue.run_pending();

        assert_eq!(*log.lock(), ["early:x"]);
    }

    #[test]
    fn test_unregister_suppresses_in_flight_delivery() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let r = recorder("r", &log);
        bus.register(r.clone()).unwrap();

        bus.broadcast("x".into()).unwrap();
        bus.unregister(&r);
        queue.run_pending();

        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_receiver_unregistering_a_later_receiver() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim = recorder("victim", &log);

        let target = victim.clone();
        let first: ReceiverRef<String> = receiver_fn("first", move |bus, _ev: &String| {
            bus.unregister(&target);
            Ok(())
        });

        bus.register(first).unwrap();
        bus.register(victim.clone()).unwrap();

        bus.broadcast("x".into()).unwrap();
        queue.run_pending();

        assert!(log.lock().is_empty());
        assert!(!bus.is_registered(&victim));
    }

    #[test]
    fn test_failing_receiver_is_unregistered_by_default() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let bad: ReceiverRef<String> = receiver_fn("bad", |_, _| anyhow::bail!("nope"));
        bus.register(bad.clone()).unwrap();
        bus.register(recorder("good", &log)).unwrap();

        bus.broadcast("x".into()).unwrap();
        queue.run_pending();

        assert!(!bus.is_registered(&bad));
        assert_eq!(*log.lock(), ["good:x"]);
    }

    #[test]
    fn test_panicking_receiver_is_isolated() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let bad: ReceiverRef<String> = receiver_fn("bad", |_, _| panic!("kaboom"));
        bus.register(bad.clone()).unwrap();
        bus.register(recorder("good", &log)).unwrap();

        bus.broadcast("x".into()).unwrap();
        queue.run_pending();

        assert!(!bus.is_registered(&bad));
        assert_eq!(*log.lock(), ["good:x"]);
    }

    #[test]
    fn test_rejected_submission_propagates() {
        let (queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register(recorder("r", &log)).unwrap();
        queue.close();

        let err = bus.broadcast("x".into()).unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_weak_handle_follows_bus_lifetime() {
        let (_queue, bus) = setup();
        let weak = bus.downgrade();
        assert!(weak.upgrade().is_some());

        drop(bus);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_builder_defaults() {
        let (_queue, bus) = setup();
        assert_eq!(bus.name(), "bus");
        assert_eq!(bus.exception_policy().as_label(), "unregister");
        assert!(bus.exception_sink().is_none());
        assert_eq!(bus.receivers().len(), 0);
    }

    #[test]
    fn test_debug_shows_name_and_strategy() {
        let (_queue, bus) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register(recorder("r", &log)).unwrap();

        let debug = format!("{bus:?}");
        assert!(debug.contains("\"bus\""), "{debug}");
        assert!(debug.contains("insertion"), "{debug}");
        assert!(debug.contains("\"r\""), "{debug}");
    }

    // =========================================================================
    // Outermost bus
    // =========================================================================

    #[test]
    fn test_plain_bus_hands_out_itself() {
        let (queue, bus) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ids = Arc::clone(&seen);
        bus.register(receiver_fn("r", move |b, _: &String| {
            ids.lock().push(b.core().id());
            Ok(())
        }))
        .unwrap();

        bus.broadcast("x".into()).unwrap();
        queue.run_pending();
        assert_eq!(*seen.lock(), [bus.id()]);
        assert_eq!(bus.outermost().core().id(), bus.id());
    }

    #[test]
    fn test_outermost_falls_back_when_decorator_dropped() {
        let (queue, bus) = setup();
        let sticky = StickyEventBus::new(bus.clone());
        sticky.broadcast("kept".into()).unwrap();

        // The decorator is handed out while alive.
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);
        let r: ReceiverRef<String> = receiver_fn("r", move |_, ev: &String| {
            log.lock().push(ev.clone());
            Ok(())
        });
        let outer = bus.outermost();
        outer.register(r.clone()).unwrap();
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*events.lock(), ["kept"]);

        drop(outer);
        drop(sticky);
        bus.unregister(&r);
        // Plain registration again: no replay without the sticky decorator.
        bus.outermost().register(r).unwrap();
        assert!(queue.is_empty());
    }
}
