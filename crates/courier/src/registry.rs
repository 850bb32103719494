//! # Bus registry
//!
//! [`BusRegistry`] hands out one bus per event type, created on first use
//! from a shared template (queue, configuration, exception policy). Code
//! that only knows an event type can find its bus without threading handles
//! through every constructor.
//!
//! ```
//! use std::sync::Arc;
//! use courier_core::{Bus, BusRegistry, ManualQueue};
//!
//! #[derive(Clone, PartialEq)]
//! struct Login(String);
//!
//! let queue = Arc::new(ManualQueue::new("app"));
//! let registry = BusRegistry::new(queue);
//!
//! let a = registry.bus::<Login>();
//! let b = registry.bus::<Login>();
//! assert_eq!(a.id(), b.id());
//! assert!(registry.sticky::<Login>().broadcast(Login("ann".into())).unwrap());
//! ```
//!
//! Plain and sticky buses of the same event type are separate buses.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::bus::{Bus, EventBus};
use crate::config::BusConfig;
use crate::error::ReceiverFailure;
use crate::policy::{ExceptionPolicy, ExceptionSink};
use crate::queue::TaskQueue;
use crate::sticky::StickyEventBus;

/// Lazily created buses, one per event type.
pub struct BusRegistry {
    queue: Arc<dyn TaskQueue>,
    config: BusConfig,
    policy: Option<ExceptionPolicy>,
    sink: Option<ExceptionSink>,
    /// Keyed by the bus type, so `EventBus<T>` and `StickyEventBus<T>` get
    /// separate slots.
    buses: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl BusRegistry {
    /// Creates an empty registry whose buses dispatch on `queue`.
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            queue,
            config: BusConfig::default(),
            policy: None,
            sink: None,
            buses: DashMap::new(),
        }
    }

    /// Configuration applied to every bus created from now on. Each bus is
    /// named `<config name>:<event type>`.
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Exception policy applied to every bus created from now on.
    pub fn exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Reports failures of every bus created from now on to `sink`.
    pub fn report_to(mut self, sink: impl Bus<ReceiverFailure> + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// The bus for events of type `T`, created on first call.
    pub fn bus<T: Send + 'static>(&self) -> EventBus<T> {
        self.lookup(|| self.build::<T>())
    }

    /// The sticky bus for events of type `T`, created on first call with the
    /// configured [`StickyMode`](crate::StickyMode).
    pub fn sticky<T>(&self) -> StickyEventBus<T>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        self.lookup(|| StickyEventBus::with_mode(self.build::<T>(), self.config.sticky))
    }

    /// True if a plain bus for `T` exists.
    pub fn contains<T: 'static>(&self) -> bool {
        self.buses.contains_key(&TypeId::of::<EventBus<T>>())
    }

    /// True if a sticky bus for `T` exists.
    pub fn contains_sticky<T: 'static>(&self) -> bool {
        self.buses.contains_key(&TypeId::of::<StickyEventBus<T>>())
    }

    /// Forgets the plain bus for `T` and returns it. Handles already given
    /// out keep working; the next `bus::<T>()` creates a new bus.
    pub fn remove<T: Send + 'static>(&self) -> Option<EventBus<T>> {
        let (_, slot) = self.buses.remove(&TypeId::of::<EventBus<T>>())?;
        slot.downcast_ref::<EventBus<T>>().cloned()
    }

    /// Number of buses created, plain and sticky.
    pub fn len(&self) -> usize {
        self.buses.len()
    }

    /// True if no bus has been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build<T: Send + 'static>(&self) -> EventBus<T> {
        let mut builder = EventBus::<T>::builder(Arc::clone(&self.queue)).config(BusConfig {
            name: format!("{}:{}", self.config.name, type_name::<T>()),
            ..self.config.clone()
        });
        let policy = match (&self.policy, &self.sink) {
            (Some(policy), _) => Some(policy.clone()),
            (None, Some(sink)) => Some(ExceptionPolicy::UnregisterAndReport(Arc::clone(sink))),
            (None, None) => None,
        };
        if let Some(policy) = policy {
            builder = builder.exception_policy(policy);
        }
        let bus = builder.build();
        debug!(bus = %bus.name(), bus_id = %bus.id(), "Registry created bus");
        bus
    }

    /// Returns the stored `B`, creating it with `make` if absent. The entry
    /// lock is held while `make` runs, so racing callers get the same bus.
    fn lookup<B, F>(&self, make: F) -> B
    where
        B: Clone + Send + Sync + 'static,
        F: FnOnce() -> B,
    {
        let mut entry = match self.buses.entry(TypeId::of::<B>()) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(entry) => {
                let bus = make();
                entry.insert(Box::new(bus.clone()));
                return bus;
            }
        };
        if let Some(bus) = entry.get().downcast_ref::<B>() {
            return bus.clone();
        }
        let bus = make();
        entry.insert(Box::new(bus.clone()));
        bus
    }
}

impl fmt::Debug for BusRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusRegistry")
            .field("queue", &self.queue.name())
            .field("config", &self.config)
            .field("buses", &self.buses.len())
            .finish()
    }
}
