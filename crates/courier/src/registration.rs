//! # Registration helper
//!
//! [`RegistrationHelper`] lets an owner (a screen, a session, a plugin) group
//! the receivers it registers under one key and cancel them all at once.
//!
//! Registrations hold only weak references to the bus and the receiver, so
//! the helper never keeps either alive. A registration whose bus or receiver
//! has been dropped is skipped on `unregister_all` and removed by `prune`.
//! Keys are held strongly; the owner releases a key with `unregister_all`.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::bus::{Bus, WeakEventBus};
use crate::error::BusError;
use crate::receiver::{Receiver, ReceiverRef};

trait Registration: Send + Sync {
    /// Unregisters if both ends are alive. Returns whether anything was
    /// removed.
    fn unregister(&self) -> bool;

    fn is_dead(&self) -> bool;
}

struct WeakRegistration<T> {
    bus: WeakEventBus<T>,
    receiver: Weak<dyn Receiver<T>>,
}

impl<T: Send + 'static> Registration for WeakRegistration<T> {
    fn unregister(&self) -> bool {
        match (self.bus.upgrade(), self.receiver.upgrade()) {
            (Some(bus), Some(receiver)) => bus.unregister(&receiver),
            _ => false,
        }
    }

    fn is_dead(&self) -> bool {
        self.receiver.strong_count() == 0 || self.bus.upgrade().is_none()
    }
}

type Registrations = SmallVec<[Box<dyn Registration>; 4]>;

/// Groups registrations by key for bulk cancellation.
pub struct RegistrationHelper<K> {
    keys: DashMap<K, Registrations>,
}

impl<K: Eq + Hash> RegistrationHelper<K> {
    /// Creates an empty helper.
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
        }
    }

    /// Registers `receiver` on `bus` and, if it was newly added, records the
    /// registration under `key`.
    ///
    /// Sticky buses replay as usual because registration goes through `bus`.
    /// If the replay is rejected the receiver stays registered, so it is
    /// still recorded before the error is returned.
    pub fn register<T, B>(
        &self,
        key: K,
        bus: &B,
        receiver: ReceiverRef<T>,
    ) -> Result<bool, BusError>
    where
        T: Send + 'static,
        B: Bus<T> + ?Sized,
    {
        let core = bus.core();
        let registration = WeakRegistration {
            bus: core.downgrade(),
            receiver: Arc::downgrade(&receiver),
        };
        let was_registered = core.is_registered(&receiver);
        match bus.register(Arc::clone(&receiver)) {
            Ok(added) => {
                if added {
                    self.record(key, registration);
                }
                Ok(added)
            }
            Err(err) => {
                if !was_registered && core.is_registered(&receiver) {
                    self.record(key, registration);
                }
                Err(err)
            }
        }
    }

    fn record(&self, key: K, registration: impl Registration + 'static) {
        self.keys
            .entry(key)
            .or_default()
            .push(Box::new(registration));
    }

    /// Unregisters everything recorded under `key` and forgets the key.
    /// Returns how many receivers were actually removed.
    pub fn unregister_all(&self, key: &K) -> usize {
        match self.keys.remove(key) {
            Some((_, registrations)) => registrations.iter().filter(|r| r.unregister()).count(),
            None => 0,
        }
    }

    /// Drops registrations whose bus or receiver is gone, and keys left empty.
    pub fn prune(&self) {
        self.keys.retain(|_, registrations| {
            registrations.retain(|r| !r.is_dead());
            !registrations.is_empty()
        });
    }

    /// Number of registrations recorded under `key`.
    pub fn registrations(&self, key: &K) -> usize {
        self.keys.get(key).map_or(0, |r| r.len())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if no key has registrations.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<K: Eq + Hash> Default for RegistrationHelper<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> fmt::Debug for RegistrationHelper<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHelper")
            .field("keys", &self.keys.len())
            .finish()
    }
}
