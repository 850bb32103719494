//! Testing utilities for the Courier event bus.
//!
//! Ready-made receivers that record what they see, so tests can assert on
//! delivery without writing closures and shared vectors every time. Pair
//! them with [`ManualQueue`](courier_core::ManualQueue) to control exactly
//! when dispatch runs.
//!
//! ```
//! use std::sync::Arc;
//! use courier_core::{Bus, EventBus, ManualQueue};
//! use courier_testing::RecordingReceiver;
//!
//! let queue = Arc::new(ManualQueue::new("test"));
//! let bus = EventBus::<u32>::new(queue.clone());
//! let recorder = RecordingReceiver::new("recorder");
//!
//! bus.register(recorder.receiver()).unwrap();
//! bus.broadcast(7).unwrap();
//! assert!(recorder.events().is_empty());
//!
//! queue.run_pending();
//! assert_eq!(recorder.events(), vec![7]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use courier_core::{Bus, Receiver, ReceiverRef};
use parking_lot::Mutex;

/// Records a clone of every event it receives.
pub struct RecordingReceiver<T> {
    name: String,
    events: Mutex<Vec<T>>,
}

impl<T: Clone + Send + 'static> RecordingReceiver<T> {
    /// Creates a shared recorder.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
        })
    }

    /// This recorder as a registrable handle. All handles share identity.
    pub fn receiver(self: &Arc<Self>) -> ReceiverRef<T> {
        self.clone()
    }

    /// Events received so far, in delivery order.
    pub fn events(&self) -> Vec<T> {
        self.events.lock().clone()
    }

    /// Number of events received.
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<T: Clone + Send + 'static> Receiver<T> for RecordingReceiver<T> {
    fn on_event(&self, _bus: &dyn Bus<T>, event: &T) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// How a [`FaultyReceiver`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Return an error.
    Error,
    /// Panic.
    Panic,
}

/// Fails on every event and counts how often it was called.
pub struct FaultyReceiver {
    name: String,
    fault: Fault,
    calls: AtomicUsize,
}

impl FaultyReceiver {
    /// A receiver that returns an error.
    pub fn failing(name: impl Into<String>) -> Arc<Self> {
        Self::with_fault(name, Fault::Error)
    }

    /// A receiver that panics.
    pub fn panicking(name: impl Into<String>) -> Arc<Self> {
        Self::with_fault(name, Fault::Panic)
    }

    fn with_fault(name: impl Into<String>, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            fault,
            calls: AtomicUsize::new(0),
        })
    }

    /// This receiver as a registrable handle for events of type `T`.
    pub fn receiver<T: 'static>(self: &Arc<Self>) -> ReceiverRef<T> {
        self.clone()
    }

    /// How many times it was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: 'static> Receiver<T> for FaultyReceiver {
    fn on_event(&self, _bus: &dyn Bus<T>, _event: &T) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fault {
            Fault::Error => anyhow::bail!("{} failed on call {call}", self.name),
            Fault::Panic => panic!("{} panicked on call {call}", self.name),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Unregisters a target receiver from the dispatching bus, then records the
/// event.
pub struct UnregisteringReceiver<T> {
    name: String,
    target: Mutex<Option<ReceiverRef<T>>>,
    events: Mutex<Vec<T>>,
}

impl<T: Clone + Send + 'static> UnregisteringReceiver<T> {
    /// Unregisters `target` on the first event.
    pub fn new(name: impl Into<String>, target: ReceiverRef<T>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target: Mutex::new(Some(target)),
            events: Mutex::new(Vec::new()),
        })
    }

    /// A receiver that unregisters itself on its first event.
    pub fn one_shot(name: impl Into<String>) -> Arc<Self> {
        let this = Arc::new(Self {
            name: name.into(),
            target: Mutex::new(None),
            events: Mutex::new(Vec::new()),
        });
        this.target_self();
        this
    }

    /// Makes this receiver its own target.
    pub fn target_self(self: &Arc<Self>) {
        // The self-reference is dropped when the target is taken.
        *self.target.lock() = Some(self.receiver());
    }

    /// This receiver as a registrable handle.
    pub fn receiver(self: &Arc<Self>) -> ReceiverRef<T> {
        self.clone()
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<T> {
        self.events.lock().clone()
    }
}

impl<T: Clone + Send + 'static> Receiver<T> for UnregisteringReceiver<T> {
    fn on_event(&self, bus: &dyn Bus<T>, event: &T) -> anyhow::Result<()> {
        let target = self.target.lock().take();
        if let Some(target) = target {
            bus.unregister(&target);
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
