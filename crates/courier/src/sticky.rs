//! # Sticky event bus
//!
//! [`StickyEventBus`] retains the last broadcast event and replays it to
//! every receiver that registers afterwards.
//!
//! ## States
//! ```text
//!                 broadcast(e)                    broadcast(e')
//!  NoStickyEvent ─────────────► HasSticky(e) ───────────────► HasSticky(e')
//!        ▲                           │
//!        └────── clear_sticky() ─────┘
//! ```
//!
//! ## Rules
//! - The sticky value is visible synchronously: `sticky()` returns the new
//!   event as soon as `broadcast` returns, before any receiver runs.
//! - One lock orders broadcast against registration. A receiver registering
//!   concurrently with a broadcast either gets that broadcast through the
//!   normal dispatch, or gets it through replay; never both, never the stale
//!   value.
//! - Replay goes through the task queue and re-checks membership, so a
//!   receiver unregistered before its replay runs receives nothing.
//! - Clearing never broadcasts; it only affects later registrations.
//! - If the queue rejects a broadcast, the sticky value is left unchanged.
//!
//! ## Repeats
//! [`StickyMode::Always`] re-broadcasts every event. [`StickyMode::SkipRepeats`]
//! discards a broadcast equal to the current sticky value and reports it as
//! not accepted.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bus::{Bus, EventBus};
use crate::error::BusError;
use crate::policy::ExceptionSink;
use crate::receiver::ReceiverRef;

/// How a sticky bus treats a broadcast equal to the current sticky value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyMode {
    /// Always re-broadcast.
    #[default]
    Always,
    /// Discard events equal to the current sticky value.
    SkipRepeats,
}

/// An [`EventBus`] that replays the last event to late registrants.
///
/// Cloning is cheap and yields a handle to the same sticky bus. Receivers on
/// the wrapped core are handed this bus, so broadcasts made from a callback
/// update the sticky value.
pub struct StickyEventBus<T> {
    state: Arc<State<T>>,
}

struct State<T> {
    bus: EventBus<T>,
    sticky: Mutex<Option<T>>,
    same: Option<fn(&T, &T) -> bool>,
}

impl<T> Clone for StickyEventBus<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: 'static> fmt::Debug for StickyEventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StickyEventBus")
            .field("bus", &self.state.bus)
            .field("has_sticky", &self.has_sticky())
            .field("mode", &self.mode())
            .finish()
    }
}

impl<T: Clone + Send + 'static> StickyEventBus<T> {
    /// Wraps `bus`, always re-broadcasting.
    pub fn new(bus: EventBus<T>) -> Self {
        Self::attach(bus, None)
    }

    /// Wraps `bus` with the given repeat handling.
    pub fn with_mode(bus: EventBus<T>, mode: StickyMode) -> Self
    where
        T: PartialEq,
    {
        let same = match mode {
            StickyMode::Always => None,
            StickyMode::SkipRepeats => Some(<T as PartialEq>::eq as fn(&T, &T) -> bool),
        };
        Self::attach(bus, same)
    }

    fn attach(bus: EventBus<T>, same: Option<fn(&T, &T) -> bool>) -> Self {
        let state = Arc::new(State {
            bus,
            sticky: Mutex::new(None),
            same,
        });
        let weak: Weak<State<T>> = Arc::downgrade(&state);
        let outer: Weak<dyn Bus<T>> = weak;
        state.bus.attach(outer);
        Self { state }
    }
}

impl<T> StickyEventBus<T> {
    /// The repeat handling in effect.
    pub fn mode(&self) -> StickyMode {
        if self.state.same.is_some() {
            StickyMode::SkipRepeats
        } else {
            StickyMode::Always
        }
    }

    /// True if an event is retained.
    pub fn has_sticky(&self) -> bool {
        self.state.sticky.lock().is_some()
    }

    /// Drops the retained event and returns it.
    pub fn clear_sticky(&self) -> Option<T> {
        self.state.sticky.lock().take()
    }
}

impl<T: Clone> StickyEventBus<T> {
    /// The retained event, if any.
    pub fn sticky(&self) -> Option<T> {
        self.state.sticky.lock().clone()
    }
}

impl<T: Clone + Send + 'static> Bus<T> for State<T> {
    fn register(&self, receiver: ReceiverRef<T>) -> Result<bool, BusError> {
        let sticky = self.sticky.lock();
        let added = self.bus.register(Arc::clone(&receiver))?;
        if added {
            if let Some(event) = sticky.as_ref() {
                trace!(
                    bus = %self.bus.name(),
                    receiver = %receiver.name(),
                    "Replaying sticky event"
                );
                self.bus.deliver_one(receiver, event.clone())?;
            }
        }
        Ok(added)
    }

    fn unregister(&self, receiver: &ReceiverRef<T>) -> bool {
        self.bus.unregister(receiver)
    }

    fn broadcast(&self, event: T) -> Result<bool, BusError> {
        let mut sticky = self.sticky.lock();
        if let (Some(same), Some(current)) = (self.same, sticky.as_ref()) {
            if same(current, &event) {
                trace!(bus = %self.bus.name(), "Skipping repeat of sticky event");
                return Ok(false);
            }
        }
        self.bus.broadcast(event.clone())?;
        *sticky = Some(event);
        Ok(true)
    }

    fn exception_sink(&self) -> Option<ExceptionSink> {
        self.bus.exception_sink()
    }

    fn core(&self) -> &EventBus<T> {
        &self.bus
    }
}

impl<T: Clone + Send + 'static> Bus<T> for StickyEventBus<T> {
    fn register(&self, receiver: ReceiverRef<T>) -> Result<bool, BusError> {
        self.state.register(receiver)
    }

    fn unregister(&self, receiver: &ReceiverRef<T>) -> bool {
        self.state.unregister(receiver)
    }

    fn broadcast(&self, event: T) -> Result<bool, BusError> {
        self.state.broadcast(event)
    }

    fn exception_sink(&self) -> Option<ExceptionSink> {
        self.state.exception_sink()
    }

    fn core(&self) -> &EventBus<T> {
        &self.state.bus
    }
}
