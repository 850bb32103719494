//! # Courier
//!
//! A typed, in-process publish/subscribe bus with asynchronous, serialized
//! dispatch.
//!
//! ## Core Concepts
//!
//! - [`EventBus<T>`] = one event type, one receiver set, one task queue
//! - [`Receiver<T>`] = anything callable with `&T`
//! - [`TaskQueue`] = the serialized executor dispatch runs on
//! - [`BusRegistry`] = one lazily created bus per event type
//!
//! The key principle: **broadcast never runs a receiver**. It snapshots the
//! receiver set and submits one task; the queue runs receivers later.
//!
//! ## Architecture
//!
//! ```text
//! Producer
//!     │
//!     ▼ broadcast(ev)
//! Filtered ── discard / fail fast
//!     │
//!     ▼
//! StickyEventBus ── retain ev, replay on register
//!     │
//!     ▼
//! EventBus ── snapshot CopyOnWrite<ReceiverSet>
//!     │
//!     ▼ submit(task)
//! TaskQueue (ManualQueue | TokioQueue)
//!     │
//!     ├─► receiver A.on_event() ─► Ok
//!     │
//!     ├─► receiver B.on_event() ─► Err / panic ──► ExceptionPolicy
//!     │                                               │
//!     └─► receiver C.on_event() ─► Ok                 ▼ report
//!                                           EventBus<ReceiverFailure>
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Snapshot delivery** - A broadcast reaches only receivers registered
//!    when it was called
//! 2. **No delivery after unregister** - Unregistering suppresses pending
//!    deliveries, even from inside another receiver's callback
//! 3. **Serialized callbacks** - Callbacks of one bus never overlap
//! 4. **Failure isolation** - A failing receiver never reaches the producer
//!    and never starves its siblings
//! 5. **Sticky consistency** - A late registrant gets the latest event exactly
//!    once
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use courier_core::{receiver_fn, Bus, EventBus, ManualQueue, ReceiverFailure};
//!
//! let queue = Arc::new(ManualQueue::new("main"));
//!
//! // Failures are events too.
//! let failures = EventBus::<ReceiverFailure>::new(queue.clone());
//! failures
//!     .register(receiver_fn("log", |_, f: &ReceiverFailure| {
//!         eprintln!("{f}");
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let bus = EventBus::<String>::builder(queue.clone())
//!     .name("greetings")
//!     .report_to(failures)
//!     .build();
//!
//! bus.register(receiver_fn("printer", |_, ev: &String| {
//!     println!("{ev}");
//!     Ok(())
//! }))
//! .unwrap();
//!
//! bus.broadcast("hello".to_string()).unwrap();
//! assert_eq!(queue.run_pending(), 1);
//! ```
//!
//! ## What This Is Not
//!
//! Courier is **not**:
//! - A message broker (nothing leaves the process)
//! - A durable log (no persistence, no replay beyond the sticky event)
//! - A stream library (no debounce, throttle or backpressure)

mod bus;
mod config;
mod cow;
mod error;
mod filter;
mod policy;
mod queue;
mod receiver;
mod registration;
mod registry;
mod sticky;
mod strategy;


// Re-export bus types
pub use bus::{Bus, EventBus, EventBusBuilder, WeakEventBus};

// Re-export configuration
pub use config::BusConfig;

// Re-export concurrency primitive
pub use cow::CopyOnWrite;

// Re-export error types
pub use error::{BusError, QueueRejected, ReceiverFailure};

// Re-export filter types
pub use filter::{DiscardNone, EventFilter, Filtered, RejectNone};

// Re-export exception policy types
pub use policy::{Disposition, ExceptionPolicy, ExceptionSink};

// Re-export task queue types
pub use queue::{ManualQueue, Task, TaskQueue};
#[cfg(feature = "tokio")]
pub use queue::TokioQueue;

// Re-export receiver types
pub use receiver::{receiver_fn, FnReceiver, Receiver, ReceiverId, ReceiverRef};

// Re-export registration helper
pub use registration::RegistrationHelper;

// Re-export per-type bus registry
pub use registry::BusRegistry;

// Re-export sticky bus types
pub use sticky::{StickyEventBus, StickyMode};

// Re-export strategy types
pub use strategy::{
    InsertionOrder, ReceiverOrder, ReceiverSet, ReceiverSetStrategy, TotalOrder, Unordered,
};
