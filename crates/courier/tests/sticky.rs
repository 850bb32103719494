//! Sticky replay on a manually drained queue.

use std::sync::Arc;

use courier_core::{Bus, EventBus, ManualQueue, StickyEventBus, StickyMode};
use courier_testing::{RecordingReceiver, UnregisteringReceiver};

fn setup() -> (Arc<ManualQueue>, StickyEventBus<String>) {
    let queue = Arc::new(ManualQueue::new("main"));
    let bus = EventBus::<String>::builder(queue.clone())
        .name("status")
        .build_sticky();
    (queue, bus)
}

#[test]
fn test_sticky_is_visible_before_dispatch() {
    let (queue, bus) = setup();
    let r = RecordingReceiver::new("r");

    bus.broadcast("foo".into()).unwrap();
    assert_eq!(bus.sticky().as_deref(), Some("foo"));

    bus.register(r.receiver()).unwrap();
    assert!(r.events().is_empty());
    queue.run_pending();
    assert_eq!(r.events(), ["foo"]);
}

#[test]
fn test_replay_happens_without_further_broadcasts() {
    let (queue, bus) = setup();
    let r = RecordingReceiver::new("r");

    bus.broadcast("foo".into()).unwrap();
    queue.run_pending();
    bus.register(r.receiver()).unwrap();
    queue.run_pending();
    queue.run_pending();

    assert_eq!(r.events(), ["foo"]);
}

#[test]
fn test_only_latest_event_is_replayed() {
    let (queue, bus) = setup();
    let r = RecordingReceiver::new("r");

    bus.broadcast("e1".into()).unwrap();
    bus.broadcast("e2".into()).unwrap();
    bus.register(r.receiver()).unwrap();
    queue.run_pending();

    assert_eq!(r.events(), ["e2"]);
}

#[test]
fn test_existing_receiver_gets_live_events_not_replay() {
    let (queue, bus) = setup();
    let r = RecordingReceiver::new("r");

    bus.register(r.receiver()).unwrap();
    bus.broadcast("a".into()).unwrap();
    bus.broadcast("b".into()).unwrap();
    assert!(!bus.register(r.receiver()).unwrap());
    queue.run_pending();

    assert_eq!(r.events(), ["a", "b"]);
}

#[test]
fn test_replay_and_following_broadcast_arrive_in_order() {
    let (queue, bus) = setup();
    let r = RecordingReceiver::new("r");

    bus.broadcast("old".into()).unwrap();
    bus.register(r.receiver()).unwrap();
    bus.broadcast("new".into()).unwrap();
    queue.run_pending();

    assert_eq!(r.events(), ["old", "new"]);
}

#[test]
fn test_one_shot_registrant_unregisters_on_replay() {
    let (queue, bus) = setup();
    let once = UnregisteringReceiver::one_shot("once");

    bus.broadcast("foo".into()).unwrap();
    bus.register(once.receiver()).unwrap();
    bus.broadcast("bar".into()).unwrap();
    queue.run_pending();

    assert_eq!(once.events(), ["foo"]);
    assert!(bus.core().is_empty());
}

#[test]
fn test_skip_repeats_from_builder() {
    let queue = Arc::new(ManualQueue::new("main"));
    let bus = EventBus::<u8>::builder(queue.clone())
        .config(courier_core::BusConfig {
            sticky: StickyMode::SkipRepeats,
            ..Default::default()
        })
        .build_sticky();
    let r = RecordingReceiver::new("r");
    bus.register(r.receiver()).unwrap();

    for ev in [1, 1, 2, 2, 1] {
        bus.broadcast(ev).unwrap();
    }
    queue.run_pending();

    assert_eq!(r.events(), [1, 2, 1]);
}
