//! # Receiver set strategies
//!
//! A [`ReceiverSet`] is the immutable snapshot a broadcast iterates. Every
//! registration change asks the bus's [`ReceiverSetStrategy`] for a brand-new
//! set derived from the current one; the strategy decides where a receiver
//! lands and therefore the order in which one broadcast calls its receivers.
//!
//! | Strategy           | Dispatch order                                  |
//! |--------------------|-------------------------------------------------|
//! | [`Unordered`]      | unspecified (may change on every unregister)    |
//! | [`InsertionOrder`] | registration order (the bus default)            |
//! | [`TotalOrder`]     | ascending by a caller-supplied comparator       |
//!
//! ## Caller obligation for `TotalOrder`
//! The comparator must be a total order over every receiver registered on
//! the bus and consistent with receiver identity. Distinct receivers that
//! compare `Equal` are all kept, in an unspecified relative order.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::receiver::{Receiver, ReceiverId, ReceiverRef};

/// Immutable collection of registered receivers, in dispatch order.
pub struct ReceiverSet<T> {
    members: Vec<ReceiverRef<T>>,
    index: HashSet<ReceiverId>,
}

impl<T> ReceiverSet<T> {
    /// The empty set.
    pub fn empty() -> Self {
        Self {
            members: Vec::new(),
            index: HashSet::new(),
        }
    }

    /// Builds a set from members already in dispatch order.
    ///
    /// Duplicate receivers keep their first position.
    pub fn from_ordered(members: Vec<ReceiverRef<T>>) -> Self {
        let mut index = HashSet::with_capacity(members.len());
        let members = members
            .into_iter()
            .filter(|r| index.insert(ReceiverId::of(r)))
            .collect();
        Self { members, index }
    }

    /// True if `receiver` is a member.
    pub fn contains(&self, receiver: &ReceiverRef<T>) -> bool {
        self.index.contains(&ReceiverId::of(receiver))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &ReceiverRef<T>> {
        self.members.iter()
    }

    /// Members in dispatch order, as a slice.
    pub fn as_slice(&self) -> &[ReceiverRef<T>] {
        &self.members
    }

    /// Copy of the members, for a strategy to rearrange.
    pub fn to_vec(&self) -> Vec<ReceiverRef<T>> {
        self.members.clone()
    }
}

impl<T> Default for ReceiverSet<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for ReceiverSet<T> {
    fn clone(&self) -> Self {
        Self {
            members: self.members.clone(),
            index: self.index.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for ReceiverSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.members.iter().map(|r| r.name()))
            .finish()
    }
}

/// Produces new receiver sets from the current one.
///
/// The bus only calls `with_added` for a receiver that is absent and
/// `with_removed` for one that is present. Implementations must return a set
/// holding exactly the expected members; a set that drops or duplicates
/// receivers corrupts the bus's registration bookkeeping.
pub trait ReceiverSetStrategy<T>: Send + Sync + 'static {
    /// `current` plus `receiver`.
    fn with_added(&self, current: &ReceiverSet<T>, receiver: ReceiverRef<T>) -> ReceiverSet<T>;

    /// `current` minus `receiver`.
    fn with_removed(&self, current: &ReceiverSet<T>, receiver: &ReceiverRef<T>)
        -> ReceiverSet<T>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

fn without<T>(current: &ReceiverSet<T>, receiver: &ReceiverRef<T>) -> Vec<ReceiverRef<T>> {
    let id = ReceiverId::of(receiver);
    current
        .iter()
        .filter(|r| ReceiverId::of(*r) != id)
        .cloned()
        .collect()
}

/// Dispatch order is unspecified.
///
/// Removal moves the last member into the vacated slot, so order can change
/// whenever a receiver is unregistered.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unordered;

impl<T: 'static> ReceiverSetStrategy<T> for Unordered {
    fn with_added(&self, current: &ReceiverSet<T>, receiver: ReceiverRef<T>) -> ReceiverSet<T> {
        let mut members = current.to_vec();
        members.push(receiver);
        ReceiverSet::from_ordered(members)
    }

    fn with_removed(&self, current: &ReceiverSet<T>, receiver: &ReceiverRef<T>) -> ReceiverSet<T> {
        let id = ReceiverId::of(receiver);
        let mut members = current.to_vec();
        if let Some(pos) = members.iter().position(|r| ReceiverId::of(r) == id) {
            members.swap_remove(pos);
        }
        ReceiverSet::from_ordered(members)
    }

    fn name(&self) -> &'static str {
        "unordered"
    }
}

/// Receivers are called in the order they were registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertionOrder;

impl<T: 'static> ReceiverSetStrategy<T> for InsertionOrder {
    fn with_added(&self, current: &ReceiverSet<T>, receiver: ReceiverRef<T>) -> ReceiverSet<T> {
        let mut members = current.to_vec();
        members.push(receiver);
        ReceiverSet::from_ordered(members)
    }

    fn with_removed(&self, current: &ReceiverSet<T>, receiver: &ReceiverRef<T>) -> ReceiverSet<T> {
        ReceiverSet::from_ordered(without(current, receiver))
    }

    fn name(&self) -> &'static str {
        "insertion"
    }
}

type Comparator<T> = dyn Fn(&dyn Receiver<T>, &dyn Receiver<T>) -> Ordering + Send + Sync;

/// Receivers are called in ascending comparator order.
pub struct TotalOrder<T> {
    cmp: Arc<Comparator<T>>,
}

impl<T> TotalOrder<T> {
    /// Orders receivers with `cmp`. See the module docs for the caller
    /// obligation.
    pub fn by<F>(cmp: F) -> Self
    where
        F: Fn(&dyn Receiver<T>, &dyn Receiver<T>) -> Ordering + Send + Sync + 'static,
    {
        Self { cmp: Arc::new(cmp) }
    }

    /// Orders receivers by [`Receiver::name`].
    pub fn by_name() -> Self
    where
        T: 'static,
    {
        Self::by(|a, b| a.name().cmp(b.name()))
    }
}

impl<T> Clone for TotalOrder<T> {
    fn clone(&self) -> Self {
        Self {
            cmp: Arc::clone(&self.cmp),
        }
    }
}

impl<T> fmt::Debug for TotalOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotalOrder")
    }
}

impl<T: 'static> ReceiverSetStrategy<T> for TotalOrder<T> {
    fn with_added(&self, current: &ReceiverSet<T>, receiver: ReceiverRef<T>) -> ReceiverSet<T> {
        let mut members = current.to_vec();
        // Equal keys go after existing members.
        let pos = members.partition_point(|m| (self.cmp)(&**m, &*receiver) != Ordering::Greater);
        members.insert(pos, receiver);
        ReceiverSet::from_ordered(members)
    }

    fn with_removed(&self, current: &ReceiverSet<T>, receiver: &ReceiverRef<T>) -> ReceiverSet<T> {
        ReceiverSet::from_ordered(without(current, receiver))
    }

    fn name(&self) -> &'static str {
        "total"
    }
}

/// Serializable choice of built-in strategy, used by
/// [`BusConfig`](crate::BusConfig). `TotalOrder` needs a comparator and is
/// only available through the builder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverOrder {
    /// [`Unordered`].
    Unordered,
    /// [`InsertionOrder`].
    #[default]
    Insertion,
}

impl ReceiverOrder {
    /// Instantiates the strategy.
    pub fn strategy<T: 'static>(self) -> Arc<dyn ReceiverSetStrategy<T>> {
        match self {
            ReceiverOrder::Unordered => Arc::new(Unordered),
            ReceiverOrder::Insertion => Arc::new(InsertionOrder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::receiver_fn;

    fn named(name: &str) -> ReceiverRef<u32> {
        receiver_fn(name, |_, _| Ok(()))
    }

    fn names(set: &ReceiverSet<u32>) -> Vec<String> {
        set.iter().map(|r| r.name().to_string()).collect()
    }

    fn build<S>(strategy: &S, rs: &[ReceiverRef<u32>]) -> ReceiverSet<u32>
    where
        S: ReceiverSetStrategy<u32>,
    {
        rs.iter().fold(ReceiverSet::empty(), |set, r| {
            strategy.with_added(&set, Arc::clone(r))
        })
    }

    #[test]
    fn test_debug_lists_receiver_names() {
        let set = build(&InsertionOrder, &[named("b"), named("a")]);
        assert_eq!(format!("{set:?}"), r#"["b", "a"]"#);
    }

    #[test]
    fn test_insertion_order_preserved_across_removal() {
        let (a, b, c) = (named("a"), named("b"), named("c"));
        let set = build(&InsertionOrder, &[c.clone(), a.clone(), b.clone()]);
        assert_eq!(names(&set), ["c", "a", "b"]);

        let set = InsertionOrder.with_removed(&set, &c);
        assert_eq!(names(&set), ["a", "b"]);
        assert!(!set.contains(&c));
        assert!(set.contains(&a));
    }

    #[test]
    fn test_total_order_sorts_by_comparator() {
        let (a, b, c) = (named("a"), named("b"), named("c"));
        let set = build(&TotalOrder::by_name(), &[c, a, b]);
        assert_eq!(names(&set), ["a", "b", "c"]);
    }

    #[test]
    fn test_total_order_keeps_equal_keys() {
        let first = named("same");
        let second = named("same");
        let set = build(&TotalOrder::by_name(), &[first.clone(), second.clone()]);

        assert_eq!(set.len(), 2);
        assert!(set.contains(&first));
        assert!(set.contains(&second));
    }

    #[test]
    fn test_unordered_keeps_membership() {
        let (a, b, c) = (named("a"), named("b"), named("c"));
        let set = build(&Unordered, &[a.clone(), b.clone(), c.clone()]);
        let set = Unordered.with_removed(&set, &a);

        assert_eq!(set.len(), 2);
        assert!(!set.contains(&a));
        assert!(set.contains(&b));
        assert!(set.contains(&c));
    }

    #[test]
    fn test_from_ordered_drops_duplicates() {
        let a = named("a");
        let set = ReceiverSet::from_ordered(vec![a.clone(), a.clone(), named("b")]);
        assert_eq!(names(&set), ["a", "b"]);
    }

    #[test]
    fn test_receiver_order_deserializes_snake_case() {
        let order: ReceiverOrder = serde_json::from_str("\"unordered\"").unwrap();
        assert_eq!(order, ReceiverOrder::Unordered);
        assert_eq!(ReceiverOrder::default(), ReceiverOrder::Insertion);
        assert_eq!(ReceiverOrder::Insertion.strategy::<u32>().name(), "insertion");
    }
}
