//! Copy-on-write cell.
//!
//! [`CopyOnWrite`] holds one immutable value at a time. Readers take an
//! `Arc` snapshot in O(1); writers build a new value from the current one and
//! publish it with a pointer swap. A published value is never mutated, so a
//! snapshot stays valid and unchanged for as long as its holder keeps it.
//!
//! ```text
//!  load() ──► Arc<V> (snapshot, read lock held only for the clone)
//!
//!  update(f):
//!     writer lock ─► current = load() ─► f(&current) ─► Some(next) ─► swap
//!                                                   └─► None ───────► keep
//! ```
//!
//! Writers are serialized by a separate mutex, so two concurrent updates
//! never both start from the same value and lose one change.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Single-writer-at-a-time, many-reader cell of immutable snapshots.
pub struct CopyOnWrite<V> {
    current: RwLock<Arc<V>>,
    writer: Mutex<()>,
}

impl<V> CopyOnWrite<V> {
    /// Creates a cell publishing `value`.
    pub fn new(value: V) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            writer: Mutex::new(()),
        }
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<V> {
        Arc::clone(&self.current.read())
    }

    /// Runs one read-copy-publish cycle.
    ///
    /// `f` sees the current value and returns the replacement, or `None` to
    /// leave the cell untouched. Returns whether a new value was published.
    ///
    /// `f` runs while the writer lock is held; it must not call back into
    /// this cell's `update` or `replace`.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&V) -> Option<V>,
    {
        let _writer = self.writer.lock();
        let current = self.load();
        match f(&current) {
            Some(next) => {
                *self.current.write() = Arc::new(next);
                true
            }
            None => false,
        }
    }

    /// Publishes `value` unconditionally and returns the previous snapshot.
    pub fn replace(&self, value: V) -> Arc<V> {
        let _writer = self.writer.lock();
        std::mem::replace(&mut *self.current.write(), Arc::new(value))
    }
}

impl<V: Default> Default for CopyOnWrite<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V: fmt::Debug> fmt::Debug for CopyOnWrite<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CopyOnWrite").field(&self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_snapshot_is_unaffected_by_later_updates() {
        let cell = CopyOnWrite::new(vec![1, 2]);
        let before = cell.load();

        assert!(cell.update(|v| {
            let mut next = v.clone();
            next.push(3);
            Some(next)
        }));

        assert_eq!(*before, vec![1, 2]);
        assert_eq!(*cell.load(), vec![1, 2, 3]);
    }

    #[test]
    fn test_update_returning_none_publishes_nothing() {
        let cell = CopyOnWrite::new(String::from("a"));
        let before = cell.load();

        assert!(!cell.update(|_| None));
        assert!(Arc::ptr_eq(&before, &cell.load()));
    }

    #[test]
    fn test_replace_returns_previous() {
        let cell = CopyOnWrite::new(1);
        let old = cell.replace(2);
        assert_eq!(*old, 1);
        assert_eq!(*cell.load(), 2);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let cell = Arc::new(CopyOnWrite::new(Vec::<usize>::new()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for i in 0..100 {
                        cell.update(|v| {
                            let mut next = v.clone();
                            next.push(t * 1000 + i);
                            Some(next)
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cell.load().len(), 800);
    }
}
