//! Caller-pumped queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{Task, TaskQueue};
use crate::error::QueueRejected;

/// A FIFO queue whose tasks run only when the owner pumps it.
///
/// Useful wherever a single thread owns the loop (tests, UI event loops,
/// game ticks). Pump it from one thread at a time; two threads pumping
/// concurrently can run tasks in parallel.
///
/// A task that panics propagates the panic out of [`run_one`](Self::run_one)
/// or [`run_pending`](Self::run_pending); the remaining tasks stay queued.
pub struct ManualQueue {
    name: String,
    tasks: Mutex<VecDeque<Task>>,
    closed: AtomicBool,
}

impl ManualQueue {
    /// Creates an open, empty queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Runs the oldest task. Returns `false` if the queue was empty.
    pub fn run_one(&self) -> bool {
        // The lock is released before the task runs, so tasks may submit.
        let next = self.tasks.lock().pop_front();
        match next {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks submitted by the
    /// tasks being run. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Rejects all further submissions. Already queued tasks can still be
    /// run.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for ManualQueue {
    fn default() -> Self {
        Self::new("manual")
    }
}

impl fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualQueue")
            .field("name", &self.name)
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TaskQueue for ManualQueue {
    fn submit(&self, task: Task) -> Result<(), QueueRejected> {
        if self.is_closed() {
            return Err(QueueRejected::new(self.name.clone()));
        }
        self.tasks.lock().push_back(task);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_runs_in_submission_order() {
        let queue = ManualQueue::new("q");
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            queue.submit(Box::new(move || log.lock().push(i))).unwrap();
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_run_pending_includes_tasks_submitted_while_running() {
        let queue = Arc::new(ManualQueue::new("q"));
        let hits = Arc::new(Mutex::new(0));

        let inner_queue = Arc::clone(&queue);
        let inner_hits = Arc::clone(&hits);
        queue
            .submit(Box::new(move || {
                *inner_hits.lock() += 1;
                let hits = Arc::clone(&inner_hits);
                inner_queue
                    .submit(Box::new(move || *hits.lock() += 1))
                    .unwrap();
            }))
            .unwrap();

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn test_closed_queue_rejects() {
        let queue = ManualQueue::new("ui");
        queue.close();

        let err = queue.submit(Box::new(|| {})).unwrap_err();
        assert_eq!(err.queue, "ui");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_run_one_on_empty_queue() {
        assert!(!ManualQueue::default().run_one());
    }
}
