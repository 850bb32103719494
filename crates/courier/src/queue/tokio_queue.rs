//! Queue backed by a tokio worker task.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{Task, TaskQueue};
use crate::error::{panic_to_error, QueueRejected};

enum Job {
    Run(Task),
    Flush(oneshot::Sender<()>),
}

/// A single-logical-thread queue: one tokio task drains an unbounded channel,
/// so tasks run in submission order and never overlap.
///
/// Tasks are synchronous and run directly on the worker; keep them short.
/// A panicking task is logged and the worker moves on to the next one.
///
/// ```
/// use std::sync::Arc;
/// use courier_core::{receiver_fn, Bus, EventBus, TokioQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = Arc::new(TokioQueue::new("events"));
/// let bus = EventBus::new(queue.clone());
/// bus.register(receiver_fn("print", |_, ev: &String| {
///     println!("{ev}");
///     Ok(())
/// }))?;
///
/// bus.broadcast("hello".to_string())?;
/// queue.drain().await?;
/// # Ok(())
/// # }
/// ```
pub struct TokioQueue {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TokioQueue {
    /// Spawns the worker on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime; use
    /// [`with_handle`](Self::with_handle) there.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_handle(name, &Handle::current())
    }

    /// Spawns the worker on `handle`.
    pub fn with_handle(name: impl Into<String>, handle: &Handle) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.spawn(run_worker(name.clone(), rx));
        debug!(queue = %name, "Task queue started");
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Resolves once every task submitted before this call has run.
    pub async fn drain(&self) -> Result<(), QueueRejected> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Job::Flush(done_tx))?;
        done_rx
            .await
            .map_err(|_| QueueRejected::new(self.name.clone()))
    }

    /// Rejects further submissions. Queued tasks still run.
    pub fn close(&self) {
        if self.tx.lock().take().is_some() {
            debug!(queue = %self.name, "Task queue closed");
        }
    }

    /// True once closed.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Closes the queue and waits for the worker to finish queued tasks.
    pub async fn shutdown(&self) {
        self.close();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                error!(queue = %self.name, error = %err, "Task queue worker failed");
            }
        }
    }

    fn send(&self, job: Job) -> Result<(), QueueRejected> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(QueueRejected::new(self.name.clone()));
        };
        tx.send(job)
            .map_err(|_| QueueRejected::new(self.name.clone()))
    }
}

impl fmt::Debug for TokioQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioQueue")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TaskQueue for TokioQueue {
    fn submit(&self, task: Task) -> Result<(), QueueRejected> {
        self.send(Job::Run(task))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn run_worker(name: String, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Run(task) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                    error!(
                        queue = %name,
                        error = %panic_to_error(payload),
                        "Task panicked"
                    );
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(queue = %name, "Task queue worker stopped");
}
