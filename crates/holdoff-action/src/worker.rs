//! Single-threaded executor that owns mutable store state.
//!
//! Every job runs on one dedicated OS thread in FIFO order, so two jobs
//! never observe each other half-done. Callers pick how to wait: `call`
//! from async code, `call_blocking` from plain threads, `submit` to not
//! wait at all.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use holdoff_core::error::HoldoffError;

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Handle to the worker thread. Dropping every handle stops the thread
/// once the queued jobs have drained.
pub struct StoreWorker<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
    _thread: JoinHandle<()>,
}

impl<S: Send + 'static> StoreWorker<S> {
    /// Move `state` onto a new thread named `name`.
    pub fn spawn(name: &str, mut state: S) -> Result<Self, HoldoffError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<S>>();
        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(worker = %thread_name, "Store worker started");
                while let Some(job) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(|| job(&mut state))).is_err() {
                        error!(worker = %thread_name, "Store worker job panicked");
                    }
                }
                debug!(worker = %thread_name, "Store worker stopped");
            })?;
        Ok(Self {
            tx,
            _thread: thread,
        })
    }

    fn enqueue(&self, job: Job<S>) -> Result<(), HoldoffError> {
        self.tx.send(job).map_err(|_| HoldoffError::ShuttingDown)
    }

    fn request<R, F>(&self, f: F) -> Result<oneshot::Receiver<Result<R, HoldoffError>>, HoldoffError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> Result<R, HoldoffError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(Box::new(move |state| {
            // The caller may have stopped waiting; the job still ran.
            let _ = reply_tx.send(f(state));
        }))?;
        Ok(reply_rx)
    }

    /// Run `f` on the worker and await its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, HoldoffError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> Result<R, HoldoffError> + Send + 'static,
    {
        let reply = self.request(f)?;
        reply.await.map_err(|_| dropped())?
    }

    /// Run `f` on the worker, blocking the current thread.
    ///
    /// Panics if called from inside an async runtime thread, like
    /// `oneshot::Receiver::blocking_recv`.
    pub fn call_blocking<R, F>(&self, f: F) -> Result<R, HoldoffError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> Result<R, HoldoffError> + Send + 'static,
    {
        let reply = self.request(f)?;
        reply.blocking_recv().map_err(|_| dropped())?
    }

    /// Enqueue `f` without waiting for it to run.
    pub fn submit<F>(&self, f: F) -> Result<(), HoldoffError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.enqueue(Box::new(f))
    }
}

fn dropped() -> HoldoffError {
    HoldoffError::Storage("store worker dropped the request".to_string())
}

impl<S> std::fmt::Debug for StoreWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWorker")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
