//! Delivery contexts: where observer callbacks run.
//!
//! # Design
//! All callbacks of one subscription are scheduled on a single
//! `DeliveryContext`, which must run jobs serially and in submission order.
//! `DeliveryQueue` is the stock implementation: an unbounded channel drained
//! by one dedicated thread, or by one task on a caller-supplied runtime.
//! Applications with their own event loop implement the trait themselves.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Unit of work scheduled on a delivery context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial executor for observer callbacks.
pub trait DeliveryContext: Send + Sync + 'static {
    /// Run `job` after every previously scheduled job.
    fn schedule(&self, job: Job);
}

/// A serial job queue.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl DeliveryQueue {
    /// Drain the queue on a new thread named `name`.
    ///
    /// The thread exits once every clone of the queue has been dropped.
    pub fn spawn_thread(name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                run(job);
            }
        })?;
        Ok(Self { tx })
    }

    /// Drain the queue from a single task on `runtime`.
    pub fn spawn_on(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                run(job);
            }
        });
        Self { tx }
    }

    pub fn into_context(self) -> Arc<dyn DeliveryContext> {
        Arc::new(self)
    }
}

/// A panicking callback must not take the queue down with it.
fn run(job: Job) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(panic = %message, "delivery job panicked");
    }
}

impl DeliveryContext for DeliveryQueue {
    fn schedule(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::trace!("delivery queue closed, dropping job");
        }
    }
}
