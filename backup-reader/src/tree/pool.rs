//! Bounded worker pool for parallel listing.
//!
//! Created once at start-up and shared by handle. Dropping the last handle
//! joins the worker threads.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::utils::{ReaderError, Result};

pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("backup-index-{idx}"))
            .build()
            .map_err(|e| ReaderError::Configuration(format!("worker pool: {e}")))?;
        debug!("Worker pool started with {} threads", threads);
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `task` on every item in parallel.
    ///
    /// Slot `i` of the result always belongs to `items[i]`, whatever order
    /// the units finish in. A unit that panics yields `Err(message)` in its
    /// slot instead of tearing down its siblings. Nested calls from inside a
    /// task share the same threads.
    pub fn map_ordered<T, U, F>(&self, items: Vec<T>, task: F) -> Vec<std::result::Result<U, String>>
    where
        T: Send,
        U: Send,
        F: Fn(T) -> U + Sync,
    {
        let mut slots: Vec<Option<std::result::Result<U, String>>> = Vec::with_capacity(items.len());
        slots.resize_with(items.len(), || None);

        let task = &task;
        self.pool.scope(|scope| {
            for (slot, item) in slots.iter_mut().zip(items) {
                scope.spawn(move |_| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(item)));
                    *slot = Some(outcome.map_err(panic_message));
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err("work unit produced no result".to_string())))
            .collect()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("worker panicked: {msg}")
    } else {
        "worker panicked".to_string()
    }
}
