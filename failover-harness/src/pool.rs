//! Bounded worker pool.
//!
//! Units of work run as tokio tasks, at most `capacity` at a time. Waiting
//! drains every unit, so one failure does not leave others running
//! unobserved, and reports the first failure.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::HarnessError;

/// Runs fallible units concurrently and collects their results.
///
/// Dropping the pool aborts any unit still running.
#[derive(Debug)]
pub struct TaskPool<T> {
    tasks: JoinSet<Result<T, HarnessError>>,
    permits: Arc<Semaphore>,
}

impl<T: Send + 'static> TaskPool<T> {
    /// Create a pool running at most `capacity` units at once (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Submit a unit. It starts as soon as a slot is free.
    pub fn submit<F>(&mut self, unit: F)
    where
        F: Future<Output = Result<T, HarnessError>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| HarnessError::PoolClosed)?;
            unit.await
        });
    }

    /// Number of units not yet collected.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether every unit has been collected.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every unit, handing each success to `on_complete` in
    /// completion order. Returns the first failure, if any.
    pub async fn wait<F>(mut self, mut on_complete: F) -> Result<(), HarnessError>
    where
        F: FnMut(T),
    {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(value)) => on_complete(value),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "worker failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "worker panicked or was cancelled");
                    first_error.get_or_insert(HarnessError::Join(e));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
