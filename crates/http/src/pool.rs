//! Bounded execution pool that runs request handlers away from connection I/O.

use std::future::Future;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Returned by [`ExecutionPool::submit`] when every slot is taken. The connection answers
/// the request with `503 Service Unavailable`.
#[derive(Debug, Error)]
#[error("execution pool saturated, {capacity} tasks in flight")]
pub struct Rejected {
    capacity: usize,
}

/// Runs handler futures with at most `capacity` of them in flight.
///
/// A pool built with [`ExecutionPool::new`] owns a dedicated multi-thread runtime, so a
/// handler blocking its worker never stalls the connections of the accepting runtime.
#[derive(Debug)]
pub struct ExecutionPool {
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ExecutionPool {
    pub fn new(workers: usize, capacity: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread().worker_threads(workers.max(1)).thread_name("nimbus-worker").enable_all().build()?;
        let handle = runtime.handle().clone();
        info!(workers, capacity, "started execution pool");
        Ok(Self::with_parts(Some(runtime), handle, capacity))
    }

    /// A pool spawning onto the runtime of the caller.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn on_current(capacity: usize) -> Self {
        Self::with_parts(None, Handle::current(), capacity)
    }

    fn with_parts(runtime: Option<Runtime>, handle: Handle, capacity: usize) -> Self {
        Self { runtime, handle, permits: Arc::new(Semaphore::new(capacity)), capacity }
    }

    /// Spawns `future` if a slot is free. The slot is released when the task finishes, even
    /// when nobody awaits the returned handle anymore.
    pub fn submit<F>(&self, future: F) -> Result<JoinHandle<F::Output>, Rejected>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            debug!(capacity = self.capacity, "execution pool saturated");
            return Err(Rejected { capacity: self.capacity });
        };

        Ok(self.handle.spawn(async move {
            let output = future.await;
            drop(permit);
            output
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Drop for ExecutionPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn rejects_when_saturated() {
        let pool = ExecutionPool::on_current(1);
        let (release, wait) = oneshot::channel::<()>();

        let first = pool.submit(async move { wait.await.is_ok() }).unwrap();
        assert_eq!(pool.available(), 0);
        assert!(pool.submit(async {}).is_err());

        release.send(()).unwrap();
        assert!(first.await.unwrap());
        assert_eq!(pool.available(), 1);
        assert!(pool.submit(async {}).is_ok());
    }

    #[tokio::test]
    async fn permit_released_after_panic() {
        let pool = ExecutionPool::on_current(1);
        let handle = pool.submit(async { panic!("handler failure") }).unwrap();
        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn dedicated_runtime() {
        let pool = ExecutionPool::new(2, 4).unwrap();
        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        let name = runtime.block_on(async { pool.submit(async { std::thread::current().name().map(str::to_string) }).unwrap().await.unwrap() });
        assert_eq!(name.as_deref(), Some("nimbus-worker"));
        assert_eq!(pool.capacity(), 4);
    }
}
