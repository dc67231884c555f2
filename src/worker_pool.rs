//! A bounded pool for running OCR jobs.
//!
//! Each OCR job is an external process that will happily use an entire CPU
//! core, so we limit how many of them run at once. Unlike a global semaphore,
//! a [`WorkerPool`] belongs to a single run and is shared by all of that run's
//! batches.

use std::{num::NonZeroUsize, sync::Arc};

use tokio::sync::Semaphore;

use crate::prelude::*;

/// Default concurrency limit: one job per available CPU.
pub fn default_concurrency_limit() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

/// A cheaply-cloneable handle to a bounded pool of job slots.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    /// One permit per worker slot.
    semaphore: Arc<Semaphore>,
    /// How many slots we were created with.
    limit: NonZeroUsize,
}

impl WorkerPool {
    /// Create a new pool with `limit` slots.
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.get())),
            limit,
        }
    }

    /// The maximum number of jobs this pool runs at once.
    pub fn limit(&self) -> NonZeroUsize {
        self.limit
    }

    /// Call an async function while holding a slot in the pool.
    #[instrument(level = "trace", skip_all)]
    pub async fn run<Func, Fut, R>(&self, f: Func) -> Result<R>
    where
        Func: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let permit = self
            .semaphore
            .acquire()
            .await
            .context("Could not acquire worker slot")?;
        let result = f().await;
        drop(permit);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_limit() -> Result<()> {
        let pool = WorkerPool::new(NonZeroUsize::new(2).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(|| async {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn default_limit_is_at_least_one() {
        assert!(default_concurrency_limit().get() >= 1);
    }
}
