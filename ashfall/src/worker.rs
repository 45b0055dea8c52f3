use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Cap on queued-but-unstarted jobs. The event loops treat a saturated
/// pool the same way the queues treat overflow: the work is dropped and
/// counted, the pipeline keeps moving.
pub const MAX_PENDING_TASKS: usize = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker pool saturated ({pending} pending tasks)")]
pub struct PoolSaturated {
    pub pending: usize,
}

/// Bounded dispatch pool for event handlers and scheduler pulses. A panic
/// inside a job is caught at the task boundary, logged, and never takes a
/// worker down.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::with_threads(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        )
    }

    pub fn with_threads(threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("worker-{i}"))
            .build()
            .expect("worker pool construction cannot fail with valid sizes");
        Self {
            pool,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) -> Result<(), PoolSaturated> {
        let pending = self.in_flight.load(Ordering::Acquire);
        if pending >= MAX_PENDING_TASKS {
            return Err(PoolSaturated { pending });
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let in_flight = self.in_flight.clone();
        self.pool.spawn(move || {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_owned());
                log::error!("worker task panicked: {message}");
            }
            in_flight.fetch_sub(1, Ordering::AcqRel);
        });
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn jobs_run_and_drain() {
        let pool = WorkerPool::with_threads(2);
        let (tx, rx) = mpsc::channel();
        for i in 0..8 {
            let tx = tx.clone();
            pool.spawn(move || tx.send(i).unwrap()).unwrap();
        }
        let mut seen: Vec<i32> = (0..8)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_job_does_not_kill_the_pool() {
        let pool = WorkerPool::with_threads(1);
        pool.spawn(|| panic!("boom")).unwrap();

        let (tx, rx) = mpsc::channel();
        pool.spawn(move || tx.send(42).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
    }
}
