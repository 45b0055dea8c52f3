use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

type Job = Box<dyn Fn() + Send + Sync>;

struct ScheduledTask {
    id: u32,
    interval: Duration,
    next_run: Instant,
    job: Job,
}

/// Single-owner periodic task registry. One thread sleeps until the
/// earliest deadline, fires everything due, and advances deadlines by their
/// interval. Jobs are expected to hand real work to the worker pool and
/// return quickly.
#[derive(Default)]
pub struct Scheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
    wakeup: Condvar,
    stopped: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, id: u32, interval: Duration, job: impl Fn() + Send + Sync + 'static) {
        let mut tasks = self.tasks.lock();
        if tasks.iter().any(|t| t.id == id) {
            log::error!("scheduler task id {id} already registered, ignoring");
            return;
        }
        tasks.push(ScheduledTask {
            id,
            interval,
            next_run: Instant::now() + interval,
            job: Box::new(job),
        });
        self.wakeup.notify_all();
    }

    /// Run on the calling thread until `stop`.
    pub fn run(&self) {
        log::info!("scheduler running {} tasks", self.tasks.lock().len());
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }

            let now = Instant::now();
            let mut due: Vec<u32> = Vec::new();
            let mut next_deadline: Option<Instant> = None;
            {
                let mut tasks = self.tasks.lock();
                for task in tasks.iter_mut() {
                    if task.next_run <= now {
                        due.push(task.id);
                        // Skip missed pulses instead of bursting to catch up.
                        while task.next_run <= now {
                            task.next_run += task.interval;
                        }
                    }
                    next_deadline = Some(match next_deadline {
                        Some(deadline) => deadline.min(task.next_run),
                        None => task.next_run,
                    });
                }
            }

            for id in due {
                let tasks = self.tasks.lock();
                if let Some(task) = tasks.iter().find(|t| t.id == id) {
                    (task.job)();
                }
            }

            let wait = next_deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_millis(100));
            let mut guard = self.tasks.lock();
            if !self.stopped.load(Ordering::Acquire) {
                self.wakeup.wait_for(&mut guard, wait);
            }
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wakeup.notify_all();
    }
}
