//! Deferred and periodic work on a single timer thread.
//!
//! Timers live in a min-heap ordered by deadline. One thread sleeps until the
//! earliest deadline, runs the job with the queue unlocked, and goes back to
//! sleep. Periodic tasks are rescheduled only after the previous run has
//! returned, so two runs of the same task never overlap.

use crate::error::Result;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Timer {
    at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed: BinaryHeap is a max-heap and the earliest deadline must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    timers: BinaryHeap<Timer>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

/// Cloneable handle used to submit work to a [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Run `job` once after `delay`.
    pub fn schedule_after<F>(&self, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return;
        }

        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.timers.push(Timer {
            at: Instant::now() + delay,
            seq,
            job: Box::new(job),
        });
        drop(queue);

        self.shared.wakeup.notify_one();
    }

    /// Run `task` every `period` until it returns `false`.
    ///
    /// The next run is scheduled `period` after the previous one finished.
    pub fn schedule_every<F>(&self, period: Duration, task: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.schedule_repeating(period, Arc::new(task));
    }

    fn schedule_repeating(&self, period: Duration, task: Arc<dyn Fn() -> bool + Send + Sync>) {
        let handle = self.clone();
        self.schedule_after(period, move || {
            if task() {
                handle.schedule_repeating(period, task);
            }
        });
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().timers.len()
    }
}

/// Owner of the timer thread. Dropping it stops the thread and discards
/// timers that have not fired yet.
pub struct Scheduler {
    handle: SchedulerHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the timer thread.
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = shared.clone();

        let worker = std::thread::Builder::new()
            .name("geoload-timer".to_string())
            .spawn(move || run(worker_shared))?;

        Ok(Self {
            handle: SchedulerHandle { shared },
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Stop the timer thread and wait for the job in flight, if any.
    pub fn shutdown(&self) {
        self.handle.shared.queue.lock().shutdown = true;
        self.handle.shared.wakeup.notify_all();

        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            log::error!("Timer thread terminated abnormally");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>) {
    let mut queue = shared.queue.lock();

    loop {
        if queue.shutdown {
            break;
        }

        let next = queue.timers.peek().map(|timer| timer.at);
        match next {
            None => shared.wakeup.wait(&mut queue),
            Some(at) if at > Instant::now() => {
                shared.wakeup.wait_until(&mut queue, at);
            }
            Some(_) => {
                if let Some(timer) = queue.timers.pop() {
                    MutexGuard::unlocked(&mut queue, || run_job(timer.job));
                }
            }
        }
    }

    // Pending jobs may hold handles back to this queue; drop them unlocked.
    let pending = std::mem::take(&mut queue.timers);
    drop(queue);
    drop(pending);
    log::debug!("Timer thread shutting down");
}

fn run_job(job: Job) {
    if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        // Jobs only panic on a corrupted index; keep no timers running on top of it.
        log::error!("Scheduled task panicked, aborting");
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::mpsc;

    #[test]
    fn test_schedule_after_runs_in_deadline_order() {
        let scheduler = Scheduler::new().unwrap();
        let handle = scheduler.handle();
        let (tx, rx) = mpsc::channel();

        for (delay, label) in [(60, "late"), (10, "early"), (30, "middle")] {
            let tx = tx.clone();
            handle.schedule_after(Duration::from_millis(delay), move || {
                tx.send(label).unwrap();
            });
        }

        let order: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_schedule_every_stops_when_task_returns_false() {
        let scheduler = Scheduler::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let counter = runs.clone();
        scheduler
            .handle()
            .schedule_every(Duration::from_millis(5), move || {
                let n = counter.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                if n == 3 {
                    tx.send(()).unwrap();
                    return false;
                }
                true
            });

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(scheduler.handle().pending(), 0);
    }

    #[test]
    fn test_shutdown_discards_pending_timers() {
        let scheduler = Scheduler::new().unwrap();
        let handle = scheduler.handle();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        handle.schedule_after(Duration::from_secs(3600), move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });
        assert_eq!(handle.pending(), 1);

        drop(scheduler);
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);

        // Submissions after shutdown are ignored
        handle.schedule_after(Duration::ZERO, || {});
        assert_eq!(handle.pending(), 0);
    }
}
