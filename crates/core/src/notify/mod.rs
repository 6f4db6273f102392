//! Delayed, time-aligned beat notifications for the visual layer.
//!
//! The scheduler decides about beats ahead of time; the notifier holds each
//! one back until it is audible and then hands its index to the registered
//! observer. A single worker thread drains a deadline-ordered queue.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::Result;

/// Observer invoked with the index of each beat as it becomes audible.
pub type BeatCallback = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    deadline: Instant,
    seq: u64,
    beat: usize,
}

#[derive(Debug, Default)]
struct Queue {
    pending: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
    last_deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    observer: Mutex<Option<BeatCallback>>,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, beat: usize) {
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(beat);
        }
    }
}

pub struct BeatNotifier {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl BeatNotifier {
    /// Starts the delivery thread with no observer registered.
    pub fn spawn() -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
            observer: Mutex::new(None),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("rhythmflow-notify".into())
                .spawn(move || run(shared))?
        };

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Replaces the observer. At most one is registered at any time.
    pub fn set_observer(&self, observer: Option<BeatCallback>) {
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    /// Delivers `beat` to the observer once `delay` has elapsed.
    ///
    /// Deadlines never go backwards, so beats are delivered in the order
    /// they were armed even when several are already due.
    pub fn arm(&self, delay: Duration, beat: usize) {
        let mut queue = self.shared.lock_queue();
        let mut deadline = Instant::now() + delay;
        if let Some(last) = queue.last_deadline {
            deadline = deadline.max(last);
        }

        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.last_deadline = Some(deadline);
        queue.pending.push(Reverse(Pending {
            deadline,
            seq,
            beat,
        }));
        drop(queue);

        self.shared.wake.notify_one();
    }

    /// Drops every notification that has not been delivered yet and returns
    /// how many were discarded.
    pub fn cancel_pending(&self) -> usize {
        let mut queue = self.shared.lock_queue();
        let cancelled = queue.pending.len();
        queue.pending.clear();
        queue.last_deadline = None;
        drop(queue);

        self.shared.wake.notify_one();
        cancelled
    }

    pub fn pending(&self) -> usize {
        self.shared.lock_queue().pending.len()
    }
}

fn run(shared: Arc<Shared>) {
    let mut queue = shared.lock_queue();

    loop {
        if queue.shutdown {
            break;
        }

        let now = Instant::now();
        match queue.pending.peek().map(|Reverse(next)| next.deadline) {
            Some(deadline) if deadline <= now => {
                if let Some(Reverse(due)) = queue.pending.pop() {
                    drop(queue);
                    shared.deliver(due.beat);
                    queue = shared.lock_queue();
                }
            }
            Some(deadline) => {
                queue = shared
                    .wake
                    .wait_timeout(queue, deadline - now)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            }
            None => {
                queue = shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

impl Drop for BeatNotifier {
    fn drop(&mut self) {
        self.shared.lock_queue().shutdown = true;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("beat notifier thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for BeatNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatNotifier")
            .field("pending", &self.pending())
            .finish()
    }
}
