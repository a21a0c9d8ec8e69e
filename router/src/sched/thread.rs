// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router threads.
//!
//! Each thread owns a stride-ordered run queue and a timer heap and runs a
//! strictly cooperative loop: fire expired timers in expiry order, admit
//! rescheduled tasks, run the task with the smallest pass, park when idle.
//! Packet flow happens synchronously on the running task's stack; the only
//! yield points are between tasks and between timer firings.

use crate::router::RouterInner;
use crate::sched::task::TaskHandle;
use crate::sched::timer::TimerHandle;
use parking_lot::{Condvar, Mutex};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Most timers fired per scheduling pass, so a burst of short timers cannot
/// starve tasks.
const MAX_TIMER_STRIDE: usize = 32;

/// Longest idle park; stop requests and reschedules wake threads early.
const MAX_PARK: Duration = Duration::from_secs(1);

struct RunEntry {
    pass: u64,
    seq: u64,
    task: TaskHandle,
}

impl PartialEq for RunEntry {
    fn eq(&self, other: &Self) -> bool {
        self.pass == other.pass && self.seq == other.seq
    }
}
impl Eq for RunEntry {}
impl PartialOrd for RunEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for RunEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.pass, self.seq).cmp(&(other.pass, other.seq))
    }
}

struct TimerEntry {
    when: Instant,
    generation: u64,
    timer: TimerHandle,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.generation == other.generation
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.when, self.generation).cmp(&(other.when, other.generation))
    }
}

/// One router thread's scheduling state.
pub struct ThreadCore {
    id: usize,
    run_queue: Mutex<BinaryHeap<Reverse<RunEntry>>>,
    pending: Mutex<Vec<TaskHandle>>,
    timers: Mutex<BinaryHeap<Reverse<TimerEntry>>>,
    now_pass: AtomicU64,
    seq: AtomicU64,
    park_lock: Mutex<()>,
    park_cv: Condvar,
}

impl ThreadCore {
    /// A fresh thread core with the given id.
    #[must_use]
    pub fn new(id: usize) -> Arc<ThreadCore> {
        Arc::new(ThreadCore {
            id,
            run_queue: Mutex::new(BinaryHeap::new()),
            pending: Mutex::new(Vec::new()),
            timers: Mutex::new(BinaryHeap::new()),
            now_pass: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            park_lock: Mutex::new(()),
            park_cv: Condvar::new(),
        })
    }

    /// This thread's id.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Wake the thread if it is parked.
    pub fn wakeup(&self) {
        let _guard = self.park_lock.lock();
        self.park_cv.notify_one();
    }

    pub(crate) fn enqueue_pending(&self, task: &TaskHandle) {
        self.pending.lock().push(Arc::clone(task));
    }

    pub(crate) fn schedule_timer(&self, when: Instant, generation: u64, timer: &TimerHandle) {
        self.timers.lock().push(Reverse(TimerEntry {
            when,
            generation,
            timer: Arc::clone(timer),
        }));
    }

    /// Admit rescheduled tasks into the run queue. A task that slept re-
    /// enters at the scheduler's current pass instead of replaying missed
    /// quanta.
    fn drain_pending(&self) {
        let drained = std::mem::take(&mut *self.pending.lock());
        for task in drained {
            task.clear_pending();
            if task.scheduled() {
                let pass = task.pass().max(self.now_pass.load(Ordering::Relaxed));
                task.set_pass(pass);
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                self.run_queue.lock().push(Reverse(RunEntry {
                    pass,
                    seq,
                    task,
                }));
            }
        }
    }

    /// Fire expired timers in expiry order, up to [`MAX_TIMER_STRIDE`].
    fn run_timers(&self, inner: &RouterInner) {
        let now = Instant::now();
        let mut fired = 0;
        while fired < MAX_TIMER_STRIDE {
            let entry = {
                let mut timers = self.timers.lock();
                let due = timers
                    .peek()
                    .is_some_and(|Reverse(entry)| entry.when <= now);
                if due { timers.pop() } else { None }
            };
            let Some(Reverse(entry)) = entry else { return };
            if entry.timer.claim_fire(entry.when, entry.generation) {
                inner.run_element_timer(&entry.timer);
                fired += 1;
            }
        }
    }

    /// Run the task with the smallest pass. Returns false when the queue
    /// held nothing runnable.
    fn run_one_task(&self, inner: &RouterInner) -> bool {
        loop {
            let entry = self.run_queue.lock().pop();
            let Some(Reverse(entry)) = entry else {
                return false;
            };
            if !entry.task.scheduled() {
                continue; // lazily removed
            }
            self.now_pass.store(entry.pass, Ordering::Relaxed);
            entry.task.unschedule();
            entry
                .task
                .set_pass(entry.pass.wrapping_add(u64::from(entry.task.stride())));
            let worked = inner.run_element_task(&entry.task);
            if !worked {
                trace!(thread = self.id, "task ran without work");
            }
            return true;
        }
    }

    fn has_immediate_work(&self, inner: &RouterInner) -> bool {
        if inner.driver_done() || inner.pause_requested() {
            return true;
        }
        if !self.pending.lock().is_empty() {
            return true;
        }
        if self
            .run_queue
            .lock()
            .iter()
            .any(|Reverse(entry)| entry.task.scheduled())
        {
            return true;
        }
        match self.next_timer_expiry() {
            Some(when) => when <= Instant::now(),
            None => false,
        }
    }

    fn next_timer_expiry(&self) -> Option<Instant> {
        self.timers.lock().peek().map(|Reverse(entry)| entry.when)
    }

    fn idle_park(&self, inner: &RouterInner) {
        let mut guard = self.park_lock.lock();
        if self.has_immediate_work(inner) {
            return;
        }
        let timeout = self
            .next_timer_expiry()
            .map_or(MAX_PARK, |when| {
                when.saturating_duration_since(Instant::now()).min(MAX_PARK)
            });
        let _ = self.park_cv.wait_for(&mut guard, timeout);
    }

    /// The cooperative loop. Returns when the driver is told to stop.
    pub fn run_loop(&self, inner: &RouterInner) {
        trace!(thread = self.id, "router thread running");
        while !inner.driver_done() {
            inner.pause_point(self.id);
            self.run_timers(inner);
            self.drain_pending();
            if !self.run_one_task(inner) {
                self.idle_park(inner);
            }
        }
        trace!(thread = self.id, "router thread exiting");
    }

    /// Run until the run queue and due timers are exhausted, at most
    /// `max_quanta` task runs. Test and script harness entry point; the
    /// production loop is [`ThreadCore::run_loop`].
    pub fn run_until_idle(&self, inner: &RouterInner, max_quanta: usize) -> usize {
        let mut quanta = 0;
        while quanta < max_quanta {
            self.run_timers(inner);
            self.drain_pending();
            if !self.run_one_task(inner) {
                break;
            }
            quanta += 1;
        }
        quanta
    }
}
