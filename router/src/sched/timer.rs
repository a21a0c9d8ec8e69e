// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! One-shot timers over a per-thread min-heap.
//!
//! A timer is bound to an owning element and a home thread at initialize
//! time; scheduling pushes an entry into the home thread's heap, keyed by
//! steady-clock expiry. Cancellation is lazy: `unschedule` bumps the
//! timer's generation and stale heap entries are skipped when popped, so
//! no backpointers into the heap are needed.

use crate::element::EIndex;
use crate::sched::thread::ThreadCore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use tracing::error;

/// Shared timer state; elements keep a [`TimerHandle`] field and hand it to
/// [`crate::context::Context::initialize_timer`] during initialize.
pub struct Timer {
    owner: OnceLock<EIndex>,
    home: Mutex<Weak<ThreadCore>>,
    expiry: Mutex<Option<Instant>>,
    generation: AtomicU64,
}

/// Shared handle to a [`Timer`].
pub type TimerHandle = Arc<Timer>;

impl Timer {
    /// A fresh, unbound, unscheduled timer.
    #[must_use]
    pub fn new() -> TimerHandle {
        Arc::new(Timer {
            owner: OnceLock::new(),
            home: Mutex::new(Weak::new()),
            expiry: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub(crate) fn bind(self: &Arc<Self>, owner: EIndex, home: &Arc<ThreadCore>) {
        let _ = self.owner.set(owner);
        *self.home.lock() = Arc::downgrade(home);
    }

    /// The owning element, once bound.
    #[must_use]
    pub fn owner(&self) -> Option<EIndex> {
        self.owner.get().copied()
    }

    /// Schedule to fire at `when`. Replaces any earlier schedule.
    pub fn schedule_at(self: &Arc<Self>, when: Instant) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.expiry.lock() = Some(when);
        if let Some(home) = self.home.lock().upgrade() {
            home.schedule_timer(when, generation, self);
            home.wakeup();
        } else {
            error!("timer scheduled before initialize");
        }
    }

    /// Schedule to fire `after` from now.
    pub fn schedule_after(self: &Arc<Self>, after: Duration) {
        self.schedule_at(Instant::now() + after);
    }

    /// Cancel without firing. Heap entries become stale and are skipped.
    pub fn unschedule(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.expiry.lock() = None;
    }

    /// The pending expiry, if scheduled.
    #[must_use]
    pub fn expiry(&self) -> Option<Instant> {
        *self.expiry.lock()
    }

    /// True if scheduled and not yet fired.
    #[must_use]
    pub fn scheduled(&self) -> bool {
        self.expiry.lock().is_some()
    }

    /// Check that a popped heap entry still represents this timer's current
    /// schedule; if so, consume the schedule (the callback may re-arm).
    pub(crate) fn claim_fire(&self, when: Instant, generation: u64) -> bool {
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        let mut expiry = self.expiry.lock();
        if *expiry == Some(when) && self.generation.load(Ordering::Acquire) == generation {
            *expiry = None;
            true
        } else {
            false
        }
    }
}
