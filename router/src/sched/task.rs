// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Stride-scheduled tasks.
//!
//! A task is the schedulable unit bound to one element's `run_task`. Each
//! carries a ticket count; the stride is inversely proportional, and the
//! scheduler always runs the task with the smallest pass (virtual time),
//! adding its stride after every run. Twice the tickets means half the
//! stride means twice the CPU share.

use crate::element::EIndex;
use crate::sched::thread::ThreadCore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Stride corresponding to one ticket.
pub const STRIDE1: u32 = 1 << 16;
/// Ticket count used when nothing specifies one.
pub const DEFAULT_TICKETS: u32 = 1024;
/// Upper bound on tickets.
pub const MAX_TICKETS: u32 = 1 << 15;

/// Shared task state; elements keep a [`TaskHandle`] field and hand it to
/// [`crate::context::Context::initialize_task`] during initialize.
pub struct Task {
    owner: OnceLock<EIndex>,
    home: Mutex<Weak<ThreadCore>>,
    tickets: AtomicU32,
    stride: AtomicU32,
    pass: AtomicU64,
    scheduled: AtomicBool,
    on_pending: AtomicBool,
}

/// Shared handle to a [`Task`].
pub type TaskHandle = Arc<Task>;

impl Task {
    /// A fresh, unbound, unscheduled task.
    #[must_use]
    pub fn new() -> TaskHandle {
        Arc::new(Task {
            owner: OnceLock::new(),
            home: Mutex::new(Weak::new()),
            tickets: AtomicU32::new(DEFAULT_TICKETS),
            stride: AtomicU32::new(STRIDE1 / DEFAULT_TICKETS),
            pass: AtomicU64::new(0),
            scheduled: AtomicBool::new(false),
            on_pending: AtomicBool::new(false),
        })
    }

    /// Bind to an owning element and home thread. Called by the context's
    /// `initialize_task`; idempotent for the same owner.
    pub(crate) fn bind(self: &Arc<Self>, owner: EIndex, home: &Arc<ThreadCore>) {
        let _ = self.owner.set(owner);
        *self.home.lock() = Arc::downgrade(home);
    }

    /// The owning element, once bound.
    #[must_use]
    pub fn owner(&self) -> Option<EIndex> {
        self.owner.get().copied()
    }

    /// Home thread id, once bound.
    #[must_use]
    pub fn home_thread(&self) -> Option<usize> {
        self.home.lock().upgrade().map(|t| t.id())
    }

    /// Current ticket count.
    #[must_use]
    pub fn tickets(&self) -> u32 {
        self.tickets.load(Ordering::Relaxed)
    }

    /// Set the ticket count, clamped to `[1, MAX_TICKETS]`. Applies to
    /// subsequent runs.
    pub fn set_tickets(&self, tickets: u32) {
        let tickets = tickets.clamp(1, MAX_TICKETS);
        self.tickets.store(tickets, Ordering::Relaxed);
        self.stride.store((STRIDE1 / tickets).max(1), Ordering::Relaxed);
    }

    /// Current stride.
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride.load(Ordering::Relaxed)
    }

    pub(crate) fn pass(&self) -> u64 {
        self.pass.load(Ordering::Relaxed)
    }

    pub(crate) fn set_pass(&self, pass: u64) {
        self.pass.store(pass, Ordering::Relaxed);
    }

    /// True while the task wants CPU.
    #[must_use]
    pub fn scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Ask the scheduler to run this task. Idempotent while scheduled; a
    /// task sleeping for a long time re-enters at the scheduler's current
    /// pass rather than catching up run by run.
    pub fn reschedule(self: &Arc<Self>) {
        self.scheduled.store(true, Ordering::Release);
        if self.on_pending.swap(true, Ordering::AcqRel) {
            return; // already queued
        }
        if let Some(home) = self.home.lock().upgrade() {
            home.enqueue_pending(self);
            home.wakeup();
        } else {
            // not bound yet: stays marked scheduled; the bind-time
            // registration picks it up
            self.on_pending.store(false, Ordering::Release);
        }
    }

    /// End-of-run shorthand for "keep running"; identical in effect to
    /// [`Task::reschedule`] but intended from the task's own run.
    pub fn fast_reschedule(self: &Arc<Self>) {
        self.reschedule();
    }

    /// Remove from the run queue. A task may unschedule itself during its
    /// own run.
    pub fn unschedule(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    pub(crate) fn clear_pending(&self) {
        self.on_pending.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ticket_stride_relation() {
        let task = Task::new();
        assert_eq!(task.tickets(), DEFAULT_TICKETS);
        assert_eq!(task.stride(), STRIDE1 / DEFAULT_TICKETS);
        task.set_tickets(2 * DEFAULT_TICKETS);
        assert_eq!(task.stride(), STRIDE1 / (2 * DEFAULT_TICKETS));
        task.set_tickets(0);
        assert_eq!(task.tickets(), 1);
        task.set_tickets(u32::MAX);
        assert_eq!(task.tickets(), MAX_TICKETS);
    }

    #[test]
    fn schedule_flags() {
        let task = Task::new();
        assert!(!task.scheduled());
        task.reschedule();
        assert!(task.scheduled());
        task.unschedule();
        assert!(!task.scheduled());
    }
}
