// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Producer-to-consumer wake signals.
//!
//! A [`NotifierSignal`] is a shared atomic word plus a mask selecting one
//! bit; `active()` is one acquire-load. A [`Notifier`] owns a signal and a
//! listener list: when the producer flips the signal from inactive to
//! active it reschedules every listener task, giving pull-driven consumers
//! O(1) sleep and wakeup with no locks on the packet path.

use crate::sched::task::TaskHandle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

const TRUE_MASK: u32 = 1;
const CONFLICT_MASK: u32 = 2;

/// The shared word behind the constant signals. Its bits are never cleared.
fn constant_word() -> &'static Arc<AtomicU32> {
    static WORD: OnceLock<Arc<AtomicU32>> = OnceLock::new();
    WORD.get_or_init(|| Arc::new(AtomicU32::new(TRUE_MASK | CONFLICT_MASK)))
}

/// A cheap, copyable view of one notifier bit.
#[derive(Debug, Clone)]
pub struct NotifierSignal {
    word: Arc<AtomicU32>,
    mask: u32,
}

impl NotifierSignal {
    fn new(word: Arc<AtomicU32>, mask: u32) -> Self {
        NotifierSignal { word, mask }
    }

    /// A signal that is never active. Merging it is the identity.
    #[must_use]
    pub fn idle() -> Self {
        NotifierSignal::new(Arc::clone(constant_word()), 0)
    }

    /// A signal that is always active: consumers holding it never sleep.
    #[must_use]
    pub fn busy() -> Self {
        NotifierSignal::new(Arc::clone(constant_word()), TRUE_MASK)
    }

    /// The conflicted signal: always active, produced when signals over
    /// different words are merged.
    #[must_use]
    pub fn conflicted() -> Self {
        NotifierSignal::new(Arc::clone(constant_word()), CONFLICT_MASK)
    }

    /// Whether the selected bit is set.
    #[must_use]
    pub fn active(&self) -> bool {
        self.word.load(Ordering::Acquire) & self.mask != 0
    }

    /// True for signals sharing the constant word with a nonzero mask.
    #[must_use]
    pub fn always_active(&self) -> bool {
        Arc::ptr_eq(&self.word, constant_word()) && self.mask != 0
    }

    /// True for the merge-conflict signal.
    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        Arc::ptr_eq(&self.word, constant_word()) && self.mask == CONFLICT_MASK
    }

    fn set_active(&self, active: bool) {
        if active {
            self.word.fetch_or(self.mask, Ordering::Release);
        } else {
            self.word.fetch_and(!self.mask, Ordering::Release);
        }
    }

    /// Combine with another signal. Signals over the same word OR their
    /// masks; signals over different words cannot be observed through one
    /// load, so the combination degrades to the always-active conflicted
    /// signal.
    pub fn merge(&mut self, other: &NotifierSignal) {
        if Arc::ptr_eq(&self.word, &other.word) {
            self.mask |= other.mask;
        } else if self.mask == 0 {
            *self = other.clone();
        } else if other.mask != 0 {
            *self = NotifierSignal::conflicted();
        }
    }
}

impl PartialEq for NotifierSignal {
    fn eq(&self, other: &Self) -> bool {
        self.mask == other.mask && (Arc::ptr_eq(&self.word, &other.word) || self.mask == 0)
    }
}

/// A signal plus the tasks to wake when it goes active.
///
/// Used passively (producers set the bit, consumers poll) or actively
/// (consumers register listener tasks and get rescheduled on the 0→1 edge).
pub struct Notifier {
    signal: NotifierSignal,
    listeners: Mutex<Vec<TaskHandle>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Notifier::new()
    }
}

impl Notifier {
    /// A notifier whose signal starts inactive.
    #[must_use]
    pub fn new() -> Self {
        Notifier {
            signal: NotifierSignal::new(Arc::new(AtomicU32::new(0)), TRUE_MASK),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// A copy of the signal for consumers to poll.
    #[must_use]
    pub fn signal(&self) -> NotifierSignal {
        self.signal.clone()
    }

    /// Whether the signal is currently active.
    #[must_use]
    pub fn active(&self) -> bool {
        self.signal.active()
    }

    /// Set the signal. On the inactive-to-active edge every listener task is
    /// rescheduled; going inactive wakes nobody (listeners sleep on their
    /// next fruitless pull).
    pub fn set_active(&self, active: bool) {
        if active && !self.signal.active() {
            for task in &*self.listeners.lock() {
                task.reschedule();
            }
        }
        self.signal.set_active(active);
    }

    /// Equivalent of `set_active(true)`.
    pub fn wake(&self) {
        self.set_active(true);
    }

    /// Equivalent of `set_active(false)`.
    pub fn sleep(&self) {
        self.set_active(false);
    }

    /// Register a task to wake on the inactive-to-active edge.
    pub fn add_listener(&self, task: &TaskHandle) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|t| Arc::ptr_eq(t, task)) {
            listeners.push(Arc::clone(task));
        }
    }

    /// Remove a previously registered task.
    pub fn remove_listener(&self, task: &TaskHandle) {
        self.listeners.lock().retain(|t| !Arc::ptr_eq(t, task));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sched::task::Task;

    #[test]
    fn signal_bit_semantics() {
        let notifier = Notifier::new();
        let signal = notifier.signal();
        assert!(!signal.active());
        notifier.set_active(true);
        assert!(signal.active());
        notifier.set_active(false);
        assert!(!signal.active());
    }

    #[test]
    fn constant_signals() {
        assert!(!NotifierSignal::idle().active());
        assert!(NotifierSignal::busy().active());
        assert!(NotifierSignal::busy().always_active());
        assert!(NotifierSignal::conflicted().active());
        assert!(NotifierSignal::conflicted().is_conflicted());
    }

    #[test]
    fn merge_same_word_ors_masks() {
        let notifier = Notifier::new();
        let mut a = notifier.signal();
        let b = notifier.signal();
        a.merge(&b);
        assert_eq!(a, notifier.signal());
        // idle is the identity
        let mut idle = NotifierSignal::idle();
        idle.merge(&notifier.signal());
        assert_eq!(idle, notifier.signal());
    }

    #[test]
    fn merge_different_words_conflicts() {
        let n1 = Notifier::new();
        let n2 = Notifier::new();
        let mut combined = n1.signal();
        combined.merge(&n2.signal());
        assert!(combined.is_conflicted());
        assert!(combined.active());
    }

    #[test]
    fn wake_marks_listeners_scheduled() {
        let notifier = Notifier::new();
        let task = Task::new();
        notifier.add_listener(&task);
        assert!(!task.scheduled());
        notifier.wake();
        assert!(task.scheduled());
        // 1 -> 1 transition does not re-wake
        notifier.wake();
        assert!(notifier.active());
        notifier.sleep();
        assert!(!notifier.active());
        notifier.remove_listener(&task);
        notifier.wake();
    }
}
