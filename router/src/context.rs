// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The element-side view of the router.
//!
//! Every call into an element carries a [`Context`] binding it to its
//! router and eindex. The context is how packets traverse edges —
//! [`Context::push`] hands a packet to the connected downstream input,
//! [`Context::pull`] asks the connected upstream output for one — and how
//! elements reach runtime services (tasks, timers, notifier discovery,
//! attachments, driver stop).

use crate::attachments::{FRAC_BITS, SCHEDULE_INFO, ScheduleInfoTable, THREAD_SCHED, ThreadSchedTable};
use crate::element::EIndex;
use crate::ports::PortKind;
use crate::router::{RouterInner, Visit};
use crate::sched::notifier::NotifierSignal;
use crate::sched::task::{DEFAULT_TICKETS, MAX_TICKETS, TaskHandle};
use crate::sched::timer::TimerHandle;
use packet::Packet;
use tracing::trace;

/// One element's bound view of its router.
pub struct Context<'a> {
    inner: &'a RouterInner,
    eindex: EIndex,
}

impl<'a> Context<'a> {
    pub(crate) fn new(inner: &'a RouterInner, eindex: EIndex) -> Self {
        Context { inner, eindex }
    }

    /// The router this element belongs to.
    #[must_use]
    pub fn router(&self) -> &'a RouterInner {
        self.inner
    }

    /// This element's index.
    #[must_use]
    pub fn eindex(&self) -> EIndex {
        self.eindex
    }

    /// This element's full hierarchical name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.inner.name(self.eindex)
    }

    /// This element's current configuration string.
    #[must_use]
    pub fn configuration(&self) -> String {
        self.inner.configuration(self.eindex)
    }

    /// Replace the stored configuration string (reconfigure handlers do).
    pub fn set_configuration(&self, config: String) {
        self.inner.set_configuration(self.eindex, config);
    }

    /// Number of connected input ports.
    #[must_use]
    pub fn ninputs(&self) -> usize {
        self.inner.meta(self.eindex).ninputs
    }

    /// Number of connected output ports.
    #[must_use]
    pub fn noutputs(&self) -> usize {
        self.inner.meta(self.eindex).noutputs
    }

    /// Resolved discipline of input `port`.
    #[must_use]
    pub fn input_kind(&self, port: usize) -> PortKind {
        self.inner.meta(self.eindex).in_kind[port]
    }

    /// Resolved discipline of output `port`.
    #[must_use]
    pub fn output_kind(&self, port: usize) -> PortKind {
        self.inner.meta(self.eindex).out_kind[port]
    }

    /// Hand `packet` to whatever is connected to output `port`. The
    /// downstream element runs synchronously on this call stack.
    ///
    /// A packet pushed to an unconnected output, or around a cycle back
    /// into an element already on this stack, is dropped and counted.
    pub fn push(&self, port: usize, packet: Packet) {
        let meta = self.inner.meta(self.eindex);
        match meta.out_adj.get(port).and_then(|adj| adj.first()) {
            Some(&(peer, peer_port)) => self.inner.deliver_push(peer, peer_port, packet),
            None => {
                trace!(
                    element = self.name(),
                    port, "push to unconnected output, packet dropped"
                );
                drop(packet);
            }
        }
    }

    /// Ask whatever is connected to input `port` for a packet. The
    /// upstream element runs synchronously on this call stack.
    #[must_use]
    pub fn pull(&self, port: usize) -> Option<Packet> {
        let meta = self.inner.meta(self.eindex);
        let &(peer, peer_port) = meta.in_adj.get(port)?.first()?;
        self.inner.deliver_pull(peer, peer_port)
    }

    /// Bind `task` to this element, apply scheduling parameters from the
    /// `ScheduleInfo` and `StaticThreadSched` tables, and optionally
    /// schedule it.
    pub fn initialize_task(&self, task: &TaskHandle, start_scheduled: bool) {
        let home = self.home_thread();
        task.bind(self.eindex, self.inner.thread(home));
        if let Some(info) = self.inner.attachment::<ScheduleInfoTable>(SCHEDULE_INFO) {
            let factor = info.factor_for(self.name());
            let tickets = (u64::from(DEFAULT_TICKETS).saturating_mul(factor)) >> FRAC_BITS;
            #[allow(clippy::cast_possible_truncation)]
            task.set_tickets(tickets.min(u64::from(MAX_TICKETS)) as u32);
        }
        if start_scheduled || task.scheduled() {
            task.reschedule();
        }
    }

    /// Bind `timer` to this element on its home thread.
    pub fn initialize_timer(&self, timer: &TimerHandle) {
        timer.bind(self.eindex, self.inner.thread(self.home_thread()));
    }

    fn home_thread(&self) -> usize {
        let pinned = self
            .inner
            .attachment::<ThreadSchedTable>(THREAD_SCHED)
            .and_then(|t| t.thread_for(self.name()));
        let home = pinned.unwrap_or_else(|| self.inner.home_thread(self.eindex));
        let home = home.min(self.inner.nthreads().saturating_sub(1));
        self.inner.set_home_thread(self.eindex, home);
        home
    }

    /// Find the nearest upstream empty notifiers reachable from input
    /// `port`, register `task` as a listener on each, and return the
    /// aggregated signal. When no notifier exists upstream the result is
    /// the always-active signal: the consumer can never sleep safely.
    #[must_use]
    pub fn upstream_empty_signal(&self, port: usize, task: &TaskHandle) -> NotifierSignal {
        let mut signal = NotifierSignal::idle();
        let mut found = false;
        self.inner
            .visit_upstream(self.eindex, port, &mut |el, _eindex, _oport| {
                if let Some(notifier) = el.empty_notifier() {
                    notifier.add_listener(task);
                    signal.merge(&notifier.signal());
                    found = true;
                    Visit::Done
                } else {
                    Visit::Continue
                }
            });
        if found { signal } else { NotifierSignal::busy() }
    }

    /// Ask the driver to stop (subject to a driver-manager's script).
    pub fn please_stop_driver(&self) {
        self.inner.please_stop_driver();
    }
}
