// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `Queue`: the push-to-pull bridge.
//!
//! Upstream pushes land in a bounded ring; downstream pulls drain it. The
//! queue owns the empty notifier downstream pull tasks sleep on: the signal
//! is active exactly while the queue holds packets, and the empty-to-
//! nonempty edge reschedules every listener.

use config::args::{Arguments, parse_usize};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use packet::Packet;
use parking_lot::Mutex;
use router::element::{Element, ElementError};
use router::handler::{Handler, HandlerError, HandlerFlags, HandlerRegistry};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::sched::notifier::Notifier;
use router::{Context, errno, llrpc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::trace;

const DEFAULT_CAPACITY: usize = 1000;

/// A bounded FIFO with a push input, a pull output and an empty notifier.
/// Thread-safe: this is the one element packets legally cross threads
/// through.
pub struct Queue {
    ring: Mutex<VecDeque<Packet>>,
    capacity: AtomicUsize,
    drops: AtomicU64,
    highwater: AtomicUsize,
    notifier: Notifier,
}

impl Default for Queue {
    fn default() -> Self {
        Queue::new()
    }
}

impl Queue {
    /// An empty queue with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Queue {
            ring: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(DEFAULT_CAPACITY),
            drops: AtomicU64::new(0),
            highwater: AtomicUsize::new(0),
            notifier: Notifier::new(),
        }
    }

    /// Packets currently queued.
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Packets dropped because the ring was full.
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Highest occupancy seen.
    pub fn highwater(&self) -> usize {
        self.highwater.load(Ordering::Relaxed)
    }

    fn enqueue(&self, packet: Packet) {
        let mut ring = self.ring.lock();
        if ring.len() >= self.capacity() {
            drop(ring);
            self.drops.fetch_add(1, Ordering::Relaxed);
            trace!("queue full, packet dropped");
            packet.kill();
            return;
        }
        ring.push_back(packet);
        let len = ring.len();
        drop(ring);
        self.highwater.fetch_max(len, Ordering::Relaxed);
        if len == 1 {
            // empty -> nonempty: wake sleeping consumers
            self.notifier.wake();
        }
    }

    fn dequeue(&self) -> Option<Packet> {
        let mut ring = self.ring.lock();
        let packet = ring.pop_front();
        let now_empty = ring.is_empty();
        drop(ring);
        if now_empty {
            self.notifier.sleep();
        }
        packet
    }
}

fn queue_read(el: &dyn Element, _cx: &Context<'_>, h: &Handler) -> String {
    el.downcast_ref::<Queue>().map_or_else(String::new, |q| {
        match h.user_data {
            0 => q.len().to_string(),
            1 => q.capacity().to_string(),
            2 => q.drops().to_string(),
            _ => q.highwater().to_string(),
        }
    })
}

fn queue_reset_counts_write(
    el: &mut dyn Element,
    _value: &str,
    _cx: &Context<'_>,
    _h: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    if let Some(q) = el.downcast_mut::<Queue>() {
        q.drops.store(0, Ordering::Relaxed);
        q.highwater.store(q.len(), Ordering::Relaxed);
    }
    Ok(())
}

fn queue_reset_write(
    el: &mut dyn Element,
    value: &str,
    cx: &Context<'_>,
    h: &Handler,
    errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    if let Some(q) = el.downcast_mut::<Queue>() {
        loop {
            let Some(packet) = q.dequeue() else { break };
            packet.kill();
        }
    }
    queue_reset_counts_write(el, value, cx, h, errh)
}

impl Element for Queue {
    fn class_name(&self) -> &'static str {
        "Queue"
    }

    fn port_count(&self) -> &'static str {
        "1/1"
    }

    fn processing(&self) -> &'static str {
        "h/l"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let mut capacity = DEFAULT_CAPACITY;
        if let Some(text) = args.keyword("CAPACITY").or_else(|| args.positional(0)) {
            match parse_usize(text) {
                Ok(0) => {
                    errh.error("CAPACITY must be positive");
                    return Err(ElementError);
                }
                Ok(n) => capacity = n,
                Err(e) => {
                    errh.error(format!("CAPACITY: {e}"));
                    return Err(ElementError);
                }
            }
        }
        if let Err(e) = args.check_keywords(1, &["CAPACITY"]) {
            errh.error(e);
            return Err(ElementError);
        }
        self.capacity.store(capacity, Ordering::Relaxed);
        Ok(())
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn push(&mut self, _cx: &Context<'_>, _port: usize, packet: Packet) {
        self.enqueue(packet);
    }

    fn pull(&mut self, _cx: &Context<'_>, _port: usize) -> Option<Packet> {
        self.dequeue()
    }

    fn empty_notifier(&self) -> Option<&Notifier> {
        Some(&self.notifier)
    }

    fn take_state(&mut self, old: &mut dyn Element, errh: &mut ErrorHandler) {
        let Some(old_queue) = old.downcast_mut::<Queue>() else {
            return;
        };
        let mut moved = 0usize;
        while let Some(packet) = old_queue.dequeue() {
            if self.len() >= self.capacity() {
                packet.kill();
                self.drops.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.enqueue(packet);
            moved += 1;
        }
        if moved > 0 {
            trace!(moved, "queue contents migrated");
        }
        let _ = errh;
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("length", 0, queue_read);
        reg.add_read("capacity", 1, queue_read);
        reg.add_read("drops", 2, queue_read);
        reg.add_read("highwater", 3, queue_read);
        reg.add_write("reset_counts", 0, queue_reset_counts_write);
        reg.add_write("reset", 0, queue_reset_write);
        reg.mark("reset_counts", HandlerFlags::BUTTON);
        reg.mark("reset", HandlerFlags::BUTTON);
    }

    fn llrpc(&mut self, cmd: u32, data: &mut [u8]) -> Result<(), i32> {
        match cmd {
            llrpc::GET_COUNT => llrpc::write_u64(data, self.len() as u64),
            _ => Err(errno::ENOTSUP),
        }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static QUEUE_CLASS: ElementClass = ElementClass::new("Queue", || Box::new(Queue::new()));
