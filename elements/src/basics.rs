// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The smallest elements: `Null`, `Idle`, `Discard`, `Counter`.

use config::args::Arguments;
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use packet::Packet;
use router::element::{Element, ElementError};
use router::handler::{Handler, HandlerError, HandlerFlags, HandlerRegistry};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::sched::notifier::NotifierSignal;
use router::sched::task::{Task, TaskHandle};
use router::{Context, PortKind, llrpc};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Passes every packet through unchanged. Agnostic; useful as glue and in
/// tests.
#[derive(Default)]
pub struct Null;

impl Element for Null {
    fn class_name(&self) -> &'static str {
        "Null"
    }

    fn port_count(&self) -> &'static str {
        "1/1"
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static NULL_CLASS: ElementClass = ElementClass::new("Null", || Box::new(Null));

/// Swallows everything quietly and never wakes up. Any number of agnostic
/// ports; pushes are dropped, pulls produce nothing.
#[derive(Default)]
pub struct Idle;

impl Element for Idle {
    fn class_name(&self) -> &'static str {
        "Idle"
    }

    fn port_count(&self) -> &'static str {
        "-/-"
    }

    fn push(&mut self, _cx: &Context<'_>, _port: usize, packet: Packet) {
        packet.kill();
    }

    fn pull(&mut self, _cx: &Context<'_>, _port: usize) -> Option<Packet> {
        None
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static IDLE_CLASS: ElementClass = ElementClass::new("Idle", || Box::new(Idle));

/// Drops every packet, counting them. On a pull input it runs its own task
/// and sleeps on the upstream empty signal.
pub struct Discard {
    count: u64,
    // keeps the task alive for as long as the element exists
    #[allow(dead_code)]
    task: Option<TaskHandle>,
    signal: NotifierSignal,
}

impl Default for Discard {
    fn default() -> Self {
        Discard::new()
    }
}

impl Discard {
    /// A fresh discard sink.
    #[must_use]
    pub fn new() -> Self {
        Discard {
            count: 0,
            task: None,
            signal: NotifierSignal::idle(),
        }
    }

    /// Packets discarded so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

fn discard_count_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<Discard>()
        .map_or_else(String::new, |d| d.count.to_string())
}

fn discard_reset_write(
    el: &mut dyn Element,
    _value: &str,
    _cx: &Context<'_>,
    _h: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    if let Some(d) = el.downcast_mut::<Discard>() {
        d.count = 0;
    }
    Ok(())
}

impl Element for Discard {
    fn class_name(&self) -> &'static str {
        "Discard"
    }

    fn port_count(&self) -> &'static str {
        "1/0"
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        if cx.input_kind(0) == PortKind::Pull {
            let task = Task::new();
            cx.initialize_task(&task, true);
            self.signal = cx.upstream_empty_signal(0, &task);
            self.task = Some(task);
        }
        Ok(())
    }

    fn push(&mut self, _cx: &Context<'_>, _port: usize, packet: Packet) {
        self.count += 1;
        packet.kill();
    }

    fn run_task(&mut self, cx: &Context<'_>, task: &TaskHandle) -> bool {
        match cx.pull(0) {
            Some(packet) => {
                self.count += 1;
                packet.kill();
                task.fast_reschedule();
                true
            }
            None => {
                if self.signal.active() {
                    task.fast_reschedule();
                }
                false
            }
        }
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("count", 0, discard_count_read);
        reg.add_write("reset_counts", 0, discard_reset_write);
        reg.mark("reset_counts", HandlerFlags::BUTTON);
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static DISCARD_CLASS: ElementClass = ElementClass::new("Discard", || Box::new(Discard::new()));

/// Counts packets and bytes passing through; agnostic pass-through.
pub struct Counter {
    count: AtomicU64,
    byte_count: AtomicU64,
}

impl Default for Counter {
    fn default() -> Self {
        Counter::new()
    }
}

impl Counter {
    /// A fresh counter.
    #[must_use]
    pub fn new() -> Self {
        Counter {
            count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
        }
    }

    /// Packets seen.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Bytes seen.
    pub fn byte_count(&self) -> u64 {
        self.byte_count.load(Ordering::Relaxed)
    }
}

fn counter_read(el: &dyn Element, _cx: &Context<'_>, h: &Handler) -> String {
    el.downcast_ref::<Counter>().map_or_else(String::new, |c| {
        if h.user_data == 0 {
            c.count().to_string()
        } else {
            c.byte_count().to_string()
        }
    })
}

fn counter_reset_write(
    el: &mut dyn Element,
    _value: &str,
    _cx: &Context<'_>,
    _h: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    if let Some(c) = el.downcast_mut::<Counter>() {
        c.count.store(0, Ordering::Relaxed);
        c.byte_count.store(0, Ordering::Relaxed);
    }
    Ok(())
}

impl Element for Counter {
    fn class_name(&self) -> &'static str {
        "Counter"
    }

    fn port_count(&self) -> &'static str {
        "1/1"
    }

    fn simple_action(&mut self, packet: Packet) -> Option<Packet> {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.byte_count
            .fetch_add(packet.len() as u64, Ordering::Relaxed);
        Some(packet)
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("count", 0, counter_read);
        reg.add_read("byte_count", 1, counter_read);
        reg.add_write("reset_counts", 0, counter_reset_write);
        reg.mark("reset_counts", HandlerFlags::BUTTON);
    }

    fn llrpc(&mut self, cmd: u32, data: &mut [u8]) -> Result<(), i32> {
        match cmd {
            llrpc::GET_COUNT => llrpc::write_u64(data, self.count()),
            llrpc::GET_BYTE_COUNT => llrpc::write_u64(data, self.byte_count()),
            _ => Err(router::errno::ENOTSUP),
        }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static COUNTER_CLASS: ElementClass = ElementClass::new("Counter", || Box::new(Counter::new()));

/// Shared helper for elements that log and drop a packet.
pub(crate) fn drop_packet(cx: &Context<'_>, why: &str, packet: Packet) {
    trace!(element = cx.name(), why, "packet dropped");
    packet.kill();
}

#[allow(unused)]
pub(crate) fn parse_no_args(
    class: &str,
    args: &Arguments,
    errh: &mut ErrorHandler,
) -> Result<(), ElementError> {
    if args.is_empty() {
        Ok(())
    } else {
        errh.error(format!("{class} takes no arguments"));
        Err(ElementError)
    }
}
