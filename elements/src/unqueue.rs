// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `Unqueue`: the pull-to-push bridge.

use config::args::{Arguments, parse_u64};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use router::element::{Element, ElementError};
use router::handler::{Handler, HandlerError, HandlerFlags, HandlerRegistry};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::sched::notifier::NotifierSignal;
use router::sched::task::{Task, TaskHandle};
use router::Context;

/// Task-driven bridge: pulls up to BURST packets per quantum from its pull
/// input and pushes them downstream. Sleeps on the nearest upstream empty
/// notifier; the producer's first enqueue wakes it.
pub struct Unqueue {
    burst: u64,
    count: u64,
    task: Option<TaskHandle>,
    signal: NotifierSignal,
}

impl Default for Unqueue {
    fn default() -> Self {
        Unqueue {
            burst: 1,
            count: 0,
            task: None,
            signal: NotifierSignal::idle(),
        }
    }
}

impl Unqueue {
    /// Packets moved so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

fn unqueue_count_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<Unqueue>()
        .map_or_else(String::new, |u| u.count.to_string())
}

fn unqueue_reset_write(
    el: &mut dyn Element,
    _value: &str,
    _cx: &Context<'_>,
    _h: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    if let Some(u) = el.downcast_mut::<Unqueue>() {
        u.count = 0;
    }
    Ok(())
}

impl Element for Unqueue {
    fn class_name(&self) -> &'static str {
        "Unqueue"
    }

    fn port_count(&self) -> &'static str {
        "1/1"
    }

    fn processing(&self) -> &'static str {
        "l/h"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        if let Err(e) = args.check_keywords(1, &["BURST"]) {
            errh.error(e);
            return Err(ElementError);
        }
        if let Some(text) = args.keyword("BURST").or_else(|| args.positional(0)) {
            match parse_u64(text) {
                Ok(burst) if burst > 0 => self.burst = burst,
                _ => {
                    errh.error("BURST must be a positive integer");
                    return Err(ElementError);
                }
            }
        }
        Ok(())
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        let task = Task::new();
        cx.initialize_task(&task, true);
        self.signal = cx.upstream_empty_signal(0, &task);
        self.task = Some(task);
        Ok(())
    }

    fn run_task(&mut self, cx: &Context<'_>, task: &TaskHandle) -> bool {
        let mut moved = 0u64;
        while moved < self.burst {
            match cx.pull(0) {
                Some(packet) => {
                    self.count += 1;
                    moved += 1;
                    cx.push(0, packet);
                }
                None => {
                    if self.signal.active() {
                        // producer refilled while we were looking
                        task.fast_reschedule();
                    }
                    return moved > 0;
                }
            }
        }
        task.fast_reschedule();
        true
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("count", 0, unqueue_count_read);
        reg.add_write("reset", 0, unqueue_reset_write);
        reg.mark("reset", HandlerFlags::BUTTON);
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static UNQUEUE_CLASS: ElementClass = ElementClass::new("Unqueue", || Box::new(Unqueue::default()));
