// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet sources.
//!
//! `InfiniteSource` floods as fast as the scheduler lets it (task-driven in
//! push context, generate-on-demand in pull context). `TimedSource` emits
//! on a timer. `RatedSource` emits at a configured packets-per-second rate.

use config::args::{Arguments, parse_bool, parse_interval, parse_u64};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use packet::Packet;
use router::element::{Element, ElementError};
use router::handler::{
    Handler, HandlerError, HandlerFlags, HandlerRegistry, reconfigure_keyword_read,
    reconfigure_keyword_write,
};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::sched::task::{Task, TaskHandle};
use router::sched::timer::{Timer, TimerHandle};
use router::{Context, PortKind};
use std::time::Duration;
use tracing::debug;

const DEFAULT_DATA_LEN: usize = 64;

fn default_data() -> Vec<u8> {
    vec![0; DEFAULT_DATA_LEN]
}

fn parse_data(text: &str) -> Vec<u8> {
    let trimmed = text.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.as_bytes().to_vec()
}

/// Pushes copies of one packet as fast as it is scheduled, up to LIMIT.
///
/// Arguments: `DATA` (payload text), `LIMIT` (packet count, unlimited when
/// absent), `BURST` (packets per scheduling quantum), `ACTIVE` (start
/// emitting immediately), `STOP` (ask the driver to stop at the limit).
pub struct InfiniteSource {
    data: Vec<u8>,
    limit: Option<u64>,
    burst: u64,
    active: bool,
    stop: bool,
    count: u64,
    task: Option<TaskHandle>,
}

impl Default for InfiniteSource {
    fn default() -> Self {
        InfiniteSource {
            data: default_data(),
            limit: None,
            burst: 1,
            active: true,
            stop: false,
            count: 0,
            task: None,
        }
    }
}

impl InfiniteSource {
    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.count >= limit)
    }

    fn next_packet(&mut self) -> Option<Packet> {
        if !self.active || self.exhausted() {
            return None;
        }
        let packet = Packet::from_data(&self.data).ok()?;
        self.count += 1;
        Some(packet)
    }
}

fn infinite_count_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<InfiniteSource>()
        .map_or_else(String::new, |s| s.count.to_string())
}

fn infinite_reset_write(
    el: &mut dyn Element,
    _value: &str,
    _cx: &Context<'_>,
    _h: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    if let Some(s) = el.downcast_mut::<InfiniteSource>() {
        s.count = 0;
        if let Some(task) = &s.task {
            task.reschedule();
        }
    }
    Ok(())
}

fn infinite_active_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<InfiniteSource>()
        .map_or_else(String::new, |s| s.active.to_string())
}

fn infinite_active_write(
    el: &mut dyn Element,
    value: &str,
    _cx: &Context<'_>,
    _h: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    let active = parse_bool(value.trim()).map_err(|e| HandlerError::Invalid(e.to_string()))?;
    if let Some(s) = el.downcast_mut::<InfiniteSource>() {
        s.active = active;
        if active && let Some(task) = &s.task {
            task.reschedule();
        }
    }
    Ok(())
}

impl Element for InfiniteSource {
    fn class_name(&self) -> &'static str {
        "InfiniteSource"
    }

    fn port_count(&self) -> &'static str {
        "0/1"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        if let Err(e) = args.check_keywords(1, &["DATA", "LIMIT", "BURST", "ACTIVE", "STOP"]) {
            errh.error(e);
            return Err(ElementError);
        }
        if let Some(text) = args.keyword("DATA").or_else(|| args.positional(0)) {
            self.data = parse_data(text);
        }
        if let Some(text) = args.keyword("LIMIT") {
            match parse_u64(text) {
                Ok(limit) => self.limit = Some(limit),
                Err(e) => {
                    errh.error(format!("LIMIT: {e}"));
                    return Err(ElementError);
                }
            }
        }
        if let Some(text) = args.keyword("BURST") {
            match parse_u64(text) {
                Ok(burst) if burst > 0 => self.burst = burst,
                _ => {
                    errh.error("BURST must be a positive integer");
                    return Err(ElementError);
                }
            }
        }
        if let Some(text) = args.keyword("ACTIVE") {
            match parse_bool(text) {
                Ok(active) => self.active = active,
                Err(e) => {
                    errh.error(format!("ACTIVE: {e}"));
                    return Err(ElementError);
                }
            }
        }
        if let Some(text) = args.keyword("STOP") {
            match parse_bool(text) {
                Ok(stop) => self.stop = stop,
                Err(e) => {
                    errh.error(format!("STOP: {e}"));
                    return Err(ElementError);
                }
            }
        }
        Ok(())
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        if cx.output_kind(0) == PortKind::Push {
            let task = Task::new();
            cx.initialize_task(&task, self.active);
            self.task = Some(task);
        }
        Ok(())
    }

    fn run_task(&mut self, cx: &Context<'_>, task: &TaskHandle) -> bool {
        let mut emitted = 0u64;
        while emitted < self.burst {
            let Some(packet) = self.next_packet() else {
                break;
            };
            cx.push(0, packet);
            emitted += 1;
        }
        if self.exhausted() {
            debug!(element = cx.name(), count = self.count, "source limit reached");
            if self.stop {
                cx.please_stop_driver();
            }
        } else if self.active {
            task.fast_reschedule();
        }
        emitted > 0
    }

    fn pull(&mut self, _cx: &Context<'_>, _port: usize) -> Option<Packet> {
        self.next_packet()
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("count", 0, infinite_count_read);
        reg.add_write("reset", 0, infinite_reset_write);
        reg.mark("reset", HandlerFlags::BUTTON);
        reg.add_read_write("active", 0, infinite_active_read, infinite_active_write);
        reg.mark("active", HandlerFlags::CHECKBOX);
        reg.add_read_write(
            "limit",
            0,
            reconfigure_keyword_read,
            reconfigure_keyword_write,
        );
        reg.add_read_write(
            "burst",
            0,
            reconfigure_keyword_read,
            reconfigure_keyword_write,
        );
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static INFINITE_SOURCE_CLASS: ElementClass =
    ElementClass::new("InfiniteSource", || Box::new(InfiniteSource::default()));

/// Pushes one packet every INTERVAL.
///
/// Arguments: `INTERVAL` (default 500ms), `DATA`, `LIMIT`, `ACTIVE`.
pub struct TimedSource {
    interval: Duration,
    data: Vec<u8>,
    limit: Option<u64>,
    active: bool,
    count: u64,
    timer: Option<TimerHandle>,
}

impl Default for TimedSource {
    fn default() -> Self {
        TimedSource {
            interval: Duration::from_millis(500),
            data: default_data(),
            limit: None,
            active: true,
            count: 0,
            timer: None,
        }
    }
}

fn timed_count_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<TimedSource>()
        .map_or_else(String::new, |s| s.count.to_string())
}

impl Element for TimedSource {
    fn class_name(&self) -> &'static str {
        "TimedSource"
    }

    fn port_count(&self) -> &'static str {
        "0/1"
    }

    fn processing(&self) -> &'static str {
        "h/h"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        if let Err(e) = args.check_keywords(2, &["INTERVAL", "DATA", "LIMIT", "ACTIVE"]) {
            errh.error(e);
            return Err(ElementError);
        }
        if let Some(text) = args.keyword("INTERVAL").or_else(|| args.positional(0)) {
            match parse_interval(text) {
                Ok(interval) if !interval.is_zero() => self.interval = interval,
                _ => {
                    errh.error("INTERVAL must be a positive time");
                    return Err(ElementError);
                }
            }
        }
        if let Some(text) = args.keyword("DATA").or_else(|| args.positional(1)) {
            self.data = parse_data(text);
        }
        if let Some(text) = args.keyword("LIMIT") {
            match parse_u64(text) {
                Ok(limit) => self.limit = Some(limit),
                Err(e) => {
                    errh.error(format!("LIMIT: {e}"));
                    return Err(ElementError);
                }
            }
        }
        if let Some(text) = args.keyword("ACTIVE") {
            match parse_bool(text) {
                Ok(active) => self.active = active,
                Err(e) => {
                    errh.error(format!("ACTIVE: {e}"));
                    return Err(ElementError);
                }
            }
        }
        Ok(())
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        let timer = Timer::new();
        cx.initialize_timer(&timer);
        if self.active {
            timer.schedule_after(self.interval);
        }
        self.timer = Some(timer);
        Ok(())
    }

    fn run_timer(&mut self, cx: &Context<'_>, timer: &TimerHandle) {
        if !self.active || self.limit.is_some_and(|l| self.count >= l) {
            return;
        }
        if let Ok(packet) = Packet::from_data(&self.data) {
            self.count += 1;
            cx.push(0, packet);
        }
        if !self.limit.is_some_and(|l| self.count >= l) {
            timer.schedule_after(self.interval);
        }
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("count", 0, timed_count_read);
        reg.add_read_write(
            "interval",
            0,
            reconfigure_keyword_read,
            reconfigure_keyword_write,
        );
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TIMED_SOURCE_CLASS: ElementClass =
    ElementClass::new("TimedSource", || Box::new(TimedSource::default()));

/// Pushes at RATE packets per second, timer-paced.
///
/// Arguments: `RATE` (default 10/s), `DATA`, `LIMIT`, `ACTIVE`.
pub struct RatedSource {
    rate: u64,
    data: Vec<u8>,
    limit: Option<u64>,
    active: bool,
    count: u64,
    timer: Option<TimerHandle>,
}

impl Default for RatedSource {
    fn default() -> Self {
        RatedSource {
            rate: 10,
            data: default_data(),
            limit: None,
            active: true,
            count: 0,
            timer: None,
        }
    }
}

impl RatedSource {
    #[allow(clippy::cast_precision_loss)]
    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate as f64)
    }

    /// Current rate in packets per second.
    pub fn rate(&self) -> u64 {
        self.rate
    }
}

fn rated_count_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<RatedSource>()
        .map_or_else(String::new, |s| s.count.to_string())
}

impl Element for RatedSource {
    fn class_name(&self) -> &'static str {
        "RatedSource"
    }

    fn port_count(&self) -> &'static str {
        "0/1"
    }

    fn processing(&self) -> &'static str {
        "h/h"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        if let Err(e) = args.check_keywords(1, &["RATE", "DATA", "LIMIT", "ACTIVE"]) {
            errh.error(e);
            return Err(ElementError);
        }
        if let Some(text) = args.keyword("RATE").or_else(|| args.positional(0)) {
            match parse_u64(text) {
                Ok(rate) if rate > 0 => self.rate = rate,
                _ => {
                    errh.error("RATE must be a positive integer");
                    return Err(ElementError);
                }
            }
        }
        if let Some(text) = args.keyword("DATA") {
            self.data = parse_data(text);
        }
        if let Some(text) = args.keyword("LIMIT") {
            match parse_u64(text) {
                Ok(limit) => self.limit = Some(limit),
                Err(e) => {
                    errh.error(format!("LIMIT: {e}"));
                    return Err(ElementError);
                }
            }
        }
        if let Some(text) = args.keyword("ACTIVE") {
            match parse_bool(text) {
                Ok(active) => self.active = active,
                Err(e) => {
                    errh.error(format!("ACTIVE: {e}"));
                    return Err(ElementError);
                }
            }
        }
        Ok(())
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        let timer = Timer::new();
        cx.initialize_timer(&timer);
        if self.active {
            timer.schedule_after(self.period());
        }
        self.timer = Some(timer);
        Ok(())
    }

    fn run_timer(&mut self, cx: &Context<'_>, timer: &TimerHandle) {
        if !self.active || self.limit.is_some_and(|l| self.count >= l) {
            return;
        }
        if let Ok(packet) = Packet::from_data(&self.data) {
            self.count += 1;
            cx.push(0, packet);
        }
        if !self.limit.is_some_and(|l| self.count >= l) {
            // the new period applies from the next tick after a reconfigure
            timer.schedule_after(self.period());
        }
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("count", 0, rated_count_read);
        reg.add_read_write(
            "rate",
            0,
            reconfigure_keyword_read,
            reconfigure_keyword_write,
        );
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static RATED_SOURCE_CLASS: ElementClass =
    ElementClass::new("RatedSource", || Box::new(RatedSource::default()));
