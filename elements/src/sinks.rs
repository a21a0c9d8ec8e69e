// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Timer-driven sinks.

use config::args::{Arguments, parse_interval};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use router::element::{Element, ElementError};
use router::handler::{
    Handler, HandlerRegistry, reconfigure_keyword_read, reconfigure_keyword_write,
};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::sched::timer::{Timer, TimerHandle};
use router::Context;
use std::time::Duration;

/// Pulls one packet every INTERVAL and drops it. The classic pacing sink
/// for pull-side graphs.
pub struct TimedSink {
    interval: Duration,
    count: u64,
    timer: Option<TimerHandle>,
}

impl Default for TimedSink {
    fn default() -> Self {
        TimedSink {
            interval: Duration::from_millis(500),
            count: 0,
            timer: None,
        }
    }
}

fn timed_sink_count_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<TimedSink>()
        .map_or_else(String::new, |s| s.count.to_string())
}

impl Element for TimedSink {
    fn class_name(&self) -> &'static str {
        "TimedSink"
    }

    fn port_count(&self) -> &'static str {
        "1/0"
    }

    fn processing(&self) -> &'static str {
        "l/l"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        if let Err(e) = args.check_keywords(1, &["INTERVAL"]) {
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
        Ok(())
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        let timer = Timer::new();
        cx.initialize_timer(&timer);
        timer.schedule_after(self.interval);
        self.timer = Some(timer);
        Ok(())
    }

    fn run_timer(&mut self, cx: &Context<'_>, timer: &TimerHandle) {
        if let Some(packet) = cx.pull(0) {
            self.count += 1;
            packet.kill();
        }
        timer.schedule_after(self.interval);
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("count", 0, timed_sink_count_read);
        reg.add_read_write(
            "interval",
            0,
            reconfigure_keyword_read,
            reconfigure_keyword_write,
        );
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TIMED_SINK_CLASS: ElementClass =
    ElementClass::new("TimedSink", || Box::new(TimedSink::default()));
