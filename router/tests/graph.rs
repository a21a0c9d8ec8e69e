// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Linker and handler-plane tests over small purpose-built elements.

use config::args::{Arguments, parse_u64};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use packet::Packet;
use pretty_assertions::assert_eq;
use router::element::{Element, ElementError};
use router::handler::{
    Handler, HandlerError, HandlerRegistry, reconfigure_keyword_read, reconfigure_keyword_write,
};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::sched::task::{Task, TaskHandle};
use router::{Context, Visit, ino, parse_router};

/// Pushes COUNT packets from a task, then goes quiet.
#[derive(Default)]
struct TSource {
    count: u64,
    emitted: u64,
    task: Option<TaskHandle>,
}

impl Element for TSource {
    fn class_name(&self) -> &'static str {
        "TSource"
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
        let mut count = 1;
        if let Some(text) = args.keyword("COUNT").or_else(|| args.positional(0)) {
            match parse_u64(text) {
                Ok(n) => count = n,
                Err(e) => {
                    errh.error(e);
                    return Err(ElementError);
                }
            }
        }
        self.count = count;
        Ok(())
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        let task = Task::new();
        cx.initialize_task(&task, true);
        self.task = Some(task);
        Ok(())
    }

    fn run_task(&mut self, cx: &Context<'_>, task: &TaskHandle) -> bool {
        if self.emitted >= self.count {
            return false;
        }
        if let Ok(packet) = Packet::from_data(&[0u8; 32]) {
            self.emitted += 1;
            cx.push(0, packet);
        }
        if self.emitted < self.count {
            task.fast_reschedule();
        }
        true
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("emitted", 0, |el, _cx, _h| {
            el.downcast_ref::<TSource>()
                .map_or_else(String::new, |s| s.emitted.to_string())
        });
        reg.add_read_write(
            "count",
            0,
            reconfigure_keyword_read,
            reconfigure_keyword_write,
        );
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TSOURCE: ElementClass = ElementClass::new("TSource", || Box::new(TSource::default()));

/// Counts and swallows pushed packets.
#[derive(Default)]
struct TSink {
    received: u64,
}

fn tsink_received_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<TSink>()
        .map_or_else(String::new, |s| s.received.to_string())
}

impl Element for TSink {
    fn class_name(&self) -> &'static str {
        "TSink"
    }

    fn port_count(&self) -> &'static str {
        "1/0"
    }

    fn processing(&self) -> &'static str {
        "h/h"
    }

    fn push(&mut self, _cx: &Context<'_>, _port: usize, packet: Packet) {
        self.received += 1;
        packet.kill();
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("received", 0, tsink_received_read);
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TSINK: ElementClass = ElementClass::new("TSink", || Box::new(TSink::default()));

/// Agnostic no-op with two ports on each side, port-respecting flow.
#[derive(Default)]
struct TWire;

impl Element for TWire {
    fn class_name(&self) -> &'static str {
        "TWire"
    }

    fn port_count(&self) -> &'static str {
        "1-2/1-2"
    }

    fn flow_code(&self) -> &'static str {
        "#/#"
    }

    fn push(&mut self, cx: &Context<'_>, port: usize, packet: Packet) {
        cx.push(port, packet);
    }

    fn pull(&mut self, cx: &Context<'_>, port: usize) -> Option<Packet> {
        cx.pull(port)
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TWIRE: ElementClass = ElementClass::new("TWire", || Box::new(TWire));

/// A pull-only hole (never yields packets).
#[derive(Default)]
struct TPullEnd;

impl Element for TPullEnd {
    fn class_name(&self) -> &'static str {
        "TPullEnd"
    }

    fn port_count(&self) -> &'static str {
        "1/0"
    }

    fn processing(&self) -> &'static str {
        "l/l"
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TPULLEND: ElementClass = ElementClass::new("TPullEnd", || Box::new(TPullEnd));

/// A portless element whose timer is driven by handlers; records firings.
#[derive(Default)]
struct TTimerProbe {
    timer: Option<router::TimerHandle>,
    fired: u64,
}

impl Element for TTimerProbe {
    fn class_name(&self) -> &'static str {
        "TTimerProbe"
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        let timer = router::Timer::new();
        cx.initialize_timer(&timer);
        self.timer = Some(timer);
        Ok(())
    }

    fn run_timer(&mut self, _cx: &Context<'_>, _timer: &router::TimerHandle) {
        self.fired += 1;
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read("fired", 0, |el, _cx, _h| {
            el.downcast_ref::<TTimerProbe>()
                .map_or_else(String::new, |t| t.fired.to_string())
        });
        reg.add_write("schedule_ms", 0, |el, value, _cx, _h, _errh| {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| HandlerError::Invalid(value.to_string()))?;
            if let Some(probe) = el.downcast_mut::<TTimerProbe>()
                && let Some(timer) = &probe.timer
            {
                timer.schedule_after(std::time::Duration::from_millis(ms));
            }
            Ok(())
        });
        reg.add_write("unschedule", 0, |el, _value, _cx, _h, _errh| {
            if let Some(probe) = el.downcast_mut::<TTimerProbe>()
                && let Some(timer) = &probe.timer
            {
                timer.unschedule();
            }
            Ok(())
        });
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TTIMERPROBE: ElementClass =
    ElementClass::new("TTimerProbe", || Box::new(TTimerProbe::default()));

fn build(text: &str) -> router::Router {
    let mut errh = ErrorHandler::new();
    match parse_router(text, "test", 1, &mut errh) {
        Ok(router) => router,
        Err(_) => panic!("link failed:\n{}", errh.render()),
    }
}

fn build_err(text: &str) -> String {
    let mut errh = ErrorHandler::new();
    match parse_router(text, "test", 1, &mut errh) {
        Ok(_) => panic!("link unexpectedly succeeded"),
        Err(_) => errh.render(),
    }
}

#[test]
fn push_chain_delivers() {
    let router = build("TSource(COUNT 7) -> TWire -> snk :: TSink;");
    let quanta = router.run_until_idle(100);
    assert_eq!(quanta, 7);
    assert_eq!(router.inner().read_handler(Some("snk"), "received").unwrap(), "7");
}

#[test]
fn agnostic_ports_resolve_push_from_source() {
    let router = build("TSource -> w :: TWire -> TSink;");
    let ports = router.inner().read_handler(Some("w"), "ports").unwrap();
    assert!(ports.contains("0: push"));
}

#[test]
fn unknown_class_is_a_link_error() {
    let rendered = build_err("Frobnicator -> TSink;");
    assert!(rendered.contains("undeclared element 'Frobnicator'"));
}

#[test]
fn push_pull_conflict_is_detected() {
    // push-only source feeding a pull-only sink cannot type
    let rendered = build_err("TSource -> TPullEnd;");
    assert!(rendered.contains("push/pull conflict") || rendered.contains("conflict"));
}

#[test]
fn double_connected_push_output_is_an_error() {
    let rendered = build_err("s :: TSource; s -> TSink; s -> TSink;");
    assert!(rendered.contains("connected 2 times"));
}

#[test]
fn unconnected_push_output_is_an_error() {
    let rendered = build_err("s :: TSource;");
    assert!(rendered.contains("has 0 output(s)"));
}

#[test]
fn port_count_range_is_enforced() {
    let rendered = build_err(
        "s :: TSource; w :: TWire; s -> [0]w; TSource -> [1]w; TSource -> [2]w; w -> TSink; w[1] -> TSink; w[2] -> TSink;",
    );
    assert!(rendered.contains("allows 1-2/1-2"));
}

#[test]
fn reconfigure_keyword_handler_round_trips() {
    let router = build("src :: TSource(COUNT 3) -> TSink;");
    let inner = router.inner();
    assert_eq!(inner.read_handler(Some("src"), "count").unwrap(), "3");
    inner.write_handler(Some("src"), "count", "9").unwrap();
    assert_eq!(inner.read_handler(Some("src"), "count").unwrap(), "9");
    // the config handler reflects the rewritten configuration
    let config = inner.read_handler(Some("src"), "config").unwrap();
    assert!(config.contains("COUNT 9"));
    // and the element actually runs with it
    let quanta = router.run_until_idle(100);
    assert_eq!(quanta, 9);
}

#[test]
fn default_handlers_exist() {
    let router = build("zed :: TSource -> TSink;");
    let inner = router.inner();
    assert_eq!(inner.read_handler(Some("zed"), "name").unwrap(), "zed");
    assert_eq!(inner.read_handler(Some("zed"), "class").unwrap(), "TSource");
    let handlers = inner.read_handler(Some("zed"), "handlers").unwrap();
    assert!(handlers.contains("config\trw"));
    assert!(handlers.contains("emitted\tr"));
}

#[test]
fn global_handlers() {
    let router = build("TSource -> TSink;");
    let inner = router.inner();
    assert_eq!(inner.read_handler(None, "list").unwrap(), "2\nTSource@1\nTSink@2\n");
    assert!(inner.read_handler(None, "config").unwrap().contains("TSource"));
    assert!(inner.read_handler(None, "flatconfig").unwrap().contains("TSource@1"));
    assert!(!inner.driver_done());
    inner.write_handler(None, "stop", "").unwrap();
    assert!(inner.driver_done());
}

#[test]
fn handler_errors_map_to_errno() {
    let router = build("s :: TSource -> TSink;");
    let inner = router.inner();
    let err = inner.read_handler(Some("s"), "nonesuch").unwrap_err();
    assert_eq!(err.to_errno(), router::errno::ENOENT);
    let err = inner.write_handler(Some("s"), "emitted", "1").unwrap_err();
    assert!(matches!(err, HandlerError::NotWritable));
    let err = inner.write_handler(Some("s"), "count", "bogus").unwrap_err();
    assert_eq!(err.to_errno(), router::errno::EINVAL);
}

#[test]
fn handler_lookup_index_is_cacheable() {
    let router = build("s :: TSource(COUNT 2) -> TSink;");
    let inner = router.inner();
    let e = inner.eindex_of("s").unwrap();
    let idx = inner.find_handler(Some(e), "emitted").unwrap();
    assert_eq!(inner.call_read(idx).unwrap(), "0");
    router.run_until_idle(10);
    assert_eq!(inner.call_read(idx).unwrap(), "2");
}

#[test]
fn visit_downstream_finds_the_sink() {
    let router = build("s :: TSource -> TWire -> k :: TSink;");
    let inner = router.inner();
    let s = inner.eindex_of("s").unwrap();
    let k = inner.eindex_of("k").unwrap();
    let mut seen = Vec::new();
    inner.visit_downstream(s, 0, &mut |_el, e, _port| {
        seen.push(e);
        Visit::Continue
    });
    assert!(seen.contains(&k));
}

#[test]
fn ino_namespace_over_compound_names() {
    let router = build(
        "elementclass Pair { input -> TWire -> output }\n\
         p :: Pair; TSource -> p -> TSink;",
    );
    let inner = router.inner();
    let mut table = ino::InoTable::new();
    table.prepare(inner);

    // /p is a fake directory; /p/TWire@1 is real
    let p_dir = table.lookup(inner, ino::INO_ROOT, "p").unwrap();
    assert!(!ino::is_handler(p_dir));
    let wire_dir = table.lookup(inner, p_dir, "TWire@1").unwrap();
    let count_ino = table.lookup(inner, wire_dir, "name").unwrap();
    assert!(ino::is_handler(count_ino));
    let e = ino::handler_element(count_ino).unwrap();
    assert_eq!(inner.name(e), "p/TWire@1");

    // .e/<n> mirrors by index
    let edir = table.lookup(inner, ino::INO_ROOT, ".e").unwrap();
    let e0 = table.lookup(inner, edir, "0").unwrap();
    assert!(table.lookup(inner, e0, "name").is_ok());

    // .h has the global handlers
    let hdir = table.lookup(inner, ino::INO_ROOT, ".h").unwrap();
    let stop = table.lookup(inner, hdir, "stop").unwrap();
    assert!(ino::is_handler(stop));
    assert_eq!(ino::handler_element(stop), None);

    assert_eq!(table.lookup(inner, ino::INO_ROOT, "absent").unwrap_err(), router::errno::ENOENT);

    // stable for the generation
    let generation = table.generation();
    table.prepare(inner);
    assert_eq!(table.generation(), generation);

    // root listing
    let mut names = Vec::new();
    let mut pos = 0;
    table
        .readdir(inner, ino::INO_ROOT, &mut pos, &mut |name, _ino| {
            names.push(name.to_string());
            true
        })
        .unwrap();
    assert!(names.contains(&".e".to_string()));
    assert!(names.contains(&".h".to_string()));
    assert!(names.contains(&"p".to_string()));
    assert!(!names.contains(&"p/TWire@1".to_string()));
}

#[test]
fn timer_fires_once_at_the_rescheduled_time() {
    use std::time::{Duration, Instant};
    let router = build("t :: TTimerProbe;");
    let inner = router.inner();
    let fired = || -> u64 {
        inner
            .read_handler(Some("t"), "fired")
            .unwrap()
            .parse()
            .unwrap()
    };

    inner.write_handler(Some("t"), "schedule_ms", "30").unwrap();
    std::thread::sleep(Duration::from_millis(5));
    router.run_until_idle(10);
    assert_eq!(fired(), 0);

    // cancel before expiry, then re-arm for later
    inner.write_handler(Some("t"), "unschedule", "").unwrap();
    std::thread::sleep(Duration::from_millis(40));
    router.run_until_idle(10);
    assert_eq!(fired(), 0, "unscheduled timer fired anyway");

    let rearmed_at = Instant::now();
    inner.write_handler(Some("t"), "schedule_ms", "40").unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while fired() == 0 {
        assert!(Instant::now() < deadline, "rescheduled timer never fired");
        std::thread::sleep(Duration::from_millis(2));
        router.run_until_idle(10);
    }
    assert!(rearmed_at.elapsed() >= Duration::from_millis(40));

    // one-shot: it does not fire again
    std::thread::sleep(Duration::from_millis(50));
    router.run_until_idle(10);
    assert_eq!(fired(), 1);
}

#[test]
fn reentry_is_dropped_not_deadlocked() {
    // a push cycle with no queue in it: s -> w -> b -> w. The second entry
    // into w happens while w is still on the stack; the packet is dropped
    // and counted instead of deadlocking
    let router = build("s :: TSource(COUNT 1); w :: TWire; b :: TWire; s -> w -> b -> w;");
    let before = router.inner().reentry_drops();
    router.run_until_idle(10);
    assert_eq!(router.inner().reentry_drops(), before + 1);
}
