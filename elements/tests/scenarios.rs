// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! End-to-end scenarios over the parser, linker, scheduler and the standard
//! element library.

use config::errh::ErrorHandler;
use elements as _;
use pretty_assertions::assert_eq;
use router::{Hotswap, Router, llrpc, parse_router};
use std::time::Duration;

fn build(text: &str) -> Router {
    build_threads(text, 1)
}

fn build_threads(text: &str, nthreads: usize) -> Router {
    let mut errh = ErrorHandler::new();
    match parse_router(text, "test", nthreads, &mut errh) {
        Ok(router) => router,
        Err(_) => panic!("link failed:\n{}", errh.render()),
    }
}

fn read(router: &Router, element: &str, handler: &str) -> String {
    router.inner().read_handler(Some(element), handler).unwrap()
}

fn write(router: &Router, element: &str, handler: &str, value: &str) {
    router
        .inner()
        .write_handler(Some(element), handler, value)
        .unwrap();
}

#[test]
fn push_through_agnostic() {
    // Gen -> Null -> Discard
    let router = build("gen :: InfiniteSource(LIMIT 100) -> Null -> d :: Discard;");
    let quanta = router.run_until_idle(1000);
    assert_eq!(read(&router, "d", "count"), "100");
    // one scheduling quantum per packet at BURST 1
    assert_eq!(quanta, 100);
    assert_eq!(router.inner().reentry_drops(), 0);
}

#[test]
fn pull_through_agnostic_with_queue() {
    // Source -> Queue(16) -> Null -> Sink; the sink side is pull
    let router = build(
        "src :: InfiniteSource(LIMIT 100, BURST 2) -> q :: Queue(16) \
         -> Null -> u :: Unqueue(BURST 2) -> d :: Discard;",
    );
    router.run_until_idle(10_000);
    assert_eq!(read(&router, "d", "count"), "100");
    assert_eq!(read(&router, "q", "length"), "0");
    // capacity was never exceeded
    assert_eq!(read(&router, "q", "drops"), "0");
    let highwater: usize = read(&router, "q", "highwater").parse().unwrap();
    assert!(highwater <= 16, "highwater {highwater}");
    // everything is asleep now: the sink task waits on the empty notifier
    assert_eq!(router.run_until_idle(10), 0);
}

#[test]
fn notifier_wakeup_on_first_packet() {
    let router = build(
        "src :: InfiniteSource(LIMIT 1, ACTIVE false) -> q :: Queue(4) \
         -> u :: Unqueue -> d :: Discard;",
    );
    // the sink task runs once, finds the queue empty, and sleeps
    router.run_until_idle(100);
    assert_eq!(read(&router, "d", "count"), "0");
    assert_eq!(router.run_until_idle(10), 0);

    // activating the source pushes one packet: the queue's 0->1 edge
    // reschedules the sleeping sink task, which drains it
    write(&router, "src", "active", "true");
    router.run_until_idle(100);
    assert_eq!(read(&router, "d", "count"), "1");
    assert_eq!(read(&router, "q", "length"), "0");
    // and it is asleep again
    assert_eq!(router.run_until_idle(10), 0);
}

#[test]
fn scheduler_fairness_two_to_one() {
    let router = build(
        "a :: InfiniteSource -> ca :: Counter -> Discard;\n\
         b :: InfiniteSource -> cb :: Counter -> Discard;\n\
         ScheduleInfo(a 2, b 1);",
    );
    let n = 3000;
    assert_eq!(router.run_until_idle(n), n);
    let ca: i64 = read(&router, "ca", "count").parse().unwrap();
    let cb: i64 = read(&router, "cb", "count").parse().unwrap();
    assert_eq!(ca + cb, 3000);
    // 2x tickets gets 2N/3 of the runs, within a small constant
    assert!((ca - 2000).abs() <= 4, "ca {ca} cb {cb}");
}

#[test]
fn schedule_info_scales_through_compounds() {
    // outer factor 4 times inner 0.5 = effective 2
    let router = build(
        "elementclass Gen { i :: InfiniteSource -> output; ScheduleInfo(i 0.5); }\n\
         c :: Gen -> ca :: Counter -> Discard;\n\
         b :: InfiniteSource -> cb :: Counter -> Discard;\n\
         ScheduleInfo(c 4);",
    );
    assert_eq!(router.run_until_idle(3000), 3000);
    let ca: i64 = read(&router, "ca", "count").parse().unwrap();
    let cb: i64 = read(&router, "cb", "count").parse().unwrap();
    assert!((ca - 2 * cb).abs() <= 8, "ca {ca} cb {cb}");
}

#[test]
fn timers_fire_in_expiry_order() {
    let router = build(
        "fast :: TimedSource(2ms, LIMIT 3) -> c1 :: Counter -> Discard;\n\
         slow :: TimedSource(50ms, LIMIT 1) -> c2 :: Counter -> Discard;",
    );
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        router.run_until_idle(100);
        let c1: u64 = read(&router, "c1", "count").parse().unwrap();
        let c2: u64 = read(&router, "c2", "count").parse().unwrap();
        if c2 >= 1 {
            // every fast firing precedes the slow one
            assert_eq!(c1, 3);
            break;
        }
        assert!(std::time::Instant::now() < deadline, "timers never fired");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn timed_sink_paces_pulls() {
    let router = build(
        "InfiniteSource(LIMIT 10, BURST 10) -> q :: Queue(16) -> snk :: TimedSink(2ms);",
    );
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        router.run_until_idle(100);
        let count: u64 = read(&router, "snk", "count").parse().unwrap();
        if count >= 10 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "sink starved");
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(read(&router, "q", "length"), "0");
}

#[test]
fn rate_handler_live_reconfigure() {
    let router = build("rs :: RatedSource(RATE 1000) -> Discard;");
    assert_eq!(read(&router, "rs", "rate"), "1000");
    write(&router, "rs", "rate", "2000");
    assert_eq!(read(&router, "rs", "rate"), "2000");
    let config = read(&router, "rs", "config");
    assert!(config.contains("RATE 2000"), "config: {config}");
    // a bad write leaves the old value in place
    assert!(
        router
            .inner()
            .write_handler(Some("rs"), "rate", "not-a-rate")
            .is_err()
    );
    assert_eq!(read(&router, "rs", "rate"), "2000");
}

#[test]
fn tee_clones_and_counters_see_copies() {
    let router = build(
        "InfiniteSource(LIMIT 5) -> t :: Tee(3);\n\
         t[0] -> c0 :: Counter -> Discard;\n\
         t[1] -> c1 :: Counter -> Discard;\n\
         t[2] -> c2 :: Counter -> Discard;",
    );
    router.run_until_idle(100);
    for counter in ["c0", "c1", "c2"] {
        assert_eq!(read(&router, counter, "count"), "5");
    }
}

#[test]
fn paint_and_paint_switch_route_by_color() {
    let router = build(
        "InfiniteSource(LIMIT 4) -> Paint(2) -> ps :: PaintSwitch;\n\
         ps[0] -> z :: Counter -> Discard;\n\
         ps[1] -> o :: Counter -> Discard;\n\
         ps[2] -> tw :: Counter -> Discard;",
    );
    router.run_until_idle(100);
    assert_eq!(read(&router, "z", "count"), "0");
    assert_eq!(read(&router, "o", "count"), "0");
    assert_eq!(read(&router, "tw", "count"), "4");
}

#[test]
fn switch_moves_traffic_at_runtime() {
    let router = build(
        "src :: InfiniteSource(LIMIT 10, ACTIVE false) -> sw :: Switch(0);\n\
         sw[0] -> a :: Counter -> Discard;\n\
         sw[1] -> b :: Counter -> Discard;",
    );
    write(&router, "src", "active", "true");
    router.run_until_idle(100);
    assert_eq!(read(&router, "a", "count"), "10");

    write(&router, "sw", "switch", "1");
    assert_eq!(read(&router, "sw", "switch"), "1");
    write(&router, "src", "reset", "");
    router.run_until_idle(100);
    assert_eq!(read(&router, "b", "count"), "10");

    // out-of-range writes are rejected
    assert!(router.inner().write_handler(Some("sw"), "switch", "7").is_err());
}

#[test]
fn switch_llrpc() {
    let router = build(
        "InfiniteSource(ACTIVE false) -> sw :: Switch(0); sw[0] -> Discard; sw[1] -> Discard;",
    );
    let mut data = [0u8; 4];
    router.inner().llrpc("sw", llrpc::GET_SWITCH, &mut data).unwrap();
    assert_eq!(llrpc::read_u32(&data).unwrap(), 0);
    llrpc::write_u32(&mut data, 1).unwrap();
    router.inner().llrpc("sw", llrpc::SET_SWITCH, &mut data).unwrap();
    assert_eq!(read(&router, "sw", "switch"), "1");
}

#[test]
fn counter_llrpc_and_byte_count() {
    let router = build("InfiniteSource(LIMIT 3, DATA \"abcd\") -> c :: Counter -> Discard;");
    router.run_until_idle(100);
    assert_eq!(read(&router, "c", "byte_count"), "12");
    let mut data = [0u8; 8];
    router.inner().llrpc("c", llrpc::GET_COUNT, &mut data).unwrap();
    assert_eq!(llrpc::read_u64(&data).unwrap(), 3);
    let err = router.inner().llrpc("c", llrpc::SET_SWITCH, &mut data).unwrap_err();
    assert_eq!(err, router::errno::ENOTSUP);
    let err = router
        .inner()
        .llrpc("nonesuch", llrpc::GET_COUNT, &mut data)
        .unwrap_err();
    assert_eq!(err, router::errno::ENOENT);
}

#[test]
fn annotation_info_rejects_overlap() {
    let mut errh = ErrorHandler::new();
    let result = parse_router(
        "AnnotationInfo(flow 16 4, mark 18 2); Idle;",
        "test",
        1,
        &mut errh,
    );
    assert!(result.is_err());
    assert!(errh.render().contains("overlap"), "{}", errh.render());

    // disjoint claims configure fine
    let router = build("AnnotationInfo(flow 16 4, mark 20 2); Idle;");
    drop(router);
}

#[test]
fn queue_live_reconfigure_capacity() {
    let router = build("InfiniteSource(ACTIVE false) -> q :: Queue(8) -> Unqueue -> Discard;");
    assert_eq!(read(&router, "q", "capacity"), "8");
    let outcome = {
        let mut errh = ErrorHandler::new();
        router
            .live_reconfigure(
                "InfiniteSource(ACTIVE false) -> q :: Queue(32) -> Unqueue -> Discard;",
                "test",
                &mut errh,
            )
            .unwrap()
    };
    assert!(matches!(outcome, Hotswap::Applied));
    assert_eq!(read(&router, "q", "capacity"), "32");
    // generation moved
    assert!(router.inner().generation() > 1);
}

#[test]
fn structurally_different_config_is_incompatible() {
    let router = build("InfiniteSource(ACTIVE false) -> q :: Queue(8) -> Unqueue -> Discard;");
    let mut errh = ErrorHandler::new();
    let outcome = router
        .live_reconfigure(
            "InfiniteSource(ACTIVE false) -> q :: Null -> Discard;",
            "test",
            &mut errh,
        )
        .unwrap();
    assert!(matches!(outcome, Hotswap::Incompatible(_)));
    // untouched
    assert_eq!(read(&router, "q", "capacity"), "8");
}

#[test]
fn hotswap_rebuild_migrates_queue_contents() {
    // fill a queue, then stand up a replacement router and move state over
    let old = build(
        "src :: InfiniteSource(LIMIT 6, BURST 6) -> q :: Queue(16) -> TimedSink(10s);",
    );
    old.run_until_idle(100);
    assert_eq!(read(&old, "q", "length"), "6");

    let new = build(
        "src :: InfiniteSource(ACTIVE false) -> q :: Queue(16) -> TimedSink(10s);",
    );
    let mut errh = ErrorHandler::new();
    new.take_state_from(&old, &mut errh);
    assert_eq!(read(&new, "q", "length"), "6");
    assert_eq!(read(&old, "q", "length"), "0");
}

#[test]
fn driver_manager_scripts_stop_events() {
    let router = build(
        "src :: InfiniteSource(LIMIT 5, STOP true) -> c :: Counter -> d :: Discard;\n\
         DriverManager(wait, wait, stop);",
    );
    // the source exhausts and requests a stop; the script wants two
    router.run_until_idle(100);
    assert_eq!(read(&router, "c", "count"), "5");
    assert!(!router.inner().driver_done());
    assert_eq!(router.inner().stop_requests(), 1);

    router.please_stop();
    assert!(router.inner().driver_done());
}

#[test]
fn default_stop_behavior_without_manager() {
    let router = build("src :: InfiniteSource(LIMIT 2, STOP true) -> Discard;");
    router.run_until_idle(100);
    assert!(router.inner().driver_done());
}

#[test]
fn multithreaded_run_with_pinning() {
    let router = build_threads(
        "src :: InfiniteSource(LIMIT 500, BURST 10, STOP true) -> q :: Queue(64) \
         -> u :: Unqueue(BURST 10) -> c :: Counter -> Discard;\n\
         StaticThreadSched(src 0, u 1);",
        2,
    );
    // run() returns once the source's stop request lands
    router.run();
    let delivered: u64 = read(&router, "c", "count").parse().unwrap();
    let left: u64 = read(&router, "q", "length").parse().unwrap();
    let drops: u64 = read(&router, "q", "drops").parse().unwrap();
    assert_eq!(delivered + left + drops, 500);
}
