// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The router: element set, connection table, handler table, lifecycle.
//!
//! Elements live in slots. Whenever the engine calls into an element — a
//! push or pull delivery, a task or timer run, a handler invocation — the
//! element is taken out of its slot for the duration of the call, which
//! gives per-element exclusion without a global lock and makes synchronous
//! reentry (a cycle with no intervening queue) detectable: the packet is
//! dropped and counted instead of deadlocking.

use crate::context::Context;
use crate::element::{CleanupStage, EIndex, Element};
use crate::handler::{Handler, HandlerError, HandlerTable, Hooks};
use crate::ports::{FlowCode, PortKind};
use crate::sched::task::TaskHandle;
use crate::sched::thread::ThreadCore;
use crate::sched::timer::TimerHandle;
use ahash::AHashMap;
use config::errh::ErrorHandler;
use config::expand::FlatConfig;
use packet::Packet;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::thread::ThreadId;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Per-branch decision of a graph visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Stop searching along this branch.
    Done,
    /// Keep searching through this element (per its flow code).
    Continue,
}

/// Immutable per-element topology, fixed at link time.
pub(crate) struct ElementMeta {
    pub ninputs: usize,
    pub noutputs: usize,
    pub in_kind: Vec<PortKind>,
    pub out_kind: Vec<PortKind>,
    /// Sources per input port.
    pub in_adj: Vec<Vec<(EIndex, usize)>>,
    /// Targets per output port.
    pub out_adj: Vec<Vec<(EIndex, usize)>>,
    pub flow: FlowCode,
}

struct SlotState {
    element: Option<Box<dyn Element>>,
    holder: Option<ThreadId>,
}

/// The element's parking place; see the module docs for the discipline.
struct SlotCell {
    state: Mutex<SlotState>,
    cv: Condvar,
}

enum Entered {
    Taken(Box<dyn Element>),
    Reentry,
}

impl SlotCell {
    fn new(element: Box<dyn Element>) -> Self {
        SlotCell {
            state: Mutex::new(SlotState {
                element: Some(element),
                holder: None,
            }),
            cv: Condvar::new(),
        }
    }

    /// Take the element for a call. Blocks while another thread has it;
    /// reports reentry when this thread already does.
    fn enter(&self) -> Entered {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        loop {
            if let Some(element) = state.element.take() {
                state.holder = Some(me);
                return Entered::Taken(element);
            }
            match state.holder {
                Some(holder) if holder == me => return Entered::Reentry,
                Some(_) => self.cv.wait(&mut state),
                None => return Entered::Reentry, // slot permanently vacated
            }
        }
    }

    fn exit(&self, element: Box<dyn Element>) {
        let mut state = self.state.lock();
        state.element = Some(element);
        state.holder = None;
        drop(state);
        self.cv.notify_all();
    }
}

pub(crate) struct ElementSlot {
    pub name: String,
    pub class: String,
    cell: SlotCell,
    config: Mutex<String>,
    pub meta: ElementMeta,
    home_thread: AtomicUsize,
}

struct PauseState {
    requested: bool,
    paused: usize,
}

/// The router core shared by threads, tasks and contexts.
pub struct RouterInner {
    pub(crate) config_text: String,
    pub(crate) flat: FlatConfig,
    pub(crate) slots: Vec<ElementSlot>,
    by_name: AHashMap<String, EIndex>,
    threads: Vec<Arc<ThreadCore>>,
    pub(crate) handlers: Mutex<HandlerTable>,
    attachments: Mutex<AHashMap<String, Arc<dyn Any + Send + Sync>>>,
    generation: AtomicU32,
    driver_done: AtomicBool,
    running: AtomicBool,
    active_threads: AtomicUsize,
    pause_flag: AtomicBool,
    pause: Mutex<PauseState>,
    pause_cv: Condvar,
    pause_ack_cv: Condvar,
    reentry_drops: AtomicU64,
    driver_manager: Mutex<Option<EIndex>>,
    stop_requests: AtomicU64,
}

impl RouterInner {
    pub(crate) fn new(
        config_text: String,
        flat: FlatConfig,
        slots: Vec<ElementSlot>,
        nthreads: usize,
    ) -> RouterInner {
        let by_name = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        let threads = (0..nthreads.max(1)).map(ThreadCore::new).collect();
        RouterInner {
            config_text,
            flat,
            slots,
            by_name,
            threads,
            handlers: Mutex::new(HandlerTable::default()),
            attachments: Mutex::new(AHashMap::new()),
            generation: AtomicU32::new(1),
            driver_done: AtomicBool::new(false),
            running: AtomicBool::new(false),
            active_threads: AtomicUsize::new(0),
            pause_flag: AtomicBool::new(false),
            pause: Mutex::new(PauseState {
                requested: false,
                paused: 0,
            }),
            pause_cv: Condvar::new(),
            pause_ack_cv: Condvar::new(),
            reentry_drops: AtomicU64::new(0),
            driver_manager: Mutex::new(None),
            stop_requests: AtomicU64::new(0),
        }
    }

    pub(crate) fn make_slot(
        name: String,
        class: String,
        config: String,
        element: Box<dyn Element>,
        meta: ElementMeta,
    ) -> ElementSlot {
        ElementSlot {
            name,
            class,
            cell: SlotCell::new(element),
            config: Mutex::new(config),
            meta,
            home_thread: AtomicUsize::new(0),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn nelements(&self) -> usize {
        self.slots.len()
    }

    /// Element name by index.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range index.
    #[must_use]
    pub fn name(&self, eindex: EIndex) -> &str {
        &self.slots[eindex].name
    }

    /// Element class name by index.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range index.
    #[must_use]
    pub fn class_of(&self, eindex: EIndex) -> &str {
        &self.slots[eindex].class
    }

    /// Element index by full name.
    #[must_use]
    pub fn eindex_of(&self, name: &str) -> Option<EIndex> {
        self.by_name.get(name).copied()
    }

    /// Current configuration string of an element.
    #[must_use]
    pub fn configuration(&self, eindex: EIndex) -> String {
        self.slots[eindex].config.lock().clone()
    }

    pub(crate) fn set_configuration(&self, eindex: EIndex, config: String) {
        *self.slots[eindex].config.lock() = config;
    }

    pub(crate) fn meta(&self, eindex: EIndex) -> &ElementMeta {
        &self.slots[eindex].meta
    }

    /// Configuration generation; incremented by every live reconfigure.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Packets dropped because a synchronous chain re-entered an element.
    #[must_use]
    pub fn reentry_drops(&self) -> u64 {
        self.reentry_drops.load(Ordering::Relaxed)
    }

    /// Number of router threads.
    #[must_use]
    pub fn nthreads(&self) -> usize {
        self.threads.len()
    }

    pub(crate) fn thread(&self, id: usize) -> &Arc<ThreadCore> {
        &self.threads[id.min(self.threads.len() - 1)]
    }

    pub(crate) fn home_thread(&self, eindex: EIndex) -> usize {
        self.slots[eindex].home_thread.load(Ordering::Relaxed)
    }

    pub(crate) fn set_home_thread(&self, eindex: EIndex, thread: usize) {
        self.slots[eindex].home_thread.store(thread, Ordering::Relaxed);
    }

    // ---- entering elements ----

    /// Run `f` with the element taken out of its slot. Returns `None` when
    /// the call would re-enter an element already on this thread's stack.
    pub(crate) fn with_element<R>(
        &self,
        eindex: EIndex,
        f: impl FnOnce(&mut Box<dyn Element>, &Context<'_>) -> R,
    ) -> Option<R> {
        let slot = self.slots.get(eindex)?;
        match slot.cell.enter() {
            Entered::Taken(mut element) => {
                let cx = Context::new(self, eindex);
                let result = f(&mut element, &cx);
                slot.cell.exit(element);
                Some(result)
            }
            Entered::Reentry => None,
        }
    }

    pub(crate) fn deliver_push(&self, eindex: EIndex, port: usize, packet: Packet) {
        let delivered = self.with_element(eindex, move |el, cx| el.push(cx, port, packet));
        if delivered.is_none() {
            self.reentry_drops.fetch_add(1, Ordering::Relaxed);
            trace!(
                element = self.name(eindex),
                port, "push re-entered element, packet dropped"
            );
        }
    }

    pub(crate) fn deliver_pull(&self, eindex: EIndex, port: usize) -> Option<Packet> {
        match self.with_element(eindex, |el, cx| el.pull(cx, port)) {
            Some(packet) => packet,
            None => {
                trace!(
                    element = self.name(eindex),
                    port, "pull re-entered element"
                );
                None
            }
        }
    }

    pub(crate) fn run_element_task(&self, task: &TaskHandle) -> bool {
        let Some(eindex) = task.owner() else {
            return false;
        };
        self.with_element(eindex, |el, cx| el.run_task(cx, task))
            .unwrap_or(false)
    }

    pub(crate) fn run_element_timer(&self, timer: &TimerHandle) {
        let Some(eindex) = timer.owner() else { return };
        let ran = self.with_element(eindex, |el, cx| el.run_timer(cx, timer));
        if ran.is_none() {
            warn!(element = self.name(eindex), "timer fired into busy element");
        }
    }

    // ---- attachments ----

    /// Look up a typed attachment by name.
    #[must_use]
    pub fn attachment<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let any = self.attachments.lock().get(name).cloned()?;
        any.downcast::<T>().ok()
    }

    /// Install (or replace) a named attachment.
    pub fn set_attachment(&self, name: &str, value: Arc<dyn Any + Send + Sync>) {
        self.attachments.lock().insert(name.to_string(), value);
    }

    /// Look up a typed attachment, installing `T::default()` first if the
    /// name is unbound.
    #[must_use]
    pub fn attachment_or_default<T: Any + Send + Sync + Default>(&self, name: &str) -> Arc<T> {
        let mut attachments = self.attachments.lock();
        let entry = attachments
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(T::default()) as Arc<dyn Any + Send + Sync>);
        match entry.clone().downcast::<T>() {
            Ok(typed) => typed,
            Err(_) => {
                // name bound to a different type; replace rather than lie
                let fresh = Arc::new(T::default());
                *entry = fresh.clone() as Arc<dyn Any + Send + Sync>;
                fresh
            }
        }
    }

    // ---- graph searches ----

    /// Breadth-first search upstream from `(eindex, in_port)`, constrained
    /// by flow codes. The visitor sees each `(element, output port)` pair at
    /// most once and steers the search per branch.
    pub fn visit_upstream(
        &self,
        eindex: EIndex,
        in_port: usize,
        visitor: &mut dyn FnMut(&mut dyn Element, EIndex, usize) -> Visit,
    ) {
        let mut queue: VecDeque<(EIndex, usize)> = VecDeque::new();
        let mut visited: HashSet<(EIndex, usize)> = HashSet::new();
        if let Some(adj) = self.meta(eindex).in_adj.get(in_port) {
            queue.extend(adj.iter().copied());
        }
        while let Some((e, out_port)) = queue.pop_front() {
            if !visited.insert((e, out_port)) {
                continue;
            }
            let decision = self
                .with_element(e, |el, _cx| visitor(&mut **el, e, out_port))
                .unwrap_or(Visit::Continue);
            if decision == Visit::Continue {
                let meta = self.meta(e);
                for in_port in 0..meta.ninputs {
                    if meta.flow.flows(in_port, out_port) {
                        queue.extend(meta.in_adj[in_port].iter().copied());
                    }
                }
            }
        }
    }

    /// Breadth-first search downstream from `(eindex, out_port)`; the
    /// mirror of [`RouterInner::visit_upstream`].
    pub fn visit_downstream(
        &self,
        eindex: EIndex,
        out_port: usize,
        visitor: &mut dyn FnMut(&mut dyn Element, EIndex, usize) -> Visit,
    ) {
        let mut queue: VecDeque<(EIndex, usize)> = VecDeque::new();
        let mut visited: HashSet<(EIndex, usize)> = HashSet::new();
        if let Some(adj) = self.meta(eindex).out_adj.get(out_port) {
            queue.extend(adj.iter().copied());
        }
        while let Some((e, in_port)) = queue.pop_front() {
            if !visited.insert((e, in_port)) {
                continue;
            }
            let decision = self
                .with_element(e, |el, _cx| visitor(&mut **el, e, in_port))
                .unwrap_or(Visit::Continue);
            if decision == Visit::Continue {
                let meta = self.meta(e);
                for out_port in 0..meta.noutputs {
                    if meta.flow.flows(in_port, out_port) {
                        queue.extend(meta.out_adj[out_port].iter().copied());
                    }
                }
            }
        }
    }

    // ---- handlers ----

    /// Find a handler by owner and name; the returned index is stable.
    #[must_use]
    pub fn find_handler(&self, owner: Option<EIndex>, name: &str) -> Option<usize> {
        self.handlers.lock().find(owner, name)
    }

    /// Handler entry by index.
    #[must_use]
    pub fn handler(&self, idx: usize) -> Option<Handler> {
        self.handlers.lock().get(idx).cloned()
    }

    /// Invoke a read handler.
    pub fn call_read(&self, idx: usize) -> Result<String, HandlerError> {
        let handler = self.handler(idx).ok_or(HandlerError::NoSuchHandler)?;
        if !handler.readable() {
            return Err(HandlerError::NotReadable);
        }
        match handler.hooks {
            Hooks::Element {
                read: Some(hook), ..
            } => {
                let eindex = handler.owner.ok_or(HandlerError::NoSuchHandler)?;
                self.with_element(eindex, |el, cx| hook(&**el, cx, &handler))
                    .ok_or(HandlerError::Busy)
            }
            Hooks::Global {
                read: Some(hook), ..
            } => Ok(hook(self, &handler)),
            _ => Err(HandlerError::NotReadable),
        }
    }

    /// Invoke a write handler.
    pub fn call_write(
        &self,
        idx: usize,
        value: &str,
        errh: &mut ErrorHandler,
    ) -> Result<(), HandlerError> {
        let handler = self.handler(idx).ok_or(HandlerError::NoSuchHandler)?;
        if !handler.writable() {
            return Err(HandlerError::NotWritable);
        }
        match handler.hooks {
            Hooks::Element {
                write: Some(hook), ..
            } => {
                let eindex = handler.owner.ok_or(HandlerError::NoSuchHandler)?;
                self.with_element(eindex, |el, cx| hook(&mut **el, value, cx, &handler, errh))
                    .ok_or(HandlerError::Busy)?
            }
            Hooks::Global {
                write: Some(hook), ..
            } => hook(self, value, &handler, errh),
            _ => Err(HandlerError::NotWritable),
        }
    }

    /// Read `element.handler` (or a global handler when `element` is None).
    pub fn read_handler(
        &self,
        element: Option<&str>,
        name: &str,
    ) -> Result<String, HandlerError> {
        let owner = match element {
            Some(e) => Some(self.eindex_of(e).ok_or(HandlerError::NoSuchHandler)?),
            None => None,
        };
        let idx = self
            .find_handler(owner, name)
            .ok_or(HandlerError::NoSuchHandler)?;
        self.call_read(idx)
    }

    /// Write `element.handler` (or a global handler when `element` is None).
    pub fn write_handler(
        &self,
        element: Option<&str>,
        name: &str,
        value: &str,
    ) -> Result<(), HandlerError> {
        let owner = match element {
            Some(e) => Some(self.eindex_of(e).ok_or(HandlerError::NoSuchHandler)?),
            None => None,
        };
        let idx = self
            .find_handler(owner, name)
            .ok_or(HandlerError::NoSuchHandler)?;
        let mut errh = ErrorHandler::new();
        self.call_write(idx, value, &mut errh)
    }

    /// Handler names and indices of an owner, name-sorted.
    #[must_use]
    pub fn handler_names(&self, owner: Option<EIndex>) -> Vec<(String, usize)> {
        self.handlers.lock().names_of(owner)
    }

    /// Handler names of an owner, one per line with `r`/`w` capability
    /// letters.
    #[must_use]
    pub fn handler_list(&self, owner: Option<EIndex>) -> String {
        let table = self.handlers.lock();
        let mut out = String::new();
        for (name, idx) in table.names_of(owner) {
            let Some(handler) = table.get(idx) else {
                continue;
            };
            let mut caps = String::new();
            if handler.readable() {
                caps.push('r');
            }
            if handler.writable() {
                caps.push('w');
            }
            out.push_str(&format!("{name}\t{caps}\n"));
        }
        out
    }

    // ---- LLRPC ----

    /// Dispatch a low-level RPC to the named element.
    pub fn llrpc(&self, element: &str, cmd: u32, data: &mut [u8]) -> Result<(), i32> {
        let eindex = self.eindex_of(element).ok_or(crate::errno::ENOENT)?;
        self.with_element(eindex, |el, _cx| el.llrpc(cmd, data))
            .ok_or(crate::errno::EAGAIN)?
    }

    // ---- stop & pause ----

    /// True once the driver has been told to stop.
    #[must_use]
    pub fn driver_done(&self) -> bool {
        self.driver_done.load(Ordering::Acquire)
    }

    /// Register the driver-manager element that intercepts stop requests.
    pub fn set_driver_manager(&self, eindex: EIndex) {
        *self.driver_manager.lock() = Some(eindex);
    }

    /// Number of stop requests seen so far.
    #[must_use]
    pub fn stop_requests(&self) -> u64 {
        self.stop_requests.load(Ordering::Relaxed)
    }

    /// An element (or the outside world) asks the driver to stop. With a
    /// driver manager present, its script decides; otherwise the first
    /// request stops the driver.
    pub fn please_stop_driver(&self) {
        self.stop_requests.fetch_add(1, Ordering::Relaxed);
        let manager = *self.driver_manager.lock();
        let stop = match manager {
            Some(eindex) => self
                .with_element(eindex, |el, cx| el.handle_stop(cx))
                .unwrap_or(true),
            None => true,
        };
        if stop {
            self.stop_driver();
        }
    }

    /// Stop the driver unconditionally.
    pub fn stop_driver(&self) {
        debug!("driver stop");
        self.driver_done.store(true, Ordering::Release);
        self.wake_all();
    }

    pub(crate) fn wake_all(&self) {
        for thread in &self.threads {
            thread.wakeup();
        }
    }

    pub(crate) fn pause_requested(&self) -> bool {
        self.pause_flag.load(Ordering::Acquire)
    }

    /// Router threads call this at the top of each loop; they block here
    /// while a pause is in force.
    pub(crate) fn pause_point(&self, _thread_id: usize) {
        if !self.pause_requested() {
            return;
        }
        let mut state = self.pause.lock();
        if !state.requested {
            return;
        }
        state.paused += 1;
        self.pause_ack_cv.notify_all();
        while state.requested {
            self.pause_cv.wait(&mut state);
        }
        state.paused -= 1;
    }

    /// Quiesce every router thread (live reconfigure does this around the
    /// swap). No-op when the router is not running.
    pub fn pause_threads(&self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        {
            let mut state = self.pause.lock();
            state.requested = true;
        }
        self.pause_flag.store(true, Ordering::Release);
        self.wake_all();
        let mut state = self.pause.lock();
        while state.paused < self.active_threads.load(Ordering::Acquire) {
            let timed_out = self
                .pause_ack_cv
                .wait_for(&mut state, Duration::from_secs(5))
                .timed_out();
            if timed_out {
                warn!("timed out waiting for router threads to pause");
                break;
            }
        }
    }

    /// Release paused threads.
    pub fn resume_threads(&self) {
        {
            let mut state = self.pause.lock();
            state.requested = false;
        }
        self.pause_flag.store(false, Ordering::Release);
        self.pause_cv.notify_all();
    }

    pub(crate) fn note_thread_started(&self) {
        self.active_threads.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn note_thread_stopped(&self) {
        self.active_threads.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    // ---- lifecycle (driven by the linker and by Router) ----

    /// Configure-phase order: by each element's declared phase, then by
    /// eindex.
    pub(crate) fn configure_order(&self) -> Vec<EIndex> {
        let mut order: Vec<(crate::element::ConfigurePhase, EIndex)> = (0..self.slots.len())
            .map(|e| {
                let phase = self
                    .with_element(e, |el, _cx| el.configure_phase())
                    .unwrap_or_default();
                (phase, e)
            })
            .collect();
        order.sort();
        order.into_iter().map(|(_, e)| e).collect()
    }

    /// Run `configure` on every element, collecting all errors. Returns the
    /// set of elements whose configure failed.
    pub(crate) fn configure_all(&self, errh: &mut ErrorHandler) -> Vec<bool> {
        let mut failed = vec![false; self.slots.len()];
        for e in self.configure_order() {
            let args = config::args::Arguments::new(&self.configuration(e));
            errh.push_context(format!(
                "While configuring '{} :: {}'",
                self.name(e),
                self.class_of(e)
            ));
            let ok = self
                .with_element(e, |el, cx| el.configure(&args, cx, errh).is_ok())
                .unwrap_or(false);
            errh.pop_context();
            if !ok {
                failed[e] = true;
            }
        }
        failed
    }

    /// Run `initialize` on every element. On failure, previously
    /// initialized elements are cleaned up in reverse order.
    pub(crate) fn initialize_all(&self, errh: &mut ErrorHandler) -> Result<(), ()> {
        let order = self.configure_order();
        let mut initialized: Vec<EIndex> = Vec::new();
        for &e in &order {
            errh.push_context(format!(
                "While initializing '{} :: {}'",
                self.name(e),
                self.class_of(e)
            ));
            let ok = self
                .with_element(e, |el, cx| el.initialize(cx, errh).is_ok())
                .unwrap_or(false);
            errh.pop_context();
            if ok {
                initialized.push(e);
            } else {
                for &done in initialized.iter().rev() {
                    self.cleanup_one(done, CleanupStage::Initialized);
                }
                self.cleanup_one(e, CleanupStage::InitializeFailed);
                for &rest in order
                    .iter()
                    .filter(|&&x| x != e && !initialized.contains(&x))
                {
                    self.cleanup_one(rest, CleanupStage::Configured);
                }
                return Err(());
            }
        }
        Ok(())
    }

    pub(crate) fn cleanup_one(&self, eindex: EIndex, stage: CleanupStage) {
        let _ = self.with_element(eindex, |el, _cx| el.cleanup(stage));
    }

    /// Clean up every element with a per-element stage.
    pub(crate) fn cleanup_all(&self, stage_for: impl Fn(EIndex) -> CleanupStage) {
        for e in (0..self.slots.len()).rev() {
            self.cleanup_one(e, stage_for(e));
        }
    }
}

/// Public face of a built router.
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub(crate) fn from_inner(inner: Arc<RouterInner>) -> Router {
        Router { inner }
    }

    /// The shared core (contexts, threads and tasks hold this too).
    #[must_use]
    pub fn inner(&self) -> &Arc<RouterInner> {
        &self.inner
    }

    /// Run the router: spawn worker threads for thread ids 1.., run thread
    /// 0 on the calling thread, and return once the driver stops.
    pub fn run(&self) {
        let inner = &self.inner;
        inner.set_running(true);
        let mut workers = Vec::new();
        for id in 1..inner.nthreads() {
            let inner = Arc::clone(inner);
            workers.push(std::thread::spawn(move || {
                inner.note_thread_started();
                inner.thread(id).run_loop(&inner);
                inner.note_thread_stopped();
            }));
        }
        inner.note_thread_started();
        inner.thread(0).run_loop(inner);
        inner.note_thread_stopped();
        for worker in workers {
            let _ = worker.join();
        }
        inner.set_running(false);
        self.inner.cleanup_all(|_| CleanupStage::Initialized);
    }

    /// Drive thread 0 until its run queue and due timers drain, without
    /// spawning workers. Returns the number of task quanta run.
    pub fn run_until_idle(&self, max_quanta: usize) -> usize {
        self.inner.thread(0).run_until_idle(&self.inner, max_quanta)
    }

    /// Tell the driver to stop (honors a driver manager's script).
    pub fn please_stop(&self) {
        self.inner.please_stop_driver();
    }

    /// Stop unconditionally.
    pub fn stop(&self) {
        self.inner.stop_driver();
    }
}
