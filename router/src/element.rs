// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The element capability set.
//!
//! An element is a vertex in the dataflow graph. It declares its ports
//! (count, processing discipline, internal flow), parses its configuration,
//! acquires runtime resources (tasks, timers), processes packets on push and
//! pull paths, and exposes named handlers for introspection and control.
//!
//! Lifecycle: constructed → configured → initialized → running → cleanup.
//! `configure` runs on every element (in configure-phase order) before any
//! `initialize` runs; failures trigger `cleanup` with a stage describing how
//! far the element got.

use crate::context::Context;
use crate::handler::HandlerRegistry;
use crate::sched::notifier::Notifier;
use crate::sched::task::TaskHandle;
use crate::sched::timer::TimerHandle;
use config::args::Arguments;
use config::errh::ErrorHandler;
use downcast_rs::{Downcast, impl_downcast};
use packet::Packet;

/// Index of an element within its router; stable for the router's lifetime.
pub type EIndex = usize;

/// Ordering of `configure` calls across elements. Information elements run
/// before the elements that consume the tables they populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ConfigurePhase {
    /// Before everything else.
    First,
    /// Information elements (scheduling parameters, annotation claims).
    Info,
    /// Elements that acquire privileged resources.
    Privileged,
    /// Everything else.
    #[default]
    Default,
    /// After everything else.
    Last,
}

/// How far an element got before `cleanup` was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStage {
    /// This element's own `configure` failed.
    ConfigureFailed,
    /// Configured fine, but the router never reached `initialize` (some
    /// other element failed).
    Configured,
    /// This element's own `initialize` failed.
    InitializeFailed,
    /// Fully initialized; normal teardown.
    Initialized,
}

/// Marker error for failed element operations; the element reports details
/// to the [`ErrorHandler`] it was handed.
#[derive(Debug, thiserror::Error)]
#[error("element operation failed")]
pub struct ElementError;

/// The element capability set. See the module docs for the lifecycle.
///
/// Implementations are `Send` because multi-threaded routers move elements'
/// run calls across router threads; within one router, the engine guarantees
/// at most one call is active per element at a time.
pub trait Element: Downcast + Send {
    /// The class name this element was declared with.
    fn class_name(&self) -> &'static str;

    /// Allowed port counts, e.g. `"1/1"`, `"1-/0-"`, `"-/-"`. See
    /// [`crate::ports::PortCount`].
    fn port_count(&self) -> &'static str {
        "0/0"
    }

    /// Port processing disciplines, e.g. `"h/h"`, `"l/l"`, `"a/a"`,
    /// `"h/lh"`. See [`crate::ports::Processing`].
    fn processing(&self) -> &'static str {
        "a/a"
    }

    /// Which inputs reach which outputs, e.g. `"x/x"`, `"#/#"`. Drives
    /// upstream/downstream graph searches. See [`crate::ports::FlowCode`].
    fn flow_code(&self) -> &'static str {
        "x/x"
    }

    /// When `configure` runs relative to other elements.
    fn configure_phase(&self) -> ConfigurePhase {
        ConfigurePhase::Default
    }

    /// Parse configuration arguments. Runs after every element is
    /// constructed and the graph is connected, in configure-phase order.
    ///
    /// The default accepts an empty configuration only.
    fn configure(
        &mut self,
        args: &Arguments,
        cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let _ = cx;
        if args.is_empty() {
            Ok(())
        } else {
            errh.error(format!("{} takes no arguments", self.class_name()));
            Err(ElementError)
        }
    }

    /// True if a live reconfiguration may call `configure` again while the
    /// router runs.
    fn can_live_reconfigure(&self) -> bool {
        false
    }

    /// Acquire runtime resources: register tasks, start timers, find
    /// upstream notifiers. Runs after every `configure` succeeded.
    fn initialize(&mut self, cx: &Context<'_>, errh: &mut ErrorHandler) -> Result<(), ElementError> {
        let _ = (cx, errh);
        Ok(())
    }

    /// Adopt state from the same-named element of a replaced router (queue
    /// contents, counters). Runs after `initialize`, before the new router
    /// starts.
    fn take_state(&mut self, old: &mut dyn Element, errh: &mut ErrorHandler) {
        let _ = (old, errh);
    }

    /// Release resources. `stage` says how far this element got.
    fn cleanup(&mut self, stage: CleanupStage) {
        let _ = stage;
    }

    /// Receive a packet on push input `port`.
    ///
    /// The default runs [`Element::simple_action`] and forwards the result
    /// to the same-numbered output.
    fn push(&mut self, cx: &Context<'_>, port: usize, packet: Packet) {
        if let Some(packet) = self.simple_action(packet) {
            cx.push(port, packet);
        }
    }

    /// Produce a packet on pull output `port`, or nothing.
    ///
    /// The default pulls the same-numbered input and runs
    /// [`Element::simple_action`] on the result.
    fn pull(&mut self, cx: &Context<'_>, port: usize) -> Option<Packet> {
        let packet = cx.pull(port)?;
        self.simple_action(packet)
    }

    /// One-in, at-most-one-out packet transformation usable from both
    /// disciplines. The default passes the packet through.
    fn simple_action(&mut self, packet: Packet) -> Option<Packet> {
        Some(packet)
    }

    /// Run one scheduling quantum. Return `false` if no useful work was
    /// found (schedulers use this for backoff accounting).
    fn run_task(&mut self, cx: &Context<'_>, task: &TaskHandle) -> bool {
        let _ = (cx, task);
        false
    }

    /// A timer this element scheduled has expired.
    fn run_timer(&mut self, cx: &Context<'_>, timer: &TimerHandle) {
        let _ = (cx, timer);
    }

    /// Register this element's handlers.
    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        let _ = reg;
    }

    /// The notifier announcing whether this element has packets available
    /// for pulling, if it keeps one (queues do).
    fn empty_notifier(&self) -> Option<&Notifier> {
        None
    }

    /// An element asked the driver to stop. Return `true` to let the driver
    /// actually stop; a driver-manager element returns `false` while its
    /// script still has instructions to run.
    fn handle_stop(&mut self, cx: &Context<'_>) -> bool {
        let _ = cx;
        true
    }

    /// Low-level RPC entry point. `cmd` selects the operation; `data` is its
    /// fixed-size payload, read and written in place. Errors are errno
    /// codes from [`crate::errno`].
    fn llrpc(&mut self, cmd: u32, data: &mut [u8]) -> Result<(), i32> {
        let _ = (cmd, data);
        Err(crate::errno::ENOTSUP)
    }
}

impl_downcast!(Element);
