// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

//! The packet-graph runtime.
//!
//! A router is a directed multigraph of [`element::Element`]s built from
//! configuration text by the [`link`] module. Packets traverse edges under
//! two disciplines — push (producer-driven) and pull (consumer-driven) —
//! with agnostic ports settled at link time. Source and sink elements run
//! from stride-scheduled [`sched::task`]s on cooperative router threads;
//! [`sched::notifier`] signals let pull-driven tasks sleep on empty
//! upstream queues; [`sched::timer`]s drive time-based elements. The
//! [`handler`] plane (and its [`ino`] filesystem view and [`llrpc`] numeric
//! sibling) exposes per-element state for monitoring and live control.

pub mod attachments;
pub mod context;
pub mod element;
pub mod errno;
pub mod handler;
pub mod hotswap;
pub mod ino;
pub mod link;
pub mod llrpc;
pub mod ports;
pub mod registry;
pub mod router;
pub mod sched;

pub use context::Context;
pub use element::{CleanupStage, ConfigurePhase, EIndex, Element, ElementError};
pub use handler::{HandlerError, HandlerFlags, HandlerRegistry, split_handler_path};
pub use hotswap::{Hotswap, HotswapError};
pub use link::{LinkFailed, link, parse_router};
pub use ports::{FlowCode, PortCount, PortDir, PortKind, Processing};
pub use registry::{ELEMENT_CLASSES, ElementClass, ElementFactory};
pub use router::{Router, RouterInner, Visit};
pub use sched::{Notifier, NotifierSignal, Task, TaskHandle, Timer, TimerHandle};
