// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

//! The standard element library.
//!
//! Everything a runnable configuration needs around its domain-specific
//! elements: queues bridging push into pull, packet sources and sinks,
//! classifier-flavored plumbing (`Tee`, `Switch`, `Paint`), information
//! elements that populate router tables at configure time, and the
//! `DriverManager` stop-script machine. Each element registers its class
//! with the router's factory slice, so linking a configuration only needs
//! this crate in the binary.

pub mod basics;
pub mod drivermanager;
pub mod info;
pub mod paint;
pub mod queue;
pub mod sinks;
pub mod sources;
pub mod switch;
pub mod tee;
pub mod unqueue;

pub use basics::{Counter, Discard, Idle, Null};
pub use drivermanager::DriverManager;
pub use info::{AnnotationInfo, ScheduleInfo, StaticThreadSched};
pub use paint::{Paint, PaintSwitch};
pub use queue::Queue;
pub use sinks::TimedSink;
pub use sources::{InfiniteSource, RatedSource, TimedSource};
pub use switch::Switch;
pub use tee::Tee;
pub use unqueue::Unqueue;
