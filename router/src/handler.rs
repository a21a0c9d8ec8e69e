// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The handler plane.
//!
//! A handler is a named read/write entry point on an element (or on the
//! router itself, for global handlers). Reads return strings; writes consume
//! strings and may fail with errno-mapped errors. The router keeps one flat
//! table: lookup by `(element, name)` yields a stable index callers can
//! cache for the router's lifetime.
//!
//! Hooks are plain function pointers plus a per-handler `user_data` word, so
//! one function can serve many handler names (the classic thunk pattern,
//! with the discriminant made explicit).

use crate::context::Context;
use crate::element::{EIndex, Element};
use crate::router::RouterInner;
use ahash::AHashMap;
use bitflags::bitflags;
use config::args::Arguments;
use config::errh::ErrorHandler;

bitflags! {
    /// Capability and presentation flags on a handler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandlerFlags: u32 {
        /// Readable.
        const READ = 0x1;
        /// Writable.
        const WRITE = 0x2;
        /// Reading has no side effects and is always cheap.
        const CALM = 0x4;
        /// Value is raw bytes, not text.
        const RAW = 0x8;
        /// UIs may render as a checkbox (boolean value).
        const CHECKBOX = 0x10;
        /// UIs may render as a button (write-only trigger).
        const BUTTON = 0x20;
    }
}

/// Errors from handler lookup and invocation.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Unknown element or handler name.
    #[error("no such handler")]
    NoSuchHandler,
    /// The handler has no read hook.
    #[error("handler not readable")]
    NotReadable,
    /// The handler has no write hook.
    #[error("handler not writable")]
    NotWritable,
    /// The write hook rejected the value.
    #[error("bad handler value: {0}")]
    Invalid(String),
    /// The element could not be entered (reentrant call).
    #[error("element busy")]
    Busy,
}

impl HandlerError {
    /// The errno code external tools see.
    #[must_use]
    pub fn to_errno(&self) -> i32 {
        match self {
            HandlerError::NoSuchHandler => crate::errno::ENOENT,
            HandlerError::NotReadable | HandlerError::NotWritable => crate::errno::EACCES,
            HandlerError::Invalid(_) => crate::errno::EINVAL,
            HandlerError::Busy => crate::errno::EAGAIN,
        }
    }
}

/// Read hook on an element handler.
pub type ReadHook = fn(&dyn Element, &Context<'_>, &Handler) -> String;
/// Write hook on an element handler.
pub type WriteHook =
    fn(&mut dyn Element, &str, &Context<'_>, &Handler, &mut ErrorHandler) -> Result<(), HandlerError>;
/// Read hook on a global handler.
pub type GlobalReadHook = fn(&RouterInner, &Handler) -> String;
/// Write hook on a global handler.
pub type GlobalWriteHook =
    fn(&RouterInner, &str, &Handler, &mut ErrorHandler) -> Result<(), HandlerError>;

/// The hook pair, element- or router-scoped.
#[derive(Clone, Copy)]
pub enum Hooks {
    /// Hooks invoked with the owning element entered.
    Element {
        /// Read hook, if readable.
        read: Option<ReadHook>,
        /// Write hook, if writable.
        write: Option<WriteHook>,
    },
    /// Hooks invoked against the router.
    Global {
        /// Read hook, if readable.
        read: Option<GlobalReadHook>,
        /// Write hook, if writable.
        write: Option<GlobalWriteHook>,
    },
}

/// One handler table entry.
#[derive(Clone)]
pub struct Handler {
    /// Handler name.
    pub name: String,
    /// Owning element; `None` for global handlers.
    pub owner: Option<EIndex>,
    /// Capability and presentation flags.
    pub flags: HandlerFlags,
    /// The hook pair.
    pub hooks: Hooks,
    /// Free word multiplexing one hook over many handler names.
    pub user_data: u64,
}

impl Handler {
    /// True if reads are allowed.
    #[must_use]
    pub fn readable(&self) -> bool {
        self.flags.contains(HandlerFlags::READ)
    }

    /// True if writes are allowed.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.flags.contains(HandlerFlags::WRITE)
    }
}

/// Split `element.handler` notation at the last dot; no dot means a global
/// handler. Element names may themselves contain `/` but never `.`.
#[must_use]
pub fn split_handler_path(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('.') {
        Some((element, handler)) => (Some(element), handler),
        None => (None, path),
    }
}

fn key(owner: Option<EIndex>, name: &str) -> (i64, String) {
    let owner = owner.map_or(-1i64, |e| i64::try_from(e).unwrap_or(i64::MAX));
    (owner, name.to_string())
}

/// The router's flat handler table.
#[derive(Default)]
pub struct HandlerTable {
    handlers: Vec<Handler>,
    index: AHashMap<(i64, String), usize>,
}

impl HandlerTable {
    /// Insert or replace; replacing keeps the original index so cached
    /// lookups stay valid.
    pub fn add(&mut self, handler: Handler) -> usize {
        let k = key(handler.owner, &handler.name);
        if let Some(&idx) = self.index.get(&k) {
            self.handlers[idx] = handler;
            idx
        } else {
            let idx = self.handlers.len();
            self.index.insert(k, idx);
            self.handlers.push(handler);
            idx
        }
    }

    /// Find by owner and name.
    #[must_use]
    pub fn find(&self, owner: Option<EIndex>, name: &str) -> Option<usize> {
        self.index.get(&key(owner, name)).copied()
    }

    /// Entry by index.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Handler> {
        self.handlers.get(idx)
    }

    /// OR extra flags onto an existing handler.
    pub fn mark(&mut self, owner: Option<EIndex>, name: &str, extra: HandlerFlags) {
        if let Some(idx) = self.find(owner, name) {
            self.handlers[idx].flags |= extra;
        }
    }

    /// Names and indices of an owner's handlers, name-sorted (the order
    /// directory listings use).
    #[must_use]
    pub fn names_of(&self, owner: Option<EIndex>) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = self
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.owner == owner)
            .map(|(i, h)| (h.name.clone(), i))
            .collect();
        out.sort();
        out
    }
}

/// Registration facade handed to [`Element::add_handlers`].
pub struct HandlerRegistry<'a> {
    table: &'a mut HandlerTable,
    owner: EIndex,
}

impl<'a> HandlerRegistry<'a> {
    pub(crate) fn new(table: &'a mut HandlerTable, owner: EIndex) -> Self {
        HandlerRegistry { table, owner }
    }

    /// Register a read handler.
    pub fn add_read(&mut self, name: &str, user_data: u64, hook: ReadHook) {
        self.table.add(Handler {
            name: name.to_string(),
            owner: Some(self.owner),
            flags: HandlerFlags::READ,
            hooks: Hooks::Element {
                read: Some(hook),
                write: None,
            },
            user_data,
        });
    }

    /// Register a write handler.
    pub fn add_write(&mut self, name: &str, user_data: u64, hook: WriteHook) {
        self.table.add(Handler {
            name: name.to_string(),
            owner: Some(self.owner),
            flags: HandlerFlags::WRITE,
            hooks: Hooks::Element {
                read: None,
                write: Some(hook),
            },
            user_data,
        });
    }

    /// Register a read/write handler pair under one name.
    pub fn add_read_write(&mut self, name: &str, user_data: u64, read: ReadHook, write: WriteHook) {
        self.table.add(Handler {
            name: name.to_string(),
            owner: Some(self.owner),
            flags: HandlerFlags::READ | HandlerFlags::WRITE,
            hooks: Hooks::Element {
                read: Some(read),
                write: Some(write),
            },
            user_data,
        });
    }

    /// OR extra flags (BUTTON, CHECKBOX, CALM, RAW) onto a handler
    /// registered earlier.
    pub fn mark(&mut self, name: &str, extra: HandlerFlags) {
        self.table.mark(Some(self.owner), name, extra);
    }
}

/// Read hook of the core positional-reconfigure handler: returns positional
/// argument number `user_data` of the element's current configuration.
pub fn reconfigure_positional_read(
    _el: &dyn Element,
    cx: &Context<'_>,
    handler: &Handler,
) -> String {
    let args = Arguments::new(&cx.configuration());
    #[allow(clippy::cast_possible_truncation)]
    let position = handler.user_data as usize;
    args.positional(position).unwrap_or_default().to_string()
}

/// Write hook of the core positional-reconfigure handler: replaces
/// positional argument number `user_data` and re-runs `configure`.
pub fn reconfigure_positional_write(
    el: &mut dyn Element,
    value: &str,
    cx: &Context<'_>,
    handler: &Handler,
    errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    let mut args = Arguments::new(&cx.configuration());
    #[allow(clippy::cast_possible_truncation)]
    let position = handler.user_data as usize;
    args.set_positional(position, value);
    reconfigure(el, args, cx, errh)
}

/// Read hook of the core keyword-reconfigure handler: the keyword is the
/// handler name upper-cased.
pub fn reconfigure_keyword_read(_el: &dyn Element, cx: &Context<'_>, handler: &Handler) -> String {
    let args = Arguments::new(&cx.configuration());
    args.keyword(&handler.name.to_ascii_uppercase())
        .unwrap_or_default()
        .to_string()
}

/// Write hook of the core keyword-reconfigure handler: sets the keyword and
/// re-runs `configure`.
pub fn reconfigure_keyword_write(
    el: &mut dyn Element,
    value: &str,
    cx: &Context<'_>,
    handler: &Handler,
    errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    let mut args = Arguments::new(&cx.configuration());
    args.set_keyword(&handler.name.to_ascii_uppercase(), value);
    reconfigure(el, args, cx, errh)
}

fn reconfigure(
    el: &mut dyn Element,
    args: Arguments,
    cx: &Context<'_>,
    errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    let before = errh.messages().count();
    match el.configure(&args, cx, errh) {
        Ok(()) => {
            cx.set_configuration(args.unparse());
            cx.router().bump_generation();
            Ok(())
        }
        Err(_) => {
            let detail = errh
                .messages()
                .skip(before)
                .collect::<Vec<_>>()
                .join("; ");
            Err(HandlerError::Invalid(detail))
        }
    }
}

pub(crate) fn name_read(_el: &dyn Element, cx: &Context<'_>, _h: &Handler) -> String {
    cx.name().to_string()
}

pub(crate) fn class_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.class_name().to_string()
}

pub(crate) fn config_read(_el: &dyn Element, cx: &Context<'_>, _h: &Handler) -> String {
    cx.configuration()
}

pub(crate) fn config_write(
    el: &mut dyn Element,
    value: &str,
    cx: &Context<'_>,
    _h: &Handler,
    errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    if !el.can_live_reconfigure() {
        return Err(HandlerError::NotWritable);
    }
    reconfigure(el, Arguments::new(value), cx, errh)
}

pub(crate) fn ports_read(_el: &dyn Element, cx: &Context<'_>, _h: &Handler) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} input(s)\n", cx.ninputs()));
    for port in 0..cx.ninputs() {
        out.push_str(&format!("  {port}: {}\n", cx.input_kind(port)));
    }
    out.push_str(&format!("{} output(s)\n", cx.noutputs()));
    for port in 0..cx.noutputs() {
        out.push_str(&format!("  {port}: {}\n", cx.output_kind(port)));
    }
    out
}

pub(crate) fn handlers_read(_el: &dyn Element, cx: &Context<'_>, _h: &Handler) -> String {
    cx.router().handler_list(Some(cx.eindex()))
}

/// Install the handlers every element gets.
pub(crate) fn add_default_handlers(table: &mut HandlerTable, eindex: EIndex) {
    let mut reg = HandlerRegistry::new(table, eindex);
    reg.add_read("name", 0, name_read);
    reg.add_read("class", 0, class_read);
    reg.add_read_write("config", 0, config_read, config_write);
    reg.add_read("ports", 0, ports_read);
    reg.add_read("handlers", 0, handlers_read);
    reg.mark("name", HandlerFlags::CALM);
    reg.mark("class", HandlerFlags::CALM);
}
