// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Accumulating, context-prefixing error handler.
//!
//! Parse, link, configure and initialize failures are reported here rather
//! than returned one at a time, so a whole phase can finish and present every
//! problem at once. Contexts nest: the linker pushes `In element x:` style
//! prefixes around each element's configure call.

use crate::lex::Landmark;
use std::fmt::Display;

/// Severity of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Warning,
    Error,
}

/// Collects error and warning messages with optional context prefixes.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    context: Vec<String>,
    messages: Vec<(Severity, String)>,
    nwarnings: usize,
    nerrors: usize,
}

impl ErrorHandler {
    /// A fresh handler with no messages and no context.
    #[must_use]
    pub fn new() -> Self {
        ErrorHandler::default()
    }

    /// Push a context line; subsequent messages are prefixed with it the
    /// first time one is emitted at this depth.
    pub fn push_context(&mut self, context: impl Into<String>) {
        self.context.push(context.into());
    }

    /// Pop the innermost context line.
    pub fn pop_context(&mut self) {
        self.context.pop();
    }

    /// Report an error.
    pub fn error(&mut self, msg: impl Display) {
        self.record(Severity::Error, msg.to_string());
    }

    /// Report an error decorated with a source landmark.
    pub fn lerror(&mut self, landmark: &Landmark, msg: impl Display) {
        self.record(Severity::Error, format!("{landmark}: {msg}"));
    }

    /// Report a warning.
    pub fn warning(&mut self, msg: impl Display) {
        self.record(Severity::Warning, format!("warning: {msg}"));
    }

    /// Report a warning decorated with a source landmark.
    pub fn lwarning(&mut self, landmark: &Landmark, msg: impl Display) {
        self.record(Severity::Warning, format!("{landmark}: warning: {msg}"));
    }

    fn record(&mut self, severity: Severity, msg: String) {
        let text = if self.context.is_empty() {
            msg
        } else {
            format!("{}: {msg}", self.context.join(": "))
        };
        match severity {
            Severity::Warning => self.nwarnings += 1,
            Severity::Error => self.nerrors += 1,
        }
        self.messages.push((severity, text));
    }

    /// Number of errors reported so far.
    #[must_use]
    pub fn nerrors(&self) -> usize {
        self.nerrors
    }

    /// Number of warnings reported so far.
    #[must_use]
    pub fn nwarnings(&self) -> usize {
        self.nwarnings
    }

    /// True when no errors have been reported.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.nerrors == 0
    }

    /// Every message, in report order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|(_, m)| m.as_str())
    }

    /// All messages joined with newlines; empty string when clean.
    #[must_use]
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|(_, m)| m.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counts_and_context() {
        let mut errh = ErrorHandler::new();
        assert!(errh.is_clean());
        errh.warning("queue shallow");
        errh.push_context("In element q :: Queue");
        errh.error("CAPACITY must be positive");
        errh.pop_context();
        errh.error("top level");

        assert_eq!(errh.nerrors(), 2);
        assert_eq!(errh.nwarnings(), 1);
        let rendered = errh.render();
        assert!(rendered.contains("In element q :: Queue: CAPACITY must be positive"));
        assert!(rendered.contains("warning: queue shallow"));
        assert!(!rendered.contains("Queue: top level"));
    }
}
