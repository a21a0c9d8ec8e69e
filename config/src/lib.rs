// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Configuration language front end.
//!
//! A configuration is text declaring elements (`name :: Class(args)`) and
//! connections (`a[1] -> [0]b`), possibly grouped into reusable compound
//! classes (`elementclass`). This crate tokenizes and parses that text and
//! expands compounds into a flat element/connection list; resolving class
//! names to element factories and type-checking ports is the linker's job.

pub mod args;
pub mod errh;
pub mod expand;
pub mod lex;
pub mod parse;

pub use args::{Arguments, ArgsError};
pub use errh::ErrorHandler;
pub use expand::{FlatConfig, FlatConnection, FlatElement, expand};
pub use lex::{Landmark, LexKind, Lexeme, Lexer};
pub use parse::{ClassDef, ConnAst, Decl, ParsedConfig, Parser, PortRef};
