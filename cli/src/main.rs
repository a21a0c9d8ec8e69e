// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Userlevel driver: parse a configuration, run the router, print handlers.

mod args;

use crate::args::CmdArgs;
use clap::Parser;
use config::args::parse_interval;
use config::errh::ErrorHandler;
use router::handler::split_handler_path;
use router::link::parse_router;
use router::registry;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// the standard element library must be linked for its classes to register
use elements as _;

fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn read_config(cmd: &CmdArgs) -> Result<(String, String), String> {
    match (cmd.expr(), cmd.config_file()) {
        (Some(expr), None) => Ok((expr.to_string(), "<expr>".to_string())),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(text) => Ok((text, path.display().to_string())),
            Err(e) => Err(format!("{}: {e}", path.display())),
        },
        (Some(_), Some(_)) => Err("give a CONFIG_FILE or --expr, not both".to_string()),
        (None, None) => Err("no configuration; give a CONFIG_FILE or --expr".to_string()),
    }
}

fn print_errors(errh: &ErrorHandler) {
    for message in errh.messages() {
        eprintln!("{message}");
    }
}

fn main() -> ExitCode {
    let cmd = CmdArgs::parse();
    init_logging(cmd.quiet());

    if cmd.list_classes() {
        for class in registry::class_names() {
            println!("{class}");
        }
        return ExitCode::SUCCESS;
    }

    let (text, filename) = match read_config(&cmd) {
        Ok(found) => found,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let time_limit = match cmd.time().map(parse_interval).transpose() {
        Ok(limit) => limit,
        Err(e) => {
            error!("--time: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut errh = ErrorHandler::new();
    let Ok(router) = parse_router(&text, &filename, cmd.threads(), &mut errh) else {
        print_errors(&errh);
        return ExitCode::FAILURE;
    };
    if errh.nwarnings() > 0 {
        print_errors(&errh);
    }

    let inner = Arc::clone(router.inner());
    if let Err(e) = ctrlc::set_handler(move || inner.please_stop_driver()) {
        error!("failed to set SIGINT handler: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(limit) = time_limit {
        let inner = Arc::clone(router.inner());
        std::thread::spawn(move || {
            std::thread::sleep(limit);
            info!("time limit reached");
            inner.stop_driver();
        });
    }

    info!(
        elements = router.inner().nelements(),
        threads = cmd.threads(),
        "router running"
    );
    router.run();
    info!("router stopped");

    let mut failures = 0u32;
    for path in cmd.handlers() {
        let (element, handler) = split_handler_path(path);
        match router.inner().read_handler(element, handler) {
            Ok(value) => {
                println!("{path}:");
                println!("{value}");
            }
            Err(e) => {
                error!("{path}: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
