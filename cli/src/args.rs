// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flowplane")]
#[command(version)]
#[command(about = "Run a packet-graph configuration", long_about = None)]
pub struct CmdArgs {
    #[arg(value_name = "CONFIG_FILE")]
    config_file: Option<PathBuf>,
    #[arg(short = 'e', long, value_name = "configuration text")]
    expr: Option<String>,
    #[arg(long, value_name = "router threads", default_value_t = 1)]
    threads: usize,
    #[arg(
        short = 'H',
        long = "handler",
        value_name = "ELEMENT.HANDLER to print at exit"
    )]
    handlers: Vec<String>,
    #[arg(long, value_name = "stop after this much time, e.g. 2s")]
    time: Option<String>,
    #[arg(long, help = "list the registered element classes and exit")]
    classes: bool,
    #[arg(short = 'q', long, help = "log warnings and errors only")]
    quiet: bool,
}

impl CmdArgs {
    pub fn config_file(&self) -> Option<&PathBuf> {
        self.config_file.as_ref()
    }

    pub fn expr(&self) -> Option<&str> {
        self.expr.as_deref()
    }

    pub fn threads(&self) -> usize {
        self.threads.max(1)
    }

    pub fn handlers(&self) -> &[String] {
        &self.handlers
    }

    pub fn time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    pub fn list_classes(&self) -> bool {
        self.classes
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }
}
