// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `DriverManager`: a scripted stop-event machine.
//!
//! Without this element the driver exits on the first stop request. With
//! it, stop requests and timers advance a small instruction list instead:
//!
//! ```text
//! DriverManager(wait, read c.count, wait_time 0.5s, write s.active false, stop)
//! ```
//!
//! Instructions: `wait` / `wait_stop` (consume one stop event),
//! `wait_time INTERVAL`, `read HANDLER`, `write HANDLER VALUE`,
//! `save HANDLER FILE`, `append HANDLER FILE`, `loop`, `stop`. A `stop` is
//! implied at the end of every script.

use config::args::{Arguments, parse_interval};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use router::element::{ConfigurePhase, Element, ElementError};
use router::handler::split_handler_path;
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::sched::timer::{Timer, TimerHandle};
use router::Context;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const MAX_STEPS_PER_PASS: usize = 10_000;

#[derive(Debug, Clone)]
enum Instruction {
    Wait,
    WaitTime(Duration),
    Read(String),
    Write(String, String),
    Save(String, PathBuf, bool),
    Loop,
    Stop,
}

enum ScriptState {
    Blocked,
    Stopped,
}

/// Executes a stop-event script instead of the default stop-on-first-request
/// driver behavior.
#[derive(Default)]
pub struct DriverManager {
    instructions: Vec<Instruction>,
    pc: usize,
    pending_stops: u64,
    timer: Option<TimerHandle>,
    armed_timer: bool,
}

impl DriverManager {
    fn parse_instruction(item: &str, errh: &mut ErrorHandler) -> Option<Instruction> {
        let (op, rest) = item
            .split_once(char::is_whitespace)
            .map_or((item, ""), |(op, rest)| (op, rest.trim()));
        match op {
            "wait" | "wait_stop" | "wait_pause" => Some(Instruction::Wait),
            "wait_time" | "wait_for" => match parse_interval(rest) {
                Ok(interval) => Some(Instruction::WaitTime(interval)),
                Err(e) => {
                    errh.error(format!("wait_time: {e}"));
                    None
                }
            },
            "read" => Some(Instruction::Read(rest.to_string())),
            "write" => {
                let (handler, value) = rest
                    .split_once(char::is_whitespace)
                    .map_or((rest, ""), |(h, v)| (h, v.trim()));
                Some(Instruction::Write(handler.to_string(), value.to_string()))
            }
            "save" | "append" => {
                let Some((handler, file)) = rest.split_once(char::is_whitespace) else {
                    errh.error(format!("{op} needs HANDLER FILE"));
                    return None;
                };
                Some(Instruction::Save(
                    handler.to_string(),
                    PathBuf::from(file.trim()),
                    op == "append",
                ))
            }
            "loop" => Some(Instruction::Loop),
            "stop" | "quit" => Some(Instruction::Stop),
            _ => {
                errh.error(format!("unknown instruction '{op}'"));
                None
            }
        }
    }

    fn run_handler_instruction(cx: &Context<'_>, instruction: &Instruction) {
        match instruction {
            Instruction::Read(path) => {
                let (element, handler) = split_handler_path(path);
                match cx.router().read_handler(element, handler) {
                    Ok(value) => info!("{path}:\n{value}"),
                    Err(e) => warn!("read {path}: {e}"),
                }
            }
            Instruction::Write(path, value) => {
                let (element, handler) = split_handler_path(path);
                if let Err(e) = cx.router().write_handler(element, handler, value) {
                    warn!("write {path}: {e}");
                }
            }
            Instruction::Save(path, file, append) => {
                let (element, handler) = split_handler_path(path);
                match cx.router().read_handler(element, handler) {
                    Ok(value) => {
                        let result = if *append {
                            use std::io::Write;
                            std::fs::OpenOptions::new()
                                .create(true)
                                .append(true)
                                .open(file)
                                .and_then(|mut f| f.write_all(value.as_bytes()))
                        } else {
                            std::fs::write(file, value)
                        };
                        if let Err(e) = result {
                            warn!("save {path} to {}: {e}", file.display());
                        }
                    }
                    Err(e) => warn!("save {path}: {e}"),
                }
            }
            _ => {}
        }
    }

    /// Advance the script until it blocks or stops.
    fn run_script(&mut self, cx: &Context<'_>) -> ScriptState {
        let mut steps = 0usize;
        while self.pc < self.instructions.len() {
            steps += 1;
            if steps > MAX_STEPS_PER_PASS {
                warn!("script ran {MAX_STEPS_PER_PASS} steps without waiting; stopping it");
                return ScriptState::Stopped;
            }
            let instruction = self.instructions[self.pc].clone();
            match instruction {
                Instruction::Wait => {
                    if self.pending_stops == 0 {
                        return ScriptState::Blocked;
                    }
                    self.pending_stops -= 1;
                    self.pc += 1;
                }
                Instruction::WaitTime(interval) => {
                    if self.armed_timer {
                        // still waiting on the timer
                        return ScriptState::Blocked;
                    }
                    if let Some(timer) = &self.timer {
                        self.armed_timer = true;
                        timer.schedule_after(interval);
                        return ScriptState::Blocked;
                    }
                    self.pc += 1;
                }
                Instruction::Loop => {
                    self.pc = 0;
                }
                Instruction::Stop => {
                    return ScriptState::Stopped;
                }
                other => {
                    Self::run_handler_instruction(cx, &other);
                    self.pc += 1;
                }
            }
        }
        ScriptState::Stopped
    }
}

impl Element for DriverManager {
    fn class_name(&self) -> &'static str {
        "DriverManager"
    }

    fn configure_phase(&self) -> ConfigurePhase {
        ConfigurePhase::Last
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let before = errh.nerrors();
        self.instructions.clear();
        for item in args.iter() {
            if let Some(instruction) = Self::parse_instruction(item, errh) {
                self.instructions.push(instruction);
            }
        }
        if self.instructions.is_empty() {
            self.instructions.push(Instruction::Wait);
        }
        if !matches!(self.instructions.last(), Some(Instruction::Stop)) {
            self.instructions.push(Instruction::Stop);
        }
        if errh.nerrors() == before {
            Ok(())
        } else {
            Err(ElementError)
        }
    }

    fn initialize(&mut self, cx: &Context<'_>, _errh: &mut ErrorHandler) -> Result<(), ElementError> {
        cx.router().set_driver_manager(cx.eindex());
        let timer = Timer::new();
        cx.initialize_timer(&timer);
        self.timer = Some(timer);
        if matches!(self.run_script(cx), ScriptState::Stopped) {
            cx.router().stop_driver();
        }
        Ok(())
    }

    fn handle_stop(&mut self, cx: &Context<'_>) -> bool {
        self.pending_stops += 1;
        matches!(self.run_script(cx), ScriptState::Stopped)
    }

    fn run_timer(&mut self, cx: &Context<'_>, _timer: &TimerHandle) {
        if self.armed_timer {
            // the wait_time we armed has elapsed
            self.armed_timer = false;
            self.pc += 1;
        }
        if matches!(self.run_script(cx), ScriptState::Stopped) {
            cx.router().stop_driver();
        }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static DRIVER_MANAGER_CLASS: ElementClass =
    ElementClass::new("DriverManager", || Box::new(DriverManager::default()));
