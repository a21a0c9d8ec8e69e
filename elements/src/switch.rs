// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `Switch`: route every packet to one runtime-selectable output.

use config::args::Arguments;
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use packet::Packet;
use router::element::{Element, ElementError};
use router::handler::{Handler, HandlerError, HandlerRegistry};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::{Context, errno, llrpc};

use crate::basics::drop_packet;

/// Push-only demultiplexer. The active output is set at configure time and
/// changed at runtime through the `switch` handler or LLRPC; `-1` drops
/// everything.
#[derive(Default)]
pub struct Switch {
    output: i64,
}

impl Switch {
    /// The active output, `-1` meaning drop.
    pub fn output(&self) -> i64 {
        self.output
    }

    fn set_output(&mut self, output: i64, noutputs: usize) -> Result<(), String> {
        let max = i64::try_from(noutputs).unwrap_or(i64::MAX);
        if output < -1 || output >= max {
            return Err(format!("output {output} out of range -1..{max}"));
        }
        self.output = output;
        Ok(())
    }
}

fn switch_read(el: &dyn Element, _cx: &Context<'_>, _h: &Handler) -> String {
    el.downcast_ref::<Switch>()
        .map_or_else(String::new, |s| s.output.to_string())
}

fn switch_write(
    el: &mut dyn Element,
    value: &str,
    cx: &Context<'_>,
    _h: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    let output: i64 = value
        .trim()
        .parse()
        .map_err(|_| HandlerError::Invalid(format!("'{value}' is not an integer")))?;
    if let Some(s) = el.downcast_mut::<Switch>() {
        s.set_output(output, cx.noutputs())
            .map_err(HandlerError::Invalid)?;
    }
    Ok(())
}

impl Element for Switch {
    fn class_name(&self) -> &'static str {
        "Switch"
    }

    fn port_count(&self) -> &'static str {
        "1/1-"
    }

    fn processing(&self) -> &'static str {
        "h/h"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let mut output = 0i64;
        if let Some(text) = args.positional(0) {
            match text.trim().parse::<i64>() {
                Ok(n) => output = n,
                Err(_) => {
                    errh.error(format!("'{text}' is not an integer"));
                    return Err(ElementError);
                }
            }
        }
        if let Err(e) = self.set_output(output, cx.noutputs()) {
            errh.error(e);
            return Err(ElementError);
        }
        Ok(())
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn push(&mut self, cx: &Context<'_>, _port: usize, packet: Packet) {
        match usize::try_from(self.output) {
            Ok(port) => cx.push(port, packet),
            Err(_) => drop_packet(cx, "switch disabled", packet),
        }
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read_write("switch", 0, switch_read, switch_write);
    }

    fn llrpc(&mut self, cmd: u32, data: &mut [u8]) -> Result<(), i32> {
        match cmd {
            llrpc::GET_SWITCH => {
                let value = u32::try_from(self.output).unwrap_or(u32::MAX);
                llrpc::write_u32(data, value)
            }
            llrpc::SET_SWITCH => {
                let raw = llrpc::read_u32(data)?;
                // u32::MAX encodes "drop"
                self.output = if raw == u32::MAX { -1 } else { i64::from(raw) };
                Ok(())
            }
            _ => Err(errno::ENOTSUP),
        }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static SWITCH_CLASS: ElementClass = ElementClass::new("Switch", || Box::new(Switch::default()));
