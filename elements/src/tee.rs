// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `Tee`: copy each packet to every output.

use config::args::{Arguments, parse_usize};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use packet::Packet;
use router::element::{Element, ElementError};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::Context;

/// Push-only fan-out: output 0 gets the packet, every further output gets a
/// zero-copy clone.
#[derive(Default)]
pub struct Tee;

impl Element for Tee {
    fn class_name(&self) -> &'static str {
        "Tee"
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
        // the optional argument documents the fan-out; it must match the
        // connected outputs
        if let Some(text) = args.positional(0) {
            match parse_usize(text) {
                Ok(n) if n == cx.noutputs() => {}
                Ok(n) => {
                    errh.error(format!(
                        "configured for {n} outputs but {} are connected",
                        cx.noutputs()
                    ));
                    return Err(ElementError);
                }
                Err(e) => {
                    errh.error(e);
                    return Err(ElementError);
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, cx: &Context<'_>, _port: usize, packet: Packet) {
        for port in 1..cx.noutputs() {
            cx.push(port, packet.clone());
        }
        cx.push(0, packet);
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static TEE_CLASS: ElementClass = ElementClass::new("Tee", || Box::new(Tee));
