// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Paint annotations: `Paint` colors packets, `PaintSwitch` routes by color.

use config::args::{Arguments, parse_u32};
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use packet::Packet;
use router::element::{Element, ElementError};
use router::handler::{
    HandlerRegistry, reconfigure_positional_read, reconfigure_positional_write,
};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::Context;

use crate::basics::drop_packet;

/// Writes a fixed color into the paint annotation of every packet.
#[derive(Default)]
pub struct Paint {
    color: u8,
}

impl Element for Paint {
    fn class_name(&self) -> &'static str {
        "Paint"
    }

    fn port_count(&self) -> &'static str {
        "1/1"
    }

    fn configure(
        &mut self,
        args: &Arguments,
        _cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let Some(text) = args.positional(0) else {
            errh.error("COLOR argument required");
            return Err(ElementError);
        };
        match parse_u32(text) {
            Ok(color) if color <= u32::from(u8::MAX) => {
                self.color = u8::try_from(color).unwrap_or(u8::MAX);
                Ok(())
            }
            _ => {
                errh.error(format!("'{text}' is not a color (0-255)"));
                Err(ElementError)
            }
        }
    }

    fn can_live_reconfigure(&self) -> bool {
        true
    }

    fn simple_action(&mut self, mut packet: Packet) -> Option<Packet> {
        packet.anno_mut().set_paint(self.color);
        Some(packet)
    }

    fn add_handlers(&self, reg: &mut HandlerRegistry<'_>) {
        reg.add_read_write(
            "color",
            0,
            reconfigure_positional_read,
            reconfigure_positional_write,
        );
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static PAINT_CLASS: ElementClass = ElementClass::new("Paint", || Box::new(Paint::default()));

/// Pushes each packet to the output numbered by its paint annotation;
/// colors with no matching output drop.
#[derive(Default)]
pub struct PaintSwitch;

impl Element for PaintSwitch {
    fn class_name(&self) -> &'static str {
        "PaintSwitch"
    }

    fn port_count(&self) -> &'static str {
        "1/1-"
    }

    fn processing(&self) -> &'static str {
        "h/h"
    }

    fn push(&mut self, cx: &Context<'_>, _port: usize, packet: Packet) {
        let port = usize::from(packet.anno().paint());
        if port < cx.noutputs() {
            cx.push(port, packet);
        } else {
            drop_packet(cx, "no output for paint color", packet);
        }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static PAINT_SWITCH_CLASS: ElementClass =
    ElementClass::new("PaintSwitch", || Box::new(PaintSwitch));
