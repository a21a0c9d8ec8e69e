// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Information elements.
//!
//! These have no ports; they run in the Info configure phase and populate
//! router attachments that other elements consult at initialize time.

use config::args::Arguments;
use config::errh::ErrorHandler;
use linkme::distributed_slice;
use router::attachments::{ANNOTATION_INFO, AnnotationClaims, FRAC_BITS, SCHEDULE_INFO};
use router::element::{ConfigurePhase, Element, ElementError};
use router::registry::{ELEMENT_CLASSES, ElementClass};
use router::Context;

/// `ScheduleInfo(ELEMENT FACTOR, ...)`: scheduling parameters for named
/// elements. A ScheduleInfo inside a compound prefixes its entries with the
/// compound's name, so outer factors scale inner ones multiplicatively.
#[derive(Default)]
pub struct ScheduleInfo;

impl Element for ScheduleInfo {
    fn class_name(&self) -> &'static str {
        "ScheduleInfo"
    }

    fn configure_phase(&self) -> ConfigurePhase {
        ConfigurePhase::Info
    }

    fn configure(
        &mut self,
        args: &Arguments,
        cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let table = cx
            .router()
            .attachment_or_default::<router::attachments::ScheduleInfoTable>(SCHEDULE_INFO);
        // entries of a compound's ScheduleInfo apply inside that compound
        let prefix = cx
            .name()
            .rfind('/')
            .map_or_else(String::new, |cut| cx.name()[..=cut].to_string());
        let mut ok = true;
        for item in args.iter() {
            let Some((element, factor)) = item.split_once(char::is_whitespace) else {
                errh.error(format!("expected 'ELEMENT FACTOR', got '{item}'"));
                ok = false;
                continue;
            };
            let factor = factor.trim();
            match factor.parse::<f64>() {
                Ok(f) if f > 0.0 && f.is_finite() => {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let fixed = (f * f64::from(1u32 << FRAC_BITS)).round() as u64;
                    table.insert(&format!("{prefix}{element}"), fixed.max(1));
                }
                _ => {
                    errh.error(format!("'{factor}' is not a positive scheduling factor"));
                    ok = false;
                }
            }
        }
        if ok { Ok(()) } else { Err(ElementError) }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static SCHEDULE_INFO_CLASS: ElementClass =
    ElementClass::new("ScheduleInfo", || Box::new(ScheduleInfo));

/// `StaticThreadSched(ELEMENT THREAD, ...)`: pin elements' tasks and timers
/// to router threads.
#[derive(Default)]
pub struct StaticThreadSched;

impl Element for StaticThreadSched {
    fn class_name(&self) -> &'static str {
        "StaticThreadSched"
    }

    fn configure_phase(&self) -> ConfigurePhase {
        ConfigurePhase::Info
    }

    fn configure(
        &mut self,
        args: &Arguments,
        cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let table = cx
            .router()
            .attachment_or_default::<router::attachments::ThreadSchedTable>(
                router::attachments::THREAD_SCHED,
            );
        let nthreads = cx.router().nthreads();
        let mut ok = true;
        for item in args.iter() {
            let parsed = item
                .split_once(char::is_whitespace)
                .and_then(|(name, t)| t.trim().parse::<usize>().ok().map(|t| (name, t)));
            match parsed {
                Some((name, thread)) if thread < nthreads => table.insert(name, thread),
                Some((_, thread)) => {
                    errh.error(format!("thread {thread} out of range (have {nthreads})"));
                    ok = false;
                }
                None => {
                    errh.error(format!("expected 'ELEMENT THREAD', got '{item}'"));
                    ok = false;
                }
            }
        }
        if ok { Ok(()) } else { Err(ElementError) }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static STATIC_THREAD_SCHED_CLASS: ElementClass =
    ElementClass::new("StaticThreadSched", || Box::new(StaticThreadSched));

/// `AnnotationInfo(NAME OFFSET LENGTH, ...)`: formally claim annotation
/// byte ranges and reject overlapping claims at configure time.
#[derive(Default)]
pub struct AnnotationInfo;

impl Element for AnnotationInfo {
    fn class_name(&self) -> &'static str {
        "AnnotationInfo"
    }

    fn configure_phase(&self) -> ConfigurePhase {
        ConfigurePhase::Info
    }

    fn configure(
        &mut self,
        args: &Arguments,
        cx: &Context<'_>,
        errh: &mut ErrorHandler,
    ) -> Result<(), ElementError> {
        let claims = cx
            .router()
            .attachment_or_default::<AnnotationClaims>(ANNOTATION_INFO);
        let mut ok = true;
        for item in args.iter() {
            let mut fields = item.split_whitespace();
            let parsed = match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(name), Some(off), Some(len), None) => off
                    .parse::<usize>()
                    .ok()
                    .zip(len.parse::<usize>().ok())
                    .map(|(off, len)| (name, off, len)),
                _ => None,
            };
            let Some((name, offset, len)) = parsed else {
                errh.error(format!("expected 'NAME OFFSET LENGTH', got '{item}'"));
                ok = false;
                continue;
            };
            if len == 0 || offset + len > packet::ANNO_SIZE {
                errh.error(format!(
                    "claim '{name}' does not fit the {}-byte annotation area",
                    packet::ANNO_SIZE
                ));
                ok = false;
                continue;
            }
            if let Err(overlap) = claims.claim(name, offset, len) {
                errh.error(overlap);
                ok = false;
            }
        }
        if ok { Ok(()) } else { Err(ElementError) }
    }
}

#[distributed_slice(ELEMENT_CLASSES)]
static ANNOTATION_INFO_CLASS: ElementClass =
    ElementClass::new("AnnotationInfo", || Box::new(AnnotationInfo));
