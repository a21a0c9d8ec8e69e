// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Live reconfiguration.
//!
//! A new configuration that keeps the same element names, classes and
//! connections is applied in place: router threads pause, changed elements
//! get `configure` called again (those that allow it), threads resume and
//! the generation counter moves. Anything structurally different means a
//! full rebuild; [`Router::take_state_from`] then migrates queue contents
//! and counters from the old router into the new one by element name.

use crate::element::{EIndex, Element};
use crate::registry;
use crate::router::{Router, RouterInner};
use config::args::Arguments;
use config::errh::ErrorHandler;
use config::expand::FlatConfig;
use config::parse::Parser;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Outcome of [`Router::live_reconfigure`].
#[derive(Debug)]
pub enum Hotswap {
    /// The new text was applied in place.
    Applied,
    /// The new text is structurally different (or an element refused);
    /// build a fresh router from the returned flat configuration.
    Incompatible(FlatConfig),
}

/// Live reconfiguration failed before anything was changed.
#[derive(Debug, thiserror::Error)]
pub enum HotswapError {
    /// The new text does not parse or expand.
    #[error("new configuration is invalid")]
    BadConfig,
    /// An element rejected its new configuration; the router keeps the old
    /// one for that element.
    #[error("element '{0}' rejected its new configuration")]
    Rejected(String),
}

fn connection_set(flat: &FlatConfig) -> BTreeSet<(String, u32, String, u32)> {
    flat.connections
        .iter()
        .map(|c| (c.from.0.clone(), c.from.1, c.to.0.clone(), c.to.1))
        .collect()
}

impl Router {
    /// Try to apply `text` to the running router in place.
    pub fn live_reconfigure(
        &self,
        text: &str,
        filename: &str,
        errh: &mut ErrorHandler,
    ) -> Result<Hotswap, HotswapError> {
        let is_class = |name: &str| registry::has_class(name);
        let parsed = Parser::new(text, filename, &is_class, errh).parse();
        if !errh.is_clean() {
            return Err(HotswapError::BadConfig);
        }
        let flat = config::expand::expand(&parsed, errh);
        if !errh.is_clean() {
            return Err(HotswapError::BadConfig);
        }

        let inner = self.inner();
        let Some(changed) = compatible_changes(inner, &flat) else {
            return Ok(Hotswap::Incompatible(flat));
        };
        if changed.is_empty() {
            debug!("live reconfigure: nothing changed");
            return Ok(Hotswap::Applied);
        }

        inner.pause_threads();
        let mut result = Ok(Hotswap::Applied);
        for (e, new_config) in changed {
            let args = Arguments::new(&new_config);
            errh.push_context(format!(
                "While reconfiguring '{} :: {}'",
                inner.name(e),
                inner.class_of(e)
            ));
            let ok = inner
                .with_element(e, |el, cx| el.configure(&args, cx, errh).is_ok())
                .unwrap_or(false);
            errh.pop_context();
            if ok {
                inner.set_configuration(e, new_config);
            } else {
                result = Err(HotswapError::Rejected(inner.name(e).to_string()));
                break;
            }
        }
        inner.bump_generation();
        inner.resume_threads();
        if result.is_ok() {
            info!("live reconfigure applied");
        }
        result
    }

    /// Migrate state from `old` into this (freshly initialized, not yet
    /// running) router: every element whose name and class match gets
    /// `take_state` called with its predecessor.
    pub fn take_state_from(&self, old: &Router, errh: &mut ErrorHandler) {
        let new_inner = self.inner();
        let old_inner = old.inner();
        for e in 0..new_inner.nelements() {
            let name = new_inner.name(e).to_string();
            let Some(old_e) = old_inner.eindex_of(&name) else {
                continue;
            };
            if old_inner.class_of(old_e) != new_inner.class_of(e) {
                continue;
            }
            let _ = new_inner.with_element(e, |new_el, _cx| {
                let _ = old_inner.with_element(old_e, |old_el, _old_cx| {
                    take_one(&mut **new_el, &mut **old_el, &name, errh);
                });
            });
        }
    }
}

fn take_one(new_el: &mut dyn Element, old_el: &mut dyn Element, name: &str, errh: &mut ErrorHandler) {
    debug!(element = name, "migrating state");
    new_el.take_state(old_el, errh);
}

/// Structural compatibility check: same names, same classes, same edges.
/// Returns the set of `(eindex, new config)` pairs that differ, or `None`
/// when only a full rebuild can apply the new text.
fn compatible_changes(inner: &RouterInner, flat: &FlatConfig) -> Option<Vec<(EIndex, String)>> {
    if flat.elements.len() != inner.nelements()
        || connection_set(flat) != connection_set(&inner.flat)
    {
        return None;
    }
    let mut changed = Vec::new();
    for decl in &flat.elements {
        let e = inner.eindex_of(&decl.name)?;
        if inner.class_of(e) != decl.class {
            return None;
        }
        if inner.configuration(e) != decl.config {
            let allows = inner
                .with_element(e, |el, _cx| el.can_live_reconfigure())
                .unwrap_or(false);
            if !allows {
                return None;
            }
            changed.push((e, decl.config.clone()));
        }
    }
    Some(changed)
}
