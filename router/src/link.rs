// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The linker: flat configuration in, initialized router out.
//!
//! Linking resolves class names to factories, sizes and types every port,
//! settles agnostic ports by fixed-point propagation (union-find over
//! agnostic-to-agnostic edges, through elements per their flow codes),
//! enforces the one-active-end rule on every edge, and then drives the
//! configure and initialize phases, cleaning up in reverse on failure.

use crate::element::{CleanupStage, EIndex, Element};
use crate::handler::{
    Handler, HandlerError, HandlerFlags, HandlerRegistry, HandlerTable, Hooks, add_default_handlers,
};
use crate::ports::{FlowCode, PortCount, PortKind, Processing};
use crate::registry;
use crate::router::{ElementMeta, Router, RouterInner};
use config::errh::ErrorHandler;
use config::expand::FlatConfig;
use config::lex::Landmark;
use config::parse::Parser;
use std::sync::Arc;
use tracing::debug;

/// Router construction failed; the details are in the [`ErrorHandler`].
#[derive(Debug, thiserror::Error)]
#[error("router construction failed")]
pub struct LinkFailed;

/// Parse, expand and link `text` into a runnable router.
pub fn parse_router(
    text: &str,
    filename: &str,
    nthreads: usize,
    errh: &mut ErrorHandler,
) -> Result<Router, LinkFailed> {
    let is_class = |name: &str| registry::has_class(name);
    let parsed = Parser::new(text, filename, &is_class, errh).parse();
    if !errh.is_clean() {
        return Err(LinkFailed);
    }
    let flat = config::expand::expand(&parsed, errh);
    if !errh.is_clean() {
        return Err(LinkFailed);
    }
    link(text, flat, nthreads, errh)
}

/// Link an already-expanded configuration.
pub fn link(
    config_text: &str,
    flat: FlatConfig,
    nthreads: usize,
    errh: &mut ErrorHandler,
) -> Result<Router, LinkFailed> {
    let ResolvedGraph {
        elements,
        mut metas,
    } = resolve_graph(&flat, errh)?;
    debug!(
        elements = elements.len(),
        connections = flat.connections.len(),
        "linking router"
    );

    let mut slots = Vec::with_capacity(elements.len());
    for (e, element) in elements.into_iter().enumerate() {
        let decl = &flat.elements[e];
        slots.push(RouterInner::make_slot(
            decl.name.clone(),
            decl.class.clone(),
            decl.config.clone(),
            element,
            metas[e].take_meta(),
        ));
    }
    let inner = Arc::new(RouterInner::new(
        config_text.to_string(),
        flat,
        slots,
        nthreads,
    ));

    // configure, collecting every element's errors before deciding
    let failed = inner.configure_all(errh);
    if !errh.is_clean() {
        inner.cleanup_all(|e| {
            if failed[e] {
                CleanupStage::ConfigureFailed
            } else {
                CleanupStage::Configured
            }
        });
        return Err(LinkFailed);
    }

    register_handlers(&inner);

    if inner.initialize_all(errh).is_err() || !errh.is_clean() {
        return Err(LinkFailed);
    }
    Ok(Router::from_inner(inner))
}

struct MetaBuilder {
    meta: Option<ElementMeta>,
}

impl MetaBuilder {
    fn take_meta(&mut self) -> ElementMeta {
        #[allow(clippy::unwrap_used)] // filled by resolve_graph for every element
        self.meta.take().unwrap()
    }
}

struct ResolvedGraph {
    elements: Vec<Box<dyn Element>>,
    metas: Vec<MetaBuilder>,
}

#[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
fn resolve_graph(flat: &FlatConfig, errh: &mut ErrorHandler) -> Result<ResolvedGraph, LinkFailed> {
    // instantiate classes
    let mut elements: Vec<Box<dyn Element>> = Vec::with_capacity(flat.elements.len());
    let mut by_name = ahash::AHashMap::new();
    for (e, decl) in flat.elements.iter().enumerate() {
        match registry::factory_for(&decl.class) {
            Some(factory) => {
                elements.push(factory());
            }
            None => {
                errh.lerror(
                    &decl.landmark,
                    format!("unknown element class '{}'", decl.class),
                );
                continue;
            }
        }
        if by_name.insert(decl.name.clone(), e).is_some() {
            errh.lerror(&decl.landmark, format!("duplicate element '{}'", decl.name));
        }
    }
    if !errh.is_clean() {
        return Err(LinkFailed);
    }

    // resolve connection endpoints and derive port counts
    let n = elements.len();
    let mut conns: Vec<((EIndex, usize), (EIndex, usize), Landmark)> = Vec::new();
    let mut nin = vec![0usize; n];
    let mut nout = vec![0usize; n];
    for conn in &flat.connections {
        let from = by_name.get(&conn.from.0).copied();
        let to = by_name.get(&conn.to.0).copied();
        let (Some(from_e), Some(to_e)) = (from, to) else {
            errh.lerror(&conn.landmark, "connection references unknown element");
            continue;
        };
        let from_port = conn.from.1 as usize;
        let to_port = conn.to.1 as usize;
        nout[from_e] = nout[from_e].max(from_port + 1);
        nin[to_e] = nin[to_e].max(to_port + 1);
        conns.push(((from_e, from_port), (to_e, to_port), conn.landmark.clone()));
    }

    // port count validation
    for (e, element) in elements.iter().enumerate() {
        let decl = &flat.elements[e];
        match PortCount::parse(element.port_count()) {
            Ok(pc) => {
                if !pc.inputs.admits(nin[e]) {
                    errh.lerror(
                        &decl.landmark,
                        format!(
                            "'{}' has {} input(s), allows {}",
                            decl.name,
                            nin[e],
                            element.port_count()
                        ),
                    );
                }
                if !pc.outputs.admits(nout[e]) {
                    errh.lerror(
                        &decl.landmark,
                        format!(
                            "'{}' has {} output(s), allows {}",
                            decl.name,
                            nout[e],
                            element.port_count()
                        ),
                    );
                }
            }
            Err(err) => errh.lerror(&decl.landmark, format!("in '{}': {err}", decl.name)),
        }
    }
    if !errh.is_clean() {
        return Err(LinkFailed);
    }

    // declared kinds, flow codes
    let mut declared: Vec<(Vec<PortKind>, Vec<PortKind>)> = Vec::with_capacity(n);
    let mut flows: Vec<FlowCode> = Vec::with_capacity(n);
    for (e, element) in elements.iter().enumerate() {
        let decl = &flat.elements[e];
        let processing = match Processing::parse(element.processing()) {
            Ok(p) => p,
            Err(err) => {
                errh.lerror(&decl.landmark, format!("in '{}': {err}", decl.name));
                Processing::parse("a/a").map_err(|_| LinkFailed)?
            }
        };
        let ins = (0..nin[e]).map(|i| processing.input(i)).collect();
        let outs = (0..nout[e]).map(|o| processing.output(o)).collect();
        declared.push((ins, outs));
        let flow = match FlowCode::parse(element.flow_code()) {
            Ok(f) => f,
            Err(err) => {
                errh.lerror(&decl.landmark, format!("in '{}': {err}", decl.name));
                FlowCode::parse("x/x").map_err(|_| LinkFailed)?
            }
        };
        flows.push(flow);
    }
    if !errh.is_clean() {
        return Err(LinkFailed);
    }

    // agnostic resolution by union-find
    let mut offset_in = vec![0usize; n];
    let mut offset_out = vec![0usize; n];
    let mut total = 0usize;
    for e in 0..n {
        offset_in[e] = total;
        total += nin[e];
        offset_out[e] = total;
        total += nout[e];
    }
    let mut uf = UnionFind::new(total);
    for &((fe, fp), (te, tp), _) in &conns {
        uf.union(offset_out[fe] + fp, offset_in[te] + tp);
    }
    for e in 0..n {
        for i in 0..nin[e] {
            if declared[e].0[i] != PortKind::Agnostic {
                continue;
            }
            for o in 0..nout[e] {
                if declared[e].1[o] == PortKind::Agnostic && flows[e].flows(i, o) {
                    uf.union(offset_in[e] + i, offset_out[e] + o);
                }
            }
        }
    }
    // component constraints
    let mut component_kind: ahash::AHashMap<usize, PortKind> = ahash::AHashMap::new();
    let mut conflict: ahash::AHashMap<usize, bool> = ahash::AHashMap::new();
    {
        let mut note = |uf: &mut UnionFind, node: usize, kind: PortKind| {
            if kind == PortKind::Agnostic {
                return;
            }
            let root = uf.find(node);
            match component_kind.get(&root) {
                Some(existing) if *existing != kind => {
                    conflict.insert(root, true);
                }
                Some(_) => {}
                None => {
                    component_kind.insert(root, kind);
                }
            }
        };
        for e in 0..n {
            for i in 0..nin[e] {
                note(&mut uf, offset_in[e] + i, declared[e].0[i]);
            }
            for o in 0..nout[e] {
                note(&mut uf, offset_out[e] + o, declared[e].1[o]);
            }
        }
    }
    for e in 0..n {
        let decl = &flat.elements[e];
        for i in 0..nin[e] {
            if conflict.contains_key(&uf.find(offset_in[e] + i)) {
                errh.lerror(
                    &decl.landmark,
                    format!("push/pull conflict reaches '{}' input {i}", decl.name),
                );
                conflict.remove(&uf.find(offset_in[e] + i));
            }
        }
        for o in 0..nout[e] {
            if conflict.contains_key(&uf.find(offset_out[e] + o)) {
                errh.lerror(
                    &decl.landmark,
                    format!("push/pull conflict reaches '{}' output {o}", decl.name),
                );
                conflict.remove(&uf.find(offset_out[e] + o));
            }
        }
    }
    if !errh.is_clean() {
        return Err(LinkFailed);
    }
    let resolved_kind = |uf: &mut UnionFind, node: usize| -> PortKind {
        match component_kind.get(&uf.find(node)) {
            Some(kind) => *kind,
            // a fully agnostic (typically unconnected) component defaults
            // to push
            None => PortKind::Push,
        }
    };

    // adjacency + one-active-end checks
    let mut in_adj: Vec<Vec<Vec<(EIndex, usize)>>> =
        (0..n).map(|e| vec![Vec::new(); nin[e]]).collect();
    let mut out_adj: Vec<Vec<Vec<(EIndex, usize)>>> =
        (0..n).map(|e| vec![Vec::new(); nout[e]]).collect();
    for &((fe, fp), (te, tp), _) in &conns {
        out_adj[fe][fp].push((te, tp));
        in_adj[te][tp].push((fe, fp));
    }
    for e in 0..n {
        let decl = &flat.elements[e];
        for o in 0..nout[e] {
            let kind = resolved_kind(&mut uf, offset_out[e] + o);
            if kind == PortKind::Push && out_adj[e][o].len() != 1 {
                errh.lerror(
                    &decl.landmark,
                    format!(
                        "push output '{}' [{o}] connected {} times, needs exactly 1",
                        decl.name,
                        out_adj[e][o].len()
                    ),
                );
            }
        }
        for i in 0..nin[e] {
            let kind = resolved_kind(&mut uf, offset_in[e] + i);
            if kind == PortKind::Pull && in_adj[e][i].len() != 1 {
                errh.lerror(
                    &decl.landmark,
                    format!(
                        "pull input '{}' [{i}] connected {} times, needs exactly 1",
                        decl.name,
                        in_adj[e][i].len()
                    ),
                );
            }
        }
    }
    if !errh.is_clean() {
        return Err(LinkFailed);
    }

    // assemble metas
    let mut metas = Vec::with_capacity(n);
    for e in 0..n {
        let in_kind = (0..nin[e])
            .map(|i| resolved_kind(&mut uf, offset_in[e] + i))
            .collect();
        let out_kind = (0..nout[e])
            .map(|o| resolved_kind(&mut uf, offset_out[e] + o))
            .collect();
        metas.push(MetaBuilder {
            meta: Some(ElementMeta {
                ninputs: nin[e],
                noutputs: nout[e],
                in_kind,
                out_kind,
                in_adj: in_adj[e].clone(),
                out_adj: out_adj[e].clone(),
                flow: flows[e].clone(),
            }),
        });
    }
    Ok(ResolvedGraph { elements, metas })
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

// ---- handler registration ----

fn register_handlers(inner: &Arc<RouterInner>) {
    {
        let mut table = inner.handlers.lock();
        register_globals(&mut table);
        for e in 0..inner.nelements() {
            add_default_handlers(&mut table, e);
        }
    }
    for e in 0..inner.nelements() {
        let _ = inner.with_element(e, |el, _cx| {
            let mut table = inner.handlers.lock();
            let mut reg = HandlerRegistry::new(&mut table, e);
            el.add_handlers(&mut reg);
        });
    }
}

fn global_read(name: &str, hook: crate::handler::GlobalReadHook) -> Handler {
    Handler {
        name: name.to_string(),
        owner: None,
        flags: HandlerFlags::READ,
        hooks: Hooks::Global {
            read: Some(hook),
            write: None,
        },
        user_data: 0,
    }
}

fn register_globals(table: &mut HandlerTable) {
    table.add(global_read("version", |_inner, _h| {
        env!("CARGO_PKG_VERSION").to_string()
    }));
    table.add(global_read("config", |inner, _h| inner.config_text.clone()));
    table.add(global_read("flatconfig", |inner, _h| inner.flat.unparse()));
    table.add(global_read("list", |inner, _h| {
        let mut out = format!("{}\n", inner.nelements());
        for e in 0..inner.nelements() {
            out.push_str(inner.name(e));
            out.push('\n');
        }
        out
    }));
    table.add(global_read("requirements", |inner, _h| {
        inner.flat.requires.join("\n")
    }));
    table.add(Handler {
        name: "stop".to_string(),
        owner: None,
        flags: HandlerFlags::WRITE | HandlerFlags::BUTTON,
        hooks: Hooks::Global {
            read: None,
            write: Some(stop_write),
        },
        user_data: 0,
    });
}

fn stop_write(
    inner: &RouterInner,
    _value: &str,
    _handler: &Handler,
    _errh: &mut ErrorHandler,
) -> Result<(), HandlerError> {
    inner.please_stop_driver();
    Ok(())
}
