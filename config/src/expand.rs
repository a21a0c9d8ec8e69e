// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Compound-element expansion.
//!
//! Expansion turns a parsed configuration into a flat list of element
//! declarations and connections. Compound instances disappear: their bodies
//! are stamped out with hierarchical `outer/inner` names and `$variable`
//! substitution, and the pseudo-elements standing for their external ports
//! are spliced out of the connection list.

use crate::args::split_args;
use crate::errh::ErrorHandler;
use crate::lex::Landmark;
use crate::parse::{ClassDef, ConnAst, ParsedConfig, PortRef, TUNNEL_CLASS};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Maximum compound nesting depth; deeper graphs are assumed recursive.
const MAX_DEPTH: usize = 100;

/// A flat element declaration.
#[derive(Debug, Clone)]
pub struct FlatElement {
    /// Full hierarchical name.
    pub name: String,
    /// Class name, to be resolved by the linker.
    pub class: String,
    /// Configuration string after variable substitution.
    pub config: String,
    /// Where the element was declared.
    pub landmark: Landmark,
}

/// A flat connection between real elements.
#[derive(Debug, Clone)]
pub struct FlatConnection {
    /// Source element name and output port.
    pub from: (String, u32),
    /// Destination element name and input port.
    pub to: (String, u32),
    /// Where the connection was written.
    pub landmark: Landmark,
}

/// The expanded configuration handed to the linker.
#[derive(Debug, Clone, Default)]
pub struct FlatConfig {
    /// Elements in declaration order.
    pub elements: Vec<FlatElement>,
    /// Connections in declaration order.
    pub connections: Vec<FlatConnection>,
    /// Accumulated `require(...)` items.
    pub requires: Vec<String>,
}

impl FlatConfig {
    /// Render back into configuration text (the `flatconfig` handler).
    #[must_use]
    pub fn unparse(&self) -> String {
        let mut out = String::new();
        for element in &self.elements {
            out.push_str(&element.name);
            out.push_str(" :: ");
            out.push_str(&element.class);
            if element.config.is_empty() {
                out.push_str(";\n");
            } else {
                out.push('(');
                out.push_str(&element.config);
                out.push_str(");\n");
            }
        }
        for conn in &self.connections {
            out.push_str(&format!(
                "{} [{}] -> [{}] {};\n",
                conn.from.0, conn.from.1, conn.to.1, conn.to.0
            ));
        }
        out
    }
}

/// Substitute `$name` / `${name}` variable references outside single quotes.
/// Unknown variables are left verbatim.
#[must_use]
pub fn substitute(text: &str, env: &HashMap<String, String>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0usize;
    let mut in_single = false;
    while pos < bytes.len() {
        let b = bytes[pos];
        if b == b'\'' {
            in_single = !in_single;
            out.push('\'');
            pos += 1;
        } else if b == b'$' && !in_single {
            let (name, consumed) = if bytes.get(pos + 1) == Some(&b'{') {
                match bytes[pos + 2..].iter().position(|&c| c == b'}') {
                    Some(close) => (
                        String::from_utf8_lossy(&bytes[pos + 2..pos + 2 + close]).into_owned(),
                        close + 3,
                    ),
                    None => (String::new(), 1),
                }
            } else {
                let end = bytes[pos + 1..]
                    .iter()
                    .position(|&c| !(c.is_ascii_alphanumeric() || c == b'_'))
                    .map_or(bytes.len(), |off| pos + 1 + off);
                (
                    String::from_utf8_lossy(&bytes[pos + 1..end]).into_owned(),
                    end - pos,
                )
            };
            match env.get(&name) {
                Some(value) if !name.is_empty() => out.push_str(value),
                _ => out.push_str(&text[pos..pos + consumed]),
            }
            pos += consumed;
        } else {
            out.push(char::from(b));
            pos += 1;
        }
    }
    out
}

struct Expander<'e> {
    errh: &'e mut ErrorHandler,
    elements: Vec<FlatElement>,
    conns: Vec<FlatConnection>,
    requires: Vec<String>,
    tunnels: HashSet<String>,
}

/// Expand `config` into a flat configuration, reporting problems to `errh`.
pub fn expand(config: &ParsedConfig, errh: &mut ErrorHandler) -> FlatConfig {
    let mut expander = Expander {
        errh,
        elements: Vec::new(),
        conns: Vec::new(),
        requires: Vec::new(),
        tunnels: HashSet::new(),
    };
    let mut class_stack: Vec<&[ClassDef]> = Vec::new();
    expander.scope(config, "", &HashMap::new(), &mut class_stack, 0);
    let connections = expander.splice_tunnels();
    FlatConfig {
        elements: expander.elements,
        connections,
        requires: expander.requires,
    }
}

impl Expander<'_> {
    fn scope<'c>(
        &mut self,
        scope: &'c ParsedConfig,
        prefix: &str,
        outer_env: &HashMap<String, String>,
        class_stack: &mut Vec<&'c [ClassDef]>,
        depth: usize,
    ) {
        if depth > MAX_DEPTH {
            self.errh
                .error("compound elements nested too deeply (recursive elementclass?)");
            return;
        }
        class_stack.push(&scope.classes);
        let mut env = outer_env.clone();
        for (name, value) in &scope.defines {
            env.entry(name.clone()).or_insert_with(|| value.clone());
        }
        self.requires.extend(scope.requires.iter().cloned());

        let mut compound_instances: HashSet<&str> = HashSet::new();
        for decl in &scope.decls {
            let full = format!("{prefix}{}", decl.name);
            if decl.class == TUNNEL_CLASS {
                self.tunnels.insert(full);
                continue;
            }
            let class_def = class_stack
                .iter()
                .rev()
                .find_map(|defs| defs.iter().find(|def| def.name == decl.class));
            if let Some(def) = class_def {
                compound_instances.insert(decl.name.as_str());
                let args = split_args(&substitute(&decl.config, &env));
                let Some(variant) = def.variants.iter().find(|v| v.params.len() == args.len())
                else {
                    self.errh.lerror(
                        &decl.landmark,
                        format!(
                            "compound class '{}' has no variant taking {} argument(s)",
                            def.name,
                            args.len()
                        ),
                    );
                    continue;
                };
                trace!(instance = %full, class = %def.name, "expanding compound");
                let mut inner_env = env.clone();
                for (param, arg) in variant.params.iter().zip(&args) {
                    inner_env.insert(param.clone(), arg.clone());
                }
                let inner_prefix = format!("{full}/");
                self.scope(&variant.body, &inner_prefix, &inner_env, class_stack, depth + 1);
            } else {
                self.elements.push(FlatElement {
                    name: full,
                    class: decl.class.clone(),
                    config: substitute(&decl.config, &env),
                    landmark: decl.landmark.clone(),
                });
            }
        }

        for conn in &scope.conns {
            let from = endpoint(prefix, &conn.from, &compound_instances, "/output");
            let to = endpoint(prefix, &conn.to, &compound_instances, "/input");
            self.conns.push(FlatConnection {
                from,
                to,
                landmark: conn.landmark.clone(),
            });
        }
        class_stack.pop();
    }

    /// Remove tunnel pseudo-elements by joining each connection into a
    /// tunnel port with every connection out of the same port.
    fn splice_tunnels(&mut self) -> Vec<FlatConnection> {
        let mut out = Vec::new();
        for conn in &self.conns {
            if self.tunnels.contains(&conn.from.0) {
                continue;
            }
            let mut visited = HashSet::new();
            let mut targets = Vec::new();
            self.resolve(&conn.to, &mut visited, &mut targets);
            if targets.is_empty() && self.tunnels.contains(&conn.to.0) {
                self.errh.lwarning(
                    &conn.landmark,
                    format!("connection into '{}' port {} goes nowhere", conn.to.0, conn.to.1),
                );
            }
            for target in targets {
                out.push(FlatConnection {
                    from: conn.from.clone(),
                    to: target,
                    landmark: conn.landmark.clone(),
                });
            }
        }
        out
    }

    fn resolve(
        &self,
        endpoint: &(String, u32),
        visited: &mut HashSet<(String, u32)>,
        targets: &mut Vec<(String, u32)>,
    ) {
        if !self.tunnels.contains(&endpoint.0) {
            targets.push(endpoint.clone());
            return;
        }
        if !visited.insert(endpoint.clone()) {
            return;
        }
        for conn in &self.conns {
            if conn.from == *endpoint {
                self.resolve(&conn.to, visited, targets);
            }
        }
    }
}

fn endpoint(
    prefix: &str,
    port_ref: &PortRef,
    compound_instances: &HashSet<&str>,
    side: &str,
) -> (String, u32) {
    let name = if compound_instances.contains(port_ref.element.as_str()) {
        format!("{prefix}{}{side}", port_ref.element)
    } else {
        format!("{prefix}{}", port_ref.element)
    };
    (name, port_ref.port)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::Parser;
    use pretty_assertions::assert_eq;

    fn classes(name: &str) -> bool {
        matches!(name, "Queue" | "Null" | "Discard" | "Idle" | "InfiniteSource")
    }

    fn expand_text(text: &str) -> FlatConfig {
        let mut errh = ErrorHandler::new();
        let parsed = Parser::new(text, "test", &classes, &mut errh).parse();
        let flat = expand(&parsed, &mut errh);
        assert!(errh.is_clean(), "unexpected errors: {}", errh.render());
        flat
    }

    #[test]
    fn flat_config_passes_through() {
        let flat = expand_text("src :: Idle; src -> Discard;");
        let names: Vec<_> = flat.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["src", "Discard@1"]);
        assert_eq!(flat.connections.len(), 1);
        assert_eq!(flat.connections[0].from, ("src".to_string(), 0));
    }

    #[test]
    fn compound_expands_with_hierarchical_names() {
        let flat = expand_text(
            "elementclass Buffered { $cap | input -> q :: Queue($cap) -> output }\n\
             b :: Buffered(32); Idle -> b -> Discard;",
        );
        let names: Vec<_> = flat.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b/q", "Idle@1", "Discard@2"]);
        let q = &flat.elements[0];
        assert_eq!(q.class, "Queue");
        assert_eq!(q.config, "32");
        // Idle -> b/q and b/q -> Discard after tunnel splicing
        assert_eq!(flat.connections.len(), 2);
        let pairs: Vec<_> = flat
            .connections
            .iter()
            .map(|c| (c.from.0.as_str(), c.to.0.as_str()))
            .collect();
        assert!(pairs.contains(&("Idle@1", "b/q")));
        assert!(pairs.contains(&("b/q", "Discard@2")));
    }

    #[test]
    fn nested_compounds() {
        let flat = expand_text(
            "elementclass Inner { input -> Null -> output }\n\
             elementclass Outer { input -> i :: Inner -> output }\n\
             Idle -> o :: Outer -> Discard;",
        );
        let names: Vec<_> = flat.elements.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"o/i/Null@1"));
        assert_eq!(flat.connections.len(), 2);
    }

    #[test]
    fn variant_selected_by_arity() {
        let flat = expand_text(
            "elementclass B { input -> output || $cap | input -> Queue($cap) -> output }\n\
             plain :: B; sized :: B(9);\n\
             Idle -> plain -> Discard; Idle -> sized -> Discard;",
        );
        // plain variant has no queue; sized does
        assert!(flat.elements.iter().any(|e| e.name == "sized/Queue@1" && e.config == "9"));
        assert!(!flat.elements.iter().any(|e| e.name.starts_with("plain/Queue")));
    }

    #[test]
    fn defines_give_defaults_and_args_override() {
        let flat = expand_text(
            "elementclass B { $cap | define($extra 4); input -> Queue($cap) -> output }\n\
             b :: B(16); Idle -> b -> Discard;",
        );
        let q = flat.elements.iter().find(|e| e.class == "Queue").unwrap();
        assert_eq!(q.config, "16");
    }

    #[test]
    fn substitute_variables() {
        let mut env = HashMap::new();
        env.insert("cap".to_string(), "64".to_string());
        assert_eq!(substitute("$cap", &env), "64");
        assert_eq!(substitute("${cap}x", &env), "64x");
        assert_eq!(substitute("'$cap'", &env), "'$cap'");
        assert_eq!(substitute("$unknown", &env), "$unknown");
    }

    #[test]
    fn no_matching_variant_is_an_error() {
        let mut errh = ErrorHandler::new();
        let parsed = Parser::new(
            "elementclass B { input -> output } b :: B(1, 2); Idle -> b -> Discard;",
            "test",
            &classes,
            &mut errh,
        )
        .parse();
        let _ = expand(&parsed, &mut errh);
        assert!(errh.nerrors() > 0);
    }

    #[test]
    fn unparse_round_trips_structure() {
        let flat = expand_text("q :: Queue(4); Idle -> q -> Discard;");
        let text = flat.unparse();
        assert!(text.contains("q :: Queue(4);"));
        assert!(text.contains("Idle@1 [0] -> [0] q;"));
    }
}
