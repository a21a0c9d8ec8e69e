// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Recursive-descent parser producing the configuration AST.
//!
//! The parser knows declared element names and visible class names; base
//! element classes live in the runtime's registry, so callers supply a
//! predicate for them. Compound classes (`elementclass`) are collected into
//! the AST and become visible to later statements in the same or nested
//! scopes.

use crate::args::split_args;
use crate::errh::ErrorHandler;
use crate::lex::{Landmark, LexKind, Lexeme, Lexer};

/// Class name given to the pseudo-elements standing for a compound's
/// external ports inside its body.
pub const TUNNEL_CLASS: &str = "<tunnel>";

/// One element declaration.
#[derive(Debug, Clone)]
pub struct Decl {
    /// Declared name (synthetic `Class@n` for anonymous declarations).
    pub name: String,
    /// Class name; compound classes by their (possibly synthetic) name.
    pub class: String,
    /// Raw configuration string.
    pub config: String,
    /// Where the declaration appeared.
    pub landmark: Landmark,
}

/// One endpoint of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRef {
    /// Element name.
    pub element: String,
    /// Port number (0 when unspecified).
    pub port: u32,
}

/// One directed connection.
#[derive(Debug, Clone)]
pub struct ConnAst {
    /// Source (an output port).
    pub from: PortRef,
    /// Destination (an input port).
    pub to: PortRef,
    /// Where the arrow appeared.
    pub landmark: Landmark,
}

/// One overload of a compound class.
#[derive(Debug, Clone)]
pub struct ClassVariant {
    /// Formal parameter names (without the `$`).
    pub params: Vec<String>,
    /// The compound body.
    pub body: ParsedConfig,
}

/// A compound class definition.
#[derive(Debug, Clone)]
pub struct ClassDef {
    /// Class name (synthetic `@compound@n` for inline bodies).
    pub name: String,
    /// Overloads, tried by parameter count.
    pub variants: Vec<ClassVariant>,
    /// Where the definition appeared.
    pub landmark: Landmark,
}

/// A parsed scope: the top level of a file or one compound body.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
    /// Element declarations in order.
    pub decls: Vec<Decl>,
    /// Connections in order.
    pub conns: Vec<ConnAst>,
    /// Compound classes defined in this scope.
    pub classes: Vec<ClassDef>,
    /// `require(...)` items.
    pub requires: Vec<String>,
    /// `define($var value)` bindings.
    pub defines: Vec<(String, String)>,
}

impl ParsedConfig {
    fn find_decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name == name)
    }
}

enum ScopeEnd {
    Eof,
    Brace,
    BarBar,
}

/// The parser. One instance parses one configuration string.
pub struct Parser<'a, 'e> {
    lexer: Lexer<'a>,
    errh: &'e mut ErrorHandler,
    is_base_class: &'e dyn Fn(&str) -> bool,
    class_scopes: Vec<Vec<String>>,
    anon: usize,
}

impl<'a, 'e> Parser<'a, 'e> {
    /// Parse `text` (from `filename`), resolving base element classes with
    /// `is_base_class`. Problems are reported to `errh`; the returned AST is
    /// whatever could be salvaged.
    pub fn new(
        text: &'a str,
        filename: &str,
        is_base_class: &'e dyn Fn(&str) -> bool,
        errh: &'e mut ErrorHandler,
    ) -> Self {
        Parser {
            lexer: Lexer::new(text, filename),
            errh,
            is_base_class,
            class_scopes: vec![Vec::new()],
            anon: 0,
        }
    }

    /// Run the parser over the whole input.
    pub fn parse(mut self) -> ParsedConfig {
        let (config, end) = self.parse_scope(false);
        if !matches!(end, ScopeEnd::Eof) {
            let landmark = self.lexer.landmark();
            self.errh.lerror(&landmark, "unexpected '}'");
        }
        config
    }

    fn is_class(&self, name: &str) -> bool {
        self.class_scopes
            .iter()
            .rev()
            .any(|scope| scope.iter().any(|c| c == name))
            || (self.is_base_class)(name)
    }

    fn anon_name(&mut self, class: &str) -> String {
        self.anon += 1;
        format!("{class}@{}", self.anon)
    }

    fn parse_scope(&mut self, in_compound: bool) -> (ParsedConfig, ScopeEnd) {
        let mut scope = ParsedConfig::default();
        if in_compound {
            for pseudo in ["input", "output"] {
                scope.decls.push(Decl {
                    name: pseudo.to_string(),
                    class: TUNNEL_CLASS.to_string(),
                    config: String::new(),
                    landmark: Landmark::none(),
                });
            }
        }
        let end = loop {
            let lx = self.lexer.lex();
            match lx.kind {
                LexKind::Eof => break ScopeEnd::Eof,
                LexKind::Punct('}') => break ScopeEnd::Brace,
                LexKind::BarBar => break ScopeEnd::BarBar,
                LexKind::Punct(';') => {}
                LexKind::Elementclass => self.parse_elementclass(&mut scope),
                LexKind::Require => {
                    for item in self.parse_paren_args(&lx.landmark) {
                        scope.requires.push(item);
                    }
                }
                LexKind::Define => {
                    for item in self.parse_paren_args(&lx.landmark) {
                        match item.strip_prefix('$') {
                            Some(binding) => {
                                let (name, value) =
                                    binding.split_once(char::is_whitespace).unwrap_or((binding, ""));
                                scope
                                    .defines
                                    .push((name.to_string(), value.trim().to_string()));
                            }
                            None => self
                                .errh
                                .lerror(&lx.landmark, format!("bad define '{item}'")),
                        }
                    }
                }
                _ => {
                    self.lexer.unlex(lx);
                    self.parse_connection_statement(&mut scope);
                }
            }
        };
        (scope, end)
    }

    /// `require(...)` / `define(...)` argument lists.
    fn parse_paren_args(&mut self, landmark: &Landmark) -> Vec<String> {
        if !self.lexer.expect(&LexKind::Punct('(')) {
            self.errh.lerror(landmark, "expected '('");
            return Vec::new();
        }
        let raw = self.lexer.lex_config();
        if !self.lexer.expect(&LexKind::Punct(')')) {
            self.errh.lerror(landmark, "expected ')'");
        }
        split_args(&raw)
    }

    /// `elementclass Name { [$a, $b |] body [|| ...] }`
    fn parse_elementclass(&mut self, scope: &mut ParsedConfig) {
        let name_lx = self.lexer.lex();
        if !name_lx.is(&LexKind::Ident) {
            self.errh
                .lerror(&name_lx.landmark, "expected element class name");
            self.lexer.unlex(name_lx);
            return;
        }
        let Some(def) = self.parse_compound_body(name_lx.text.clone(), &name_lx.landmark) else {
            return;
        };
        self.declare_class(def.name.clone());
        scope.classes.push(def);
    }

    fn declare_class(&mut self, name: String) {
        if let Some(scope) = self.class_scopes.last_mut() {
            scope.push(name);
        }
    }

    /// Parse `{ ... }` compound variants. `name` becomes the class name.
    fn parse_compound_body(&mut self, name: String, landmark: &Landmark) -> Option<ClassDef> {
        if !self.lexer.expect(&LexKind::Punct('{')) {
            self.errh.lerror(landmark, "expected '{'");
            return None;
        }
        self.class_scopes.push(Vec::new());
        let mut variants = Vec::new();
        loop {
            let params = self.parse_compound_params();
            let (body, end) = self.parse_scope(true);
            variants.push(ClassVariant { params, body });
            match end {
                ScopeEnd::BarBar => {}
                ScopeEnd::Brace => break,
                ScopeEnd::Eof => {
                    self.errh
                        .lerror(landmark, format!("unterminated compound class '{name}'"));
                    break;
                }
            }
        }
        self.class_scopes.pop();
        Some(ClassDef {
            name,
            variants,
            landmark: landmark.clone(),
        })
    }

    /// `$a, $b |` parameter prologue of a compound variant, if present.
    fn parse_compound_params(&mut self) -> Vec<String> {
        let mut params = Vec::new();
        if !self.lexer.peek().is(&LexKind::Variable) {
            return params;
        }
        loop {
            let lx = self.lexer.lex();
            if lx.is(&LexKind::Variable) {
                params.push(lx.text);
            } else {
                self.errh.lerror(&lx.landmark, "expected '$' parameter");
                break;
            }
            let sep = self.lexer.lex();
            match sep.kind {
                LexKind::Punct(',') => {}
                LexKind::Punct('|') => break,
                _ => {
                    self.errh
                        .lerror(&sep.landmark, "expected ',' or '|' after parameter");
                    self.lexer.unlex(sep);
                    break;
                }
            }
        }
        params
    }

    /// `[port]`, if present.
    fn parse_port(&mut self, scope_name: &str) -> Option<u32> {
        if !self.lexer.expect(&LexKind::Punct('[')) {
            return None;
        }
        let lx = self.lexer.lex();
        let port = if lx.is(&LexKind::Ident) {
            match lx.text.parse::<u32>() {
                Ok(port) => Some(port),
                Err(_) => {
                    self.errh.lerror(
                        &lx.landmark,
                        format!("bad port number '{}' on {scope_name}", lx.text),
                    );
                    Some(0)
                }
            }
        } else {
            self.errh.lerror(&lx.landmark, "expected port number");
            self.lexer.unlex(lx);
            Some(0)
        };
        if !self.lexer.expect(&LexKind::Punct(']')) {
            let landmark = self.lexer.landmark();
            self.errh.lerror(&landmark, "expected ']'");
        }
        port
    }

    /// An element reference with optional surrounding ports. Handles
    /// anonymous declarations (`Queue(8)`) and named declarations
    /// (`a, b :: Class(args)`). Returns `(in_port, name, out_port)`.
    fn parse_element(&mut self, scope: &mut ParsedConfig) -> Option<(u32, String, u32)> {
        let in_port = self.parse_port("input").unwrap_or(0);
        let lx = self.lexer.lex();
        let landmark = lx.landmark.clone();
        let name = match lx.kind {
            LexKind::Ident => lx.text,
            LexKind::Punct('{') => {
                // anonymous inline compound: `... -> { input -> output } -> ...`
                self.lexer.unlex(lx);
                let class = self.parse_inline_compound(scope, &landmark)?;
                let name = self.anon_name(&class);
                scope.decls.push(Decl {
                    name: name.clone(),
                    class,
                    config: String::new(),
                    landmark: landmark.clone(),
                });
                let out_port = self.parse_port("output").unwrap_or(0);
                return Some((in_port, name, out_port));
            }
            _ => {
                self.errh.lerror(&landmark, "expected element name");
                self.lexer.unlex(lx);
                return None;
            }
        };

        // gather `a, b, c` in case this is a multi-name declaration
        let mut names = vec![name];
        loop {
            let comma = self.lexer.lex();
            if !comma.is(&LexKind::Punct(',')) {
                self.lexer.unlex(comma);
                break;
            }
            let next = self.lexer.lex();
            if next.is(&LexKind::Ident) {
                names.push(next.text);
            } else {
                self.errh
                    .lerror(&next.landmark, "expected element name after ','");
                self.lexer.unlex(next);
                break;
            }
        }

        let name = if self.lexer.expect(&LexKind::ColonColon) {
            self.parse_declaration(scope, names, &landmark)?
        } else if names.len() > 1 {
            self.errh
                .lerror(&landmark, "expected '::' after declaration list");
            return None;
        } else {
            let solo = &names[0];
            if scope.find_decl(solo).is_some() {
                solo.clone()
            } else if self.is_class(solo) {
                // anonymous declaration by class name, optional config
                let config = self.parse_optional_config();
                let anon = self.anon_name(solo);
                scope.decls.push(Decl {
                    name: anon.clone(),
                    class: solo.clone(),
                    config,
                    landmark: landmark.clone(),
                });
                anon
            } else {
                self.errh
                    .lerror(&landmark, format!("undeclared element '{solo}'"));
                return None;
            }
        };

        let out_port = self.parse_port("output").unwrap_or(0);
        Some((in_port, name, out_port))
    }

    /// The `:: Class(config)` tail of a declaration; returns the last name
    /// declared (the one a surrounding chain continues with).
    fn parse_declaration(
        &mut self,
        scope: &mut ParsedConfig,
        names: Vec<String>,
        landmark: &Landmark,
    ) -> Option<String> {
        let class_lx = self.lexer.lex();
        let class = match class_lx.kind {
            LexKind::Ident => class_lx.text,
            LexKind::Punct('{') => {
                self.lexer.unlex(class_lx);
                self.parse_inline_compound(scope, landmark)?
            }
            _ => {
                self.errh
                    .lerror(&class_lx.landmark, "expected class name after '::'");
                self.lexer.unlex(class_lx);
                return None;
            }
        };
        let config = self.parse_optional_config();
        for name in &names {
            if scope.find_decl(name).is_some() {
                self.errh
                    .lerror(landmark, format!("redeclaration of element '{name}'"));
                continue;
            }
            scope.decls.push(Decl {
                name: name.clone(),
                class: class.clone(),
                config: config.clone(),
                landmark: landmark.clone(),
            });
        }
        names.last().cloned()
    }

    /// An inline `{ ... }` compound used as a class; defines a synthetic
    /// class in the current scope and returns its name.
    fn parse_inline_compound(
        &mut self,
        scope: &mut ParsedConfig,
        landmark: &Landmark,
    ) -> Option<String> {
        self.anon += 1;
        let class_name = format!("@compound@{}", self.anon);
        let def = self.parse_compound_body(class_name.clone(), landmark)?;
        self.declare_class(class_name.clone());
        scope.classes.push(def);
        Some(class_name)
    }

    fn parse_optional_config(&mut self) -> String {
        if self.lexer.expect(&LexKind::Punct('(')) {
            let config = self.lexer.lex_config();
            if !self.lexer.expect(&LexKind::Punct(')')) {
                let landmark = self.lexer.landmark();
                self.errh.lerror(&landmark, "expected ')'");
            }
            config
        } else {
            String::new()
        }
    }

    /// A declaration statement or a connection chain.
    fn parse_connection_statement(&mut self, scope: &mut ParsedConfig) {
        let Some((_, mut prev, mut prev_out)) = self.parse_element(scope) else {
            self.recover();
            return;
        };
        loop {
            let arrow = self.lexer.lex();
            if !arrow.is(&LexKind::Arrow) {
                self.lexer.unlex(arrow);
                break;
            }
            let landmark = arrow.landmark;
            let Some((in_port, name, out_port)) = self.parse_element(scope) else {
                self.recover();
                return;
            };
            scope.conns.push(ConnAst {
                from: PortRef {
                    element: prev,
                    port: prev_out,
                },
                to: PortRef {
                    element: name.clone(),
                    port: in_port,
                },
                landmark,
            });
            prev = name;
            prev_out = out_port;
        }
    }

    /// Skip to the next statement boundary after a parse error.
    fn recover(&mut self) {
        loop {
            let lx = self.lexer.lex();
            match lx.kind {
                LexKind::Eof | LexKind::Punct(';') => return,
                LexKind::Punct('}') | LexKind::BarBar => {
                    self.lexer.unlex(lx);
                    return;
                }
                _ => {}
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn classes(name: &str) -> bool {
        matches!(
            name,
            "Queue" | "Null" | "Discard" | "InfiniteSource" | "Idle"
        )
    }

    fn parse_ok(text: &str) -> ParsedConfig {
        let mut errh = ErrorHandler::new();
        let config = Parser::new(text, "test", &classes, &mut errh).parse();
        assert!(errh.is_clean(), "unexpected errors: {}", errh.render());
        config
    }

    #[test]
    fn declarations_and_chain() {
        let config = parse_ok("src :: InfiniteSource(LIMIT 5); src -> q :: Queue(16) -> Null -> Discard;");
        let names: Vec<_> = config.decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["src", "q", "Null@1", "Discard@2"]);
        assert_eq!(config.decls[0].config, "LIMIT 5");
        assert_eq!(config.conns.len(), 3);
        assert_eq!(config.conns[0].from, PortRef { element: "src".into(), port: 0 });
        assert_eq!(config.conns[0].to, PortRef { element: "q".into(), port: 0 });
    }

    #[test]
    fn multi_name_declaration() {
        let config = parse_ok("q1, q2 :: Queue(8);");
        assert_eq!(config.decls.len(), 2);
        assert_eq!(config.decls[0].class, "Queue");
        assert_eq!(config.decls[1].name, "q2");
        assert_eq!(config.decls[1].config, "8");
    }

    #[test]
    fn explicit_ports() {
        let config = parse_ok("t :: Null; t[1] -> [2]t;");
        assert_eq!(config.conns[0].from.port, 1);
        assert_eq!(config.conns[0].to.port, 2);
    }

    #[test]
    fn compound_class_with_params() {
        let config = parse_ok(
            "elementclass Buffered { $cap | input -> Queue($cap) -> output };\n\
             b :: Buffered(32); Idle -> b -> Discard;",
        );
        assert_eq!(config.classes.len(), 1);
        let def = &config.classes[0];
        assert_eq!(def.name, "Buffered");
        assert_eq!(def.variants.len(), 1);
        assert_eq!(def.variants[0].params, vec!["cap"]);
        // body has input/output pseudo-decls plus the anonymous queue
        let body = &def.variants[0].body;
        assert!(body.find_decl("input").is_some());
        assert!(body.find_decl("output").is_some());
        assert_eq!(body.conns.len(), 2);
    }

    #[test]
    fn compound_variants_by_bar_bar() {
        let config = parse_ok(
            "elementclass B { input -> output || $cap | input -> Queue($cap) -> output }",
        );
        assert_eq!(config.classes[0].variants.len(), 2);
        assert!(config.classes[0].variants[0].params.is_empty());
        assert_eq!(config.classes[0].variants[1].params, vec!["cap"]);
    }

    #[test]
    fn require_and_define() {
        let config = parse_ok("require(fastpath); define($cap 64, $rate 10);");
        assert_eq!(config.requires, vec!["fastpath"]);
        assert_eq!(
            config.defines,
            vec![("cap".to_string(), "64".to_string()), ("rate".to_string(), "10".to_string())]
        );
    }

    #[test]
    fn undeclared_element_is_reported() {
        let mut errh = ErrorHandler::new();
        let _ = Parser::new("nosuch -> Discard;", "test", &classes, &mut errh).parse();
        assert_eq!(errh.nerrors(), 1);
        assert!(errh.render().contains("undeclared element 'nosuch'"));
    }

    #[test]
    fn redeclaration_is_reported() {
        let mut errh = ErrorHandler::new();
        let _ = Parser::new("q :: Queue; q :: Null;", "test", &classes, &mut errh).parse();
        assert_eq!(errh.nerrors(), 1);
    }

    #[test]
    fn anonymous_inline_compound() {
        let config = parse_ok("Idle -> { input -> output } -> Discard;");
        assert!(config.classes.iter().any(|c| c.name.starts_with("@compound@")));
        assert_eq!(config.conns.len(), 2);
    }
}
