// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tokenizer for the configuration language.
//!
//! Tokens are produced on demand into a small ring so the parser can push
//! back what it over-read (`unlex`). Comments (`//`, `/* */`) and `#line`
//! directives are consumed here and never reach the parser. Every token
//! carries a [`Landmark`] for error reporting.

use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Source position attached to tokens and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmark {
    /// File name (or a synthetic name such as `<expr>`).
    pub file: Arc<str>,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub col: u32,
}

impl Landmark {
    /// A landmark for text with no file of origin.
    #[must_use]
    pub fn none() -> Self {
        Landmark {
            file: Arc::from("<config>"),
            line: 0,
            col: 0,
        }
    }
}

impl Display for Landmark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexKind {
    /// End of input.
    Eof,
    /// Identifier (element or class name, number, keyword argument word).
    Ident,
    /// `$name` variable reference.
    Variable,
    /// `->`
    Arrow,
    /// `::`
    ColonColon,
    /// `||`
    BarBar,
    /// `...`
    Ellipsis,
    /// `elementclass`
    Elementclass,
    /// `require`
    Require,
    /// `define`
    Define,
    /// Any single punctuation character (`[`, `]`, `(`, `)`, `{`, `}`, `;`,
    /// `,`, `|`, ...).
    Punct(char),
}

impl Display for LexKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LexKind::Eof => write!(f, "end of input"),
            LexKind::Ident => write!(f, "identifier"),
            LexKind::Variable => write!(f, "variable"),
            LexKind::Arrow => write!(f, "'->'"),
            LexKind::ColonColon => write!(f, "'::'"),
            LexKind::BarBar => write!(f, "'||'"),
            LexKind::Ellipsis => write!(f, "'...'"),
            LexKind::Elementclass => write!(f, "'elementclass'"),
            LexKind::Require => write!(f, "'require'"),
            LexKind::Define => write!(f, "'define'"),
            LexKind::Punct(c) => write!(f, "'{c}'"),
        }
    }
}

/// One token: kind, source text and landmark.
#[derive(Debug, Clone)]
pub struct Lexeme {
    /// Token kind.
    pub kind: LexKind,
    /// Source text (identifier or variable name; empty for punctuation).
    pub text: String,
    /// Where the token started.
    pub landmark: Landmark,
}

impl Lexeme {
    /// True if this token has the given kind.
    #[must_use]
    pub fn is(&self, kind: &LexKind) -> bool {
        self.kind == *kind
    }
}

const RING: usize = 8;

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'@'
}

/// The tokenizer.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    file: Arc<str>,
    line: u32,
    line_begin: usize,
    ring: VecDeque<Lexeme>,
}

impl<'a> Lexer<'a> {
    /// Tokenize `data`, reporting positions against `filename`.
    #[must_use]
    pub fn new(data: &'a str, filename: &str) -> Self {
        Lexer {
            data: data.as_bytes(),
            pos: 0,
            file: Arc::from(filename),
            line: 1,
            line_begin: 0,
            ring: VecDeque::with_capacity(RING),
        }
    }

    /// Landmark for the current read position.
    #[must_use]
    pub fn landmark(&self) -> Landmark {
        #[allow(clippy::cast_possible_truncation)]
        let col = (self.pos.saturating_sub(self.line_begin) as u32) + 1;
        Landmark {
            file: Arc::clone(&self.file),
            line: self.line,
            col,
        }
    }

    /// Next token, honoring pushed-back tokens first.
    pub fn lex(&mut self) -> Lexeme {
        if let Some(lx) = self.ring.pop_front() {
            return lx;
        }
        self.next_lexeme()
    }

    /// Push a token back; it will be returned by the next `lex` call.
    pub fn unlex(&mut self, lexeme: Lexeme) {
        debug_assert!(self.ring.len() < RING, "token ring overflow");
        self.ring.push_front(lexeme);
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Lexeme {
        let lx = self.lex();
        self.unlex(lx.clone());
        lx
    }

    /// Consume the next token if it has the expected kind; otherwise push it
    /// back. Returns whether it matched.
    pub fn expect(&mut self, kind: &LexKind) -> bool {
        let lx = self.lex();
        if lx.is(kind) {
            true
        } else {
            self.unlex(lx);
            false
        }
    }

    fn byte(&self, at: usize) -> u8 {
        self.data.get(at).copied().unwrap_or(0)
    }

    fn newline(&mut self, at_pos: usize) {
        self.line += 1;
        self.line_begin = at_pos + 1;
    }

    fn skip_line(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            self.pos += 1;
            if b == b'\n' {
                self.newline(self.pos - 1);
                break;
            }
        }
    }

    fn skip_slash_star(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if b == b'\n' {
                self.newline(self.pos);
            } else if b == b'*' && self.byte(self.pos + 1) == b'/' {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    /// Handle `# <line> "file"` and `#line <line> "file"` directives; the
    /// rest of the line is discarded either way.
    fn process_line_directive(&mut self) {
        self.pos += 1; // '#'
        let eol = self.data[self.pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(self.data.len(), |off| self.pos + off);
        let text = String::from_utf8_lossy(&self.data[self.pos..eol]).into_owned();
        self.pos = eol;
        if self.pos < self.data.len() {
            self.pos += 1;
            self.newline(self.pos - 1);
        }

        let rest = text.trim_start();
        let rest = rest.strip_prefix("line").unwrap_or(rest).trim_start();
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return;
        }
        if let Ok(line) = digits.parse::<u32>() {
            self.line = line;
            self.line_begin = self.pos;
        }
        let rest = rest[digits.len()..].trim_start();
        if let Some(stripped) = rest.strip_prefix('"')
            && let Some(end) = stripped.find('"')
        {
            self.file = Arc::from(&stripped[..end]);
        }
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.byte(self.pos) {
                b'\n' => {
                    self.newline(self.pos);
                    self.pos += 1;
                }
                b if b.is_ascii_whitespace() && b != 0 => self.pos += 1,
                b'/' if self.byte(self.pos + 1) == b'/' => self.skip_line(),
                b'/' if self.byte(self.pos + 1) == b'*' => {
                    self.pos += 2;
                    self.skip_slash_star();
                }
                b'#' => self.process_line_directive(),
                _ => return,
            }
        }
    }

    fn next_lexeme(&mut self) -> Lexeme {
        self.skip_blanks();
        let landmark = self.landmark();
        if self.pos >= self.data.len() {
            return Lexeme {
                kind: LexKind::Eof,
                text: String::new(),
                landmark,
            };
        }

        let b = self.data[self.pos];
        if is_word_byte(b) {
            let begin = self.pos;
            while self.pos < self.data.len() && is_word_byte(self.data[self.pos]) {
                self.pos += 1;
            }
            let text = String::from_utf8_lossy(&self.data[begin..self.pos]).into_owned();
            let kind = match text.as_str() {
                "elementclass" => LexKind::Elementclass,
                "require" => LexKind::Require,
                "define" => LexKind::Define,
                _ => LexKind::Ident,
            };
            return Lexeme {
                kind,
                text,
                landmark,
            };
        }

        if b == b'$' && is_word_byte(self.byte(self.pos + 1)) {
            self.pos += 1;
            let begin = self.pos;
            while self.pos < self.data.len() && is_word_byte(self.data[self.pos]) {
                self.pos += 1;
            }
            let text = String::from_utf8_lossy(&self.data[begin..self.pos]).into_owned();
            return Lexeme {
                kind: LexKind::Variable,
                text,
                landmark,
            };
        }

        let two = (b, self.byte(self.pos + 1));
        let kind = match two {
            (b'-', b'>') => {
                self.pos += 2;
                LexKind::Arrow
            }
            (b':', b':') => {
                self.pos += 2;
                LexKind::ColonColon
            }
            (b'|', b'|') => {
                self.pos += 2;
                LexKind::BarBar
            }
            (b'.', b'.') if self.byte(self.pos + 2) == b'.' => {
                self.pos += 3;
                LexKind::Ellipsis
            }
            _ => {
                self.pos += 1;
                LexKind::Punct(char::from(b))
            }
        };
        Lexeme {
            kind,
            text: String::new(),
            landmark,
        }
    }

    /// Collect the raw text of an element configuration: everything up to
    /// (but not including) the `)` that balances the already-consumed `(`.
    ///
    /// Quotes and nested parentheses are honored; comments count toward
    /// nothing but are kept in the returned text verbatim.
    pub fn lex_config(&mut self) -> String {
        debug_assert!(self.ring.is_empty(), "lex_config must not follow unlex");
        let begin = self.pos;
        let mut depth = 0usize;
        while self.pos < self.data.len() {
            match self.data[self.pos] {
                b'\n' => {
                    self.newline(self.pos);
                    self.pos += 1;
                }
                b'(' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' if depth == 0 => break,
                b')' => {
                    depth -= 1;
                    self.pos += 1;
                }
                b'/' if self.byte(self.pos + 1) == b'/' => self.skip_line(),
                b'/' if self.byte(self.pos + 1) == b'*' => {
                    self.pos += 2;
                    self.skip_slash_star();
                }
                quote @ (b'"' | b'\'') => {
                    self.pos += 1;
                    self.skip_quote(quote);
                }
                _ => self.pos += 1,
            }
        }
        String::from_utf8_lossy(&self.data[begin..self.pos])
            .trim()
            .to_string()
    }

    fn skip_quote(&mut self, quote: u8) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            self.pos += 1;
            match b {
                b'\n' => self.newline(self.pos - 1),
                b'\\' if quote == b'"' && self.pos < self.data.len() => self.pos += 1,
                b if b == quote => return,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(text: &str) -> Vec<LexKind> {
        let mut lexer = Lexer::new(text, "t");
        let mut out = Vec::new();
        loop {
            let lx = lexer.lex();
            let done = lx.is(&LexKind::Eof);
            out.push(lx.kind);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn basic_tokens() {
        assert_eq!(
            kinds("src :: Source -> [0]q;"),
            vec![
                LexKind::Ident,
                LexKind::ColonColon,
                LexKind::Ident,
                LexKind::Arrow,
                LexKind::Punct('['),
                LexKind::Ident,
                LexKind::Punct(']'),
                LexKind::Ident,
                LexKind::Punct(';'),
                LexKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_variables_and_multichar() {
        assert_eq!(
            kinds("elementclass X { $cap || ... } define"),
            vec![
                LexKind::Elementclass,
                LexKind::Ident,
                LexKind::Punct('{'),
                LexKind::Variable,
                LexKind::BarBar,
                LexKind::Ellipsis,
                LexKind::Punct('}'),
                LexKind::Define,
                LexKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_line_directive() {
        let text = "// a comment\n/* span\nlines */ a\n#line 40 \"other\"\nb";
        let mut lexer = Lexer::new(text, "t");
        let a = lexer.lex();
        assert_eq!(a.text, "a");
        assert_eq!(a.landmark.line, 3);
        let b = lexer.lex();
        assert_eq!(b.text, "b");
        assert_eq!(b.landmark.line, 40);
        assert_eq!(&*b.landmark.file, "other");
    }

    #[test]
    fn unlex_round_trip() {
        let mut lexer = Lexer::new("x y", "t");
        let x = lexer.lex();
        lexer.unlex(x.clone());
        let again = lexer.lex();
        assert_eq!(again.text, x.text);
        assert_eq!(lexer.lex().text, "y");
    }

    #[test]
    fn config_text_balances_parens_and_quotes() {
        let mut lexer = Lexer::new("q :: Queue(16, NOTE \"a ) paren\", F(1))", "t");
        lexer.lex(); // q
        lexer.lex(); // ::
        lexer.lex(); // Queue
        assert!(lexer.expect(&LexKind::Punct('(')));
        let config = lexer.lex_config();
        assert!(lexer.expect(&LexKind::Punct(')')));
        assert_eq!(config, "16, NOTE \"a ) paren\", F(1)");
        assert!(lexer.expect(&LexKind::Eof));
    }

    #[test]
    fn landmark_columns() {
        let mut lexer = Lexer::new("ab cd", "t");
        assert_eq!(lexer.lex().landmark.col, 1);
        assert_eq!(lexer.lex().landmark.col, 4);
    }
}
