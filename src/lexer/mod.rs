use std::fmt;

use crate::error::AsmError;
use crate::lexer::cursor::Cursor;
use crate::span::{Idx, Span};

pub mod cursor;

/// Smallest unit of source the assembler deals with.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Exact source text of the token
    pub text: &'a str,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Ident,
    /// Unsigned integer literal, already parsed
    Int(u32),
    /// Any other single character, e.g. `:` `{` `-` `>` `|`
    Punct(char),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident => f.write_str("identifier"),
            TokenKind::Int(_) => f.write_str("integer"),
            TokenKind::Punct(c) => write!(f, "`{c}`"),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Punct(_) => write!(f, "{}", self.kind),
            _ => write!(f, "{} `{}`", self.kind, self.text),
        }
    }
}

/// Lazy token stream over a source file. Whitespace and comments never leave the lexer.
pub struct Lexer<'a> {
    src: &'a str,
    cursor: Cursor<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            cursor: Cursor::new(src),
        }
    }

    /// Span pointing just past the last character, for end of file errors.
    pub fn eof_span(&self) -> Span {
        Span::at(self.src.len())
    }

    fn next_token(&mut self) -> Option<Result<Token<'a>, AsmError>> {
        loop {
            self.cursor.reset_pos();
            let first_char = self.cursor.bump()?;
            let kind = match first_char {
                c if c.is_whitespace() => {
                    self.cursor.take_while(char::is_whitespace);
                    continue;
                }
                '/' if self.cursor.first() == '/' => {
                    self.cursor.take_while(|c| c != '\n');
                    continue;
                }
                '/' if self.cursor.first() == '*' => {
                    if let Err(e) = self.block_comment() {
                        return Some(Err(e));
                    }
                    continue;
                }
                c if is_id_start(c) => {
                    self.cursor.take_while(is_id_continue);
                    TokenKind::Ident
                }
                // Letters are eaten too so that `12ab` is one bad literal, not two tokens
                c if c.is_ascii_digit() => {
                    self.cursor.take_while(is_id_continue);
                    match parse_int(self.current_text()) {
                        Some(val) => TokenKind::Int(val),
                        None => {
                            return Some(Err(AsmError::InvalidLiteral {
                                text: self.current_text().to_string(),
                                span: self.current_span().into(),
                            }))
                        }
                    }
                }
                c => TokenKind::Punct(c),
            };
            return Some(Ok(Token {
                kind,
                text: self.current_text(),
                span: self.current_span(),
            }));
        }
    }

    /// Skip until the closing `*/`. Nesting is not supported.
    fn block_comment(&mut self) -> Result<(), AsmError> {
        // Opening `*`
        self.cursor.bump();
        loop {
            match self.cursor.bump() {
                Some('*') if self.cursor.first() == '/' => {
                    self.cursor.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    return Err(AsmError::Syntax {
                        expected: "`*/`".to_string(),
                        found: "end of file".to_string(),
                        span: self.current_span().into(),
                    })
                }
            }
        }
    }

    fn current_span(&self) -> Span {
        Span::new(Idx(self.cursor.tok_start()), self.cursor.pos_in_token())
    }

    fn current_text(&self) -> &'a str {
        &self.src[self.current_span().as_range()]
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, AsmError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

fn is_id_start(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_')
}

fn is_id_continue(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

/// Parse a decimal or `0x`/`0b`/`0o` prefixed literal. Underscores act as digit separators.
fn parse_int(text: &str) -> Option<u32> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (digits, radix) = match cleaned.get(..2) {
        Some("0x" | "0X") => (&cleaned[2..], 16),
        Some("0b" | "0B") => (&cleaned[2..], 2),
        Some("0o" | "0O") => (&cleaned[2..], 8),
        _ => (cleaned.as_str(), 10),
    };
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}
