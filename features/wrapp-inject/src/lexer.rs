//! Tokenizer shared by the header parser and the built in script engine.
//!
//! Source starts in code mode. `?>` switches to inline text until the next
//! `<?php` / `<?` marker. Whitespace and ordinary comments are skipped, comments
//! starting with the metadata delimiter are returned as [Token::DocBlock].

use thiserror::Error;

use crate::header::Delimiters;

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    DocBlock(&'a str),
    OpenTag,
    CloseTag,
    Inline(&'a str),
    Ident(&'a str),
    Variable(&'a str),
    Str(String),
    Int(i64),
    Float(f64),
    Punct(char),
}

/// A token and its byte range in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    pub start: usize,
    pub end: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("Unterminated string starting at byte {0}")]
    UnterminatedString(usize),
    #[error("Unterminated comment starting at byte {0}")]
    UnterminatedComment(usize),
    #[error("Invalid number at byte {0}")]
    InvalidNumber(usize),
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    inline: bool,
    failed: bool,
    doc_open: &'a str,
    doc_close: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, delimiters: &'a Delimiters) -> Self {
        Lexer {
            src,
            pos: 0,
            inline: false,
            failed: false,
            doc_open: &delimiters.open,
            doc_close: &delimiters.close,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn spanned(&mut self, token: Token<'a>, start: usize, end: usize) -> Spanned<'a> {
        self.pos = end;
        Spanned { token, start, end }
    }

    /// Skips whitespace and comments which are not metadata blocks
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if self.is_doc_block(trimmed) {
                return Ok(());
            }
            if trimmed.starts_with("/*") {
                let end = trimmed[2..]
                    .find("*/")
                    .ok_or(LexError::UnterminatedComment(self.pos))?;
                self.pos += end + 4;
            } else if trimmed.starts_with("//") || trimmed.starts_with('#') {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                return Ok(());
            }
        }
    }

    fn is_doc_block(&self, rest: &str) -> bool {
        !self.doc_open.is_empty()
            && rest.starts_with(self.doc_open)
            && !rest[self.doc_open.len()..].starts_with('/')
    }

    fn lex_token(&mut self) -> Result<Option<Spanned<'a>>, LexError> {
        let start = self.pos;

        if self.inline {
            let rest = self.rest();
            let end = rest.find("<?").unwrap_or(rest.len());
            self.inline = false;
            if end > 0 {
                let text = &rest[..end];
                return Ok(Some(self.spanned(Token::Inline(text), start, start + end)));
            }
        }

        self.skip_trivia()?;
        let start = self.pos;
        let rest = self.rest();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        if self.is_doc_block(rest) {
            let body = &rest[self.doc_open.len()..];
            let end = body
                .find(self.doc_close)
                .ok_or(LexError::UnterminatedComment(start))?;
            let len = self.doc_open.len() + end + self.doc_close.len();
            return Ok(Some(self.spanned(Token::DocBlock(&rest[..len]), start, start + len)));
        }

        if rest.starts_with("<?php") {
            return Ok(Some(self.spanned(Token::OpenTag, start, start + 5)));
        }
        if rest.starts_with("<?") {
            return Ok(Some(self.spanned(Token::OpenTag, start, start + 2)));
        }
        if rest.starts_with("?>") {
            self.inline = true;
            // A single newline directly after the marker belongs to it
            let skip = if rest[2..].starts_with("\r\n") {
                4
            } else if rest[2..].starts_with('\n') {
                3
            } else {
                2
            };
            return Ok(Some(self.spanned(Token::CloseTag, start, start + skip)));
        }

        if first == '$' {
            let name_len = ident_len(&rest[1..]);
            if name_len > 0 {
                let name = &rest[1..1 + name_len];
                return Ok(Some(self.spanned(Token::Variable(name), start, start + 1 + name_len)));
            }
        }

        if first.is_alphabetic() || first == '_' {
            let len = ident_len(rest);
            return Ok(Some(self.spanned(Token::Ident(&rest[..len]), start, start + len)));
        }

        if first.is_ascii_digit() {
            return self.lex_number(start).map(Some);
        }

        if first == '"' || first == '\'' {
            return self.lex_string(start, first).map(Some);
        }

        Ok(Some(self.spanned(Token::Punct(first), start, start + first.len_utf8())))
    }

    fn lex_number(&mut self, start: usize) -> Result<Spanned<'a>, LexError> {
        let rest = self.rest();
        let mut len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let fraction = rest[len..]
            .strip_prefix('.')
            .filter(|tail| tail.starts_with(|c: char| c.is_ascii_digit()));

        let token = match fraction {
            Some(tail) => {
                len += 1 + tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
                Token::Float(rest[..len].parse().map_err(|_| LexError::InvalidNumber(start))?)
            }
            None => Token::Int(rest[..len].parse().map_err(|_| LexError::InvalidNumber(start))?),
        };
        Ok(self.spanned(token, start, start + len))
    }

    fn lex_string(&mut self, start: usize, quote: char) -> Result<Spanned<'a>, LexError> {
        let mut value = String::new();
        let mut chars = self.rest().char_indices().skip(1);

        while let Some((offset, c)) = chars.next() {
            match c {
                c if c == quote => {
                    let end = start + offset + 1;
                    return Ok(self.spanned(Token::Str(value), start, end));
                }
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    match (quote, escaped) {
                        ('"', 'n') => value.push('\n'),
                        ('"', 't') => value.push('\t'),
                        ('"', 'r') => value.push('\r'),
                        ('"', '$') => value.push('$'),
                        (_, '\\') => value.push('\\'),
                        (q, e) if q == e => value.push(e),
                        (_, other) => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c => value.push(c),
            }
        }

        Err(LexError::UnterminatedString(start))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Spanned<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.lex_token() {
            Ok(token) => token.map(Ok),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

fn ident_len(input: &str) -> usize {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(index, _)| index)
        .unwrap_or(input.len())
}
