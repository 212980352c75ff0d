use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::{
    lexer::{Lexer, Token},
    types::{normalize_type_name, TypeName},
};

/// Delimiters of the metadata block, `/**` and `*/` by default
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters {
            open: "/**".to_string(),
            close: "*/".to_string(),
        }
    }
}

/// What the prologue of a source file declares
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedHeader {
    pub namespace: Option<String>,
    /// alias -> fully qualified type name
    pub imports: IndexMap<String, TypeName>,
    /// The first metadata block, delimiters included
    pub metadata_block: Option<String>,
}

impl ParsedHeader {
    fn set_namespace(&mut self, text: &str) {
        if self.namespace.is_some() {
            return;
        }
        let path = text.trim();
        if !is_qualified_name(path) {
            tracing::debug!("Skipping unsupported namespace declaration '{path}'");
            return;
        }
        let namespace = normalize_type_name(path);
        if !namespace.is_empty() {
            self.namespace = Some(namespace);
        }
    }

    fn add_import(&mut self, text: &str) {
        let words: Vec<&str> = text.split_whitespace().collect();
        let (path, alias) = match words.as_slice() {
            [path] => (*path, None),
            [path, keyword, alias] if keyword.eq_ignore_ascii_case("as") => (*path, Some(*alias)),
            _ => {
                tracing::debug!("Skipping unsupported import '{}'", text.trim());
                return;
            }
        };
        if !is_qualified_name(path) {
            tracing::debug!("Skipping unsupported import '{}'", text.trim());
            return;
        }

        let target = normalize_type_name(path);
        let Some(last_segment) = target.rsplit('.').next().filter(|s| !s.is_empty()) else {
            return;
        };
        let alias = alias.unwrap_or(last_segment).to_string();
        self.imports.insert(alias, target);
    }
}

/// Parses the header region of `source`
///
/// Stops at the first token which is not a header construct, nothing after it
/// is inspected. Unsupported statement forms are skipped up to their end.
pub fn parse_header(source: &str, delimiters: &Delimiters) -> ParsedHeader {
    let mut header = ParsedHeader::default();
    let mut lexer = Lexer::new(source, delimiters);

    while let Some(Ok(spanned)) = lexer.next() {
        match spanned.token {
            Token::DocBlock(block) => {
                if header.metadata_block.is_none() {
                    header.metadata_block = Some(block.to_string());
                }
            }
            Token::OpenTag | Token::CloseTag | Token::Inline(_) | Token::Punct(';') => {}
            Token::Ident(keyword) if keyword.eq_ignore_ascii_case("namespace") => {
                let Some(statement) = read_statement(&mut lexer, source, spanned.end) else {
                    break;
                };
                if statement.braced {
                    tracing::debug!("Skipping bracketed namespace");
                    continue;
                }
                header.set_namespace(statement.text);
            }
            Token::Ident(keyword)
                if keyword.eq_ignore_ascii_case("import") || keyword.eq_ignore_ascii_case("use") =>
            {
                let Some(statement) = read_statement(&mut lexer, source, spanned.end) else {
                    break;
                };
                if statement.braced || statement.text.contains(',') {
                    tracing::debug!("Skipping group import '{}'", statement.text.trim());
                    continue;
                }
                header.add_import(statement.text);
            }
            _ => break,
        }
    }

    header
}

/// SHA-256 of the content and delimiters, keys cached headers
pub fn content_hash(source: &str, delimiters: &Delimiters) -> String {
    let mut hasher = Sha256::new();
    hasher.update(delimiters.open.as_bytes());
    hasher.update([0u8]);
    hasher.update(delimiters.close.as_bytes());
    hasher.update([0u8]);
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Statement<'a> {
    /// Text after the keyword, up to `;` or the first `{`
    text: &'a str,
    braced: bool,
}

/// Consumes tokens up to the end of the current statement
///
/// A statement ends at a top level `;`, or at the `}` closing its first brace.
/// Returns `None` if the source ends first.
fn read_statement<'a>(lexer: &mut Lexer<'a>, source: &'a str, start: usize) -> Option<Statement<'a>> {
    let mut depth = 0usize;
    let mut text_end = None;

    for item in lexer.by_ref() {
        let spanned = item.ok()?;
        match spanned.token {
            Token::Punct(';') if depth == 0 => {
                return Some(Statement {
                    text: &source[start..text_end.unwrap_or(spanned.start)],
                    braced: text_end.is_some(),
                });
            }
            Token::Punct('{') => {
                text_end.get_or_insert(spanned.start);
                depth += 1;
            }
            Token::Punct('}') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(end) = text_end {
                        return Some(Statement {
                            text: &source[start..end],
                            braced: true,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    None
}

fn is_qualified_name(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '\\' | '/'))
}
