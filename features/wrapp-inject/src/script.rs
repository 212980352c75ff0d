//! Execution of included files.
//!
//! The resolver only prepares bindings, running the body is up to a
//! [ScriptEngine]. [EchoEngine] understands enough to template text:
//!
//! ```text
//! <?php
//! /** string $name */
//! namespace App;
//! ?>
//! Hello <?php echo $name . "!"; ?>
//! ```

use std::{iter::Peekable, path::PathBuf};

use thiserror::Error;

use crate::{
    header::Delimiters,
    lexer::{LexError, Lexer, Spanned, Token},
    signature::Arguments,
    types::{DynError, Value},
};

/// An included file
#[derive(Debug, Clone)]
pub struct Script {
    pub path: PathBuf,
    pub source: String,
}

pub trait ScriptEngine: Send + Sync {
    /// Runs the body of `script` with `bindings` as its local variables
    ///
    /// Everything emitted is appended to `output`, also when execution fails.
    /// Returns the explicit return value, `None` if the script has none.
    fn execute(
        &self,
        script: &Script,
        bindings: &Arguments,
        output: &mut String,
    ) -> Result<Option<Value>, DynError>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Unexpected {found} at byte {offset}")]
    Unexpected { found: String, offset: usize },
    #[error("Unexpected end of script")]
    UnexpectedEnd,
    #[error("Undefined variable '${0}'")]
    UndefinedVariable(String),
    #[error("Can not negate a {0}")]
    InvalidOperand(&'static str),
    /// Raised by `throw`
    #[error("{0}")]
    Thrown(String),
}

/// Minimal engine for `echo`, `print`, `return` and `throw` statements
///
/// Expressions are literals, `true`/`false`/`null`, bound `$variables`,
/// parentheses, unary minus and `.` concatenation. Text outside of code
/// mode is emitted as is.
#[derive(Debug, Clone, Default)]
pub struct EchoEngine {
    delimiters: Delimiters,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiters(delimiters: Delimiters) -> Self {
        EchoEngine { delimiters }
    }
}

impl ScriptEngine for EchoEngine {
    fn execute(
        &self,
        script: &Script,
        bindings: &Arguments,
        output: &mut String,
    ) -> Result<Option<Value>, DynError> {
        let mut interpreter = Interpreter {
            tokens: Lexer::new(&script.source, &self.delimiters).peekable(),
            bindings,
            output,
        };
        Ok(interpreter.run()?)
    }
}

struct Interpreter<'a, 'o> {
    tokens: Peekable<Lexer<'a>>,
    bindings: &'a Arguments,
    output: &'o mut String,
}

impl<'a> Interpreter<'a, '_> {
    fn run(&mut self) -> Result<Option<Value>, ScriptError> {
        while let Some(spanned) = self.next_token()? {
            let keyword = match spanned.token {
                Token::Inline(text) => {
                    self.output.push_str(text);
                    continue;
                }
                Token::DocBlock(_) | Token::OpenTag | Token::CloseTag | Token::Punct(';') => {
                    continue;
                }
                Token::Ident(keyword) => keyword.to_ascii_lowercase(),
                other => return Err(unexpected(&other, spanned.start)),
            };

            match keyword.as_str() {
                "echo" => {
                    loop {
                        let value = self.expression()?;
                        self.output.push_str(&value.to_string());
                        if !self.eat_punct(',') {
                            break;
                        }
                    }
                    self.end_statement()?;
                }
                "print" => {
                    let value = self.expression()?;
                    self.output.push_str(&value.to_string());
                    self.end_statement()?;
                }
                "return" => {
                    if self.at_statement_end() {
                        return Ok(None);
                    }
                    return self.expression().map(Some);
                }
                "throw" => {
                    let value = self.expression()?;
                    return Err(ScriptError::Thrown(value.to_string()));
                }
                // The header was already evaluated by the resolver
                "namespace" | "import" | "use" => self.skip_statement()?,
                _ => {
                    return Err(ScriptError::Unexpected {
                        found: format!("'{keyword}'"),
                        offset: spanned.start,
                    })
                }
            }
        }
        Ok(None)
    }

    /// `unary ('.' unary)*`
    fn expression(&mut self) -> Result<Value, ScriptError> {
        let mut value = self.unary()?;
        while self.eat_punct('.') {
            let right = self.unary()?;
            value = Value::String(format!("{value}{right}"));
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<Value, ScriptError> {
        if !self.eat_punct('-') {
            return self.primary();
        }
        match self.unary()? {
            Value::Int(value) => Ok(Value::Int(value.wrapping_neg())),
            Value::Float(value) => Ok(Value::Float(-value)),
            other => Err(ScriptError::InvalidOperand(other.kind())),
        }
    }

    fn primary(&mut self) -> Result<Value, ScriptError> {
        let spanned = self.next_token()?.ok_or(ScriptError::UnexpectedEnd)?;
        match spanned.token {
            Token::Str(value) => Ok(Value::String(value)),
            Token::Int(value) => Ok(Value::Int(value)),
            Token::Float(value) => Ok(Value::Float(value)),
            Token::Variable(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::UndefinedVariable(name.to_string())),
            Token::Ident(word) if word.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Token::Ident(word) if word.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Token::Ident(word) if word.eq_ignore_ascii_case("null") => Ok(Value::Null),
            Token::Punct('(') => {
                let value = self.expression()?;
                if !self.eat_punct(')') {
                    return Err(self.unexpected_next());
                }
                Ok(value)
            }
            other => Err(unexpected(&other, spanned.start)),
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned<'a>>, ScriptError> {
        Ok(self.tokens.next().transpose()?)
    }

    fn eat_punct(&mut self, punct: char) -> bool {
        self.tokens
            .next_if(|item| matches!(item, Ok(Spanned { token: Token::Punct(p), .. }) if *p == punct))
            .is_some()
    }

    fn at_statement_end(&mut self) -> bool {
        matches!(
            self.tokens.peek(),
            None | Some(Ok(Spanned {
                token: Token::Punct(';') | Token::CloseTag,
                ..
            }))
        )
    }

    fn end_statement(&mut self) -> Result<(), ScriptError> {
        if self.at_statement_end() {
            // `?>` is left for the main loop, it switches to inline text
            self.eat_punct(';');
            return Ok(());
        }
        Err(self.unexpected_next())
    }

    /// Skips to the next `;`, or past a braced block
    fn skip_statement(&mut self) -> Result<(), ScriptError> {
        let mut depth = 0usize;
        while let Some(spanned) = self.next_token()? {
            match spanned.token {
                Token::Punct(';') if depth == 0 => return Ok(()),
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn unexpected_next(&mut self) -> ScriptError {
        match self.next_token() {
            Ok(Some(spanned)) => unexpected(&spanned.token, spanned.start),
            Ok(None) => ScriptError::UnexpectedEnd,
            Err(error) => error,
        }
    }
}

fn unexpected(token: &Token<'_>, offset: usize) -> ScriptError {
    ScriptError::Unexpected {
        found: format!("{token:?}"),
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, bindings: &Arguments) -> (Result<Option<Value>, DynError>, String) {
        let script = Script {
            path: PathBuf::from("test.php"),
            source: source.to_string(),
        };
        let mut output = String::new();
        let result = EchoEngine::new().execute(&script, bindings, &mut output);
        (result, output)
    }

    #[test]
    fn echoes_bound_values_and_inline_text() {
        let mut bindings = Arguments::new();
        bindings.insert("name", Value::from("ada"));
        bindings.insert("count", Value::Int(3));

        let (result, output) = run(
            "<?php\n/** string $name */\nnamespace App;\nuse App\\Thing;\n?>\nHello <?php echo $name . '!', \" \", -$count; ?> done",
            &bindings,
        );
        assert_eq!(result.unwrap(), None);
        assert_eq!(output, "Hello ada! -3 done");
    }

    #[test]
    fn returns_explicit_values() {
        let (result, output) = run("echo 'v'; return 1;", &Arguments::new());
        assert_eq!(result.unwrap(), Some(Value::Int(1)));
        assert_eq!(output, "v");

        let (result, _) = run("return ('a' . 2.5);", &Arguments::new());
        assert_eq!(result.unwrap(), Some(Value::from("a2.5")));

        let (result, _) = run("return;", &Arguments::new());
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn throw_keeps_partial_output() {
        let (result, output) = run("echo 'before'; throw 'boom'; echo 'after';", &Arguments::new());
        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(output, "before");
    }

    #[test]
    fn undefined_variables_fail() {
        let (result, _) = run("echo $missing;", &Arguments::new());
        let error = result.unwrap_err();
        assert_eq!(
            error.downcast_ref::<ScriptError>(),
            Some(&ScriptError::UndefinedVariable("missing".into()))
        );
    }

    #[test]
    fn rejects_unknown_statements() {
        let (result, _) = run("$x = 1;", &Arguments::new());
        assert!(matches!(
            result.unwrap_err().downcast_ref::<ScriptError>(),
            Some(ScriptError::Unexpected { offset: 0, .. })
        ));
        let (result, _) = run("echo 'a' 'b';", &Arguments::new());
        assert!(result.is_err());
    }
}
