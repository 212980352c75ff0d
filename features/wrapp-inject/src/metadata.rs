//! Turns the metadata block of a [ParsedHeader] into placeholders.
//!
//! ```text
//! /**
//!  * @category("admin")
//!  * Mailer $mailer
//!  * @config('mail.from')
//!  * ?string $from
//!  */
//! ```

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_till1, take_while1},
    character::complete::{char, space0, space1},
    combinator::{map, opt, verify},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::{
    catalog::TypeCatalog,
    errors::MetadataError,
    header::{Delimiters, ParsedHeader},
    placeholder::{ConfigPlaceholder, ObjectPlaceholder, Placeholder, Placeholders, TypeTag},
    types::{normalize_type_name, DEFAULT_CATEGORY},
};

type ParseResult<'a, T> = IResult<&'a str, T>;

#[derive(Debug, Clone, PartialEq)]
enum Line<'a> {
    Category(&'a str),
    Config(&'a str),
    Variable { types: &'a str, name: &'a str },
    Untyped(&'a str),
}

/// Parses the metadata block of `header` into placeholders by variable name
///
/// Type tokens are resolved against the imports, then relative to the
/// namespace, and must name a type of the catalog.
pub fn parse_metadata(
    header: &ParsedHeader,
    catalog: &TypeCatalog,
    delimiters: &Delimiters,
) -> Result<Placeholders, MetadataError> {
    let mut placeholders = Placeholders::new();
    let Some(block) = &header.metadata_block else {
        return Ok(placeholders);
    };

    let mut category: Option<String> = None;
    let mut config_key: Option<String> = None;

    for line in block_lines(block, delimiters) {
        match parse_line(line) {
            Some(Line::Category(name)) => category = Some(name.to_string()),
            Some(Line::Config(key)) => config_key = Some(key.to_string()),
            Some(Line::Variable { types, name }) => {
                let expression = TypeExpression::parse(types, name, header, catalog)?;
                let placeholder = match config_key.take() {
                    Some(key) => Placeholder::Config(ConfigPlaceholder {
                        key,
                        category: category.as_deref().unwrap_or(DEFAULT_CATEGORY).to_string(),
                        candidate_types: expression.candidates,
                        optional: false,
                        default: None,
                        nullable: expression.nullable,
                    }),
                    None => Placeholder::Object(expression.into_object(name, category.as_deref())?),
                };
                placeholders.insert(name.to_string(), placeholder);
            }
            Some(Line::Untyped(name)) => return Err(MetadataError::MissingType(name.to_string())),
            None => {}
        }
    }

    Ok(placeholders)
}

fn block_lines<'a>(block: &'a str, delimiters: &Delimiters) -> impl Iterator<Item = &'a str> {
    let inner = block.strip_prefix(delimiters.open.as_str()).unwrap_or(block);
    let inner = inner.strip_suffix(delimiters.close.as_str()).unwrap_or(inner);
    inner
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
}

/// Parsed `?A|B|null` expression
struct TypeExpression {
    candidates: Vec<TypeTag>,
    nullable: bool,
}

impl TypeExpression {
    fn parse(
        expression: &str,
        variable: &str,
        header: &ParsedHeader,
        catalog: &TypeCatalog,
    ) -> Result<Self, MetadataError> {
        let mut nullable = false;
        let mut expression = expression.trim();
        if let Some(stripped) = expression.strip_prefix('?') {
            nullable = true;
            expression = stripped;
        }

        let mut candidates = Vec::new();
        for token in expression.split('|').map(str::trim).filter(|t| !t.is_empty()) {
            if token.eq_ignore_ascii_case("null") {
                nullable = true;
                continue;
            }
            let tag = resolve_type_token(token, header, catalog).ok_or_else(|| {
                MetadataError::UnresolvedType {
                    token: token.to_string(),
                    variable: variable.to_string(),
                }
            })?;
            candidates.push(tag);
        }

        candidates.sort();
        candidates.dedup();

        Ok(TypeExpression {
            candidates,
            nullable,
        })
    }

    fn into_object(
        self,
        variable: &str,
        category: Option<&str>,
    ) -> Result<ObjectPlaceholder, MetadataError> {
        match self.candidates.as_slice() {
            [] => Err(MetadataError::MissingType(variable.to_string())),
            [TypeTag::Object(type_name)] => Ok(ObjectPlaceholder {
                type_name: type_name.clone(),
                category: category.unwrap_or(DEFAULT_CATEGORY).to_string(),
            }),
            [scalar] => Err(MetadataError::ScalarWithoutConfig {
                token: scalar.to_string(),
                variable: variable.to_string(),
            }),
            many => Err(MetadataError::UnionNotAllowed {
                variable: variable.to_string(),
                types: many.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

fn resolve_type_token(token: &str, header: &ParsedHeader, catalog: &TypeCatalog) -> Option<TypeTag> {
    if let Some(scalar) = TypeTag::scalar(&token.to_ascii_lowercase()) {
        return Some(scalar);
    }

    let known = |name: String| catalog.contains(&name).then_some(TypeTag::Object(name));

    if let Some(qualified) = token.strip_prefix(|c: char| c == '\\' || c == '.') {
        return known(normalize_type_name(qualified));
    }

    let name = normalize_type_name(token);
    let (first, rest) = match name.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (name.as_str(), None),
    };
    let aliased = header.imports.get(first).and_then(|target| {
        known(match rest {
            Some(rest) => format!("{target}.{rest}"),
            None => target.clone(),
        })
    });
    if aliased.is_some() {
        return aliased;
    }

    known(match &header.namespace {
        Some(namespace) => format!("{namespace}.{name}"),
        None => name.clone(),
    })
}

fn parse_line(line: &str) -> Option<Line<'_>> {
    alt((category_line, config_line, variable_line, untyped_line))(line)
        .ok()
        .map(|(_, line)| line)
}

fn quoted(input: &str) -> ParseResult<'_, &str> {
    alt((
        delimited(char('"'), is_not("\""), char('"')),
        delimited(char('\''), is_not("'"), char('\'')),
    ))(input)
}

/// `("value")`, `('value')` or just `"value"`
fn tag_argument(input: &str) -> ParseResult<'_, &str> {
    preceded(
        space0,
        alt((
            delimited(pair(char('('), space0), quoted, pair(space0, char(')'))),
            quoted,
        )),
    )(input)
}

fn category_line(input: &str) -> ParseResult<'_, Line<'_>> {
    map(preceded(tag("@category"), tag_argument), Line::Category)(input)
}

fn config_line(input: &str) -> ParseResult<'_, Line<'_>> {
    map(preceded(tag("@config"), tag_argument), Line::Config)(input)
}

fn variable_name(input: &str) -> ParseResult<'_, &str> {
    preceded(
        char('$'),
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
    )(input)
}

/// `[@var] <type-expression> $<name>`, anything after the name is ignored
fn variable_line(input: &str) -> ParseResult<'_, Line<'_>> {
    let (input, _) = opt(pair(tag("@var"), space1))(input)?;
    let (input, (types, _, name)) = tuple((
        verify(take_till1(|c: char| c.is_whitespace()), |types: &str| {
            !types.starts_with('$') && !types.starts_with('@')
        }),
        space1,
        variable_name,
    ))(input)?;
    Ok((input, Line::Variable { types, name }))
}

fn untyped_line(input: &str) -> ParseResult<'_, Line<'_>> {
    let (input, _) = opt(pair(tag("@var"), space1))(input)?;
    map(variable_name, Line::Untyped)(input)
}
