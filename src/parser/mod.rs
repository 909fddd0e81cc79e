//! PEST-based parser for the superworker definition language
//!
//! Produces IR nodes with span information for error reporting. Parsing is
//! purely syntactic: names are not resolved and arguments are not evaluated.

use std::collections::HashSet;

use pest::Parser;
use pest_derive::Parser;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::ir::{ArgExpr, ArgSource, Definition, ListBinding, Node, Span};

pub mod semantic_validator;


/* ===================== Definition Files ===================== */

/// Everything declared in one definition file
#[derive(Debug, Clone, Default)]
pub struct DefinitionSource {
    /// Names from `workers` declarations, in declaration order
    pub workers: Vec<String>,
    pub definitions: Vec<Definition>,
}

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/superworker.pest"]
struct SuperworkerParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(String, Option<Span>),
    #[error("malformed definition: {0}")]
    MalformedDefinition(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::Syntax(_, span) => *span,
            ParseError::MalformedDefinition(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Syntax(msg, _) => msg,
            ParseError::MalformedDefinition(msg, _) => msg,
        }
    }

    fn malformed(message: impl Into<String>, span: Span) -> Self {
        ParseError::MalformedDefinition(message.into(), Some(span))
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Span {
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
                ..Span::default()
            },
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Span {
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                    ..Span::default()
                }
            }
        };
        ParseError::Syntax(err.to_string(), Some(span))
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

fn pair_to_span(pair: &Pair, source: &LineIndex) -> Span {
    let pest_span = pair.as_span();
    let start = pest_span.start();
    let end = pest_span.end();

    let (start_line, start_col) = source.line_col(start);
    let (end_line, end_col) = source.line_col(end);

    Span::new(start, end, start_line, start_col, end_line, end_col)
}

/// Byte offsets of line starts, built once per parse
struct LineIndex<'i> {
    input: &'i str,
    starts: Vec<usize>,
}

impl<'i> LineIndex<'i> {
    fn new(input: &'i str) -> Self {
        let starts = std::iter::once(0)
            .chain(input.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { input, starts }
    }

    /// Convert byte offset to (line, column) - 0-indexed, columns in chars
    fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&start| start <= offset).saturating_sub(1);
        let line_start = self.starts.get(line).copied().unwrap_or(0);
        let col = self
            .input
            .get(line_start..offset)
            .map_or(0, |text| text.chars().count());
        (line, col)
    }
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_superworker | Rule::kw_workers | Rule::kw_batch | Rule::kw_do | Rule::kw_end
    )
}

/// Inner pairs with keyword tokens and the end-of-input marker dropped
fn significant<'i>(pair: Pair<'i>) -> impl Iterator<Item = Pair<'i>> {
    pair.into_inner()
        .filter(|p| !is_keyword(p.as_rule()) && p.as_rule() != Rule::EOI)
}

/* ===================== Public API ===================== */

/// Parse a superworker body (a list of statements) into an IR node.
///
/// A single statement yields that statement's node; several yield a
/// `Sequence`.
pub fn parse(input: &str) -> ParseResult<Node> {
    let source = &LineIndex::new(input);
    let body = SuperworkerParser::parse(Rule::body, input)?
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty parse result".to_string(), None))?;
    let span = pair_to_span(&body, source);

    build_statements(body, source, span, "superworker body")
}

/// Parse a definition file containing `workers` declarations and
/// `superworker` definitions.
pub fn parse_definitions(input: &str) -> ParseResult<DefinitionSource> {
    let source = &LineIndex::new(input);
    let program = SuperworkerParser::parse(Rule::program, input)?
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty parse result".to_string(), None))?;

    let mut parsed = DefinitionSource::default();

    for item in significant(program) {
        match item.as_rule() {
            Rule::workers_decl => {
                parsed
                    .workers
                    .extend(significant(item).map(|name| name.as_str().to_string()));
            }
            Rule::definition => parsed.definitions.push(build_definition(item, source)?),
            other => {
                return Err(ParseError::Syntax(
                    format!("Unexpected top-level rule: {:?}", other),
                    Some(pair_to_span(&item, source)),
                ))
            }
        }
    }

    Ok(parsed)
}

/* ===================== IR Builder ===================== */

fn build_definition(pair: Pair, source: &LineIndex) -> ParseResult<Definition> {
    let span = pair_to_span(&pair, source);
    let mut name = String::new();
    let mut parameters = Vec::new();
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::worker_name => name = part.as_str().to_string(),
            Rule::param_list => {
                let mut seen = HashSet::new();
                for symbol in part.into_inner() {
                    let symbol_span = pair_to_span(&symbol, source);
                    let param = symbol_name(symbol);
                    if !seen.insert(param.clone()) {
                        return Err(ParseError::malformed(
                            format!("Duplicate parameter ':{}'", param),
                            symbol_span,
                        ));
                    }
                    parameters.push(param);
                }
            }
            Rule::block => {
                let context = format!("superworker '{}'", name);
                body = Some(build_block(part, source, &context)?);
            }
            other => {
                return Err(ParseError::Syntax(
                    format!("Unexpected definition rule: {:?}", other),
                    Some(pair_to_span(&part, source)),
                ))
            }
        }
    }

    let body = body.ok_or_else(|| {
        ParseError::malformed(format!("superworker '{}' has no body", name), span)
    })?;

    Ok(Definition {
        name,
        parameters,
        body,
        version: None,
        span,
    })
}

fn build_block(pair: Pair, source: &LineIndex, context: &str) -> ParseResult<Node> {
    let span = pair_to_span(&pair, source);
    build_statements(pair, source, span, context)
}

/// Build the statements inside `pair`, rejecting an empty list
fn build_statements(pair: Pair, source: &LineIndex, span: Span, context: &str) -> ParseResult<Node> {
    let mut steps = significant(pair)
        .map(|stmt| build_statement(stmt, source))
        .collect::<ParseResult<Vec<_>>>()?;

    match steps.len() {
        0 => Err(ParseError::malformed(format!("{} is empty", context), span)),
        1 => Ok(steps.remove(0)),
        _ => Ok(Node::Sequence { steps, span }),
    }
}

fn build_statement(pair: Pair, source: &LineIndex) -> ParseResult<Node> {
    match pair.as_rule() {
        Rule::batch_stmt => build_batch(pair, source),
        Rule::call_stmt => build_call(pair, source),
        other => Err(ParseError::Syntax(
            format!("Unexpected statement rule: {:?}", other),
            Some(pair_to_span(&pair, source)),
        )),
    }
}

fn build_batch(pair: Pair, source: &LineIndex) -> ParseResult<Node> {
    let span = pair_to_span(&pair, source);
    let mut bindings: Vec<ListBinding> = Vec::new();
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::binding_list => {
                for binding in part.into_inner() {
                    let binding_span = pair_to_span(&binding, source);
                    let mut inner = binding.into_inner();
                    let (list, element) = match (inner.next(), inner.next()) {
                        (Some(list), Some(element)) => {
                            (key_name(list), symbol_name(element))
                        }
                        _ => {
                            return Err(ParseError::Syntax(
                                "Incomplete batch binding".to_string(),
                                Some(binding_span),
                            ))
                        }
                    };

                    if bindings.iter().any(|b| b.list == list) {
                        return Err(ParseError::malformed(
                            format!("Batch binds list '{}' twice", list),
                            binding_span,
                        ));
                    }
                    if bindings.iter().any(|b| b.element == element) {
                        return Err(ParseError::malformed(
                            format!("Batch binds element ':{}' twice", element),
                            binding_span,
                        ));
                    }
                    bindings.push(ListBinding { list, element });
                }
            }
            Rule::block => body = Some(build_block(part, source, "batch body")?),
            other => {
                return Err(ParseError::Syntax(
                    format!("Unexpected batch rule: {:?}", other),
                    Some(pair_to_span(&part, source)),
                ))
            }
        }
    }

    if bindings.is_empty() {
        return Err(ParseError::malformed(
            "batch requires at least one `list: :element` binding",
            span,
        ));
    }

    let body = body.ok_or_else(|| ParseError::malformed("batch has no body", span))?;

    Ok(Node::Batch {
        bindings,
        body: Box::new(body),
        span,
    })
}

fn build_call(pair: Pair, source: &LineIndex) -> ParseResult<Node> {
    let span = pair_to_span(&pair, source);
    let mut name = String::new();
    let mut args = Vec::new();
    let mut nested = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::worker_name => name = part.as_str().to_string(),
            Rule::arg_list => args = build_arg_list(part, source)?,
            Rule::block => {
                let context = format!("block nested under '{}'", name);
                nested = Some(Box::new(build_block(part, source, &context)?));
            }
            other => {
                return Err(ParseError::Syntax(
                    format!("Unexpected call rule: {:?}", other),
                    Some(pair_to_span(&part, source)),
                ))
            }
        }
    }

    Ok(Node::Call {
        name,
        args,
        nested,
        span,
    })
}

fn build_arg_list(pair: Pair, source: &LineIndex) -> ParseResult<Vec<ArgExpr>> {
    let mut args: Vec<ArgExpr> = Vec::new();

    for arg in pair.into_inner() {
        let arg_span = pair_to_span(&arg, source);
        let expr = match arg.as_rule() {
            Rule::symbol => ArgExpr::param(symbol_name(arg)),
            Rule::keyword_arg => {
                let mut inner = arg.into_inner();
                let (key, value) = match (inner.next(), inner.next()) {
                    (Some(key), Some(value)) => (key_name(key), value),
                    _ => {
                        return Err(ParseError::Syntax(
                            "Incomplete keyword argument".to_string(),
                            Some(arg_span),
                        ))
                    }
                };
                let source_value = match value.as_rule() {
                    Rule::symbol => ArgSource::Param(symbol_name(value)),
                    _ => ArgSource::Literal(build_literal(value, source)?),
                };
                ArgExpr {
                    key,
                    source: source_value,
                }
            }
            other => {
                return Err(ParseError::Syntax(
                    format!("Unexpected argument rule: {:?}", other),
                    Some(arg_span),
                ))
            }
        };

        if args.iter().any(|a| a.key == expr.key) {
            return Err(ParseError::malformed(
                format!("Argument '{}' given twice", expr.key),
                arg_span,
            ));
        }
        args.push(expr);
    }

    Ok(args)
}

fn build_literal(pair: Pair, source: &LineIndex) -> ParseResult<JsonValue> {
    let span = pair_to_span(&pair, source);

    match pair.as_rule() {
        Rule::literal => match pair.into_inner().next() {
            Some(inner) => build_literal(inner, source),
            None => Err(ParseError::Syntax("Empty literal".to_string(), Some(span))),
        },
        // Strings and numbers share JSON's lexical rules
        Rule::string | Rule::number => serde_json::from_str(pair.as_str()).map_err(|e| {
            ParseError::malformed(format!("Invalid literal {}: {}", pair.as_str(), e), span)
        }),
        Rule::boolean => Ok(JsonValue::Bool(pair.as_str() == "true")),
        Rule::nil => Ok(JsonValue::Null),
        Rule::array => pair
            .into_inner()
            .map(|element| build_literal(element, source))
            .collect::<ParseResult<Vec<_>>>()
            .map(JsonValue::Array),
        other => Err(ParseError::Syntax(
            format!("Unexpected literal rule: {:?}", other),
            Some(span),
        )),
    }
}

/// `name:` -> `name`
fn key_name(pair: Pair) -> String {
    pair.as_str().trim_end_matches(':').to_string()
}

/// `:name` -> `name`
fn symbol_name(pair: Pair) -> String {
    pair.as_str().trim_start_matches(':').to_string()
}
