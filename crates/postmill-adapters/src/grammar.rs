//! Declarative field-grammar interpreter.
//!
//! A [`Grammar`] is an ordered list of [`FieldSpec`]s. [`parse`] runs every spec
//! independently against the post text, so fields may appear in any order and
//! a missing field never blocks the others. Every declared field ends up in the
//! record, falling back to its declared default. Glyphs outside 7-bit ASCII are
//! dropped before any field is looked for.

use std::sync::LazyLock;

use postmill_core::{Diagnostic, FieldKind, FieldSpec, Grammar, Record};
use regex::Regex;
use serde_json::Value;

use crate::blocks::{self, Span};

static AUTHOR_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#([a-z][0-9]{3})(?:[^0-9]|$)").unwrap());
static CATEGORY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#CA([a-z0-9_]+)").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub record: Record,
    pub diagnostics: Vec<Diagnostic>,
}

enum Extracted {
    Value(Value),
    Absent,
    Unterminated(&'static str),
}

pub fn parse(text: &str, grammar: &Grammar) -> Parsed {
    let body = strip_glyphs(text);
    let body = body.as_str();

    let mut record = Record::new();
    let mut diagnostics = Vec::new();

    for spec in &grammar.fields {
        let extracted = match extract_field(body, spec) {
            Extracted::Absent if grammar.title_fallback == Some(spec.name) => {
                match first_non_empty_line(body) {
                    Some(line) => Extracted::Value(Value::String(line.to_string())),
                    None => Extracted::Absent,
                }
            }
            other => other,
        };

        let value = match extracted {
            Extracted::Value(value) => value,
            Extracted::Absent => {
                if spec.required {
                    diagnostics.push(Diagnostic::MissingField {
                        field: spec.name.to_string(),
                    });
                }
                spec.default.clone()
            }
            Extracted::Unterminated(terminator) => {
                diagnostics.push(Diagnostic::MalformedBlock {
                    field: spec.name.to_string(),
                    terminator: terminator.to_string(),
                });
                spec.default.clone()
            }
        };
        record.insert(spec.name.to_string(), value);
    }

    Parsed {
        record,
        diagnostics,
    }
}

fn extract_field(text: &str, spec: &FieldSpec) -> Extracted {
    match spec.kind {
        FieldKind::Line => scalar(find_line_value(text, spec.label)),
        FieldKind::List { delimiters } => match scalar(find_line_value(text, spec.label)) {
            Extracted::Value(Value::String(captured)) => {
                Extracted::Value(Value::from(split_list(&captured, delimiters)))
            }
            other => other,
        },
        FieldKind::Block { terminator } => match blocks::bounded(text, spec.label, terminator) {
            Span::Found(block) => Extracted::Value(Value::from(blocks::itemize(block))),
            Span::Absent => Extracted::Absent,
            Span::Unterminated => Extracted::Unterminated(terminator),
        },
        FieldKind::Compound {
            terminator,
            members,
        } => match blocks::bounded(text, spec.label, terminator) {
            Span::Found(block) => Extracted::Value(Value::Object(blocks::compound(block, members))),
            Span::Absent => Extracted::Absent,
            Span::Unterminated => Extracted::Unterminated(terminator),
        },
        FieldKind::Group { members } => {
            let mut object = Record::new();
            for member in members {
                if let Extracted::Value(value) = scalar(find_line_value(text, member.label)) {
                    object.insert(member.key.to_string(), value);
                }
            }
            if object.is_empty() {
                Extracted::Absent
            } else {
                Extracted::Value(Value::Object(object))
            }
        }
        FieldKind::Trailing => scalar(find_trailing_value(text, spec.label)),
    }
}

/// Normalize a raw capture: blank is absent, a literal `null` is JSON null.
fn scalar(captured: Option<&str>) -> Extracted {
    let Some(captured) = captured.map(str::trim) else {
        return Extracted::Absent;
    };
    if captured.is_empty() {
        Extracted::Absent
    } else if captured.eq_ignore_ascii_case("null") {
        Extracted::Value(Value::Null)
    } else {
        Extracted::Value(Value::String(captured.to_string()))
    }
}

/// Strip a case-insensitive label prefix from `line`.
pub(crate) fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        Some(&line[label.len()..])
    } else {
        None
    }
}

/// Rest of the first line that begins with `label`, trimmed.
pub fn find_line_value<'t>(text: &'t str, label: &str) -> Option<&'t str> {
    text.lines()
        .find_map(|line| strip_label(line.trim_start(), label))
        .map(str::trim)
}

fn find_trailing_value<'t>(text: &'t str, label: &str) -> Option<&'t str> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if strip_label(&line[indent..], label).is_some() {
            return Some(text[offset + indent + label.len()..].trim());
        }
        offset += line.len();
    }
    None
}

pub fn split_list(captured: &str, delimiters: &[char]) -> Vec<String> {
    captured
        .split(|c: char| delimiters.contains(&c))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Drop everything outside the 7-bit ASCII range (emoji, decorative bullets).
pub fn strip_glyphs(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

pub fn first_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// First `#X123`-style author hashtag, uppercased.
pub fn author_hashtag(text: &str) -> Option<String> {
    AUTHOR_TAG_RE
        .captures(text)
        .map(|caps| caps[1].to_ascii_uppercase())
}

/// Suffix of the first `#CA...` category hashtag, as written.
pub fn category_hashtag(text: &str) -> Option<String> {
    CATEGORY_TAG_RE.captures(text).map(|caps| caps[1].to_string())
}

/// ASCII case-insensitive substring test, used for hashtag gates.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    blocks::find_ignore_case(haystack, needle).is_some()
}
