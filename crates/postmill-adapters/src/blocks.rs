//! Bounded multi-line sections: `Requirements: ... Benefits:` style blocks.

use postmill_core::{Record, SubLabel};
use serde_json::Value;

const BULLETS: &[char] = &['-', '*', '\u{2022}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span<'t> {
    /// The start label does not occur.
    Absent,
    /// The start label occurs but no terminator follows it.
    Unterminated,
    Found(&'t str),
}

/// Byte offset of the first ASCII case-insensitive occurrence of `needle`.
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        haystack
            .get(i..i + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle))
    })
}

/// Text strictly between the first `start` label and the first `terminator`
/// after it. A missing terminator never yields a partial capture.
pub fn bounded<'t>(text: &'t str, start: &str, terminator: &str) -> Span<'t> {
    let Some(at) = find_ignore_case(text, start) else {
        return Span::Absent;
    };
    let rest = &text[at + start.len()..];
    match find_ignore_case(rest, terminator) {
        Some(end) => Span::Found(&rest[..end]),
        None => Span::Unterminated,
    }
}

/// One cleaned item per non-empty line, bullet markers removed.
pub fn itemize(block: &str) -> Vec<String> {
    block
        .lines()
        .map(|line| line.trim_start().trim_start_matches(BULLETS).trim())
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse sub-labels inside an isolated block. A value runs to the end of its
/// line or to the next sibling label, whichever comes first; absent members
/// are empty strings so the object always has every key.
pub fn compound(block: &str, members: &[SubLabel]) -> Record {
    let mut object = Record::new();
    for member in members {
        let value = find_ignore_case(block, member.label)
            .map(|at| {
                let rest = &block[at + member.label.len()..];
                let line_end = rest.find(|c: char| c == '\n' || c == '\r').unwrap_or(rest.len());
                let end = members
                    .iter()
                    .filter(|other| other.label != member.label)
                    .filter_map(|other| find_ignore_case(&rest[..line_end], other.label))
                    .min()
                    .unwrap_or(line_end);
                rest[..end].trim()
            })
            .filter(|value| !value.eq_ignore_ascii_case("null"))
            .unwrap_or_default();
        object.insert(member.key.to_string(), Value::String(value.to_string()));
    }
    object
}
