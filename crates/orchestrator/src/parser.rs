//! Labeled-line replies from agents, and the batch text shown to them.
//!
//! Agents answer in a loose `Label: value` format:
//!
//! ```text
//! **Emotion**: curious
//! Reason: they asked a direct question
//! - Inner Thought: I should check what they
//!   meant by "soon".
//! ```
//!
//! Labels may be bold, list items or markdown headers. A line without a label
//! continues the field above it.

use std::fmt::Write as _;

use {serde::Serialize, trinity_common::Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ParseError {
    #[error("reply is empty")]
    Empty,
    #[error("reply contains no labeled fields")]
    NoFields,
}

/// Fields of a parsed reply, in the order they appeared.
///
/// Lookups ignore case, spaces, `_` and `-`, so `Inner Thought`,
/// `InnerThought` and `inner_thought` are the same field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    entries: Vec<(String, String)>,
}

fn label_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl ParsedFields {
    pub fn get(&self, label: &str) -> Option<&str> {
        let key = label_key(label);
        self.entries
            .iter()
            .find(|(l, _)| label_key(l) == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    /// Add a field. A label already present keeps its first value.
    fn insert(&mut self, label: String, value: String) {
        if self.get(&label).is_none() {
            self.entries.push((label, value));
        }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ParsedFields {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut fields = Self::default();
        for (label, value) in pairs {
            fields.insert(label.to_string(), value.to_string());
        }
        fields
    }
}

impl Serialize for ParsedFields {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Turns an agent reply into fields.
pub trait StructuredTextParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedFields, ParseError>;
}

/// Parser for the `Label: value` reply format.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabeledLineParser;

const MAX_LABEL_WORDS: usize = 4;
const MAX_LABEL_LEN: usize = 40;

/// Strip list and header markers from the start of a line.
fn strip_markers(line: &str) -> (&str, bool) {
    let mut rest = line.trim();
    let header = rest.starts_with('#');
    rest = rest.trim_start_matches('#').trim_start();
    for bullet in ["- ", "* ", "+ "] {
        if let Some(stripped) = rest.strip_prefix(bullet) {
            rest = stripped.trim_start();
            break;
        }
    }
    (rest, header)
}

fn clean_label(raw: &str) -> Option<String> {
    let label = raw.trim().trim_matches(|c| c == '*' || c == '_').trim();
    let valid = !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label.split_whitespace().count() <= MAX_LABEL_WORDS
        && label.starts_with(|c: char| c.is_alphabetic())
        && label
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'));
    valid.then(|| label.to_string())
}

/// `Some((label, value))` when the line opens a new field.
fn split_labeled(line: &str) -> Option<(String, String)> {
    let (rest, header) = strip_markers(line);
    if let Some(colon) = rest.find(':') {
        let after = &rest[colon + 1..];
        // `**Label:** value` puts the closing bold marker after the colon.
        let after = after.strip_prefix("**").unwrap_or(after);
        if (after.is_empty() || after.starts_with(char::is_whitespace))
            && let Some(label) = clean_label(&rest[..colon])
        {
            return Some((label, after.trim().to_string()));
        }
    }
    if header {
        return clean_label(rest).map(|label| (label, String::new()));
    }
    None
}

impl StructuredTextParser for LabeledLineParser {
    fn parse(&self, text: &str) -> Result<ParsedFields, ParseError> {
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut fields = ParsedFields::default();
        let mut current: Option<(String, Vec<String>)> = None;

        let mut finish = |current: &mut Option<(String, Vec<String>)>| {
            if let Some((label, lines)) = current.take() {
                fields.insert(label, lines.join("\n").trim().to_string());
            }
        };

        for line in text.lines() {
            if let Some((label, value)) = split_labeled(line) {
                finish(&mut current);
                let lines = if value.is_empty() { vec![] } else { vec![value] };
                current = Some((label, lines));
            } else if let Some((_, lines)) = current.as_mut()
                && !line.trim().is_empty()
            {
                lines.push(line.trim().to_string());
            }
        }
        finish(&mut current);

        if fields.is_empty() {
            Err(ParseError::NoFields)
        } else {
            Ok(fields)
        }
    }
}

/// Render a batch for the agents: one block per message, blank-line separated,
/// with the 0-based `ID` the choose agent answers with.
pub fn format_batch(messages: &[Message]) -> String {
    let mut out = String::new();
    for (id, msg) in messages.iter().enumerate() {
        if id > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "ID: {id}");
        let _ = writeln!(out, "Date: {}", msg.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "Author: {}", msg.author);
        let _ = writeln!(out, "Message: {}", msg.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::{TimeZone, Utc},
        rstest::rstest,
        trinity_common::ChannelId,
    };

    fn parse(text: &str) -> Result<ParsedFields, ParseError> {
        LabeledLineParser.parse(text)
    }

    #[test]
    fn plain_labels() {
        let fields = parse("Choice: respond\nReason: they asked me directly").unwrap();
        assert_eq!(fields.get("Choice"), Some("respond"));
        assert_eq!(fields.get("Reason"), Some("they asked me directly"));
        assert_eq!(fields.len(), 2);
    }

    #[rstest]
    #[case("**Emotion**: calm")]
    #[case("**Emotion:** calm")]
    #[case("- Emotion: calm")]
    #[case("### Emotion: calm")]
    #[case("  emotion:   calm  ")]
    fn decorated_labels(#[case] line: &str) {
        assert_eq!(parse(line).unwrap().get("Emotion"), Some("calm"));
    }

    #[test]
    fn continuation_lines_join_previous_field() {
        let fields = parse(
            "Intro text before any field\nInner Thought: first line\n  second line\n\nWhy: because",
        )
        .unwrap();
        assert_eq!(fields.get("InnerThought"), Some("first line\nsecond line"));
        assert_eq!(fields.get("inner_thought"), Some("first line\nsecond line"));
        assert_eq!(fields.get("why"), Some("because"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn header_without_colon_opens_field() {
        let fields = parse("## What\nThey want a recipe\n## Why\nDinner party").unwrap();
        assert_eq!(fields.get("What"), Some("They want a recipe"));
        assert_eq!(fields.get("Why"), Some("Dinner party"));
    }

    #[rstest]
    #[case("see https://example.com")]
    #[case("I think the answer is: maybe")]
    #[case("12: numbers are not labels")]
    fn prose_is_not_a_label(#[case] text: &str) {
        assert_eq!(parse(text), Err(ParseError::NoFields));
    }

    #[test]
    fn empty_reply() {
        assert_eq!(parse("  \n "), Err(ParseError::Empty));
    }

    #[test]
    fn first_value_wins_on_duplicates() {
        let fields = parse("Choice: respond\nchoice: nothing").unwrap();
        assert_eq!(fields.get("Choice"), Some("respond"));
    }

    #[test]
    fn message_id_field() {
        let fields = parse("message_id: 2").unwrap();
        assert_eq!(fields.get("message_id"), Some("2"));
    }

    #[test]
    fn fields_serialize_as_object() {
        let fields = ParsedFields::from([("What", "a"), ("Why", "b")]);
        assert_eq!(
            serde_json::to_value(&fields).unwrap(),
            serde_json::json!({"What": "a", "Why": "b"})
        );
    }

    #[test]
    fn batch_format() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let batch = vec![
            Message::from_inbound("hi all", "alice", "general", vec![], ChannelId(7), ts),
            Message::from_inbound("morning", "bob", "general", vec![], ChannelId(7), ts),
        ];
        assert_eq!(
            format_batch(&batch),
            "ID: 0\nDate: 2026-03-01 09:30:00 UTC\nAuthor: alice\nMessage: hi all\n\n\
             ID: 1\nDate: 2026-03-01 09:30:00 UTC\nAuthor: bob\nMessage: morning\n"
        );
        let parsed = parse(&format_batch(&batch)).unwrap();
        assert_eq!(parsed.get("Author"), Some("alice"));
    }
}
