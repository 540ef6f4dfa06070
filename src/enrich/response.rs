//! Tolerant decoding of classifier replies.
//!
//! Replies are parsed as a whole first; when that fails the first balanced
//! `{...}` span is tried, which covers replies wrapped in prose or code fences.
//! Individual fields are then read with type checks so one mistyped field never
//! discards the others.

use serde_json::{Map, Value};

/// Outcome of decoding one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// The reply was a JSON object.
    Strict(Map<String, Value>),
    /// A JSON object was recovered from surrounding text.
    Extracted(Map<String, Value>),
    /// Nothing usable.
    Unparseable,
}

/// Decodes a reply body.
pub fn parse_reply(content: &str) -> ParsedReply {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(content.trim()) {
        return ParsedReply::Strict(fields);
    }
    let mut rest = content;
    while let Some(span) = first_balanced_object(rest) {
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(span.text) {
            return ParsedReply::Extracted(fields);
        }
        rest = &rest[span.start + 1..];
    }
    ParsedReply::Unparseable
}

struct Span<'a> {
    start: usize,
    text: &'a str,
}

/// First `{` whose matching `}` exists, honouring string literals.
fn first_balanced_object(text: &str) -> Option<Span<'_>> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(&text[start..]) {
            return Some(Span {
                start,
                text: &text[start..start + end + 1],
            });
        }
        search_from = start + 1;
    }
    None
}

fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Type-checked access to reply fields, counting the ones that typed correctly.
pub struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    typed: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Self { fields, typed: 0 }
    }

    /// String field, trimmed; empty when absent or mistyped.
    pub fn text(&mut self, key: &str) -> String {
        match self.fields.get(key) {
            Some(Value::String(value)) => {
                self.typed += 1;
                value.trim().to_string()
            }
            _ => String::new(),
        }
    }

    /// Positive integer field. `null` is a valid "unknown".
    pub fn number(&mut self, key: &str) -> Option<u32> {
        match self.fields.get(key) {
            Some(Value::Null) => {
                self.typed += 1;
                None
            }
            Some(Value::Number(number)) => {
                let whole = number.as_u64().or_else(|| {
                    number
                        .as_f64()
                        .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                        .map(|f| f as u64)
                });
                let parsed = whole.and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0);
                if parsed.is_some() {
                    self.typed += 1;
                }
                parsed
            }
            _ => None,
        }
    }

    /// Array of strings; non-string entries are skipped.
    pub fn labels(&mut self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => {
                self.typed += 1;
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|label| label.trim().to_string())
                    .filter(|label| !label.is_empty())
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Number of fields read with the expected type.
    pub fn typed(&self) -> usize {
        self.typed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn strict_object_parses_directly() {
        assert_eq!(
            parse_reply(r#" {"speaker":"Jerry"} "#),
            ParsedReply::Strict(fields(json!({"speaker": "Jerry"})))
        );
    }

    #[test]
    fn recovers_object_from_prose_and_fences() {
        let reply = "Sure! Here you go:\n```json\n{\"speaker\": \"George\", \"note\": \"a } inside\"}\n```\nAnything else?";
        assert_eq!(
            parse_reply(reply),
            ParsedReply::Extracted(fields(json!({"speaker": "George", "note": "a } inside"})))
        );
    }

    #[test]
    fn skips_unbalanced_and_invalid_spans() {
        let reply = "{not json} then {\"season\": 4}";
        assert_eq!(
            parse_reply(reply),
            ParsedReply::Extracted(fields(json!({"season": 4})))
        );
        assert_eq!(parse_reply("no braces at all"), ParsedReply::Unparseable);
        assert_eq!(parse_reply("{ \"open\": "), ParsedReply::Unparseable);
        assert_eq!(parse_reply("[1, 2]"), ParsedReply::Unparseable);
    }

    #[test]
    fn field_reader_defaults_mistyped_fields() {
        let map = fields(json!({
            "speaker": 7,
            "listener": "Elaine",
            "season": "four",
            "episode": null,
            "topics": ["Work", 3, " "]
        }));
        let mut reader = FieldReader::new(&map);
        assert_eq!(reader.text("speaker"), "");
        assert_eq!(reader.text("listener"), "Elaine");
        assert_eq!(reader.number("season"), None);
        assert_eq!(reader.number("episode"), None);
        assert_eq!(reader.labels("topics"), vec!["Work".to_string()]);
        assert_eq!(reader.text("situation"), "");
        assert_eq!(reader.typed(), 3);
    }

    #[test]
    fn whole_floats_count_as_numbers() {
        let map = fields(json!({"season": 4.0, "episode": 2.5, "other": 0}));
        let mut reader = FieldReader::new(&map);
        assert_eq!(reader.number("season"), Some(4));
        assert_eq!(reader.number("episode"), None);
        assert_eq!(reader.number("other"), None);
        assert_eq!(reader.typed(), 1);
    }
}
