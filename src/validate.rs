//! Schema checks over a serialized dataset.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::records::RecordKind;

/// One problem found in a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The dataset is not a JSON array.
    NotAnArray,
    /// An entry is not a JSON object.
    NotAnObject { index: usize },
    MissingKey { index: usize, key: &'static str },
    /// The title or text field is not a non-empty string.
    InvalidText { index: usize, field: &'static str },
    DuplicateId { id: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnArray => write!(f, "dataset must be a JSON array"),
            Self::NotAnObject { index } => write!(f, "Entry at index {index} is not an object"),
            Self::MissingKey { index, key } => write!(f, "Missing key '{key}' at index {index}"),
            Self::InvalidText { index, field } => write!(f, "Invalid {field} at index {index}"),
            Self::DuplicateId { id } => write!(f, "Duplicate id '{id}'"),
        }
    }
}

/// Checks every entry and returns all violations, not just the first.
pub fn validate(kind: RecordKind, dataset: &Value) -> Result<(), Vec<Violation>> {
    let Some(entries) = dataset.as_array() else {
        return Err(vec![Violation::NotAnArray]);
    };

    let text_field = kind.text_field();
    let mut seen_ids = HashSet::new();
    let mut violations = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let Some(fields) = entry.as_object() else {
            violations.push(Violation::NotAnObject { index });
            continue;
        };
        for &key in kind.required_keys() {
            if !fields.contains_key(key) {
                violations.push(Violation::MissingKey { index, key });
            }
        }
        let text_ok = fields
            .get(text_field)
            .and_then(Value::as_str)
            .is_some_and(|text| !text.trim().is_empty());
        if !text_ok {
            violations.push(Violation::InvalidText {
                index,
                field: text_field,
            });
        }
        if let Some(id) = fields.get("id") {
            let id = id.as_str().map_or_else(|| id.to_string(), str::to_string);
            if !seen_ids.insert(id.clone()) {
                violations.push(Violation::DuplicateId { id });
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
