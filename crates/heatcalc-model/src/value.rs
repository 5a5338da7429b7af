//! Field values entered by the visitor or defaulted by a template.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar value stored under a field name.
///
/// `Unset` is the sentinel returned for names that were never written. It
/// serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Unset,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, FieldValue::Unset)
    }

    /// True when the value counts as "filled in" for completion purposes.
    ///
    /// Blank text and `false` checkboxes do not count.
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Unset => false,
            FieldValue::Bool(value) => *value,
            FieldValue::Number(value) => value.is_finite(),
            FieldValue::Text(value) => !value.trim().is_empty(),
        }
    }

    /// Numeric view of the value. Text is parsed with [`parse_number`].
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Unset => None,
            FieldValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            FieldValue::Number(value) => value.is_finite().then_some(*value),
            FieldValue::Text(value) => parse_number(value),
        }
    }

    /// Plain text view; `Unset` becomes the empty string.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Unset => String::new(),
            FieldValue::Bool(value) => value.to_string(),
            FieldValue::Number(value) => value.to_string(),
            FieldValue::Text(value) => value.clone(),
        }
    }

    /// Case-insensitive comparison used by lookups and value checks.
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(left), Some(right)) => (left - right).abs() < f64::EPSILON,
            _ => self
                .as_text()
                .trim()
                .eq_ignore_ascii_case(other.as_text().trim()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Parses user-entered numbers.
///
/// Accepts the plain `1234.5` form as well as the displayed
/// `1.234,5` form (dot grouping, decimal comma). Returns `None` for empty,
/// malformed or non-finite input.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = trimmed.parse::<f64>() {
        return parsed.is_finite().then_some(parsed);
    }
    if !trimmed.contains(',') {
        return None;
    }
    let normalized: String = trimmed
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    normalized
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}
