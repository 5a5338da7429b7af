//! Shortcode parsing and substitution.
//!
//! Tokens follow `\[(field|calc|lookup):([^\]]+)\]`. Substitution is a
//! single pass: a value inserted for a token is never scanned again, so a
//! calculation result containing bracket text cannot trigger further
//! resolution.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use heatcalc_model::{FieldValue, NumberFormat};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::table::SessionTable;

static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(field|calc|lookup):([^\]]+)\]").expect("shortcode pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Field,
    Calc,
    Lookup,
}

impl RefKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "field" => Some(RefKind::Field),
            "calc" => Some(RefKind::Calc),
            "lookup" => Some(RefKind::Lookup),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Field => "field",
            RefKind::Calc => "calc",
            RefKind::Lookup => "lookup",
        }
    }

    /// Calc and lookup references both point at calculation records.
    pub fn is_result(&self) -> bool {
        matches!(self, RefKind::Calc | RefKind::Lookup)
    }
}

/// One `[kind:name]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: RefKind,
    pub name: String,
}

impl Reference {
    pub fn new(kind: RefKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::new(RefKind::Field, name)
    }

    pub fn calc(name: impl Into<String>) -> Self {
        Self::new(RefKind::Calc, name)
    }

    pub fn lookup(name: impl Into<String>) -> Self {
        Self::new(RefKind::Lookup, name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.kind.as_str(), self.name)
    }
}

fn reference_from(captures: &Captures<'_>) -> Option<Reference> {
    let kind = RefKind::from_tag(captures.get(1)?.as_str())?;
    let name = captures.get(2)?.as_str().trim();
    if name.is_empty() {
        return None;
    }
    Some(Reference::new(kind, name))
}

/// All distinct references in `text`, in order of first appearance.
pub fn references(text: &str) -> Vec<Reference> {
    let mut seen = BTreeSet::new();
    SHORTCODE_RE
        .captures_iter(text)
        .filter_map(|captures| reference_from(&captures))
        .filter(|reference| seen.insert(reference.clone()))
        .collect()
}

/// If `text` is exactly one shortcode (surrounding whitespace aside),
/// return it.
pub fn single_reference(text: &str) -> Option<Reference> {
    let trimmed = text.trim();
    let captures = SHORTCODE_RE.captures(trimmed)?;
    let whole = captures.get(0)?;
    if whole.start() != 0 || whole.end() != trimmed.len() {
        return None;
    }
    reference_from(&captures)
}

/// How resolved values are written into the output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionMode {
    /// Literals for the expression evaluator: numbers as plain numbers,
    /// other text quoted, unset fields as `0`.
    Expression,
    /// Text for display: field text as entered, results formatted with
    /// their unit, unset fields as the empty string.
    Display,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub text: String,
    /// Every distinct reference found, resolved or not.
    pub references: Vec<Reference>,
    /// References that had nothing to resolve to.
    pub unresolved: Vec<Reference>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Marker left in place of a token that could not be resolved.
pub fn unresolved_marker(reference: &Reference) -> String {
    format!("[unresolved {}:{}]", reference.kind.as_str(), reference.name)
}

/// Substitute every shortcode in `text` from `table`.
///
/// Field tokens always resolve (unknown fields read as unset). Calc and
/// lookup tokens resolve only when a calculation record exists; otherwise
/// an explicit marker is written and the reference is listed in
/// [`Resolution::unresolved`].
pub fn resolve(
    text: &str,
    table: &SessionTable,
    mode: SubstitutionMode,
    format: &NumberFormat,
) -> Resolution {
    let mut out = String::with_capacity(text.len());
    let mut references = Vec::new();
    let mut unresolved = Vec::new();
    let mut last = 0;

    for captures in SHORTCODE_RE.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let Some(reference) = reference_from(&captures) else {
            out.push_str(whole.as_str());
            continue;
        };

        let replacement = if reference.kind.is_result() {
            match table.calculation(&reference.name) {
                Some(record) => match mode {
                    SubstitutionMode::Expression => expression_literal(&record.value),
                    SubstitutionMode::Display => record.display(),
                },
                None => {
                    if !unresolved.contains(&reference) {
                        unresolved.push(reference.clone());
                    }
                    unresolved_marker(&reference)
                }
            }
        } else {
            let value = table.field(&reference.name);
            match mode {
                SubstitutionMode::Expression => expression_literal(value),
                SubstitutionMode::Display => display_field(value, format),
            }
        };
        out.push_str(&replacement);

        if !references.contains(&reference) {
            references.push(reference);
        }
    }
    out.push_str(&text[last..]);

    Resolution {
        text: out,
        references,
        unresolved,
    }
}

fn expression_literal(value: &FieldValue) -> String {
    match value.as_number() {
        Some(number) if number < 0.0 => format!("({number})"),
        Some(number) => number.to_string(),
        None => match value {
            FieldValue::Unset => "0".to_string(),
            other => quote(&other.as_text()),
        },
    }
}

fn display_field(value: &FieldValue, format: &NumberFormat) -> String {
    match value {
        FieldValue::Number(number) => {
            crate::format::format_number(*number, format.default_decimals, format)
        }
        other => other.as_text(),
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_distinct_references_in_order() {
        let found = references("[field:a] + [calc:b] * [field:a] - [lookup: c ]");
        assert_eq!(
            found,
            vec![
                Reference::field("a"),
                Reference::calc("b"),
                Reference::lookup("c")
            ]
        );
    }

    #[test]
    fn ignores_unknown_tags_and_empty_names() {
        assert!(references("[var:x] [field:] [field:   ]").is_empty());
    }

    #[test]
    fn single_reference_requires_whole_text() {
        assert_eq!(single_reference(" [calc:total] "), Some(Reference::calc("total")));
        assert_eq!(single_reference("[calc:total] + 1"), None);
        assert_eq!(single_reference("plain"), None);
    }

    #[test]
    fn expression_literals_quote_text_and_wrap_negatives() {
        assert_eq!(expression_literal(&FieldValue::Number(-3.0)), "(-3)");
        assert_eq!(expression_literal(&FieldValue::from("2,5")), "2.5");
        assert_eq!(expression_literal(&FieldValue::from("say \"hi\"")), "\"say \\\"hi\\\"\"");
        assert_eq!(expression_literal(&FieldValue::Unset), "0");
        assert_eq!(expression_literal(&FieldValue::Bool(true)), "1");
    }

    #[test]
    fn display_mode_reads_unset_fields_as_empty() {
        let table = SessionTable::new();
        let resolution = resolve(
            "Hello [field:name]!",
            &table,
            SubstitutionMode::Display,
            &NumberFormat::default(),
        );
        assert_eq!(resolution.text, "Hello !");
        assert!(resolution.is_complete());
        assert_eq!(resolution.references, vec![Reference::field("name")]);
    }

    #[test]
    fn missing_results_leave_a_marker() {
        let table = SessionTable::new();
        let resolution = resolve(
            "[calc:x] + 1",
            &table,
            SubstitutionMode::Expression,
            &NumberFormat::default(),
        );
        assert_eq!(resolution.text, "[unresolved calc:x] + 1");
        assert_eq!(resolution.unresolved, vec![Reference::calc("x")]);
    }
}
