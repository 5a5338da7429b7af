//! Completion rules and per-field validation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use heatcalc_formula::SessionTable;
use heatcalc_model::{CardField, CardTemplate, CompletionRule, FieldType, FieldValue};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

static TEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()/\-]{6,20}$").expect("tel pattern compiles"));

static POSTAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4,5}$").expect("postal code pattern compiles"));

/// Admin-authored `pattern` rules, compiled once per template set and keyed
/// by pattern text. Invalid patterns are reported when compiling and then
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct PatternCache {
    compiled: BTreeMap<String, Regex>,
}

impl PatternCache {
    pub fn compile<'a>(fields: impl IntoIterator<Item = &'a CardField>) -> Self {
        let mut compiled = BTreeMap::new();
        for field in fields {
            let Some(pattern) = &field.validation.pattern else {
                continue;
            };
            if compiled.contains_key(pattern) {
                continue;
            }
            match Regex::new(pattern) {
                Ok(re) => {
                    compiled.insert(pattern.clone(), re);
                }
                Err(err) => {
                    warn!(field = %field.field_name, error = %err, "ignoring invalid validation pattern");
                }
            }
        }
        Self { compiled }
    }

    pub fn for_cards(cards: &[CardTemplate]) -> Self {
        Self::compile(cards.iter().flat_map(|card| card.fields()))
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    fn get(&self, pattern: &str) -> Option<&Regex> {
        self.compiled.get(pattern)
    }
}

/// A validation message for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMessage {
    pub field: String,
    pub message: String,
}

/// The card's configured rule, or the fallback when none is configured:
/// `required_fields` if any field is required, otherwise `any_field`.
pub fn effective_rule(card: &CardTemplate) -> CompletionRule {
    card.completion_rule().unwrap_or(if card.has_required_fields() {
        CompletionRule::RequiredFields
    } else {
        CompletionRule::AnyField
    })
}

/// Validate one value against its field definition. `None` means valid.
///
/// An absent value is only an error for required fields; the other rules
/// apply once something was entered.
pub fn validate_field(
    field: &CardField,
    value: &FieldValue,
    patterns: &PatternCache,
) -> Option<String> {
    if !value.is_present() {
        return field
            .required
            .then(|| format!("{} is required", field.display_label()));
    }

    if let Some(message) = type_error(field, value) {
        return Some(message);
    }
    rule_error(field, value, patterns).map(|generated| {
        field
            .validation
            .message
            .clone()
            .unwrap_or(generated)
    })
}

fn type_error(field: &CardField, value: &FieldValue) -> Option<String> {
    let label = field.display_label();
    let text = value.as_text();
    let text = text.trim();
    match field.field_type {
        FieldType::Number | FieldType::Range if value.as_number().is_none() => {
            Some(format!("{label} must be a number"))
        }
        FieldType::Email if !EMAIL_RE.is_match(text) => {
            Some(format!("{label} must be a valid email address"))
        }
        FieldType::Tel if !TEL_RE.is_match(text) => {
            Some(format!("{label} must be a valid phone number"))
        }
        FieldType::PostalCode if !POSTAL_CODE_RE.is_match(text) => {
            Some(format!("{label} must be a valid postal code"))
        }
        FieldType::Select | FieldType::Radio
            if !field.options.is_empty()
                && !field
                    .options
                    .iter()
                    .any(|option| value.loosely_equals(&FieldValue::from(option.value.as_str()))) =>
        {
            Some(format!("{label} must be one of the offered options"))
        }
        _ => None,
    }
}

fn rule_error(field: &CardField, value: &FieldValue, patterns: &PatternCache) -> Option<String> {
    let rules = &field.validation;
    let label = field.display_label();

    if let Some(number) = value.as_number() {
        if let Some(min) = rules.min
            && number < min
        {
            return Some(format!("{label} must be at least {min}"));
        }
        if let Some(max) = rules.max
            && number > max
        {
            return Some(format!("{label} must be at most {max}"));
        }
    }

    let text = value.as_text();
    let length = text.trim().chars().count();
    if let Some(min_length) = rules.min_length
        && length < min_length
    {
        return Some(format!("{label} must have at least {min_length} characters"));
    }
    if let Some(max_length) = rules.max_length
        && length > max_length
    {
        return Some(format!("{label} must have at most {max_length} characters"));
    }

    if let Some(re) = rules
        .pattern
        .as_deref()
        .and_then(|pattern| patterns.get(pattern))
        && !re.is_match(text.trim())
    {
        return Some(format!("{label} has an invalid format"));
    }
    None
}

/// Messages for every invalid field on the card, in field order.
pub fn validate_card(
    card: &CardTemplate,
    table: &SessionTable,
    patterns: &PatternCache,
) -> Vec<FieldMessage> {
    card.fields()
        .iter()
        .filter_map(|field| {
            validate_field(field, table.field(&field.field_name), patterns).map(|message| FieldMessage {
                field: field.field_name.clone(),
                message,
            })
        })
        .collect()
}

fn is_filled(field: &CardField, table: &SessionTable, patterns: &PatternCache) -> bool {
    let value = table.field(&field.field_name);
    value.is_present() && validate_field(field, value, patterns).is_none()
}

/// Whether the card's completion rule holds for the current data.
///
/// A field counts as filled when it has a value that passes validation. A
/// card with no fields of the relevant kind counts as complete.
pub fn is_card_complete(card: &CardTemplate, table: &SessionTable, patterns: &PatternCache) -> bool {
    let fields = card.fields();
    let filled = |field: &CardField| is_filled(field, table, patterns);
    match effective_rule(card) {
        CompletionRule::AllFields => fields.iter().all(filled),
        CompletionRule::AnyField => fields.is_empty() || fields.iter().any(filled),
        CompletionRule::RequiredFields => fields
            .iter()
            .filter(|field| field.required)
            .all(filled),
    }
}

#[cfg(test)]
mod tests {
    use heatcalc_model::{CardConfig, CardId, ValidationRules};

    use super::*;

    fn form(fields: Vec<CardField>, completion: Option<CompletionRule>) -> CardTemplate {
        CardTemplate {
            id: CardId::new("form").unwrap(),
            name: "Form".to_string(),
            display_order: 0,
            config: CardConfig::Form { fields, completion },
            reveal_conditions: Vec::new(),
            reveal_timing: None,
        }
    }

    #[test]
    fn fallback_rule_depends_on_required_fields() {
        let with_required = form(vec![CardField::new("a", FieldType::Text).required()], None);
        assert_eq!(effective_rule(&with_required), CompletionRule::RequiredFields);
        let optional = form(vec![CardField::new("a", FieldType::Text)], None);
        assert_eq!(effective_rule(&optional), CompletionRule::AnyField);
        let configured = form(Vec::new(), Some(CompletionRule::AllFields));
        assert_eq!(effective_rule(&configured), CompletionRule::AllFields);
    }

    #[test]
    fn required_and_type_checks() {
        let none = PatternCache::default();
        let email = CardField::new("email", FieldType::Email).required();
        assert_eq!(
            validate_field(&email, &FieldValue::Unset, &none).as_deref(),
            Some("email is required")
        );
        assert!(validate_field(&email, &FieldValue::from("nope"), &none).is_some());
        assert!(validate_field(&email, &FieldValue::from("ada@example.org"), &none).is_none());

        let zip = CardField::new("zip", FieldType::PostalCode);
        assert!(validate_field(&zip, &FieldValue::Unset, &none).is_none());
        assert!(validate_field(&zip, &FieldValue::from("10115"), &none).is_none());
        assert!(validate_field(&zip, &FieldValue::from("1O115"), &none).is_some());

        let fuel = CardField::new("fuel", FieldType::Select).with_options(["gas", "oil"]);
        assert!(validate_field(&fuel, &FieldValue::from("Gas"), &none).is_none());
        assert!(validate_field(&fuel, &FieldValue::from("coal"), &none).is_some());
    }

    #[test]
    fn rules_use_custom_message() {
        let none = PatternCache::default();
        let area = CardField::new("area", FieldType::Number).with_validation(ValidationRules {
            min: Some(10.0),
            max: Some(1000.0),
            ..ValidationRules::default()
        });
        assert_eq!(
            validate_field(&area, &FieldValue::Number(5.0), &none).as_deref(),
            Some("area must be at least 10")
        );

        let code = CardField::new("code", FieldType::Text).with_validation(ValidationRules {
            pattern: Some("^[A-Z]{3}$".to_string()),
            message: Some("Use three capital letters".to_string()),
            ..ValidationRules::default()
        });
        let patterns = PatternCache::compile([&code]);
        assert_eq!(
            validate_field(&code, &FieldValue::from("abc"), &patterns).as_deref(),
            Some("Use three capital letters")
        );
        assert!(validate_field(&code, &FieldValue::from("ABC"), &patterns).is_none());
    }

    #[test]
    fn patterns_compile_once_and_invalid_ones_are_skipped() {
        let rules = |pattern: &str| ValidationRules {
            pattern: Some(pattern.to_string()),
            ..ValidationRules::default()
        };
        let first = CardField::new("code", FieldType::Text).with_validation(rules("^[0-9]+$"));
        let second = CardField::new("ref", FieldType::Text).with_validation(rules("^[0-9]+$"));
        let broken = CardField::new("tag", FieldType::Text).with_validation(rules("(unclosed"));
        let card = form(vec![first, second, broken], None);

        let patterns = PatternCache::for_cards(std::slice::from_ref(&card));

        assert_eq!(patterns.len(), 1);
        let fields = card.fields();
        assert!(validate_field(&fields[1], &FieldValue::from("12a"), &patterns).is_some());
        assert!(validate_field(&fields[2], &FieldValue::from("anything"), &patterns).is_none());
    }

    #[test]
    fn completion_rules_count_only_valid_values() {
        let none = PatternCache::default();
        let mut table = SessionTable::new();
        let card = form(
            vec![
                CardField::new("area", FieldType::Number).required(),
                CardField::new("note", FieldType::Text),
            ],
            None,
        );
        assert!(!is_card_complete(&card, &table, &none));
        table.set_field("area", FieldValue::from("abc"));
        assert!(!is_card_complete(&card, &table, &none));
        table.set_field("area", FieldValue::from("120"));
        assert!(is_card_complete(&card, &table, &none));

        let all = form(card.fields().to_vec(), Some(CompletionRule::AllFields));
        assert!(!is_card_complete(&all, &table, &none));
        let any = form(card.fields().to_vec(), Some(CompletionRule::AnyField));
        assert!(is_card_complete(&any, &table, &none));
    }
}
