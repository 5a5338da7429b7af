//! Content-store shape of card templates and catalogs.
//!
//! Everything optional in the export is optional here; conversion into the
//! model decides on fallbacks and records them as [`ConfigIssue`]s.

use heatcalc_model::{
    CardConfig, CardField, CardId, CardTemplate, CompletionRule, ConditionOperator, ConfigIssue,
    FieldOption, FieldType, FieldValue, FormulaDef, IssueSeverity, LookupEntry, RevealCondition,
    RevealTiming, ValidationRules,
};
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTemplateFile {
    #[serde(default)]
    pub cards: Vec<RawCard>,
    #[serde(default)]
    pub formulas: Vec<FormulaDef>,
    #[serde(default)]
    pub lookups: Vec<RawLookup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCard {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub card_type: String,
    #[serde(default)]
    pub display_order: u32,
    #[serde(default)]
    pub card_fields: Vec<RawField>,
    #[serde(default)]
    pub completion_rules: Option<RawCompletionRules>,
    #[serde(default)]
    pub reveal_conditions: Vec<RawCondition>,
    #[serde(default)]
    pub reveal_timing: Option<RawTiming>,
    /// Calculation cards: `[calc:x]` / `[lookup:y]` entries.
    #[serde(default)]
    pub calculations: Vec<String>,
    /// Calculation cards: display templates.
    #[serde(default)]
    pub display: Vec<String>,
    /// Info and visual cards.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub button_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawField {
    pub field_name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub validation_rules: Option<ValidationRules>,
    #[serde(default)]
    pub options: Vec<RawOption>,
    #[serde(default)]
    pub default_value: Option<FieldValue>,
}

/// Options come either as bare strings or as `{value, label}` objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOption {
    Value(String),
    Labeled(FieldOption),
}

impl From<RawOption> for FieldOption {
    fn from(option: RawOption) -> Self {
        match option {
            RawOption::Value(value) => FieldOption { value, label: None },
            RawOption::Labeled(option) => option,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCompletionRules {
    #[serde(default)]
    pub form_completion: Option<RawFormCompletion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFormCompletion {
    #[serde(rename = "type")]
    pub rule: CompletionRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<FieldValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTiming {
    #[serde(default)]
    pub timing: Option<String>,
    #[serde(default)]
    pub delay_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLookup {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub entries: Vec<LookupEntry>,
    /// CSV file with `key,value` or `min,max,value` columns, relative to the
    /// template file.
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub default: Option<FieldValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

impl RawCard {
    /// Convert into a typed template, pushing every fallback taken onto
    /// `issues`.
    pub fn into_template(self, issues: &mut Vec<ConfigIssue>) -> Result<CardTemplate, TemplateError> {
        let id = CardId::new(self.id.clone())?;
        let card = id.as_str().to_string();

        let reveal_conditions = self
            .reveal_conditions
            .into_iter()
            .filter_map(|raw| convert_condition(&card, raw, issues).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        let reveal_timing = self
            .reveal_timing
            .and_then(|raw| convert_timing(&card, raw, issues));

        let fields: Vec<CardField> = self.card_fields.into_iter().map(convert_field).collect();
        let config = match self.card_type.trim().to_ascii_lowercase().as_str() {
            "form" => CardConfig::Form {
                fields,
                completion: self
                    .completion_rules
                    .and_then(|rules| rules.form_completion)
                    .map(|completion| completion.rule),
            },
            "calculation" => CardConfig::Calculation {
                calculations: self.calculations,
                display: self.display,
            },
            "info" => CardConfig::Info {
                content: self.content.unwrap_or_default(),
            },
            "visual" => CardConfig::Visual {
                content: self.content.unwrap_or_default(),
            },
            "submit" => CardConfig::Submit {
                fields,
                button_label: self.button_label,
            },
            other => {
                return Err(TemplateError::invalid_card(
                    &card,
                    format!("unknown card type '{other}'"),
                ));
            }
        };

        Ok(CardTemplate {
            name: self.name.unwrap_or_else(|| card.clone()),
            id,
            display_order: self.display_order,
            config,
            reveal_conditions,
            reveal_timing,
        })
    }
}

fn convert_field(raw: RawField) -> CardField {
    CardField {
        field_name: raw.field_name,
        label: raw.label,
        field_type: raw.field_type,
        required: raw.required,
        validation: raw.validation_rules.unwrap_or_default(),
        options: raw.options.into_iter().map(FieldOption::from).collect(),
        default_value: raw.default_value,
    }
}

fn convert_timing(card: &str, raw: RawTiming, issues: &mut Vec<ConfigIssue>) -> Option<RevealTiming> {
    match raw.timing.as_deref().map(str::trim) {
        Some("immediately") => Some(RevealTiming::Immediately),
        Some("after_delay") => match raw.delay_seconds {
            Some(seconds) => Some(RevealTiming::after_seconds(seconds)),
            None => {
                issues.push(
                    ConfigIssue::new(
                        "TPL002",
                        IssueSeverity::Warning,
                        "after_delay timing without delay_seconds; revealing immediately",
                    )
                    .for_card(card),
                );
                Some(RevealTiming::Immediately)
            }
        },
        other => {
            issues.push(
                ConfigIssue::new(
                    "TPL001",
                    IssueSeverity::Warning,
                    format!(
                        "unknown reveal timing {:?}; treated as missing",
                        other.unwrap_or_default()
                    ),
                )
                .for_card(card),
            );
            None
        }
    }
}

/// `Ok(None)` drops the condition after recording why.
fn convert_condition(
    card: &str,
    raw: RawCondition,
    issues: &mut Vec<ConfigIssue>,
) -> Result<Option<RevealCondition>, TemplateError> {
    let target = raw.target.map(|target| target.trim().to_string());
    let condition = match raw.condition_type.trim() {
        "always" => RevealCondition::Always,
        "card_complete" | "fields_complete" => {
            let Some(target) = target.filter(|target| !target.is_empty()) else {
                issues.push(dropped(card, &raw.condition_type, "missing target card"));
                return Ok(None);
            };
            let target = CardId::new(target)?;
            if raw.condition_type.trim() == "card_complete" {
                RevealCondition::CardComplete { card: target }
            } else {
                RevealCondition::FieldsComplete { card: target }
            }
        }
        "value_check" => {
            let Some(field) = target.filter(|target| !target.is_empty()) else {
                issues.push(dropped(card, "value_check", "missing target field"));
                return Ok(None);
            };
            let operator = raw.operator.as_deref().unwrap_or("equals");
            let Some(operator) = parse_operator(operator) else {
                issues.push(
                    dropped(card, "value_check", &format!("unknown operator '{operator}'"))
                        .about(field),
                );
                return Ok(None);
            };
            RevealCondition::ValueCheck {
                field,
                operator,
                value: raw.value.unwrap_or_default(),
            }
        }
        other => {
            issues.push(dropped(card, other, "unknown condition type"));
            return Ok(None);
        }
    };
    Ok(Some(condition))
}

fn parse_operator(operator: &str) -> Option<ConditionOperator> {
    serde_json::from_value(serde_json::Value::String(operator.trim().to_string())).ok()
}

fn dropped(card: &str, condition_type: &str, reason: &str) -> ConfigIssue {
    ConfigIssue::new(
        "TPL003",
        IssueSeverity::Warning,
        format!("reveal condition '{condition_type}' ignored: {reason}"),
    )
    .for_card(card)
}
