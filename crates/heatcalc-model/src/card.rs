//! Card templates.
//!
//! A card template is loaded once per session and never mutated. The
//! behaviour that differs per card type lives in [`CardConfig`], so a form
//! card carries its fields and an info card carries only its copy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CardId, FieldValue};

/// Card type as it appears in the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Form,
    Calculation,
    Info,
    Visual,
    Submit,
}

impl CardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardKind::Form => "form",
            CardKind::Calculation => "calculation",
            CardKind::Info => "info",
            CardKind::Visual => "visual",
            CardKind::Submit => "submit",
        }
    }

    /// Non-form cards complete on their own once revealed.
    pub fn auto_completes(&self) -> bool {
        matches!(
            self,
            CardKind::Calculation | CardKind::Info | CardKind::Visual
        )
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific card configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardConfig {
    Form {
        fields: Vec<CardField>,
        completion: Option<CompletionRule>,
    },
    Calculation {
        /// Formula and lookup shortcodes (`[calc:x]`, `[lookup:y]`) processed
        /// in order when the card is revealed.
        calculations: Vec<String>,
        /// Display templates rendered after the calculations succeed.
        display: Vec<String>,
    },
    Info {
        content: String,
    },
    Visual {
        content: String,
    },
    Submit {
        fields: Vec<CardField>,
        button_label: Option<String>,
    },
}

impl CardConfig {
    pub fn kind(&self) -> CardKind {
        match self {
            CardConfig::Form { .. } => CardKind::Form,
            CardConfig::Calculation { .. } => CardKind::Calculation,
            CardConfig::Info { .. } => CardKind::Info,
            CardConfig::Visual { .. } => CardKind::Visual,
            CardConfig::Submit { .. } => CardKind::Submit,
        }
    }

    pub fn fields(&self) -> &[CardField] {
        match self {
            CardConfig::Form { fields, .. } | CardConfig::Submit { fields, .. } => fields,
            CardConfig::Calculation { .. } | CardConfig::Info { .. } | CardConfig::Visual { .. } => {
                &[]
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardTemplate {
    pub id: CardId,
    pub name: String,
    pub display_order: u32,
    pub config: CardConfig,
    #[serde(default)]
    pub reveal_conditions: Vec<RevealCondition>,
    #[serde(default)]
    pub reveal_timing: Option<RevealTiming>,
}

impl CardTemplate {
    pub fn kind(&self) -> CardKind {
        self.config.kind()
    }

    pub fn fields(&self) -> &[CardField] {
        self.config.fields()
    }

    pub fn owns_field(&self, field_name: &str) -> bool {
        self.fields()
            .iter()
            .any(|field| field.field_name == field_name)
    }

    /// Configured completion rule, if the card is a form with one.
    pub fn completion_rule(&self) -> Option<CompletionRule> {
        match &self.config {
            CardConfig::Form { completion, .. } => *completion,
            _ => None,
        }
    }

    pub fn has_required_fields(&self) -> bool {
        self.fields().iter().any(|field| field.required)
    }
}

/// `completion_rules.form_completion.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionRule {
    AllFields,
    AnyField,
    RequiredFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Email,
    Tel,
    PostalCode,
    Select,
    Radio,
    Checkbox,
    Range,
}

impl FieldType {
    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Number | FieldType::Range)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
    /// Message shown instead of the generated one when a rule fails.
    #[serde(default)]
    pub message: Option<String>,
}

impl ValidationRules {
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardField {
    pub field_name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub validation: ValidationRules,
    #[serde(default)]
    pub options: Vec<FieldOption>,
    #[serde(default)]
    pub default_value: Option<FieldValue>,
}

impl CardField {
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.into(),
            label: None,
            field_type,
            required: false,
            validation: ValidationRules::default(),
            options: Vec::new(),
            default_value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = values
            .into_iter()
            .map(|value| FieldOption {
                value: value.into(),
                label: None,
            })
            .collect();
        self
    }

    pub fn with_validation(mut self, validation: ValidationRules) -> Self {
        self.validation = validation;
        self
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.field_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[serde(alias = "==", alias = "eq")]
    Equals,
    #[serde(alias = "!=", alias = "neq")]
    NotEquals,
    #[serde(alias = ">", alias = "gt")]
    GreaterThan,
    #[serde(alias = ">=", alias = "gte")]
    GreaterOrEqual,
    #[serde(alias = "<", alias = "lt")]
    LessThan,
    #[serde(alias = "<=", alias = "lte")]
    LessOrEqual,
    Contains,
    IsSet,
    IsEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevealCondition {
    Always,
    /// The target card has status `complete`.
    CardComplete { card: CardId },
    /// The target card's completion rule is satisfied by the current data,
    /// whether or not the card was formally completed.
    FieldsComplete { card: CardId },
    ValueCheck {
        field: String,
        operator: ConditionOperator,
        #[serde(default)]
        value: FieldValue,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "timing", rename_all = "snake_case")]
pub enum RevealTiming {
    Immediately,
    AfterDelay { delay_ms: u64 },
}

impl RevealTiming {
    pub fn after_seconds(seconds: f64) -> Self {
        let millis = (seconds.max(0.0) * 1000.0).round() as u64;
        RevealTiming::AfterDelay { delay_ms: millis }
    }

    pub fn delay(&self) -> Duration {
        match self {
            RevealTiming::Immediately => Duration::ZERO,
            RevealTiming::AfterDelay { delay_ms } => Duration::from_millis(*delay_ms),
        }
    }
}
