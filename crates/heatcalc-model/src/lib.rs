//! Data model for the progressive card-based savings calculator.
//!
//! Everything in this crate is plain data: card templates loaded once per
//! session, formula and lookup definitions, field values, widget
//! configuration and configuration issues. Runtime state lives in
//! `heatcalc-formula` and `heatcalc-flow`.

pub mod card;
pub mod config;
pub mod error;
pub mod formula;
pub mod ids;
pub mod issue;
pub mod value;

pub use card::{
    CardConfig, CardField, CardKind, CardTemplate, CompletionRule, ConditionOperator,
    FieldOption, FieldType, RevealCondition, RevealTiming, ValidationRules,
};
pub use config::{DemotionPolicy, NumberFormat, TimingSource, WidgetConfig, WidgetMode};
pub use error::{ModelError, Result};
pub use formula::{Catalog, FormulaDef, LookupDef, LookupEntry, LookupMatch};
pub use ids::{CardId, SessionId};
pub use issue::{CheckReport, ConfigIssue, IssueSeverity};
pub use value::{FieldValue, parse_number};
