//! Formula and lookup definitions referenced by `[calc:x]` and `[lookup:x]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{FieldValue, ModelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDef {
    pub name: String,
    /// Formula text with embedded shortcodes, e.g. `[field:a] * 0.3`.
    pub formula: String,
    #[serde(default)]
    pub unit: Option<String>,
    /// Display precision; falls back to the widget's default.
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FormulaDef {
    pub fn new(name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formula: formula.into(),
            unit: None,
            decimals: None,
            description: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }
}

/// How a lookup entry matches the resolved key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum LookupMatch {
    /// Case-insensitive text or numeric equality.
    Key { key: String },
    /// Half-open numeric range `[min, max)`; a missing bound is unbounded.
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl LookupMatch {
    pub fn matches(&self, key: &FieldValue) -> bool {
        match self {
            LookupMatch::Key { key: expected } => {
                key.loosely_equals(&FieldValue::Text(expected.clone()))
            }
            LookupMatch::Range { min, max } => {
                let Some(value) = key.as_number() else {
                    return false;
                };
                min.is_none_or(|min| value >= min) && max.is_none_or(|max| value < max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    #[serde(flatten)]
    pub matcher: LookupMatch,
    pub value: FieldValue,
}

/// A table lookup: the key template is resolved against the session and the
/// first matching entry wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupDef {
    pub name: String,
    /// Shortcode template producing the lookup key, e.g. `[field:building_type]`.
    pub key: String,
    pub entries: Vec<LookupEntry>,
    #[serde(default)]
    pub default: Option<FieldValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

impl LookupDef {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            entries: Vec::new(),
            default: None,
            unit: None,
            decimals: None,
        }
    }

    pub fn with_key_entry(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.entries.push(LookupEntry {
            matcher: LookupMatch::Key { key: key.into() },
            value: value.into(),
        });
        self
    }

    pub fn with_range_entry(
        mut self,
        min: Option<f64>,
        max: Option<f64>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.entries.push(LookupEntry {
            matcher: LookupMatch::Range { min, max },
            value: value.into(),
        });
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// First matching entry value, falling back to the default.
    pub fn find(&self, key: &FieldValue) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|entry| entry.matcher.matches(key))
            .map(|entry| &entry.value)
            .or(self.default.as_ref())
    }
}

/// All formulas and lookups available to a session.
///
/// Formulas and lookups share one namespace because their results share one
/// record table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    formulas: BTreeMap<String, FormulaDef>,
    lookups: BTreeMap<String, LookupDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_formula(&mut self, formula: FormulaDef) -> Result<(), ModelError> {
        if self.contains(&formula.name) {
            return Err(ModelError::DuplicateDefinition(formula.name));
        }
        self.formulas.insert(formula.name.clone(), formula);
        Ok(())
    }

    pub fn add_lookup(&mut self, lookup: LookupDef) -> Result<(), ModelError> {
        if self.contains(&lookup.name) {
            return Err(ModelError::DuplicateDefinition(lookup.name));
        }
        self.lookups.insert(lookup.name.clone(), lookup);
        Ok(())
    }

    pub fn with_formula(mut self, formula: FormulaDef) -> Result<Self, ModelError> {
        self.add_formula(formula)?;
        Ok(self)
    }

    pub fn with_lookup(mut self, lookup: LookupDef) -> Result<Self, ModelError> {
        self.add_lookup(lookup)?;
        Ok(self)
    }

    pub fn formula(&self, name: &str) -> Option<&FormulaDef> {
        self.formulas.get(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&LookupDef> {
        self.lookups.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formulas.contains_key(name) || self.lookups.contains_key(name)
    }

    pub fn formulas(&self) -> impl Iterator<Item = &FormulaDef> {
        self.formulas.values()
    }

    pub fn lookups(&self) -> impl Iterator<Item = &LookupDef> {
        self.lookups.values()
    }

    pub fn len(&self) -> usize {
        self.formulas.len() + self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty() && self.lookups.is_empty()
    }
}
