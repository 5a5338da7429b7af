//! Per-session field values and calculation records.
//!
//! The table owns the staleness bookkeeping: every mutation bumps a
//! revision counter, records remember the revision they were computed at,
//! and field writes mark dependent records stale through the
//! [`DependencyTracker`].

use std::collections::{BTreeMap, BTreeSet};

use heatcalc_model::FieldValue;
use serde::Serialize;
use tracing::{debug, trace};

use crate::dependency::DependencyTracker;
use crate::format::format_with_unit;
use crate::shortcode::RefKind;

static UNSET: FieldValue = FieldValue::Unset;

#[derive(Debug, Clone)]
struct FieldEntry {
    value: FieldValue,
    changed_at: u64,
}

/// Output of one formula or lookup evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationRecord {
    pub name: String,
    pub value: FieldValue,
    /// Display text without the unit.
    pub formatted: String,
    pub unit: Option<String>,
    pub is_stale: bool,
    /// Table revision at which the record was last stored.
    pub computed_at: u64,
    /// Revision at which `value` last actually changed.
    #[serde(skip)]
    changed_at: u64,
}

impl CalculationRecord {
    /// Formatted value with its unit, e.g. `122,5 kWh`.
    pub fn display(&self) -> String {
        format_with_unit(&self.formatted, self.unit.as_deref())
    }
}

/// What a field write did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChange {
    /// False when the new value equals the stored one.
    pub changed: bool,
    /// Records newly marked stale by this write.
    pub invalidated: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    fields: BTreeMap<String, FieldEntry>,
    records: BTreeMap<String, CalculationRecord>,
    dependencies: DependencyTracker,
    revision: u64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Store a field value and mark every dependent record stale.
    ///
    /// Writing the value already stored is a no-op.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> FieldChange {
        if self
            .fields
            .get(name)
            .is_some_and(|entry| entry.value == value)
        {
            trace!(field = name, "field unchanged");
            return FieldChange::default();
        }

        self.revision += 1;
        self.fields.insert(
            name.to_string(),
            FieldEntry {
                value,
                changed_at: self.revision,
            },
        );
        let invalidated = self.on_field_changed(name);
        FieldChange {
            changed: true,
            invalidated,
        }
    }

    /// Mark every record that reads `field_name`, directly or through other
    /// formulas, as stale. Returns the records whose flag flipped.
    pub fn on_field_changed(&mut self, field_name: &str) -> BTreeSet<String> {
        let dependents = self.dependencies.dependents_of_field(field_name);
        let invalidated = self.mark_stale_all(dependents);
        if !invalidated.is_empty() {
            debug!(
                field = field_name,
                invalidated = invalidated.len(),
                "marked dependent calculations stale"
            );
        }
        invalidated
    }

    fn mark_stale_all(&mut self, names: BTreeSet<String>) -> BTreeSet<String> {
        names
            .into_iter()
            .filter(|name| self.mark_stale(name))
            .collect()
    }

    /// Returns true if the flag flipped.
    pub fn mark_stale(&mut self, name: &str) -> bool {
        match self.records.get_mut(name) {
            Some(record) if !record.is_stale => {
                record.is_stale = true;
                true
            }
            _ => false,
        }
    }

    /// Current value of `name`, or the unset sentinel.
    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).map_or(&UNSET, |entry| &entry.value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|(name, entry)| (name.as_str(), &entry.value))
    }

    /// Flat copy of every field value.
    pub fn field_values(&self) -> BTreeMap<String, FieldValue> {
        self.fields
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.clone()))
            .collect()
    }

    /// Upsert a record and clear its stale flag.
    ///
    /// When the value differs from the previous record, records that read
    /// this one are marked stale. Returns whether the value changed.
    pub fn store_calculation(
        &mut self,
        name: &str,
        value: FieldValue,
        formatted: String,
        unit: Option<String>,
    ) -> bool {
        self.revision += 1;
        let revision = self.revision;
        let changed = self
            .records
            .get(name)
            .is_none_or(|previous| previous.value != value);
        let changed_at = match self.records.get(name) {
            Some(previous) if !changed => previous.changed_at,
            _ => revision,
        };
        self.records.insert(
            name.to_string(),
            CalculationRecord {
                name: name.to_string(),
                value,
                formatted,
                unit,
                is_stale: false,
                computed_at: revision,
                changed_at,
            },
        );

        if changed {
            let mut dependents = self.dependencies.dependents_of_result(name);
            dependents.remove(name);
            let invalidated = self.mark_stale_all(dependents);
            if !invalidated.is_empty() {
                debug!(
                    calculation = name,
                    invalidated = invalidated.len(),
                    "result changed; marked readers stale"
                );
            }
        }
        changed
    }

    pub fn calculation(&self, name: &str) -> Option<&CalculationRecord> {
        self.records.get(name)
    }

    pub fn calculations(&self) -> impl Iterator<Item = &CalculationRecord> {
        self.records.values()
    }

    /// True if the record is missing, flagged stale, or older than one of
    /// its recorded inputs.
    pub fn needs_recalculation(&self, name: &str) -> bool {
        match self.records.get(name) {
            None => true,
            Some(record) => record.is_stale || self.dependency_changed_since(name, record.computed_at),
        }
    }

    /// Clear the stale flag without recomputing.
    pub fn mark_current(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.is_stale = false;
        }
    }

    /// True if any recorded input of `name` changed after `revision`, or is
    /// itself a stale record.
    pub fn dependency_changed_since(&self, name: &str, revision: u64) -> bool {
        let Some(dependencies) = self.dependencies.dependencies_of(name) else {
            return false;
        };
        dependencies.iter().any(|dep| match dep.kind {
            RefKind::Field => self
                .fields
                .get(&dep.name)
                .is_some_and(|entry| entry.changed_at > revision),
            RefKind::Calc | RefKind::Lookup => self
                .records
                .get(&dep.name)
                .is_some_and(|record| record.is_stale || record.changed_at > revision),
        })
    }

    pub fn dependencies(&self) -> &DependencyTracker {
        &self.dependencies
    }

    pub fn dependencies_mut(&mut self) -> &mut DependencyTracker {
        &mut self.dependencies
    }

    /// Drop every field, record and edge.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.records.clear();
        self.dependencies.clear();
        self.revision = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(table: &mut SessionTable, name: &str, value: f64) -> bool {
        table.store_calculation(name, FieldValue::Number(value), value.to_string(), None)
    }

    #[test]
    fn unknown_names_read_as_unset() {
        let table = SessionTable::new();
        assert!(table.field("missing").is_unset());
        assert!(table.calculation("missing").is_none());
        assert!(table.needs_recalculation("missing"));
    }

    #[test]
    fn field_write_marks_direct_and_transitive_dependents_stale() {
        let mut table = SessionTable::new();
        table.dependencies_mut().discover("demand", "[field:area] * 100");
        table.dependencies_mut().discover("cost", "[calc:demand] * 0.3");
        store(&mut table, "demand", 1.0);
        store(&mut table, "cost", 0.3);
        assert!(!table.needs_recalculation("cost"));

        let change = table.set_field("area", FieldValue::Number(120.0));
        assert!(change.changed);
        assert_eq!(
            change.invalidated.into_iter().collect::<Vec<_>>(),
            vec!["cost", "demand"]
        );
        assert!(table.calculation("demand").is_some_and(|r| r.is_stale));
        assert!(table.needs_recalculation("cost"));
    }

    #[test]
    fn rewriting_the_same_value_does_not_invalidate() {
        let mut table = SessionTable::new();
        table.dependencies_mut().discover("f", "[field:a]");
        table.set_field("a", FieldValue::Number(1.0));
        store(&mut table, "f", 1.0);

        let change = table.set_field("a", FieldValue::Number(1.0));
        assert!(!change.changed);
        assert!(!table.needs_recalculation("f"));
    }

    #[test]
    fn storing_clears_staleness_and_mark_current_closes_the_loop() {
        let mut table = SessionTable::new();
        table.dependencies_mut().discover("f", "[field:a]");
        store(&mut table, "f", 1.0);
        table.set_field("a", FieldValue::Number(2.0));
        assert!(table.needs_recalculation("f"));

        store(&mut table, "f", 2.0);
        assert!(!table.needs_recalculation("f"));

        table.mark_stale("f");
        table.mark_current("f");
        assert!(!table.needs_recalculation("f"));
    }

    #[test]
    fn changed_result_invalidates_readers_but_equal_result_does_not() {
        let mut table = SessionTable::new();
        table.dependencies_mut().discover("total", "[calc:base] + 1");
        store(&mut table, "base", 1.0);
        store(&mut table, "total", 2.0);

        assert!(!store(&mut table, "base", 1.0));
        assert!(!table.needs_recalculation("total"));

        assert!(store(&mut table, "base", 5.0));
        assert!(table.needs_recalculation("total"));
    }

    #[test]
    fn display_appends_unit() {
        let mut table = SessionTable::new();
        table.store_calculation(
            "energy",
            FieldValue::Number(122.5),
            "122,5".to_string(),
            Some("kWh".to_string()),
        );
        let record = table.calculation("energy").expect("stored");
        assert_eq!(record.display(), "122,5 kWh");
    }
}
