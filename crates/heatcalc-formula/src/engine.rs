//! Formula and lookup processing.
//!
//! `process` detects what a template refers to, discovers its dependency
//! edges, answers from the session table when the record is current and
//! otherwise substitutes, evaluates, formats and stores. Failures never touch
//! the previously stored record.

use std::collections::BTreeSet;
use std::sync::Arc;

use heatcalc_model::{Catalog, FieldValue, FormulaDef, LookupDef, NumberFormat};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::FormulaError;
use crate::eval::{Value, evaluate};
use crate::format::{format_number, format_with_unit};
use crate::shortcode::{
    RefKind, Reference, SubstitutionMode, references, resolve, single_reference,
};
use crate::table::SessionTable;

/// What a template passed to [`FormulaEngine::process`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Calc(String),
    Lookup(String),
    /// Free text with embedded tokens, evaluated without caching.
    Template(String),
}

impl Target {
    pub fn parse(template: &str) -> Self {
        match single_reference(template) {
            Some(Reference {
                kind: RefKind::Calc,
                name,
            }) => Target::Calc(name),
            Some(Reference {
                kind: RefKind::Lookup,
                name,
            }) => Target::Lookup(name),
            _ => Target::Template(template.trim().to_string()),
        }
    }
}

/// Call counters, mainly for verifying memoisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Calls into the expression evaluator.
    pub evaluations: u64,
    /// Lookup table searches.
    pub lookups: u64,
    /// Requests answered from a current record.
    pub cache_hits: u64,
}

/// Structured result of one `process` call. Never a panic, never a bare error.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub success: bool,
    /// Formula or lookup name; the trimmed template text for free templates.
    pub name: String,
    /// Formatted result with unit, e.g. `122,5 kWh`.
    pub result: Option<String>,
    pub value: Option<FieldValue>,
    pub unit: Option<String>,
    pub dependencies: Vec<Reference>,
    pub error: Option<FormulaError>,
    /// True when the result came from a current record.
    pub cached: bool,
}

impl ProcessOutcome {
    fn succeeded(
        name: &str,
        value: FieldValue,
        formatted: &str,
        unit: Option<String>,
        dependencies: Vec<Reference>,
        cached: bool,
    ) -> Self {
        Self {
            success: true,
            name: name.to_string(),
            result: Some(format_with_unit(formatted, unit.as_deref())),
            value: Some(value),
            unit,
            dependencies,
            error: None,
            cached,
        }
    }

    fn failed(name: &str, dependencies: Vec<Reference>, error: FormulaError) -> Self {
        Self {
            success: false,
            name: name.to_string(),
            result: None,
            value: None,
            unit: None,
            dependencies,
            error: Some(error),
            cached: false,
        }
    }

    /// Human-readable error for inline display.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Display text produced by [`FormulaEngine::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub text: String,
    pub references: Vec<Reference>,
    pub unresolved: Vec<Reference>,
}

enum Definition<'a> {
    Formula(&'a FormulaDef),
    Lookup(&'a LookupDef),
}

impl Definition<'_> {
    fn source_text(&self) -> &str {
        match self {
            Definition::Formula(formula) => &formula.formula,
            Definition::Lookup(lookup) => &lookup.key,
        }
    }

    fn unit(&self) -> Option<String> {
        match self {
            Definition::Formula(formula) => formula.unit.clone(),
            Definition::Lookup(lookup) => lookup.unit.clone(),
        }
    }

    fn decimals(&self) -> Option<u32> {
        match self {
            Definition::Formula(formula) => formula.decimals,
            Definition::Lookup(lookup) => lookup.decimals,
        }
    }
}

struct Computed {
    value: FieldValue,
    formatted: String,
    unit: Option<String>,
    cached: bool,
}

#[derive(Debug)]
pub struct FormulaEngine {
    catalog: Arc<Catalog>,
    number_format: NumberFormat,
    stats: EngineStats,
}

impl FormulaEngine {
    pub fn new(catalog: Arc<Catalog>, number_format: NumberFormat) -> Self {
        Self {
            catalog,
            number_format,
            stats: EngineStats::default(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn number_format(&self) -> &NumberFormat {
        &self.number_format
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Process a `[calc:x]`, `[lookup:x]` or free template.
    pub fn process(&mut self, table: &mut SessionTable, template: &str) -> ProcessOutcome {
        match Target::parse(template) {
            Target::Calc(name) | Target::Lookup(name) => self.process_named(table, &name),
            Target::Template(text) => self.process_template(table, &text),
        }
    }

    /// Process the formula or lookup called `name`.
    pub fn process_named(&mut self, table: &mut SessionTable, name: &str) -> ProcessOutcome {
        let mut visiting = BTreeSet::new();
        let result = self.compute(table, name, &mut visiting);
        let dependencies = table
            .dependencies()
            .dependencies_of(name)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default();
        match result {
            Ok(computed) => ProcessOutcome::succeeded(
                name,
                computed.value,
                &computed.formatted,
                computed.unit,
                dependencies,
                computed.cached,
            ),
            Err(error) => {
                debug!(formula = name, category = error.category().as_str(), %error, "formula failed");
                ProcessOutcome::failed(name, dependencies, error)
            }
        }
    }

    /// Recompute every stored record that is stale. Returns one outcome per
    /// record touched.
    pub fn recalculate_stale(&mut self, table: &mut SessionTable) -> Vec<ProcessOutcome> {
        let stale: Vec<String> = table
            .calculations()
            .filter(|record| record.is_stale)
            .map(|record| record.name.clone())
            .collect();
        let mut outcomes = Vec::with_capacity(stale.len());
        for name in stale {
            // An earlier iteration may already have refreshed this one.
            if table.needs_recalculation(&name) {
                outcomes.push(self.process_named(table, &name));
            }
        }
        outcomes
    }

    /// Substitute tokens for display. Stale referenced records are refreshed
    /// first; a failed refresh leaves the previous value on screen.
    pub fn render(&mut self, table: &mut SessionTable, template: &str) -> RenderOutcome {
        let mut visiting = BTreeSet::new();
        for reference in references(template) {
            if let Err(error) = self.refresh(table, &reference, &mut visiting) {
                debug!(%reference, %error, "keeping previous value for display");
            }
        }
        let resolution = resolve(template, table, SubstitutionMode::Display, &self.number_format);
        RenderOutcome {
            text: resolution.text,
            references: resolution.references,
            unresolved: resolution.unresolved,
        }
    }

    fn process_template(&mut self, table: &mut SessionTable, text: &str) -> ProcessOutcome {
        let mut visiting = BTreeSet::new();
        let dependencies = references(text);
        let result = self
            .refresh_all(table, &dependencies, &mut visiting)
            .and_then(|()| self.evaluate_text(table, text, text));
        match result {
            Ok((value, formatted)) => {
                ProcessOutcome::succeeded(text, value, &formatted, None, dependencies, false)
            }
            Err(error) => ProcessOutcome::failed(text, dependencies, error),
        }
    }

    fn definition<'a>(catalog: &'a Catalog, name: &str) -> Result<Definition<'a>, FormulaError> {
        if let Some(formula) = catalog.formula(name) {
            return Ok(Definition::Formula(formula));
        }
        if let Some(lookup) = catalog.lookup(name) {
            return Ok(Definition::Lookup(lookup));
        }
        Err(FormulaError::UnknownCalculation {
            kind: "calculation",
            name: name.to_string(),
        })
    }

    fn compute(
        &mut self,
        table: &mut SessionTable,
        name: &str,
        visiting: &mut BTreeSet<String>,
    ) -> Result<Computed, FormulaError> {
        let catalog = Arc::clone(&self.catalog);
        let definition = Self::definition(&catalog, name)?;

        if !visiting.insert(name.to_string()) {
            return Err(FormulaError::Cycle {
                name: name.to_string(),
            });
        }
        let result = self.compute_definition(table, name, &definition, visiting);
        visiting.remove(name);
        result
    }

    fn compute_definition(
        &mut self,
        table: &mut SessionTable,
        name: &str,
        definition: &Definition<'_>,
        visiting: &mut BTreeSet<String>,
    ) -> Result<Computed, FormulaError> {
        let dependencies: Vec<Reference> = table
            .dependencies_mut()
            .discover(name, definition.source_text())
            .into_iter()
            .collect();
        if table.dependencies().depends_on_itself(name) {
            return Err(FormulaError::Cycle {
                name: name.to_string(),
            });
        }

        if !table.needs_recalculation(name)
            && let Some(record) = table.calculation(name)
        {
            self.stats.cache_hits += 1;
            trace!(formula = name, "cache hit");
            return Ok(Computed {
                value: record.value.clone(),
                formatted: record.formatted.clone(),
                unit: record.unit.clone(),
                cached: true,
            });
        }

        self.refresh_all(table, &dependencies, visiting)?;

        let (value, formatted) = match definition {
            Definition::Formula(formula) => {
                let (value, formatted) = self.evaluate_text(table, name, &formula.formula)?;
                let formatted = match (&value, definition.decimals()) {
                    (FieldValue::Number(number), Some(decimals)) => {
                        format_number(*number, decimals, &self.number_format)
                    }
                    _ => formatted,
                };
                (value, formatted)
            }
            Definition::Lookup(lookup) => self.find_lookup(table, lookup)?,
        };

        let unit = definition.unit();
        let changed = table.store_calculation(name, value.clone(), formatted.clone(), unit.clone());
        table.mark_current(name);
        debug!(formula = name, changed, "stored calculation");
        Ok(Computed {
            value,
            formatted,
            unit,
            cached: false,
        })
    }

    /// Bring every stale result reference up to date. References without a
    /// record are left for the resolver to report.
    fn refresh_all(
        &mut self,
        table: &mut SessionTable,
        dependencies: &[Reference],
        visiting: &mut BTreeSet<String>,
    ) -> Result<(), FormulaError> {
        for reference in dependencies {
            self.refresh(table, reference, visiting)?;
        }
        Ok(())
    }

    fn refresh(
        &mut self,
        table: &mut SessionTable,
        reference: &Reference,
        visiting: &mut BTreeSet<String>,
    ) -> Result<(), FormulaError> {
        if !reference.kind.is_result()
            || table.calculation(&reference.name).is_none()
            || !table.needs_recalculation(&reference.name)
        {
            return Ok(());
        }
        self.compute(table, &reference.name, visiting)
            .map(|_| ())
            .map_err(|source| match source {
                FormulaError::Cycle { .. } => source,
                other => FormulaError::DependencyFailed {
                    name: reference.name.clone(),
                    source: Box::new(other),
                },
            })
    }

    fn evaluate_text(
        &mut self,
        table: &SessionTable,
        name: &str,
        text: &str,
    ) -> Result<(FieldValue, String), FormulaError> {
        let resolution = resolve(text, table, SubstitutionMode::Expression, &self.number_format);
        if !resolution.is_complete() {
            return Err(FormulaError::Unresolved {
                references: resolution.unresolved,
            });
        }
        self.stats.evaluations += 1;
        let value = evaluate(&resolution.text).map_err(|source| FormulaError::Evaluation {
            name: name.to_string(),
            source,
        })?;
        let formatted = match &value {
            Value::Number(number) => format_number(
                *number,
                self.number_format.default_decimals,
                &self.number_format,
            ),
            Value::Text(text) => text.clone(),
        };
        Ok((value.into(), formatted))
    }

    fn find_lookup(
        &mut self,
        table: &SessionTable,
        lookup: &LookupDef,
    ) -> Result<(FieldValue, String), FormulaError> {
        let key = match single_reference(&lookup.key) {
            Some(reference) if reference.kind == RefKind::Field => {
                table.field(&reference.name).clone()
            }
            Some(reference) => match table.calculation(&reference.name) {
                Some(record) => record.value.clone(),
                None => {
                    return Err(FormulaError::Unresolved {
                        references: vec![reference],
                    });
                }
            },
            None => {
                let resolution = resolve(
                    &lookup.key,
                    table,
                    SubstitutionMode::Display,
                    &self.number_format,
                );
                if !resolution.is_complete() {
                    return Err(FormulaError::Unresolved {
                        references: resolution.unresolved,
                    });
                }
                FieldValue::Text(resolution.text.trim().to_string())
            }
        };

        self.stats.lookups += 1;
        let value = lookup
            .find(&key)
            .cloned()
            .ok_or_else(|| FormulaError::LookupMiss {
                name: lookup.name.clone(),
                key: key.as_text(),
            })?;
        let decimals = lookup
            .decimals
            .unwrap_or(self.number_format.default_decimals);
        let formatted = match &value {
            FieldValue::Number(number) => format_number(*number, decimals, &self.number_format),
            other => other.as_text(),
        };
        Ok((value, formatted))
    }
}
