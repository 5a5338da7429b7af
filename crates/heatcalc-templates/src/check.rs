//! Configuration checks run before a template set goes live.
//!
//! A session never refuses to start because of these; the fallbacks in the
//! flow crate keep progression going. The report is for operators.

use std::collections::{BTreeMap, BTreeSet};

use heatcalc_formula::{DependencyTracker, RefKind, references, single_reference};
use heatcalc_model::{
    CardConfig, CardField, CardTemplate, Catalog, CheckReport, ConfigIssue, FieldType,
    IssueSeverity, RevealCondition,
};
use regex::Regex;
use tracing::debug;

use crate::loader::TemplateSet;

pub fn check_templates(set: &TemplateSet) -> CheckReport {
    let mut report = CheckReport::default();
    for issue in &set.load_issues {
        report.push(issue.clone());
    }

    if set.cards.is_empty() {
        report.push(ConfigIssue::new(
            "CARD000",
            IssueSeverity::Error,
            "template set has no cards",
        ));
    }

    check_card_identity(&set.cards, &mut report);

    let known_cards: BTreeSet<&str> = set.cards.iter().map(|card| card.id.as_str()).collect();
    let owners = field_owners(&set.cards, &mut report);
    for (index, card) in set.cards.iter().enumerate() {
        check_card(index, card, &known_cards, &owners, &set.catalog, &mut report);
    }
    check_catalog(&set.catalog, &owners, &mut report);

    debug!(
        errors = report.error_count(),
        warnings = report.warning_count(),
        "checked templates"
    );
    report
}

fn check_card_identity(cards: &[CardTemplate], report: &mut CheckReport) {
    let mut ids = BTreeSet::new();
    let mut orders: BTreeMap<u32, &str> = BTreeMap::new();
    for card in cards {
        if !ids.insert(card.id.as_str()) {
            report.push(
                ConfigIssue::new("CARD003", IssueSeverity::Error, "duplicate card id")
                    .for_card(card.id.as_str()),
            );
        }
        if let Some(first) = orders.insert(card.display_order, card.id.as_str()) {
            report.push(
                ConfigIssue::new(
                    "CARD004",
                    IssueSeverity::Warning,
                    format!(
                        "display_order {} is shared with card '{first}'",
                        card.display_order
                    ),
                )
                .for_card(card.id.as_str()),
            );
        }
    }
}

/// Field name to owning card id. Fields claimed by several cards are
/// reported and keep their first owner.
fn field_owners<'a>(
    cards: &'a [CardTemplate],
    report: &mut CheckReport,
) -> BTreeMap<&'a str, &'a str> {
    let mut owners = BTreeMap::new();
    for card in cards {
        for field in card.fields() {
            if let Some(owner) = owners.get(field.field_name.as_str()) {
                report.push(
                    ConfigIssue::new(
                        "FIELD004",
                        IssueSeverity::Warning,
                        format!("field is already owned by card '{owner}'"),
                    )
                    .for_card(card.id.as_str())
                    .about(&field.field_name),
                );
                continue;
            }
            owners.insert(field.field_name.as_str(), card.id.as_str());
        }
    }
    owners
}

fn check_card(
    index: usize,
    card: &CardTemplate,
    known_cards: &BTreeSet<&str>,
    owners: &BTreeMap<&str, &str>,
    catalog: &Catalog,
    report: &mut CheckReport,
) {
    let id = card.id.as_str();

    if let CardConfig::Form { completion: None, .. } = &card.config {
        let fallback = if card.has_required_fields() {
            "required_fields"
        } else {
            "any_field"
        };
        report.push(
            ConfigIssue::new(
                "CARD001",
                IssueSeverity::Warning,
                format!("form card has no completion rule; falling back to {fallback}"),
            )
            .for_card(id),
        );
    }

    if index > 0 && card.reveal_timing.is_none() {
        report.push(
            ConfigIssue::new(
                "CARD002",
                IssueSeverity::Warning,
                "card has no reveal_timing; it will be revealed immediately",
            )
            .for_card(id),
        );
    }

    for condition in &card.reveal_conditions {
        match condition {
            RevealCondition::CardComplete { card: target }
            | RevealCondition::FieldsComplete { card: target } => {
                if target == &card.id {
                    report.push(
                        ConfigIssue::new(
                            "CARD007",
                            IssueSeverity::Error,
                            "reveal condition waits on the card itself",
                        )
                        .for_card(id),
                    );
                } else if !known_cards.contains(target.as_str()) {
                    report.push(
                        ConfigIssue::new(
                            "CARD005",
                            IssueSeverity::Error,
                            "reveal condition targets an unknown card",
                        )
                        .for_card(id)
                        .about(target.as_str()),
                    );
                }
            }
            RevealCondition::ValueCheck { field, .. } => {
                if !owners.contains_key(field.as_str()) {
                    report.push(
                        ConfigIssue::new(
                            "CARD006",
                            IssueSeverity::Warning,
                            "value check reads a field no card collects",
                        )
                        .for_card(id)
                        .about(field),
                    );
                }
            }
            RevealCondition::Always => {}
        }
    }

    for field in card.fields() {
        if field.field_type.has_options() && field.options.is_empty() {
            report.push(
                ConfigIssue::new(
                    "FIELD001",
                    IssueSeverity::Warning,
                    format!("{} field has no options", field_type_name(field)),
                )
                .for_card(id)
                .about(&field.field_name),
            );
        }
        if let Some(pattern) = &field.validation.pattern
            && let Err(err) = Regex::new(pattern)
        {
            report.push(
                ConfigIssue::new(
                    "FIELD002",
                    IssueSeverity::Error,
                    format!("invalid validation pattern: {err}"),
                )
                .for_card(id)
                .about(&field.field_name),
            );
        }
        if let (Some(min), Some(max)) = (field.validation.min, field.validation.max)
            && min > max
        {
            report.push(
                ConfigIssue::new(
                    "FIELD003",
                    IssueSeverity::Error,
                    format!("validation min {min} is greater than max {max}"),
                )
                .for_card(id)
                .about(&field.field_name),
            );
        }
    }

    if let CardConfig::Calculation {
        calculations,
        display,
    } = &card.config
    {
        for entry in calculations {
            match single_reference(entry) {
                Some(reference) if reference.kind.is_result() => {
                    if !catalog.contains(&reference.name) {
                        report.push(
                            ConfigIssue::new(
                                "CALC001",
                                IssueSeverity::Error,
                                format!("calculation {reference} is not defined"),
                            )
                            .for_card(id)
                            .about(&reference.name),
                        );
                    }
                }
                _ => report.push(
                    ConfigIssue::new(
                        "CALC004",
                        IssueSeverity::Warning,
                        format!("'{entry}' is not a [calc:x] or [lookup:x] shortcode"),
                    )
                    .for_card(id),
                ),
            }
        }
        for template in display {
            for reference in references(template) {
                if reference.kind.is_result() && !catalog.contains(&reference.name) {
                    report.push(
                        ConfigIssue::new(
                            "CALC005",
                            IssueSeverity::Warning,
                            format!("display text references undefined {reference}"),
                        )
                        .for_card(id)
                        .about(&reference.name),
                    );
                }
            }
        }
    }
}

fn field_type_name(field: &CardField) -> &'static str {
    if field.field_type == FieldType::Radio {
        "radio"
    } else {
        "select"
    }
}

fn check_catalog(catalog: &Catalog, owners: &BTreeMap<&str, &str>, report: &mut CheckReport) {
    let mut tracker = DependencyTracker::new();
    let sources = catalog
        .formulas()
        .map(|formula| (formula.name.as_str(), formula.formula.as_str()))
        .chain(
            catalog
                .lookups()
                .map(|lookup| (lookup.name.as_str(), lookup.key.as_str())),
        );

    for (name, text) in sources {
        for reference in tracker.discover(name, text) {
            let known = match reference.kind {
                RefKind::Field => owners.contains_key(reference.name.as_str()),
                RefKind::Calc | RefKind::Lookup => catalog.contains(&reference.name),
            };
            if known {
                continue;
            }
            let issue = if reference.kind == RefKind::Field {
                ConfigIssue::new(
                    "CALC006",
                    IssueSeverity::Warning,
                    format!("'{name}' reads {reference}, which no card collects"),
                )
            } else {
                ConfigIssue::new(
                    "CALC003",
                    IssueSeverity::Error,
                    format!("'{name}' references undefined {reference}"),
                )
            };
            report.push(issue.about(name));
        }
    }

    let names: Vec<String> = tracker.formulas().map(str::to_string).collect();
    for name in names {
        if tracker.depends_on_itself(&name) {
            report.push(
                ConfigIssue::new(
                    "CALC002",
                    IssueSeverity::Error,
                    "formula depends on itself",
                )
                .about(name),
            );
        }
    }
}
