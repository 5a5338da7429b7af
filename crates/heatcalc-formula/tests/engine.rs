use std::sync::Arc;

use heatcalc_formula::{
    ErrorCategory, FormulaEngine, FormulaError, Reference, SessionTable, parse_formatted,
};
use heatcalc_model::{Catalog, FieldValue, FormulaDef, LookupDef, NumberFormat};

fn engine(catalog: Catalog) -> FormulaEngine {
    FormulaEngine::new(Arc::new(catalog), NumberFormat::default())
}

fn heating_catalog() -> Catalog {
    Catalog::new()
        .with_formula(FormulaDef::new("energy", "[field:a] + [field:b]").with_unit("kWh"))
        .and_then(|c| {
            c.with_formula(FormulaDef::new("demand", "[field:area] * [lookup:factor]").with_unit("kWh"))
        })
        .and_then(|c| {
            c.with_lookup(
                LookupDef::new("factor", "[field:building_year]")
                    .with_range_entry(None, Some(1980.0), 180.0)
                    .with_range_entry(Some(1980.0), Some(2005.0), 120.0)
                    .with_default(60.0),
            )
        })
        .and_then(|c| c.with_formula(FormulaDef::new("base", "[field:x] * 2")))
        .and_then(|c| c.with_formula(FormulaDef::new("total", "[calc:base] + 1")))
        .and_then(|c| c.with_formula(FormulaDef::new("share", "100 / [field:d]").with_decimals(1)))
        .expect("catalog builds")
}

#[test]
fn scenario_a_sums_fields_and_formats_with_unit() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("a", FieldValue::Number(120.0));
    table.set_field("b", FieldValue::Number(2.5));

    let outcome = engine.process(&mut table, "[calc:energy]");

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.result.as_deref(), Some("122,5 kWh"));
    assert_eq!(outcome.unit.as_deref(), Some("kWh"));
    assert_eq!(
        outcome.dependencies,
        vec![Reference::field("a"), Reference::field("b")]
    );
    let record = table.calculation("energy").expect("record stored");
    assert_eq!(record.value, FieldValue::Number(122.5));
    assert!(!record.is_stale);
}

#[test]
fn very_large_results_format_as_numbers() {
    let catalog = Catalog::new()
        .with_formula(FormulaDef::new("big", "[field:a] * 10").with_unit("kWh"))
        .expect("catalog builds");
    let mut engine = engine(catalog);
    let mut table = SessionTable::new();
    table.set_field("a", FieldValue::Number(1.0e306));

    let outcome = engine.process(&mut table, "[calc:big]");

    assert!(outcome.success, "{:?}", outcome.error);
    let text = outcome.result.expect("formatted result");
    assert!(!text.contains("inf"), "{text}");
    assert!(text.ends_with(" kWh"));
    assert_eq!(
        parse_formatted(&text, &NumberFormat::default()),
        Some(1.0e306 * 10.0)
    );
}

#[test]
fn processing_twice_answers_from_cache() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("a", FieldValue::Number(1.0));
    table.set_field("b", FieldValue::Number(2.0));

    let first = engine.process(&mut table, "[calc:energy]");
    let second = engine.process(&mut table, "[calc:energy]");

    assert_eq!(first.result, second.result);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(engine.stats().evaluations, 1);
    assert_eq!(engine.stats().cache_hits, 1);
}

#[test]
fn scenario_d_missing_calc_record_is_a_resolution_error() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("x", FieldValue::Number(3.0));

    let outcome = engine.process(&mut table, "[calc:total]");

    assert!(!outcome.success);
    let error = outcome.error.expect("error reported");
    assert_eq!(error.category(), ErrorCategory::Resolution);
    assert_eq!(
        error,
        FormulaError::Unresolved {
            references: vec![Reference::calc("base")]
        }
    );
    assert!(table.calculation("total").is_none());
    assert_eq!(engine.stats().evaluations, 0);
}

#[test]
fn scenario_e_field_change_forces_recompute() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("a", FieldValue::Number(1.0));
    table.set_field("b", FieldValue::Number(1.0));
    assert_eq!(
        engine.process(&mut table, "[calc:energy]").result.as_deref(),
        Some("2 kWh")
    );

    let change = table.set_field("a", FieldValue::Number(10.0));
    assert!(change.invalidated.contains("energy"));
    assert!(table.calculation("energy").is_some_and(|r| r.is_stale));

    let outcome = engine.process(&mut table, "[calc:energy]");
    assert!(!outcome.cached);
    assert_eq!(outcome.result.as_deref(), Some("11 kWh"));
    assert!(!table.needs_recalculation("energy"));
    assert_eq!(engine.stats().evaluations, 2);
}

#[test]
fn stale_nested_results_are_refreshed_before_use() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("x", FieldValue::Number(2.0));
    assert!(engine.process(&mut table, "[calc:base]").success);
    assert_eq!(
        engine.process(&mut table, "[calc:total]").value,
        Some(FieldValue::Number(5.0))
    );

    table.set_field("x", FieldValue::Number(5.0));
    let outcome = engine.process(&mut table, "[calc:total]");

    assert_eq!(outcome.value, Some(FieldValue::Number(11.0)));
    assert_eq!(
        table.calculation("base").map(|r| r.value.clone()),
        Some(FieldValue::Number(10.0))
    );
}

#[test]
fn lookups_feed_formulas_and_go_stale_with_their_key() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("building_year", FieldValue::from("1975"));
    table.set_field("area", FieldValue::Number(100.0));

    let factor = engine.process(&mut table, "[lookup:factor]");
    assert_eq!(factor.result.as_deref(), Some("180"));
    let demand = engine.process(&mut table, "[calc:demand]");
    assert_eq!(demand.result.as_deref(), Some("18.000 kWh"));

    table.set_field("building_year", FieldValue::from("1990"));
    assert!(table.needs_recalculation("demand"));
    let demand = engine.process(&mut table, "[calc:demand]");
    assert_eq!(demand.result.as_deref(), Some("12.000 kWh"));
    assert_eq!(engine.stats().lookups, 2);
}

#[test]
fn failed_evaluation_keeps_previous_record() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("d", FieldValue::Number(3.0));
    assert_eq!(
        engine.process(&mut table, "[calc:share]").result.as_deref(),
        Some("33,3")
    );

    table.set_field("d", FieldValue::Number(0.0));
    let outcome = engine.process(&mut table, "[calc:share]");

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_ref().map(FormulaError::category),
        Some(ErrorCategory::Evaluation)
    );
    assert!(
        outcome
            .error_message()
            .is_some_and(|message| message.contains("division by zero"))
    );
    let record = table.calculation("share").expect("previous record kept");
    assert_eq!(record.formatted, "33,3");
    assert!(record.is_stale);
}

#[test]
fn mutual_references_are_reported_as_a_cycle() {
    let catalog = Catalog::new()
        .with_formula(FormulaDef::new("left", "[calc:right] + 1"))
        .and_then(|c| c.with_formula(FormulaDef::new("right", "[calc:left] + 1")))
        .expect("catalog builds");
    let mut engine = engine(catalog);
    let mut table = SessionTable::new();

    let left = engine.process(&mut table, "[calc:left]");
    assert!(!left.success);
    let right = engine.process(&mut table, "[calc:right]");
    assert_eq!(
        right.error,
        Some(FormulaError::Cycle {
            name: "right".to_string()
        })
    );
}

#[test]
fn free_templates_are_evaluated_without_storing() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("price", FieldValue::from("0,30"));

    let outcome = engine.process(&mut table, "round([field:price] * 1000, 0)");

    assert!(outcome.success);
    assert_eq!(outcome.result.as_deref(), Some("300"));
    assert_eq!(table.calculations().count(), 0);
}

#[test]
fn render_substitutes_display_values() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("a", FieldValue::Number(1200.0));
    table.set_field("b", FieldValue::Number(34.5));
    table.set_field("name", FieldValue::from("Ada"));
    engine.process(&mut table, "[calc:energy]");

    let rendered = engine.render(
        &mut table,
        "[field:name], you need [calc:energy] ([calc:missing]).",
    );

    assert_eq!(
        rendered.text,
        "Ada, you need 1.234,5 kWh ([unresolved calc:missing])."
    );
    assert_eq!(rendered.unresolved, vec![Reference::calc("missing")]);
}

#[test]
fn recalculate_stale_refreshes_only_stale_records() {
    let mut engine = engine(heating_catalog());
    let mut table = SessionTable::new();
    table.set_field("a", FieldValue::Number(1.0));
    table.set_field("b", FieldValue::Number(1.0));
    table.set_field("x", FieldValue::Number(1.0));
    engine.process(&mut table, "[calc:energy]");
    engine.process(&mut table, "[calc:base]");
    engine.process(&mut table, "[calc:total]");

    table.set_field("x", FieldValue::Number(4.0));
    let outcomes = engine.recalculate_stale(&mut table);

    let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["base", "total"]);
    assert!(outcomes.iter().all(|o| o.success));
    assert_eq!(
        table.calculation("total").map(|r| r.value.clone()),
        Some(FieldValue::Number(9.0))
    );
}
