use std::fs;
use std::path::{Path, PathBuf};

use heatcalc_model::{CardKind, FieldValue, IssueSeverity, LookupMatch, RevealTiming};
use heatcalc_templates::{TemplateError, check_templates, load_templates, parse_json};

fn unique_temp_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "heatcalc-{}-{}-{}",
        name,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    dir
}

fn write(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

const FLAWED: &str = r#"{
  "cards": [
    {"id": "result", "type": "calculation", "display_order": 2,
     "calculations": ["[calc:demand]", "[calc:ghost]"],
     "reveal_conditions": [{"type": "card_complete", "target": "nowhere"}]},
    {"id": "intro", "type": "info", "display_order": 0, "content": "Hi"},
    {"id": "house", "type": "form", "display_order": 1,
     "card_fields": [
       {"field_name": "area", "field_type": "number", "required": true,
        "validation_rules": {"min": 10, "max": 5}},
       {"field_name": "heating", "field_type": "select"}
     ],
     "reveal_timing": {"timing": "after_delay"}}
  ],
  "formulas": [
    {"name": "demand", "formula": "[field:area] * [lookup:factor]", "unit": "kWh"},
    {"name": "loop", "formula": "[calc:loop] + 1"}
  ],
  "lookups": [
    {"name": "factor", "key": "[field:year]", "default": 1}
  ]
}"#;

#[test]
fn check_report_lists_every_gap() {
    let set = parse_json(FLAWED).expect("templates parse");
    let report = check_templates(&set);

    let lines: Vec<String> = report
        .issues
        .iter()
        .map(|issue| {
            format!(
                "{} {} {}/{}",
                issue.code,
                match issue.severity {
                    IssueSeverity::Error => "E",
                    IssueSeverity::Warning => "W",
                },
                issue.card.as_deref().unwrap_or("-"),
                issue.subject.as_deref().unwrap_or("-"),
            )
        })
        .collect();

    insta::assert_json_snapshot!(lines, @r#"
    [
      "TPL002 W house/-",
      "CARD001 W house/-",
      "FIELD003 E house/area",
      "FIELD001 W house/heating",
      "CARD002 W result/-",
      "CARD005 E result/nowhere",
      "CALC001 E result/ghost",
      "CALC006 W -/factor",
      "CALC002 E -/loop"
    ]
    "#);
    assert_eq!(report.error_count(), 4);
    assert_eq!(report.warning_count(), 5);
    assert!(report.has_errors());
}

#[test]
fn missing_completion_message_names_the_fallback() {
    let set = parse_json(FLAWED).expect("templates parse");
    let report = check_templates(&set);
    let card001 = report
        .issues
        .iter()
        .find(|issue| issue.code == "CARD001")
        .expect("CARD001 reported");
    assert_eq!(
        card001.message,
        "form card has no completion rule; falling back to required_fields"
    );
}

#[test]
fn clean_templates_have_no_issues() {
    let set = parse_json(
        r#"{
          "cards": [
            {"id": "house", "type": "form", "display_order": 0,
             "card_fields": [{"field_name": "area", "field_type": "number", "required": true}],
             "completion_rules": {"form_completion": {"type": "required_fields"}}},
            {"id": "result", "type": "calculation", "display_order": 1,
             "calculations": ["[calc:demand]"],
             "display": ["You need [calc:demand]."],
             "reveal_timing": {"timing": "immediately"}}
          ],
          "formulas": [{"name": "demand", "formula": "[field:area] * 100", "unit": "kWh"}]
        }"#,
    )
    .expect("templates parse");

    let report = check_templates(&set);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
}

#[test]
fn loads_toml_templates_with_csv_lookup_from_disk() {
    let dir = unique_temp_dir("templates");
    write(
        &dir.join("tables/factors.csv"),
        b"min,max,value\n,1980,180\n1980,2005,120\n2005,,60\n",
    );
    write(
        &dir.join("cards.toml"),
        br#"
[[cards]]
id = "house"
type = "form"
display_order = 0

[[cards.card_fields]]
field_name = "year"
field_type = "number"
required = true

[cards.completion_rules.form_completion]
type = "all_fields"

[[cards]]
id = "thanks"
type = "info"
display_order = 1
content = "Thanks!"

[cards.reveal_timing]
timing = "after_delay"
delay_seconds = 2

[[lookups]]
name = "factor"
key = "[field:year]"
csv = "tables/factors.csv"
unit = "kWh/m2"
"#,
    );

    let set = load_templates(&dir.join("cards.toml")).expect("templates load");

    assert_eq!(set.cards.len(), 2);
    assert_eq!(set.cards[1].kind(), CardKind::Info);
    assert_eq!(
        set.cards[1].reveal_timing,
        Some(RevealTiming::AfterDelay { delay_ms: 2000 })
    );
    let factor = set.catalog.lookup("factor").expect("lookup loaded");
    assert_eq!(factor.entries.len(), 3);
    assert_eq!(
        factor.entries[1].matcher,
        LookupMatch::Range {
            min: Some(1980.0),
            max: Some(2005.0)
        }
    );
    assert_eq!(
        factor.find(&FieldValue::Number(1990.0)),
        Some(&FieldValue::Number(120.0))
    );

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_csv_is_an_io_error() {
    let dir = unique_temp_dir("missing-csv");
    write(
        &dir.join("cards.json"),
        br#"{"lookups": [{"name": "price", "key": "[field:fuel]", "csv": "nope.csv"}]}"#,
    );

    let err = load_templates(&dir.join("cards.json")).unwrap_err();
    assert!(matches!(err, TemplateError::Io { path, .. } if path.ends_with("nope.csv")));

    fs::remove_dir_all(&dir).ok();
}
