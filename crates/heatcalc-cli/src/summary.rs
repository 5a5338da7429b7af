use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use heatcalc_cli::script::{ReplayResult, StepOutcome};
use heatcalc_flow::{CardSnapshot, CardStatus};
use heatcalc_model::{ConfigIssue, IssueSeverity};

use crate::commands::{CheckResult, EvalResult};

pub fn print_eval(result: &EvalResult) {
    for outcome in &result.prerequisites {
        match &outcome.result {
            Some(text) if outcome.success => println!("  {} = {text}", outcome.name),
            _ => println!(
                "  {} failed: {}",
                outcome.name,
                outcome.error_message().unwrap_or_default()
            ),
        }
    }
    let outcome = &result.outcome;
    match (&outcome.result, &outcome.error) {
        (Some(text), None) => println!("{} = {text}", result.expression),
        (_, Some(error)) => {
            eprintln!("error ({}): {error}", error.category().as_str());
        }
        (None, None) => eprintln!("error: no result"),
    }
    if !outcome.dependencies.is_empty() {
        let names: Vec<String> = outcome
            .dependencies
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("Depends on: {}", names.join(", "));
    }
}

pub fn print_check(result: &CheckResult) {
    println!("Templates: {}", result.templates);
    println!(
        "Cards: {}  Formulas/lookups: {}",
        result.cards, result.formulas
    );
    let report = &result.report;
    if report.issues.is_empty() {
        println!("No configuration issues found.");
        return;
    }

    let mut issues: Vec<&ConfigIssue> = report.issues.iter().collect();
    issues.sort_by(|a, b| {
        severity_rank(b.severity)
            .cmp(&severity_rank(a.severity))
            .then_with(|| a.code.cmp(&b.code))
            .then_with(|| a.card.cmp(&b.card))
    });

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Severity"),
        header_cell("Code"),
        header_cell("Card"),
        header_cell("Subject"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table, 140);
    align_column(&mut table, 0, CellAlignment::Center);
    for issue in issues {
        table.add_row(vec![
            severity_cell(issue.severity),
            Cell::new(&issue.code),
            optional_cell(issue.card.as_deref()),
            optional_cell(issue.subject.as_deref()),
            Cell::new(&issue.message),
        ]);
    }
    println!("{table}");
    println!(
        "{} error(s), {} warning(s)",
        report.error_count(),
        report.warning_count()
    );
}

pub fn print_replay(result: &ReplayResult) {
    println!("Session: {}", result.session_id);
    println!("Elapsed: {} ms", result.snapshot.elapsed_ms);

    let mut steps = Table::new();
    steps.set_header(vec![
        header_cell("#"),
        header_cell("Step"),
        header_cell("Outcome"),
        header_cell("Events"),
    ]);
    apply_table_style(&mut steps, 140);
    align_column(&mut steps, 0, CellAlignment::Right);
    for step in &result.steps {
        let outcome = match step.outcome {
            StepOutcome::Applied => Cell::new("applied").fg(Color::Green),
            StepOutcome::Rejected => Cell::new("rejected")
                .fg(Color::Red)
                .add_attribute(Attribute::Bold),
        };
        let detail = match &step.message {
            Some(message) => message.clone(),
            None => step
                .events
                .iter()
                .map(|event| match event.card() {
                    Some(card) => format!("{} {card}", event.name()),
                    None => event.name().to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        };
        steps.add_row(vec![
            Cell::new(step.index + 1),
            Cell::new(&step.action),
            outcome,
            Cell::new(detail),
        ]);
    }
    println!("{steps}");

    let mut cards = Table::new();
    cards.set_header(vec![
        header_cell("Card"),
        header_cell("Type"),
        header_cell("Status"),
        header_cell("Revealed"),
        header_cell("Shows"),
    ]);
    apply_table_style(&mut cards, 140);
    align_column(&mut cards, 3, CellAlignment::Center);
    for card in &result.snapshot.cards {
        cards.add_row(vec![
            Cell::new(card.id.as_str())
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(card.kind.as_str()),
            status_cell(card.status),
            revealed_cell(card.is_revealed),
            Cell::new(card_display(card)),
        ]);
    }
    println!("{cards}");

    if !result.snapshot.calculations.is_empty() {
        let mut calculations = Table::new();
        calculations.set_header(vec![
            header_cell("Calculation"),
            header_cell("Result"),
            header_cell("Stale"),
        ]);
        apply_table_style(&mut calculations, 100);
        align_column(&mut calculations, 1, CellAlignment::Right);
        for record in &result.snapshot.calculations {
            calculations.add_row(vec![
                Cell::new(&record.name),
                Cell::new(record.display()),
                if record.is_stale {
                    Cell::new("yes").fg(Color::Yellow)
                } else {
                    dim_cell("no")
                },
            ]);
        }
        println!("{calculations}");
    }

    match result.submissions.len() {
        0 => println!("No submission."),
        count => println!("Submissions: {count}"),
    }
}

fn card_display(card: &CardSnapshot) -> String {
    match &card.results {
        Some(results) => results.display.join(" | "),
        None => String::new(),
    }
}

fn apply_table_style(table: &mut Table, width: u16) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(width);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn severity_rank(severity: IssueSeverity) -> u8 {
    match severity {
        IssueSeverity::Error => 2,
        IssueSeverity::Warning => 1,
    }
}

fn severity_cell(severity: IssueSeverity) -> Cell {
    match severity {
        IssueSeverity::Error => Cell::new("ERROR")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        IssueSeverity::Warning => Cell::new("WARN").fg(Color::Yellow),
    }
}

fn status_cell(status: CardStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        CardStatus::Complete => cell.fg(Color::Green),
        CardStatus::Active => cell.fg(Color::Cyan).add_attribute(Attribute::Bold),
        CardStatus::Locked => cell.fg(Color::Yellow),
        CardStatus::Unlocked => cell,
        CardStatus::Hidden => cell.fg(Color::DarkGrey),
    }
}

fn revealed_cell(revealed: bool) -> Cell {
    if revealed {
        Cell::new("✓").fg(Color::Green).add_attribute(Attribute::Bold)
    } else {
        dim_cell("-")
    }
}

fn optional_cell(value: Option<&str>) -> Cell {
    match value {
        Some(value) => Cell::new(value),
        None => dim_cell("-"),
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
