use std::sync::Arc;

use anyhow::{Context, Result, bail};
use heatcalc_cli::script::{ReplayResult, derive_session_id, load_script, replay};
use heatcalc_formula::{FormulaEngine, ProcessOutcome, SessionTable, Target, references};
use heatcalc_model::{Catalog, CheckReport, FormulaDef, SessionId, WidgetConfig};
use heatcalc_templates::{check_templates, load_templates, load_widget_config};
use tracing::{debug, info, info_span};

use crate::cli::{CheckArgs, EvalArgs, RunArgs};

/// Name of the ad-hoc formula built from the command-line expression.
const EVAL_FORMULA: &str = "eval";

pub struct EvalResult {
    pub expression: String,
    /// Formulas and lookups the expression references, processed first.
    pub prerequisites: Vec<ProcessOutcome>,
    pub outcome: ProcessOutcome,
}

pub fn run_eval(args: &EvalArgs) -> Result<EvalResult> {
    let mut catalog = match &args.templates {
        Some(path) => load_templates(path)
            .with_context(|| format!("load templates {}", path.display()))?
            .catalog,
        None => Catalog::new(),
    };
    let config = WidgetConfig::default();

    let named = !matches!(Target::parse(&args.formula), Target::Template(_));
    if !named {
        let mut formula = FormulaDef::new(EVAL_FORMULA, args.formula.as_str());
        if let Some(unit) = &args.unit {
            formula = formula.with_unit(unit.as_str());
        }
        if let Some(decimals) = args.decimals {
            formula = formula.with_decimals(decimals);
        }
        catalog
            .add_formula(formula)
            .context("register command-line formula")?;
    }

    let mut engine = FormulaEngine::new(Arc::new(catalog), config.number_format);
    let mut table = SessionTable::new();
    for (name, value) in &args.fields {
        table.set_field(name, value.clone());
    }

    let mut prerequisites = Vec::new();
    if !named {
        for reference in references(&args.formula)
            .into_iter()
            .filter(|reference| reference.kind.is_result())
        {
            debug!(reference = %reference, "processing referenced result");
            prerequisites.push(engine.process_named(&mut table, &reference.name));
        }
    }

    let outcome = if named {
        engine.process(&mut table, &args.formula)
    } else {
        engine.process_named(&mut table, EVAL_FORMULA)
    };
    info!(
        success = outcome.success,
        evaluations = engine.stats().evaluations,
        "formula evaluated"
    );
    Ok(EvalResult {
        expression: args.formula.clone(),
        prerequisites,
        outcome,
    })
}

pub struct CheckResult {
    pub templates: String,
    pub cards: usize,
    pub formulas: usize,
    pub report: CheckReport,
}

pub fn run_check(args: &CheckArgs) -> Result<CheckResult> {
    let span = info_span!("check", templates = %args.templates.display());
    let _guard = span.enter();

    let set = load_templates(&args.templates)
        .with_context(|| format!("load templates {}", args.templates.display()))?;
    if let Some(path) = &args.config {
        load_widget_config(path).with_context(|| format!("load config {}", path.display()))?;
    }

    let report = check_templates(&set);
    info!(
        cards = set.cards.len(),
        errors = report.error_count(),
        warnings = report.warning_count(),
        "templates checked"
    );
    Ok(CheckResult {
        templates: args.templates.display().to_string(),
        cards: set.cards.len(),
        formulas: set.catalog.len(),
        report,
    })
}

pub fn run_replay(args: &RunArgs) -> Result<ReplayResult> {
    let set = load_templates(&args.templates)
        .with_context(|| format!("load templates {}", args.templates.display()))?;
    let config = match &args.config {
        Some(path) => {
            load_widget_config(path).with_context(|| format!("load config {}", path.display()))?
        }
        None => WidgetConfig::default(),
    };
    let (script, contents) = load_script(&args.script)?;

    let report = check_templates(&set);
    if report.has_errors() {
        bail!(
            "{} has {} configuration error(s); run `heatcalc check` for details",
            args.templates.display(),
            report.error_count()
        );
    }

    let session_id = args
        .session_id
        .clone()
        .or_else(|| script.session_id.clone())
        .unwrap_or_else(|| derive_session_id(&args.templates, &contents));
    let session_id = SessionId::new(session_id).context("session id")?;
    replay(&set, config, session_id, &script)
}
