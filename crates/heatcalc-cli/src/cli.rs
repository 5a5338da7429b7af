//! CLI argument definitions for `heatcalc`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use heatcalc_model::{FieldValue, parse_number};

#[derive(Parser)]
#[command(
    name = "heatcalc",
    version,
    about = "Heat-pump savings calculator - evaluate formulas, check card templates, replay sessions",
    long_about = "Operator tooling for the progressive card-based savings calculator.\n\n\
                  Evaluates formulas against ad-hoc field values, checks card templates\n\
                  for configuration gaps and replays scripted visitor sessions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Include visitor-entered field values in logs.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate one formula against field values given on the command line.
    Eval(EvalArgs),

    /// Load card templates and report configuration gaps.
    Check(CheckArgs),

    /// Replay a scripted session against card templates.
    Run(RunArgs),
}

#[derive(Parser)]
pub struct EvalArgs {
    /// Formula text, e.g. "[field:a] + [field:b]", or a "[calc:name]" reference.
    #[arg(value_name = "FORMULA")]
    pub formula: String,

    /// Field value as NAME=VALUE (repeatable).
    #[arg(long = "field", short = 'f', value_name = "NAME=VALUE", value_parser = parse_field_assignment)]
    pub fields: Vec<(String, FieldValue)>,

    /// Unit appended to the formatted result.
    #[arg(long = "unit")]
    pub unit: Option<String>,

    /// Decimal places in the formatted result.
    #[arg(long = "decimals")]
    pub decimals: Option<u32>,

    /// Card template file whose formulas and lookups may be referenced.
    #[arg(long = "templates", value_name = "PATH")]
    pub templates: Option<PathBuf>,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Card template file (.json or .toml).
    #[arg(value_name = "TEMPLATES")]
    pub templates: PathBuf,

    /// Widget configuration file (.toml) to validate alongside.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Card template file (.json or .toml).
    #[arg(value_name = "TEMPLATES")]
    pub templates: PathBuf,

    /// Script of visitor actions (JSON).
    #[arg(long = "script", value_name = "PATH")]
    pub script: PathBuf,

    /// Widget configuration file (.toml).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Session id (default: derived from the template path and script).
    #[arg(long = "session-id")]
    pub session_id: Option<String>,

    /// Print the final session snapshot as JSON instead of tables.
    #[arg(long = "json")]
    pub json: bool,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

/// `NAME=VALUE`; numbers (plain or `1.234,5`) and `true`/`false` are typed,
/// everything else is text.
fn parse_field_assignment(raw: &str) -> Result<(String, FieldValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let value = match value.trim() {
        "true" => FieldValue::Bool(true),
        "false" => FieldValue::Bool(false),
        text => parse_number(text).map_or_else(|| FieldValue::from(text), FieldValue::Number),
    };
    Ok((name.to_string(), value))
}
