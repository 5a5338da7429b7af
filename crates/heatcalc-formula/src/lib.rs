//! Formula evaluation for the savings calculator.
//!
//! This crate provides the dataflow half of a session:
//!
//! - **table**: per-session field values and calculation records with staleness flags
//! - **shortcode**: `[field:x]`, `[calc:x]`, `[lookup:x]` parsing and substitution
//! - **eval**: sandboxed arithmetic/string expression evaluation
//! - **dependency**: formula dependency edges and transitive invalidation
//! - **engine**: substitute, evaluate, format and cache formula and lookup results
//! - **format**: fixed display format for numeric results (`1.234,5 kWh`)

pub mod dependency;
pub mod engine;
pub mod error;
pub mod eval;
pub mod format;
pub mod shortcode;
pub mod table;

pub use dependency::DependencyTracker;
pub use engine::{EngineStats, FormulaEngine, ProcessOutcome, RenderOutcome, Target};
pub use error::{ErrorCategory, FormulaError};
pub use eval::{EvalError, Value, evaluate};
pub use format::{format_number, format_with_unit, parse_formatted};
pub use shortcode::{
    RefKind, Reference, Resolution, SubstitutionMode, references, resolve, single_reference,
};
pub use table::{CalculationRecord, FieldChange, SessionTable};
