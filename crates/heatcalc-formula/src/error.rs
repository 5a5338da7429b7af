use thiserror::Error;

use crate::eval::EvalError;
use crate::shortcode::Reference;

/// Broad class of a formula failure, used for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Resolution,
    Evaluation,
    Cycle,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Resolution => "resolution",
            ErrorCategory::Evaluation => "evaluation",
            ErrorCategory::Cycle => "cycle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("no {kind} named '{name}' is defined")]
    UnknownCalculation { kind: &'static str, name: String },

    #[error("{} could not be resolved", join(references))]
    Unresolved { references: Vec<Reference> },

    #[error("'{name}' depends on itself")]
    Cycle { name: String },

    #[error("dependency '{name}' failed: {source}")]
    DependencyFailed {
        name: String,
        #[source]
        source: Box<FormulaError>,
    },

    #[error("'{name}': {source}")]
    Evaluation {
        name: String,
        #[source]
        source: EvalError,
    },

    #[error("lookup '{name}' has no entry for '{key}'")]
    LookupMiss { name: String, key: String },
}

impl FormulaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FormulaError::UnknownCalculation { .. }
            | FormulaError::Unresolved { .. }
            | FormulaError::LookupMiss { .. } => ErrorCategory::Resolution,
            FormulaError::Evaluation { .. } => ErrorCategory::Evaluation,
            FormulaError::Cycle { .. } => ErrorCategory::Cycle,
            FormulaError::DependencyFailed { source, .. } => source.category(),
        }
    }
}

fn join(references: &[Reference]) -> String {
    references
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
