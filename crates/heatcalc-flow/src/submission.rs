//! Hand-off of collected values to the outside world.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use heatcalc_model::{FieldValue, SessionId};
use serde::Serialize;
use thiserror::Error;

/// Flat snapshot of everything the visitor entered plus the displayed
/// results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub session_id: SessionId,
    pub submitted_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Calculation name to formatted result with unit.
    pub calculations: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("submission rejected: {0}")]
    Rejected(String),
}

/// Receives the final submission. Transport and formatting are the sink's
/// business.
pub trait SubmissionSink {
    fn submit(&mut self, submission: &Submission) -> Result<(), SubmissionError>;
}

/// Keeps submissions in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub submissions: Vec<Submission>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmissionSink for MemorySink {
    fn submit(&mut self, submission: &Submission) -> Result<(), SubmissionError> {
        self.submissions.push(submission.clone());
        Ok(())
    }
}
