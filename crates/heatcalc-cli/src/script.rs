//! Scripted sessions.
//!
//! A script is a JSON document listing visitor actions in order:
//!
//! ```json
//! {
//!   "steps": [
//!     { "set": { "field": "area", "value": 120 } },
//!     { "advance": "house" },
//!     { "tick_ms": 2000 },
//!     { "submit": "send" }
//!   ]
//! }
//! ```
//!
//! Replaying runs every step against one session and records what each
//! step did. A rejected step (validation failure, card not revealed yet)
//! does not stop the replay.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use heatcalc_flow::{
    FlowError, FlowEvent, LoadSignal, MemorySink, Session, SessionHost, SessionSnapshot,
    Submission,
};
use heatcalc_model::{CardId, FieldValue, SessionId, WidgetConfig};
use heatcalc_templates::TemplateSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span};

use crate::logging::redact_value;

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub session_id: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Set {
        field: String,
        #[serde(default)]
        value: FieldValue,
    },
    Advance(String),
    Activate(String),
    Reveal(String),
    Complete(String),
    Submit(String),
    TickMs(u64),
}

impl Step {
    fn label(&self) -> String {
        match self {
            Step::Set { field, .. } => format!("set {field}"),
            Step::Advance(card) => format!("advance {card}"),
            Step::Activate(card) => format!("activate {card}"),
            Step::Reveal(card) => format!("reveal {card}"),
            Step::Complete(card) => format!("complete {card}"),
            Step::Submit(card) => format!("submit {card}"),
            Step::TickMs(millis) => format!("tick {millis}ms"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: String,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub events: Vec<FlowEvent>,
}

#[derive(Debug)]
pub struct ReplayResult {
    pub session_id: SessionId,
    pub steps: Vec<StepReport>,
    pub snapshot: SessionSnapshot,
    pub submissions: Vec<Submission>,
}

impl ReplayResult {
    pub fn rejected_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.outcome == StepOutcome::Rejected)
            .count()
    }
}

pub fn parse_script(contents: &str) -> Result<Script> {
    serde_json::from_str(contents).context("parse script JSON")
}

pub fn load_script(path: &Path) -> Result<(Script, String)> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read script {}", path.display()))?;
    let script = parse_script(&contents).with_context(|| format!("in {}", path.display()))?;
    Ok((script, contents))
}

/// Stable id for a replay: the first 8 bytes of SHA-256 over the template
/// path and the script text, hex encoded.
pub fn derive_session_id(templates: &Path, script: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(templates.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(script.as_bytes());
    let digest = hasher.finalize();
    format!("replay-{}", hex::encode(&digest[..8]))
}

pub fn replay(
    set: &TemplateSet,
    config: WidgetConfig,
    session_id: SessionId,
    script: &Script,
) -> Result<ReplayResult> {
    let span = info_span!("replay", session_id = %session_id, steps = script.steps.len());
    let _guard = span.enter();

    let mut host = SessionHost::new(set.cards.clone(), set.catalog.clone(), config);
    host.load(LoadSignal::new(session_id.clone()))
        .context("start session")?;
    let session = host
        .session_mut()
        .ok_or_else(|| anyhow!("session was not created"))?;

    let mut sink = MemorySink::new();
    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let report = match apply(session, step, &mut sink) {
            Ok(events) => StepReport {
                index,
                action: step.label(),
                outcome: StepOutcome::Applied,
                message: None,
                events,
            },
            Err(error) => {
                debug!(step = index, %error, "step rejected");
                StepReport {
                    index,
                    action: step.label(),
                    outcome: StepOutcome::Rejected,
                    message: Some(describe(&error)),
                    events: Vec::new(),
                }
            }
        };
        steps.push(report);
    }

    let snapshot = session.snapshot();
    info!(
        steps = steps.len(),
        submissions = sink.submissions.len(),
        "replay finished"
    );
    Ok(ReplayResult {
        session_id,
        steps,
        snapshot,
        submissions: sink.submissions,
    })
}

fn apply(
    session: &mut Session,
    step: &Step,
    sink: &mut MemorySink,
) -> Result<Vec<FlowEvent>, FlowError> {
    match step {
        Step::Set { field, value } => {
            debug!(field = %field, value = redact_value(&value.as_text()), "set field");
            Ok(session.update_field(field, value.clone()))
        }
        Step::Advance(card) => session.advance(&CardId::new(card.as_str())?),
        Step::Activate(card) => session.activate_card(&CardId::new(card.as_str())?),
        Step::Reveal(card) => session.reveal_card(&CardId::new(card.as_str())?),
        Step::Complete(card) => session.complete_card(&CardId::new(card.as_str())?),
        Step::Submit(card) => session.submit(&CardId::new(card.as_str())?, sink),
        Step::TickMs(millis) => Ok(session.tick(Duration::from_millis(*millis))),
    }
}

/// One line per problem; validation failures list every field message.
fn describe(error: &FlowError) -> String {
    match error {
        FlowError::Validation { messages, .. } => messages
            .iter()
            .map(|message| message.message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
