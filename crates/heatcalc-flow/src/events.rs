use heatcalc_model::CardId;
use serde::Serialize;

/// Something observable that happened during a session operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
    FieldUpdated {
        field: String,
        owner: Option<CardId>,
        invalidated: usize,
    },
    Revealed {
        card: CardId,
    },
    RevealScheduled {
        card: CardId,
        delay_ms: u64,
    },
    /// A delayed reveal came due but the card was already revealed or the
    /// session had been reset.
    RevealSkipped {
        card: CardId,
    },
    Locked {
        card: CardId,
    },
    Activated {
        card: CardId,
        demoted: Option<CardId>,
    },
    Completed {
        card: CardId,
    },
    CalculationFailed {
        card: CardId,
        name: String,
        error: String,
    },
    RecalculationScheduled {
        delay_ms: u64,
    },
    Submitted {
        card: CardId,
        fields: usize,
    },
    /// The last card completed.
    Finished,
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::FieldUpdated { .. } => "field_updated",
            FlowEvent::Revealed { .. } => "revealed",
            FlowEvent::RevealScheduled { .. } => "reveal_scheduled",
            FlowEvent::RevealSkipped { .. } => "reveal_skipped",
            FlowEvent::Locked { .. } => "locked",
            FlowEvent::Activated { .. } => "activated",
            FlowEvent::Completed { .. } => "completed",
            FlowEvent::CalculationFailed { .. } => "calculation_failed",
            FlowEvent::RecalculationScheduled { .. } => "recalculation_scheduled",
            FlowEvent::Submitted { .. } => "submitted",
            FlowEvent::Finished => "finished",
        }
    }

    pub fn card(&self) -> Option<&CardId> {
        match self {
            FlowEvent::FieldUpdated { owner, .. } => owner.as_ref(),
            FlowEvent::Revealed { card }
            | FlowEvent::RevealScheduled { card, .. }
            | FlowEvent::RevealSkipped { card }
            | FlowEvent::Locked { card }
            | FlowEvent::Activated { card, .. }
            | FlowEvent::Completed { card }
            | FlowEvent::CalculationFailed { card, .. }
            | FlowEvent::Submitted { card, .. } => Some(card),
            FlowEvent::RecalculationScheduled { .. } | FlowEvent::Finished => None,
        }
    }
}
