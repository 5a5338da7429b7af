//! Serialisable view of a session for the host UI and reports.

use std::collections::BTreeMap;
use std::time::Duration;

use heatcalc_formula::CalculationRecord;
use heatcalc_model::{CardId, CardKind, FieldValue, SessionId};
use serde::Serialize;

use crate::session::{CardResults, Session};
use crate::state::CardStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSnapshot {
    pub id: CardId,
    pub name: String,
    pub kind: CardKind,
    pub status: CardStatus,
    pub is_revealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<CardResults>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub elapsed_ms: u64,
    pub cards: Vec<CardSnapshot>,
    pub fields: BTreeMap<String, FieldValue>,
    pub calculations: Vec<CalculationRecord>,
    pub pending_reveals: Vec<CardId>,
    pub recalc_pending: bool,
}

impl SessionSnapshot {
    pub fn capture(session: &Session) -> Self {
        let cards = session
            .cards()
            .iter()
            .map(|card| CardSnapshot {
                id: card.id.clone(),
                name: card.name.clone(),
                kind: card.kind(),
                status: session.status(&card.id).unwrap_or(CardStatus::Hidden),
                is_revealed: session.is_revealed(&card.id),
                results: session.results(&card.id).cloned(),
            })
            .collect();
        Self {
            session_id: session.id().clone(),
            elapsed_ms: millis(session.elapsed()),
            cards,
            fields: session.table().field_values(),
            calculations: session.table().calculations().cloned().collect(),
            pending_reveals: session.pending_reveals().cloned().collect(),
            recalc_pending: session.recalc_pending(),
        }
    }

    pub fn card(&self, id: &str) -> Option<&CardSnapshot> {
        self.cards.iter().find(|card| card.id.as_str() == id)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
