//! Card lifecycle statuses.

use std::collections::BTreeMap;
use std::fmt;

use heatcalc_model::{CardId, DemotionPolicy};
use serde::Serialize;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Hidden,
    /// Next in line but its reveal conditions are not met.
    Locked,
    /// Revealed (or about to be) and not the one being worked on.
    Unlocked,
    Active,
    Complete,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Hidden => "hidden",
            CardStatus::Locked => "locked",
            CardStatus::Unlocked => "unlocked",
            CardStatus::Active => "active",
            CardStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of every card in a session.
#[derive(Debug, Clone)]
pub struct CardStates {
    statuses: BTreeMap<CardId, CardStatus>,
}

impl CardStates {
    /// First card active, the rest hidden.
    pub fn initial<'a>(ids: impl IntoIterator<Item = &'a CardId>) -> Self {
        let statuses = ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                let status = if index == 0 {
                    CardStatus::Active
                } else {
                    CardStatus::Hidden
                };
                (id.clone(), status)
            })
            .collect();
        Self { statuses }
    }

    pub fn status(&self, id: &CardId) -> Option<CardStatus> {
        self.statuses.get(id).copied()
    }

    pub fn is(&self, id: &CardId, status: CardStatus) -> bool {
        self.status(id) == Some(status)
    }

    pub fn set(&mut self, id: &CardId, status: CardStatus) {
        if let Some(current) = self.statuses.get_mut(id)
            && *current != status
        {
            trace!(card_id = %id, from = %current, to = %status, "status change");
            *current = status;
        }
    }

    pub fn active(&self) -> Option<&CardId> {
        self.statuses
            .iter()
            .find(|(_, status)| **status == CardStatus::Active)
            .map(|(id, _)| id)
    }

    pub fn active_count(&self) -> usize {
        self.statuses
            .values()
            .filter(|status| **status == CardStatus::Active)
            .count()
    }

    /// Make `id` the only active card. Returns the card that was demoted.
    pub fn activate(&mut self, id: &CardId, demotion: DemotionPolicy) -> Option<CardId> {
        let demoted_status = match demotion {
            DemotionPolicy::Unlocked => CardStatus::Unlocked,
            DemotionPolicy::Complete => CardStatus::Complete,
        };
        let demoted: Vec<CardId> = self
            .statuses
            .iter()
            .filter(|(other, status)| *other != id && **status == CardStatus::Active)
            .map(|(other, _)| other.clone())
            .collect();
        for other in &demoted {
            self.set(other, demoted_status);
        }
        self.set(id, CardStatus::Active);
        demoted.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<CardId> {
        ["a", "b", "c"]
            .into_iter()
            .map(|id| CardId::new(id).unwrap())
            .collect()
    }

    #[test]
    fn first_card_starts_active() {
        let ids = ids();
        let states = CardStates::initial(&ids);
        assert_eq!(states.status(&ids[0]), Some(CardStatus::Active));
        assert_eq!(states.status(&ids[1]), Some(CardStatus::Hidden));
        assert_eq!(states.active_count(), 1);
    }

    #[test]
    fn activation_demotes_per_policy() {
        let ids = ids();
        let mut states = CardStates::initial(&ids);
        let demoted = states.activate(&ids[1], DemotionPolicy::Unlocked);
        assert_eq!(demoted.as_ref(), Some(&ids[0]));
        assert_eq!(states.status(&ids[0]), Some(CardStatus::Unlocked));

        states.activate(&ids[2], DemotionPolicy::Complete);
        assert_eq!(states.status(&ids[1]), Some(CardStatus::Complete));
        assert_eq!(states.active(), Some(&ids[2]));
        assert_eq!(states.active_count(), 1);
    }

    #[test]
    fn unknown_cards_are_ignored() {
        let ids = ids();
        let mut states = CardStates::initial(&ids);
        let ghost = CardId::new("ghost").unwrap();
        states.set(&ghost, CardStatus::Complete);
        assert_eq!(states.status(&ghost), None);
    }
}
