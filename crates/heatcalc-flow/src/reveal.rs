//! The reveal ledger.
//!
//! `is_revealed` is a one-way permission: it goes from false to true at most
//! once per card and never back. [`RevealLedger::grant`] is the only way to
//! set it, so every path that reveals a card (init, sequential cascade,
//! delayed task, conditional reveal) goes through the same guard.

use std::collections::BTreeSet;

use heatcalc_model::CardId;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct RevealLedger {
    granted: BTreeSet<CardId>,
}

impl RevealLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant reveal permission. Returns false if it was already granted.
    pub fn grant(&mut self, id: &CardId) -> bool {
        let newly = self.granted.insert(id.clone());
        if newly {
            debug!(card_id = %id, "reveal granted");
        }
        newly
    }

    pub fn is_revealed(&self, id: &CardId) -> bool {
        self.granted.contains(id)
    }

    pub fn revealed_count(&self) -> usize {
        self.granted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_is_idempotent() {
        let mut ledger = RevealLedger::new();
        let id = CardId::new("a").unwrap();
        assert!(!ledger.is_revealed(&id));
        assert!(ledger.grant(&id));
        assert!(!ledger.grant(&id));
        assert!(ledger.is_revealed(&id));
        assert_eq!(ledger.revealed_count(), 1);
    }
}
