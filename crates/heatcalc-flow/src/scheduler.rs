//! Deferred reveals and debounced recalculation on a virtual clock.
//!
//! Nothing here fires on its own: the host advances the clock with
//! [`RevealScheduler::advance_until`] and applies whatever came due, one
//! due time at a time. Tasks are
//! keyed by card id, carry the generation they were scheduled in, and are
//! re-validated by the session before taking effect.

use std::collections::BTreeMap;
use std::time::Duration;

use heatcalc_model::CardId;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct ScheduledReveal {
    due: Duration,
    generation: u64,
}

/// Tasks that came due in one clock advance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueTasks {
    /// Card ids with the generation they were scheduled in, in due order.
    pub reveals: Vec<(CardId, u64)>,
    pub recalculate: bool,
}

impl DueTasks {
    pub fn is_empty(&self) -> bool {
        self.reveals.is_empty() && !self.recalculate
    }
}

#[derive(Debug, Clone, Default)]
pub struct RevealScheduler {
    now: Duration,
    generation: u64,
    pending: BTreeMap<CardId, ScheduledReveal>,
    recalc_due: Option<Duration>,
}

impl RevealScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Schedule a reveal of `card` after `delay`. A card has at most one
    /// pending reveal; scheduling again keeps the earlier one and returns
    /// false.
    pub fn schedule_reveal(&mut self, card: &CardId, delay: Duration) -> bool {
        if self.pending.contains_key(card) {
            trace!(card_id = %card, "reveal already pending");
            return false;
        }
        let due = self.now + delay;
        self.pending.insert(
            card.clone(),
            ScheduledReveal {
                due,
                generation: self.generation,
            },
        );
        debug!(card_id = %card, delay_ms = delay.as_millis() as u64, "reveal scheduled");
        true
    }

    pub fn is_pending(&self, card: &CardId) -> bool {
        self.pending.contains_key(card)
    }

    pub fn pending(&self) -> impl Iterator<Item = &CardId> {
        self.pending.keys()
    }

    pub fn cancel(&mut self, card: &CardId) -> bool {
        self.pending.remove(card).is_some()
    }

    /// Debounce: each call pushes the single recalculation task out to
    /// `now + delay`.
    pub fn schedule_recalc(&mut self, delay: Duration) {
        self.recalc_due = Some(self.now + delay);
    }

    pub fn recalc_pending(&self) -> bool {
        self.recalc_due.is_some()
    }

    /// Earliest due time among pending tasks.
    fn next_due(&self) -> Option<Duration> {
        let reveal = self.pending.values().map(|task| task.due).min();
        match (reveal, self.recalc_due) {
            (Some(reveal), Some(recalc)) => Some(reveal.min(recalc)),
            (reveal, recalc) => reveal.or(recalc),
        }
    }

    /// Move the clock towards `until`, stopping at the first moment a task
    /// comes due. Returns the tasks due at that moment, or `None` once the
    /// clock has reached `until` with nothing left to fire.
    ///
    /// Call repeatedly: tasks scheduled while applying one step are based on
    /// that step's time, not on `until`.
    pub fn advance_until(&mut self, until: Duration) -> Option<DueTasks> {
        let Some(at) = self.next_due().filter(|due| *due <= until) else {
            self.now = self.now.max(until);
            return None;
        };
        self.now = self.now.max(at);
        let now = self.now;

        let mut due: Vec<(Duration, CardId, u64)> = self
            .pending
            .iter()
            .filter(|(_, task)| task.due <= now)
            .map(|(card, task)| (task.due, card.clone(), task.generation))
            .collect();
        due.sort();
        for (_, card, _) in &due {
            self.pending.remove(card);
        }

        let recalculate = self.recalc_due.is_some_and(|due| due <= now);
        if recalculate {
            self.recalc_due = None;
        }

        Some(DueTasks {
            reveals: due
                .into_iter()
                .map(|(_, card, generation)| (card, generation))
                .collect(),
            recalculate,
        })
    }

    /// Drop every pending task and invalidate any already handed out.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.pending.clear();
        self.recalc_due = None;
    }
}
