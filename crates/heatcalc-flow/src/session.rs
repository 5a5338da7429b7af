//! The session: one data table plus one set of card runtime states.
//!
//! Every public operation runs to completion synchronously. Reveals that
//! follow from an operation are queued on a [`Cascade`] and drained before
//! the operation returns, so cascades are iterative and bounded by the
//! number of cards. Timed reveals and debounced recalculation are left on
//! the scheduler until [`Session::tick`] brings them due.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use heatcalc_formula::{
    EngineStats, FormulaEngine, ProcessOutcome, RenderOutcome, SessionTable,
};
use heatcalc_model::{
    CardConfig, CardId, CardKind, CardTemplate, Catalog, FieldValue, RevealTiming, SessionId,
    TimingSource, WidgetConfig,
};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::completion::{PatternCache, is_card_complete, validate_card};
use crate::conditions::{ConditionContext, conditions_met};
use crate::error::{FlowError, Result};
use crate::events::FlowEvent;
use crate::reveal::RevealLedger;
use crate::scheduler::{DueTasks, RevealScheduler};
use crate::snapshot::SessionSnapshot;
use crate::state::{CardStatus, CardStates};
use crate::submission::{Submission, SubmissionSink};

/// One processed entry of a calculation card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationLine {
    pub name: String,
    pub success: bool,
    /// Formatted result with unit.
    pub result: Option<String>,
    pub error: Option<String>,
}

impl From<&ProcessOutcome> for CalculationLine {
    fn from(outcome: &ProcessOutcome) -> Self {
        Self {
            name: outcome.name.clone(),
            success: outcome.success,
            result: outcome.result.clone(),
            error: outcome.error_message(),
        }
    }
}

/// What a calculation card currently shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CardResults {
    pub lines: Vec<CalculationLine>,
    /// Display templates after substitution.
    pub display: Vec<String>,
}

impl CardResults {
    pub fn all_succeeded(&self) -> bool {
        self.lines.iter().all(|line| line.success)
    }
}

/// Reveals queued during one operation.
#[derive(Debug, Default)]
struct Cascade {
    queue: VecDeque<CardId>,
    visited: BTreeSet<CardId>,
}

impl Cascade {
    fn push(&mut self, card: CardId) {
        self.queue.push_back(card);
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: WidgetConfig,
    cards: Arc<[CardTemplate]>,
    catalog: Arc<Catalog>,
    table: SessionTable,
    engine: FormulaEngine,
    patterns: PatternCache,
    states: CardStates,
    ledger: RevealLedger,
    scheduler: RevealScheduler,
    results: BTreeMap<CardId, CardResults>,
}

impl Session {
    /// Build a session and reveal the first card.
    ///
    /// `cards` must already be in display order.
    pub fn new(
        id: SessionId,
        cards: Arc<[CardTemplate]>,
        catalog: Arc<Catalog>,
        config: WidgetConfig,
    ) -> Result<Self> {
        if cards.is_empty() {
            return Err(FlowError::NoCards);
        }
        let mut seen = BTreeSet::new();
        for card in cards.iter() {
            if !seen.insert(&card.id) {
                return Err(FlowError::DuplicateCard(card.id.clone()));
            }
        }
        for card in cards.iter() {
            if card.kind() == CardKind::Form && card.completion_rule().is_none() {
                warn!(
                    card_id = %card.id,
                    required_fields = card.has_required_fields(),
                    "form card has no completion rule; using fallback"
                );
            }
        }

        let engine = FormulaEngine::new(Arc::clone(&catalog), config.number_format.clone());
        let patterns = PatternCache::for_cards(&cards);
        let mut session = Self {
            states: CardStates::initial(cards.iter().map(|card| &card.id)),
            id,
            config,
            cards,
            catalog,
            table: SessionTable::new(),
            engine,
            patterns,
            ledger: RevealLedger::new(),
            scheduler: RevealScheduler::new(),
            results: BTreeMap::new(),
        };
        session.start();
        Ok(session)
    }

    fn start(&mut self) {
        for card in self.cards.iter() {
            for field in card.fields() {
                if let Some(default) = &field.default_value {
                    self.table.set_field(&field.field_name, default.clone());
                }
            }
        }

        let first = self.cards[0].id.clone();
        let mut events = Vec::new();
        let mut cascade = Cascade::default();
        cascade.push(first);
        self.drain(&mut cascade, &mut events);
        info!(
            session_id = %self.id,
            cards = self.cards.len(),
            events = events.len(),
            "session started"
        );
    }

    /// Back to a clean slate: no field values, first card active. Delayed
    /// reveals scheduled before the reset never fire.
    pub fn reset(&mut self) {
        self.table.clear();
        self.engine = FormulaEngine::new(
            Arc::clone(&self.catalog),
            self.config.number_format.clone(),
        );
        self.states = CardStates::initial(self.cards.iter().map(|card| &card.id));
        self.ledger = RevealLedger::new();
        self.scheduler.reset();
        self.results.clear();
        info!(session_id = %self.id, "session reset");
        self.start();
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn cards(&self) -> &[CardTemplate] {
        &self.cards
    }

    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn status(&self, id: &CardId) -> Option<CardStatus> {
        self.states.status(id)
    }

    pub fn is_revealed(&self, id: &CardId) -> bool {
        self.ledger.is_revealed(id)
    }

    pub fn active_card(&self) -> Option<&CardId> {
        self.states.active()
    }

    pub fn active_count(&self) -> usize {
        self.states.active_count()
    }

    pub fn results(&self, id: &CardId) -> Option<&CardResults> {
        self.results.get(id)
    }

    pub fn pending_reveals(&self) -> impl Iterator<Item = &CardId> {
        self.scheduler.pending()
    }

    pub fn recalc_pending(&self) -> bool {
        self.scheduler.recalc_pending()
    }

    /// Virtual time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn field(&self, name: &str) -> &FieldValue {
        self.table.field(name)
    }

    /// Process a formula, lookup or free template against this session.
    pub fn process(&mut self, template: &str) -> ProcessOutcome {
        self.engine.process(&mut self.table, template)
    }

    pub fn render(&mut self, template: &str) -> RenderOutcome {
        self.engine.render(&mut self.table, template)
    }

    fn card(&self, id: &CardId) -> Result<&CardTemplate> {
        self.cards
            .iter()
            .find(|card| &card.id == id)
            .ok_or_else(|| FlowError::UnknownCard(id.to_string()))
    }

    fn index_of(&self, id: &CardId) -> Option<usize> {
        self.cards.iter().position(|card| &card.id == id)
    }

    fn require_revealed(&self, id: &CardId) -> Result<&CardTemplate> {
        let card = self.card(id)?;
        if !self.ledger.is_revealed(id) {
            return Err(FlowError::NotRevealed(id.clone()));
        }
        Ok(card)
    }

    fn condition_context(&self) -> ConditionContext<'_> {
        ConditionContext {
            cards: &self.cards,
            states: &self.states,
            table: &self.table,
            patterns: &self.patterns,
        }
    }

    /// The single entry point for field writes.
    ///
    /// Stores the value, invalidates dependent calculations, recalculates
    /// (inline or debounced), completes the owning card if its completion
    /// rule now holds, and re-checks conditional reveals.
    pub fn update_field(&mut self, name: &str, value: impl Into<FieldValue>) -> Vec<FlowEvent> {
        let mut events = Vec::new();
        let mut cascade = Cascade::default();

        let change = self.table.set_field(name, value.into());
        let owner = self
            .cards
            .iter()
            .find(|card| card.owns_field(name))
            .map(|card| card.id.clone());
        debug!(
            field = name,
            owner = owner.as_ref().map(CardId::as_str).unwrap_or(""),
            changed = change.changed,
            invalidated = change.invalidated.len(),
            "field updated"
        );
        events.push(FlowEvent::FieldUpdated {
            field: name.to_string(),
            owner: owner.clone(),
            invalidated: change.invalidated.len(),
        });

        if change.changed {
            self.on_field_changed(&mut cascade, &mut events);
        }

        if let Some(owner) = owner {
            let owner_card = Arc::clone(&self.cards);
            let card = owner_card.iter().find(|card| card.id == owner);
            if let Some(card) = card
                && card.kind() == CardKind::Form
                && self.ledger.is_revealed(&owner)
                && !self.states.is(&owner, CardStatus::Complete)
                && is_card_complete(card, &self.table, &self.patterns)
            {
                self.mark_complete(&owner, &mut cascade, &mut events);
            }
        }

        self.reveal_conditional(&mut cascade);
        self.drain(&mut cascade, &mut events);
        events
    }

    /// Recalculation half of a field change.
    fn on_field_changed(&mut self, cascade: &mut Cascade, events: &mut Vec<FlowEvent>) {
        let debounce = self.config.recalc_debounce();
        if debounce.is_zero() {
            self.recalculate(cascade, events);
        } else if self.has_revealed_calculations() {
            self.scheduler.schedule_recalc(debounce);
            events.push(FlowEvent::RecalculationScheduled {
                delay_ms: self.config.recalc_debounce_ms,
            });
        }
    }

    fn has_revealed_calculations(&self) -> bool {
        self.cards
            .iter()
            .any(|card| card.kind() == CardKind::Calculation && self.ledger.is_revealed(&card.id))
    }

    /// Explicitly complete a revealed card.
    pub fn complete_card(&mut self, id: &CardId) -> Result<Vec<FlowEvent>> {
        self.require_revealed(id)?;
        let mut events = Vec::new();
        let mut cascade = Cascade::default();
        self.mark_complete(id, &mut cascade, &mut events);
        self.drain(&mut cascade, &mut events);
        Ok(events)
    }

    /// Make a revealed card the active one, demoting the previous active
    /// card according to the configured policy.
    pub fn activate_card(&mut self, id: &CardId) -> Result<Vec<FlowEvent>> {
        self.require_revealed(id)?;
        let demoted = self.states.activate(id, self.config.activation_demotion);
        debug!(card_id = %id, demoted = ?demoted, "card activated");
        Ok(vec![FlowEvent::Activated {
            card: id.clone(),
            demoted,
        }])
    }

    /// Reveal a card now. Revealing an already revealed card does nothing.
    pub fn reveal_card(&mut self, id: &CardId) -> Result<Vec<FlowEvent>> {
        self.card(id)?;
        let mut events = Vec::new();
        let mut cascade = Cascade::default();
        cascade.push(id.clone());
        self.drain(&mut cascade, &mut events);
        Ok(events)
    }

    /// The "next" button: validate the card's fields and complete it.
    ///
    /// On validation failure the per-field messages are returned and no
    /// state changes.
    pub fn advance(&mut self, id: &CardId) -> Result<Vec<FlowEvent>> {
        let cards = Arc::clone(&self.cards);
        let card = cards
            .iter()
            .find(|card| &card.id == id)
            .ok_or_else(|| FlowError::UnknownCard(id.to_string()))?;
        if !self.ledger.is_revealed(id) {
            return Err(FlowError::NotRevealed(id.clone()));
        }

        match card.kind() {
            CardKind::Form => {
                let messages = validate_card(card, &self.table, &self.patterns);
                if !messages.is_empty() {
                    debug!(card_id = %id, invalid = messages.len(), "advance blocked by validation");
                    return Err(FlowError::Validation {
                        card: id.clone(),
                        messages,
                    });
                }
            }
            CardKind::Submit => {
                return Err(FlowError::WrongCardType {
                    card: id.clone(),
                    kind: CardKind::Submit,
                    expected: CardKind::Form,
                });
            }
            CardKind::Calculation => {
                if !self.states.is(id, CardStatus::Complete) {
                    let mut events = Vec::new();
                    if !self.run_calculations(card, &mut events) {
                        let message = self
                            .results
                            .get(id)
                            .and_then(|results| results.lines.iter().find_map(|l| l.error.clone()))
                            .unwrap_or_else(|| "calculation failed".to_string());
                        return Err(FlowError::Calculation {
                            card: id.clone(),
                            message,
                        });
                    }
                }
            }
            CardKind::Info | CardKind::Visual => {}
        }

        self.complete_card(id)
    }

    /// Validate every revealed form card, hand the collected values to
    /// `sink` and complete the submit card.
    pub fn submit(&mut self, id: &CardId, sink: &mut dyn SubmissionSink) -> Result<Vec<FlowEvent>> {
        let card = self.require_revealed(id)?;
        if card.kind() != CardKind::Submit {
            return Err(FlowError::WrongCardType {
                card: id.clone(),
                kind: card.kind(),
                expected: CardKind::Submit,
            });
        }

        let messages: Vec<_> = self
            .cards
            .iter()
            .filter(|card| {
                matches!(card.kind(), CardKind::Form | CardKind::Submit)
                    && self.ledger.is_revealed(&card.id)
            })
            .flat_map(|card| validate_card(card, &self.table, &self.patterns))
            .collect();
        if !messages.is_empty() {
            return Err(FlowError::Validation {
                card: id.clone(),
                messages,
            });
        }

        let submission = Submission {
            session_id: self.id.clone(),
            submitted_at: Utc::now(),
            fields: self.table.field_values(),
            calculations: self
                .table
                .calculations()
                .map(|record| (record.name.clone(), record.display()))
                .collect(),
        };
        sink.submit(&submission)?;
        info!(
            session_id = %self.id,
            card_id = %id,
            fields = submission.fields.len(),
            "submission handed off"
        );

        let mut events = vec![FlowEvent::Submitted {
            card: id.clone(),
            fields: submission.fields.len(),
        }];
        let mut cascade = Cascade::default();
        self.mark_complete(id, &mut cascade, &mut events);
        self.drain(&mut cascade, &mut events);
        Ok(events)
    }

    /// Advance the virtual clock and apply whatever came due.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<FlowEvent> {
        let until = self.scheduler.now() + elapsed;
        let mut events = Vec::new();
        while let Some(due) = self.scheduler.advance_until(until) {
            self.apply_due(due, &mut events);
        }
        events
    }

    /// Apply the tasks that came due at the scheduler's current time.
    fn apply_due(&mut self, due: DueTasks, events: &mut Vec<FlowEvent>) {
        let mut cascade = Cascade::default();
        for (card, generation) in due.reveals {
            if !self.scheduler.is_current(generation) || self.ledger.is_revealed(&card) {
                debug!(card_id = %card, "delayed reveal no longer valid");
                events.push(FlowEvent::RevealSkipped { card });
                continue;
            }
            let still_allowed = self
                .cards
                .iter()
                .find(|template| template.id == card)
                .is_some_and(|template| conditions_met(template, self.condition_context()));
            if !still_allowed {
                self.states.set(&card, CardStatus::Locked);
                events.push(FlowEvent::Locked { card });
                continue;
            }
            cascade.push(card);
        }
        self.drain(&mut cascade, events);

        if due.recalculate {
            self.recalculate(&mut cascade, events);
            self.reveal_conditional(&mut cascade);
            self.drain(&mut cascade, events);
        }
    }

    /// Serialisable view for the host.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(self)
    }

    fn drain(&mut self, cascade: &mut Cascade, events: &mut Vec<FlowEvent>) {
        while let Some(id) = cascade.queue.pop_front() {
            if !cascade.visited.insert(id.clone()) {
                trace!(card_id = %id, "already visited in this cascade");
                continue;
            }
            if !self.ledger.grant(&id) {
                continue;
            }
            self.scheduler.cancel(&id);
            events.push(FlowEvent::Revealed { card: id.clone() });
            if matches!(
                self.states.status(&id),
                Some(CardStatus::Hidden | CardStatus::Locked)
            ) {
                self.states.set(&id, CardStatus::Unlocked);
            }
            self.settle_revealed(&id, cascade, events);
        }
    }

    /// Whatever a card does the moment it is revealed.
    fn settle_revealed(&mut self, id: &CardId, cascade: &mut Cascade, events: &mut Vec<FlowEvent>) {
        let cards = Arc::clone(&self.cards);
        let Some(card) = cards.iter().find(|card| &card.id == id) else {
            return;
        };
        match card.kind() {
            CardKind::Info | CardKind::Visual => self.mark_complete(id, cascade, events),
            CardKind::Calculation => {
                if self.run_calculations(card, events) {
                    self.mark_complete(id, cascade, events);
                } else {
                    self.activate_if_idle(id, events);
                }
            }
            CardKind::Form | CardKind::Submit => self.activate_if_idle(id, events),
        }
    }

    fn activate_if_idle(&mut self, id: &CardId, events: &mut Vec<FlowEvent>) {
        if self.states.active().is_some() || self.states.is(id, CardStatus::Complete) {
            return;
        }
        let demoted = self.states.activate(id, self.config.activation_demotion);
        events.push(FlowEvent::Activated {
            card: id.clone(),
            demoted,
        });
    }

    fn mark_complete(&mut self, id: &CardId, cascade: &mut Cascade, events: &mut Vec<FlowEvent>) {
        if self.states.is(id, CardStatus::Complete) {
            return;
        }
        self.states.set(id, CardStatus::Complete);
        debug!(card_id = %id, "card complete");
        events.push(FlowEvent::Completed { card: id.clone() });

        self.schedule_next(id, cascade, events);
        self.reveal_conditional(cascade);
    }

    /// Sequential step: reveal the card after `id` now, later, or not yet.
    fn schedule_next(&mut self, id: &CardId, cascade: &mut Cascade, events: &mut Vec<FlowEvent>) {
        let Some(index) = self.index_of(id) else {
            return;
        };
        let cards = Arc::clone(&self.cards);
        let completed = &cards[index];
        let Some(next) = cards.get(index + 1) else {
            info!(session_id = %self.id, "last card complete");
            events.push(FlowEvent::Finished);
            return;
        };

        if self.ledger.is_revealed(&next.id) {
            self.activate_if_idle(&next.id, events);
            return;
        }
        if self.scheduler.is_pending(&next.id) {
            return;
        }
        if !conditions_met(next, self.condition_context()) {
            self.states.set(&next.id, CardStatus::Locked);
            events.push(FlowEvent::Locked {
                card: next.id.clone(),
            });
            return;
        }

        let timing = match self.config.timing_source {
            TimingSource::Target => next.reveal_timing,
            TimingSource::Predecessor => completed.reveal_timing,
            TimingSource::Cascade if completed.kind().auto_completes() => completed.reveal_timing,
            TimingSource::Cascade => next.reveal_timing,
        };
        let timing = timing.unwrap_or_else(|| {
            warn!(card_id = %next.id, "no reveal_timing configured; revealing immediately");
            RevealTiming::Immediately
        });

        let delay = timing.delay();
        if delay.is_zero() {
            cascade.push(next.id.clone());
        } else if self.scheduler.schedule_reveal(&next.id, delay) {
            self.states.set(&next.id, CardStatus::Unlocked);
            events.push(FlowEvent::RevealScheduled {
                card: next.id.clone(),
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });
        }
    }

    /// Conditional step: when nothing is active and nothing is queued,
    /// reveal the first unrevealed card whose reveal conditions now hold.
    fn reveal_conditional(&mut self, cascade: &mut Cascade) {
        if self.states.active().is_some() || !cascade.queue.is_empty() {
            return;
        }
        let ctx = self.condition_context();
        let candidate = self.cards.iter().skip(1).find(|card| {
            !card.reveal_conditions.is_empty()
                && !self.ledger.is_revealed(&card.id)
                && !self.scheduler.is_pending(&card.id)
                && !cascade.visited.contains(&card.id)
                && conditions_met(card, ctx)
        });
        if let Some(card) = candidate {
            debug!(card_id = %card.id, "reveal conditions met");
            cascade.push(card.id.clone());
        }
    }

    /// Run a calculation card's entries and render its display text.
    /// Returns whether every entry succeeded.
    fn run_calculations(&mut self, card: &CardTemplate, events: &mut Vec<FlowEvent>) -> bool {
        let CardConfig::Calculation {
            calculations,
            display,
        } = &card.config
        else {
            return true;
        };

        let mut lines = Vec::with_capacity(calculations.len());
        for entry in calculations {
            let outcome = self.engine.process(&mut self.table, entry);
            if !outcome.success {
                let error = outcome.error_message().unwrap_or_default();
                debug!(card_id = %card.id, calculation = %outcome.name, %error, "calculation failed");
                events.push(FlowEvent::CalculationFailed {
                    card: card.id.clone(),
                    name: outcome.name.clone(),
                    error,
                });
            }
            lines.push(CalculationLine::from(&outcome));
        }
        let display = display
            .iter()
            .map(|template| self.engine.render(&mut self.table, template).text)
            .collect();

        let results = CardResults { lines, display };
        let ok = results.all_succeeded();
        self.results.insert(card.id.clone(), results);
        ok
    }

    /// Re-run every revealed calculation card; cards whose entries now all
    /// succeed complete.
    fn recalculate(&mut self, cascade: &mut Cascade, events: &mut Vec<FlowEvent>) {
        for outcome in self.engine.recalculate_stale(&mut self.table) {
            if !outcome.success {
                debug!(
                    formula = %outcome.name,
                    error = outcome.error_message().unwrap_or_default(),
                    "stale result could not be refreshed"
                );
            }
        }
        let cards = Arc::clone(&self.cards);
        for card in cards.iter() {
            if card.kind() != CardKind::Calculation || !self.ledger.is_revealed(&card.id) {
                continue;
            }
            if self.run_calculations(card, events) && !self.states.is(&card.id, CardStatus::Complete) {
                self.mark_complete(&card.id, cascade, events);
            }
        }
    }
}
