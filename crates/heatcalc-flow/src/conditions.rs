//! Reveal condition evaluation.

use heatcalc_formula::SessionTable;
use heatcalc_model::{CardId, CardTemplate, ConditionOperator, FieldValue, RevealCondition};
use tracing::warn;

use crate::completion::{PatternCache, is_card_complete};
use crate::state::{CardStatus, CardStates};

/// Read-only view of the session used to evaluate conditions.
#[derive(Clone, Copy)]
pub struct ConditionContext<'a> {
    pub cards: &'a [CardTemplate],
    pub states: &'a CardStates,
    pub table: &'a SessionTable,
    pub patterns: &'a PatternCache,
}

impl ConditionContext<'_> {
    fn card(&self, id: &CardId) -> Option<&CardTemplate> {
        self.cards.iter().find(|card| &card.id == id)
    }
}

/// All conditions hold. A card without conditions always passes.
pub fn conditions_met(card: &CardTemplate, ctx: ConditionContext<'_>) -> bool {
    card.reveal_conditions
        .iter()
        .all(|condition| condition_met(condition, ctx))
}

/// Conditions naming a card that does not exist count as met, so a bad
/// reference cannot stall the flow.
pub fn condition_met(condition: &RevealCondition, ctx: ConditionContext<'_>) -> bool {
    match condition {
        RevealCondition::Always => true,
        RevealCondition::CardComplete { card } => match ctx.states.status(card) {
            Some(status) => status == CardStatus::Complete,
            None => {
                warn!(card_id = %card, "card_complete condition targets unknown card; treating as met");
                true
            }
        },
        RevealCondition::FieldsComplete { card } => match ctx.card(card) {
            Some(template) => is_card_complete(template, ctx.table, ctx.patterns),
            None => {
                warn!(card_id = %card, "fields_complete condition targets unknown card; treating as met");
                true
            }
        },
        RevealCondition::ValueCheck {
            field,
            operator,
            value,
        } => compare(ctx.table.field(field), *operator, value),
    }
}

pub fn compare(actual: &FieldValue, operator: ConditionOperator, expected: &FieldValue) -> bool {
    let numeric = || actual.as_number().zip(expected.as_number());
    match operator {
        ConditionOperator::Equals => actual.is_present() && actual.loosely_equals(expected),
        ConditionOperator::NotEquals => !actual.loosely_equals(expected),
        ConditionOperator::GreaterThan => numeric().is_some_and(|(a, b)| a > b),
        ConditionOperator::GreaterOrEqual => numeric().is_some_and(|(a, b)| a >= b),
        ConditionOperator::LessThan => numeric().is_some_and(|(a, b)| a < b),
        ConditionOperator::LessOrEqual => numeric().is_some_and(|(a, b)| a <= b),
        ConditionOperator::Contains => actual
            .as_text()
            .to_lowercase()
            .contains(&expected.as_text().to_lowercase()),
        ConditionOperator::IsSet => actual.is_present(),
        ConditionOperator::IsEmpty => !actual.is_present(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_operators_need_numbers_on_both_sides() {
        let area = FieldValue::from("120");
        assert!(compare(&area, ConditionOperator::GreaterThan, &FieldValue::Number(100.0)));
        assert!(compare(&area, ConditionOperator::LessOrEqual, &FieldValue::from("120")));
        assert!(!compare(&FieldValue::Unset, ConditionOperator::LessThan, &FieldValue::Number(1.0)));
        assert!(!compare(&FieldValue::from("big"), ConditionOperator::GreaterThan, &FieldValue::Number(1.0)));
    }

    #[test]
    fn text_operators() {
        let fuel = FieldValue::from("Natural Gas");
        assert!(compare(&fuel, ConditionOperator::Contains, &FieldValue::from("gas")));
        assert!(compare(&FieldValue::from("oil"), ConditionOperator::Equals, &FieldValue::from("OIL")));
        assert!(compare(&fuel, ConditionOperator::NotEquals, &FieldValue::from("oil")));
        assert!(compare(&FieldValue::Unset, ConditionOperator::IsEmpty, &FieldValue::Unset));
        assert!(!compare(&FieldValue::Unset, ConditionOperator::Equals, &FieldValue::Unset));
    }
}
