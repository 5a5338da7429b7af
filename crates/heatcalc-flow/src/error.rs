use heatcalc_model::{CardId, CardKind, ModelError};
use thiserror::Error;

use crate::completion::FieldMessage;
use crate::submission::SubmissionError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("template set has no cards")]
    NoCards,

    #[error("duplicate card id '{0}'")]
    DuplicateCard(CardId),

    #[error("unknown card '{0}'")]
    UnknownCard(String),

    #[error("card '{0}' has not been revealed")]
    NotRevealed(CardId),

    #[error("card '{card}' is a {kind} card; expected {expected}")]
    WrongCardType {
        card: CardId,
        kind: CardKind,
        expected: CardKind,
    },

    #[error("card '{card}' has {} invalid field(s)", messages.len())]
    Validation {
        card: CardId,
        messages: Vec<FieldMessage>,
    },

    #[error("card '{card}' cannot complete: {message}")]
    Calculation { card: CardId, message: String },

    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, FlowError>;
