//! Progressive disclosure for card-based forms.
//!
//! A [`Session`] owns one data table and one set of card runtime states.
//! Cards move `hidden -> locked/unlocked -> active -> complete`; whether a
//! card may be shown at all is a separate, monotonic reveal flag owned by
//! the [`RevealLedger`]. Timed reveals and debounced recalculation run on a
//! virtual clock advanced by [`Session::tick`], so the whole flow stays
//! single-threaded and deterministic.

pub mod completion;
pub mod conditions;
pub mod error;
pub mod events;
pub mod host;
pub mod reveal;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod submission;

pub use completion::{
    FieldMessage, PatternCache, effective_rule, is_card_complete, validate_card, validate_field,
};
pub use error::{FlowError, Result};
pub use events::FlowEvent;
pub use host::{LoadOutcome, LoadSignal, SessionHost};
pub use reveal::RevealLedger;
pub use scheduler::{DueTasks, RevealScheduler};
pub use session::{CalculationLine, CardResults, Session};
pub use snapshot::{CardSnapshot, SessionSnapshot};
pub use state::{CardStatus, CardStates};
pub use submission::{MemorySink, Submission, SubmissionError, SubmissionSink};
