//! Session lifecycle across widget loads.

use std::sync::Arc;

use heatcalc_model::{CardTemplate, Catalog, SessionId, WidgetConfig, WidgetMode};
use tracing::info;

use crate::error::Result;
use crate::session::Session;

/// What the host knows when the widget loads.
#[derive(Debug, Clone)]
pub struct LoadSignal {
    /// Id to use if a new session is created.
    pub session_id: SessionId,
    /// Discard any existing session.
    pub force_new: bool,
}

impl LoadSignal {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            force_new: false,
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A new session was created.
    Created,
    /// The existing session was reset to a clean slate.
    Reset,
    /// The existing session was kept as is.
    Resumed,
}

/// Owns the templates and at most one live session.
#[derive(Debug)]
pub struct SessionHost {
    cards: Arc<[CardTemplate]>,
    catalog: Arc<Catalog>,
    config: WidgetConfig,
    session: Option<Session>,
}

impl SessionHost {
    pub fn new(cards: Vec<CardTemplate>, catalog: Catalog, config: WidgetConfig) -> Self {
        Self {
            cards: cards.into(),
            catalog: Arc::new(catalog),
            config,
            session: None,
        }
    }

    /// Create on first load or when forced; otherwise reset (hosted mode)
    /// or keep (embedded mode) the existing session.
    pub fn load(&mut self, signal: LoadSignal) -> Result<LoadOutcome> {
        let outcome = match self.session.as_mut() {
            Some(session) if !signal.force_new => {
                if self.config.mode == WidgetMode::Hosted {
                    session.reset();
                    LoadOutcome::Reset
                } else {
                    LoadOutcome::Resumed
                }
            }
            _ => {
                let session = Session::new(
                    signal.session_id,
                    Arc::clone(&self.cards),
                    Arc::clone(&self.catalog),
                    self.config.clone(),
                )?;
                self.session = Some(session);
                LoadOutcome::Created
            }
        };
        if let Some(session) = &self.session {
            info!(session_id = %session.id(), outcome = ?outcome, "widget loaded");
        }
        Ok(outcome)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// End the live session, if any.
    pub fn close(&mut self) -> Option<Session> {
        self.session.take()
    }
}
