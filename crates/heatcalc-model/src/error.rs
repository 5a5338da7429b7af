use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid card id: {0:?}")]
    InvalidCardId(String),
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),
    #[error("duplicate definition for {0}")]
    DuplicateDefinition(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
