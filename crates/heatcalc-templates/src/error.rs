use std::path::PathBuf;

use heatcalc_model::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON templates {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse TOML {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse CSV lookup table {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("unsupported template format for {path} (expected .json or .toml)")]
    UnsupportedFormat { path: PathBuf },

    #[error("card '{card}': {message}")]
    InvalidCard { card: String, message: String },

    #[error("lookup '{lookup}': {message}")]
    InvalidLookup { lookup: String, message: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl TemplateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_card(card: &str, message: impl Into<String>) -> Self {
        Self::InvalidCard {
            card: card.to_string(),
            message: message.into(),
        }
    }
}
