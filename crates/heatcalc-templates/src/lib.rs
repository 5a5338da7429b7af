//! Loading card templates and formula catalogs from the content store.
//!
//! The content store exports cards in a loose JSON shape (string card types,
//! optional rule blocks, delay in seconds). This crate parses that shape,
//! converts it into the typed model, records every configuration gap it had
//! to paper over, and can check a loaded set for problems that would only
//! show up mid-session.

pub mod check;
pub mod error;
pub mod loader;
pub mod lookup_csv;
pub mod schema;

pub use check::check_templates;
pub use error::TemplateError;
pub use loader::{
    TemplateSet, load_templates, load_widget_config, parse_json, parse_toml, parse_widget_config,
};
