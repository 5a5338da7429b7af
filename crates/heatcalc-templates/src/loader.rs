use std::path::{Path, PathBuf};

use heatcalc_model::{
    CardId, CardTemplate, Catalog, ConfigIssue, LookupDef, WidgetConfig,
};
use tracing::{info, warn};

use crate::error::TemplateError;
use crate::lookup_csv::load_lookup_csv;
use crate::schema::{RawLookup, RawTemplateFile};

/// Everything a session needs from the content store.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    /// Sorted by `display_order`; ties keep file order.
    pub cards: Vec<CardTemplate>,
    pub catalog: Catalog,
    /// Fallbacks taken while converting the raw export.
    pub load_issues: Vec<ConfigIssue>,
}

impl TemplateSet {
    pub fn card(&self, id: &CardId) -> Option<&CardTemplate> {
        self.cards.iter().find(|card| &card.id == id)
    }

    pub fn from_raw(raw: RawTemplateFile, base_dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut load_issues = Vec::new();
        let mut cards = raw
            .cards
            .into_iter()
            .map(|card| card.into_template(&mut load_issues))
            .collect::<Result<Vec<_>, _>>()?;
        cards.sort_by_key(|card| card.display_order);

        let mut catalog = Catalog::new();
        for formula in raw.formulas {
            catalog.add_formula(formula)?;
        }
        for lookup in raw.lookups {
            catalog.add_lookup(convert_lookup(lookup, base_dir)?)?;
        }

        for issue in &load_issues {
            warn!(
                code = %issue.code,
                card = issue.card.as_deref().unwrap_or(""),
                "{}",
                issue.message
            );
        }
        info!(
            cards = cards.len(),
            formulas = catalog.formulas().count(),
            lookups = catalog.lookups().count(),
            "loaded templates"
        );
        Ok(Self {
            cards,
            catalog,
            load_issues,
        })
    }
}

fn convert_lookup(raw: RawLookup, base_dir: Option<&Path>) -> Result<LookupDef, TemplateError> {
    let mut entries = raw.entries;
    if let Some(csv) = raw.csv {
        let path = match base_dir {
            Some(dir) => dir.join(&csv),
            None => PathBuf::from(&csv),
        };
        entries.extend(load_lookup_csv(&path)?);
    }
    if entries.is_empty() && raw.default.is_none() {
        return Err(TemplateError::InvalidLookup {
            lookup: raw.name,
            message: "no entries and no default".to_string(),
        });
    }
    Ok(LookupDef {
        name: raw.name,
        key: raw.key,
        entries,
        default: raw.default,
        unit: raw.unit,
        decimals: raw.decimals,
    })
}

/// Load a template file, picking the parser by extension. CSV lookup tables
/// are resolved relative to the file's directory.
pub fn load_templates(path: &Path) -> Result<TemplateSet, TemplateError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    if !matches!(extension.as_deref(), Some("json" | "toml")) {
        return Err(TemplateError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::io(path, e))?;
    let raw: RawTemplateFile = if extension.as_deref() == Some("json") {
        serde_json::from_str(&contents).map_err(|e| TemplateError::Json {
            path: path.to_path_buf(),
            source: e,
        })?
    } else {
        toml::from_str(&contents).map_err(|e| TemplateError::Toml {
            path: path.to_path_buf(),
            source: e,
        })?
    };
    TemplateSet::from_raw(raw, path.parent())
}

pub fn parse_json(contents: &str) -> Result<TemplateSet, TemplateError> {
    let raw: RawTemplateFile =
        serde_json::from_str(contents).map_err(|e| TemplateError::Json {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
    TemplateSet::from_raw(raw, None)
}

pub fn parse_toml(contents: &str) -> Result<TemplateSet, TemplateError> {
    let raw: RawTemplateFile = toml::from_str(contents).map_err(|e| TemplateError::Toml {
        path: PathBuf::from("<inline>"),
        source: e,
    })?;
    TemplateSet::from_raw(raw, None)
}

pub fn load_widget_config(path: &Path) -> Result<WidgetConfig, TemplateError> {
    let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::io(path, e))?;
    toml::from_str(&contents).map_err(|e| TemplateError::Toml {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn parse_widget_config(contents: &str) -> Result<WidgetConfig, TemplateError> {
    toml::from_str(contents).map_err(|e| TemplateError::Toml {
        path: PathBuf::from("<inline>"),
        source: e,
    })
}
