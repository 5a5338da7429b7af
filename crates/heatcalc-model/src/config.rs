//! Widget configuration handed to a session at construction time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the widget runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetMode {
    /// Regular page embed: every load starts from a clean slate.
    #[default]
    Hosted,
    /// Offline/embedded widget: reloads keep the in-memory session.
    Embedded,
}

/// Status given to the previously active card when another card is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionPolicy {
    #[default]
    Unlocked,
    Complete,
}

/// Which card's `reveal_timing` governs a sequential reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSource {
    /// The card being revealed, unless the previous card auto-completed on
    /// reveal; then that card's timing paces the next one.
    #[default]
    Cascade,
    /// Always the card being revealed.
    Target,
    /// Always the card that just completed.
    Predecessor,
}

/// Display format for numeric results: `1.234,5 kWh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormat {
    pub thousands_separator: char,
    pub decimal_separator: char,
    pub default_decimals: u32,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            thousands_separator: '.',
            decimal_separator: ',',
            default_decimals: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub mode: WidgetMode,
    pub activation_demotion: DemotionPolicy,
    pub timing_source: TimingSource,
    /// Debounce window for field-driven recalculation; 0 recalculates inline.
    pub recalc_debounce_ms: u64,
    pub number_format: NumberFormat,
}

impl WidgetConfig {
    pub fn embedded() -> Self {
        Self {
            mode: WidgetMode::Embedded,
            ..Self::default()
        }
    }

    pub fn with_demotion(mut self, policy: DemotionPolicy) -> Self {
        self.activation_demotion = policy;
        self
    }

    pub fn with_timing_source(mut self, source: TimingSource) -> Self {
        self.timing_source = source;
        self
    }

    pub fn with_recalc_debounce(mut self, debounce: Duration) -> Self {
        self.recalc_debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn recalc_debounce(&self) -> Duration {
        Duration::from_millis(self.recalc_debounce_ms)
    }
}
