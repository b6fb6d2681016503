//! Configuration structures for the newsbar pipeline.
//!
//! Every section and key is required when loading from JSON: a missing key is
//! a configuration error, never a silent `false`. `Default` reproduces the
//! reference settings for programmatic use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration for the dataset pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Timeline reconstruction.
    pub time_grid: TimeGridConfig,
    /// Technical indicators to back-fill.
    pub indicators: IndicatorConfig,
    /// Missing-value correction passes.
    pub correction: CorrectionConfig,
    /// News aggregation tracks.
    pub news: NewsConfig,
    /// Technical/news merge.
    pub merge: MergeConfig,
    /// Post-merge feature engineering.
    pub features: FeatureConfig,
}

impl Config {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicators;
        if ind.sma.periods.contains(&0) || ind.rsi.periods.contains(&0) {
            return Err(Error::config("indicator periods must be positive"));
        }
        if ind.macd.enabled {
            let m = &ind.macd;
            if m.fast == 0 || m.slow == 0 || m.signal == 0 {
                return Err(Error::config("MACD spans must be positive"));
            }
            if m.fast >= m.slow {
                return Err(Error::config(format!(
                    "MACD fast span {} must be shorter than slow span {}",
                    m.fast, m.slow
                )));
            }
        }
        if self.merge.rolling_enabled && self.merge.rolling_hours == 0 {
            return Err(Error::config("rolling news window must be at least one hour"));
        }
        for (column, transforms) in &self.features.transforms {
            for transform in transforms {
                match transform {
                    ColumnTransform::Lag { steps } if steps.is_empty() || steps.contains(&0) => {
                        return Err(Error::config(format!("lag steps for '{column}' must be positive")));
                    }
                    ColumnTransform::MovingAverage { windows }
                        if windows.is_empty() || windows.contains(&0) =>
                    {
                        return Err(Error::config(format!("windows for '{column}' must be positive")));
                    }
                    _ => {}
                }
            }
        }
        if let Some(share) = self.features.min_class_share {
            if !(share > 0.0 && share <= 0.5) {
                return Err(Error::config(format!(
                    "min_class_share must be in (0, 0.5], got {share}"
                )));
            }
        }
        Ok(())
    }
}

/// How to treat hours strictly between a day's first and last observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteriorHours {
    /// Leave the gap; no row is created.
    Skip,
    /// Insert a key-only row with null measurements for later correction.
    NullRow,
}

/// Timeline reconstruction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeGridConfig {
    /// Derive year/month/day/time columns from `datetime`.
    pub date_split: bool,
    /// Synthesize whole missing days from the prior day's last row.
    pub fill_missing_days: bool,
    /// Pad each observed day out to 24 hours.
    pub fill_missing_hours: bool,
    /// Interior-gap policy used by hour filling.
    pub interior_hours: InteriorHours,
    /// Add day-of-week, weekend and market-session flags.
    pub add_temporal_features: bool,
    /// Add an `is_synthetic` flag column marking gap-filled rows.
    pub track_provenance: bool,
}

impl Default for TimeGridConfig {
    fn default() -> Self {
        Self {
            date_split: true,
            fill_missing_days: true,
            fill_missing_hours: true,
            interior_hours: InteriorHours::NullRow,
            add_temporal_features: false,
            track_provenance: false,
        }
    }
}

/// A rolling indicator computed over a list of periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodIndicator {
    pub enabled: bool,
    pub periods: Vec<usize>,
}

/// MACD spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacdConfig {
    pub enabled: bool,
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// Technical indicator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorConfig {
    pub sma: PeriodIndicator,
    pub rsi: PeriodIndicator,
    pub macd: MacdConfig,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma: PeriodIndicator {
                enabled: true,
                periods: vec![5, 10, 12],
            },
            rsi: PeriodIndicator {
                enabled: true,
                periods: vec![5, 7, 9],
            },
            macd: MacdConfig {
                enabled: true,
                fast: 12,
                slow: 26,
                signal: 9,
            },
        }
    }
}

/// Missing-value correction passes, applied in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionConfig {
    pub forward_fill: bool,
    pub backward_fill: bool,
    pub moving_average: bool,
    pub mark_incomplete_days: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            forward_fill: true,
            backward_fill: true,
            moving_average: false,
            mark_incomplete_days: true,
        }
    }
}

/// News aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewsConfig {
    /// Relevance-weighted ticker averages (`w_ticker_*`).
    pub weight_ticker_value: bool,
    /// Plain ticker averages (`avg_ticker_*`).
    pub average_ticker_value: bool,
    /// Cross-ticker `global_score` / `ticker_score`.
    pub global_metrics: bool,
    /// Topic slug -> enabled.
    pub topics: BTreeMap<String, bool>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        let topics = [
            "technology",
            "blockchain",
            "financial_markets",
            "economy_macro",
            "economy_monetary",
            "economy_fiscal",
        ]
        .into_iter()
        .map(|t| (t.to_string(), true))
        .collect();

        Self {
            weight_ticker_value: true,
            average_ticker_value: false,
            global_metrics: false,
            topics,
        }
    }
}

impl NewsConfig {
    /// Enabled topic slugs in deterministic (sorted) order.
    pub fn enabled_topics(&self) -> impl Iterator<Item = &str> {
        self.topics
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(topic, _)| topic.as_str())
    }
}

/// Technical/news merge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Smooth news columns with a trailing time window.
    pub rolling_enabled: bool,
    /// Window length in hours.
    pub rolling_hours: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            rolling_enabled: false,
            rolling_hours: 3,
        }
    }
}

/// Per-column transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnTransform {
    /// `{col}_lag{k}` for each step.
    Lag { steps: Vec<usize> },
    /// `{col}_ma{w}` for each window.
    MovingAverage { windows: Vec<usize> },
    /// `{col}_diff` (and `{col}_pct_change` for close/volume/MACD).
    Diff,
    /// Explicitly untouched.
    None,
}

/// Advanced derived columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdvancedFeatureConfig {
    pub intraday_volatility: bool,
    pub volume_ratio: bool,
    pub price_trend: bool,
    pub previous_hours_close: bool,
    pub monthly_cycle: bool,
    pub yearly_cycle: bool,
    pub closing_moving_avg: bool,
    pub cumulative_change_in_volume: bool,
    /// Ticker sentiment times `price_trend` and times `volume`.
    #[serde(default)]
    pub sentiment_interaction: bool,
}

/// Post-merge feature engineering configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    /// Column -> transforms, checked against the merged schema.
    pub transforms: BTreeMap<String, Vec<ColumnTransform>>,
    /// Hour sine/cosine and day-of-week one-hot columns.
    pub encode_temporal: bool,
    pub advanced: AdvancedFeatureConfig,
    /// Columns removed before the integrity check.
    pub drop_columns: Vec<String>,
    /// If non-empty, only these columns are kept.
    pub columns_to_keep: Vec<String>,
    /// Drop rows that still hold a null.
    pub drop_null_rows: bool,
    /// Minority-class share below which rebalancing is flagged. No default.
    pub min_class_share: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.indicators.sma.periods, vec![5, 10, 12]);
        assert_eq!(config.indicators.macd.slow, 26);
        assert!(config.correction.forward_fill);
        assert!(config.features.min_class_share.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        let parsed = Config::from_json_str(&json).unwrap();
        assert_eq!(parsed.news.enabled_topics().count(), 6);
    }

    #[test]
    fn test_missing_key_fails() {
        let mut value = serde_json::to_value(Config::default()).unwrap();
        value["correction"]
            .as_object_mut()
            .unwrap()
            .remove("backward_fill");
        let err = Config::from_json_str(&value.to_string());
        assert!(matches!(err, Err(Error::Json(_))));
    }

    #[test]
    fn test_transform_tags() {
        let json = r#"{"close": [{"kind": "lag", "steps": [1, 2]}, {"kind": "diff"}]}"#;
        let parsed: BTreeMap<String, Vec<ColumnTransform>> = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed["close"],
            vec![ColumnTransform::Lag { steps: vec![1, 2] }, ColumnTransform::Diff]
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.indicators.macd.fast = 30;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.features.min_class_share = Some(0.7);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.merge.rolling_enabled = true;
        config.merge.rolling_hours = 0;
        assert!(config.validate().is_err());
    }
}
