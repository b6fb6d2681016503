//! Post-merge feature derivation.
//!
//! Runs on the merged hourly table, in order:
//! 1. Per-column transforms (lags, then moving averages, then differences)
//! 2. Cyclical time encoding
//! 3. Advanced price/volume features
//! 4. Column pruning
//! 5. Integrity check and class-balance report
//!
//! Each step is toggled by [`FeatureConfig`]. Transform targets are checked
//! against the schema before anything is written.

use newsbar_core::config::{AdvancedFeatureConfig, ColumnTransform, FeatureConfig};
use newsbar_core::rolling::{cumsum, diff, nan_to_none, pct_change, rolling_mean, round_all, shift};
use newsbar_core::{Column, ColumnKind, Error, Frame, Result, TimePoint, CLOSE, DATETIME, TARGET};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

use crate::indicators::MACD;

/// Columns that also get a rounded percentage change next to their diff.
const PCT_CHANGE_COLUMNS: [&str; 3] = [CLOSE, "volume", MACD];

const PCT_CHANGE_DECIMALS: u32 = 6;
const ADVANCED_DECIMALS: u32 = 4;

/// Window of the volume-ratio and closing moving average features.
const SHORT_WINDOW: usize = 5;

/// Number of `close_prev_*` columns.
const PREVIOUS_HOURS: usize = 5;

/// Ticker sentiment columns, in order of preference.
const SENTIMENT_SOURCES: [&str; 2] = ["w_ticker_ssm", "avg_ticker_ssm"];

/// Label distribution after the integrity check.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBalance {
    pub positives: usize,
    pub negatives: usize,
    /// Share of the smaller class, in `[0, 0.5]`.
    pub minority_share: f64,
    /// Threshold the share was compared against, if one is configured.
    pub threshold: Option<f64>,
    /// True when the minority share is below the threshold.
    pub needs_rebalancing: bool,
}

impl ClassBalance {
    /// Count the 0/1 labels; `None` when nothing is labelled.
    pub fn from_labels(labels: &[Option<f64>], threshold: Option<f64>) -> Option<Self> {
        let positives = labels.iter().filter(|v| **v == Some(1.0)).count();
        let negatives = labels.iter().filter(|v| **v == Some(0.0)).count();
        let total = positives + negatives;
        if total == 0 {
            return None;
        }
        let minority_share = positives.min(negatives) as f64 / total as f64;
        Some(Self {
            positives,
            negatives,
            minority_share,
            threshold,
            needs_rebalancing: threshold.is_some_and(|t| minority_share < t),
        })
    }
}

/// Output of [`FeatureDeriver::derive`].
#[derive(Debug, Clone)]
pub struct DerivedFeatures {
    pub frame: Frame,
    /// `None` when the table has no labelled rows.
    pub balance: Option<ClassBalance>,
}

/// Adds derived columns to the merged table.
pub struct FeatureDeriver {
    config: FeatureConfig,
}

impl FeatureDeriver {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Every configured transform target must exist and be numeric.
    pub fn validate_schema(&self, frame: &Frame) -> Result<()> {
        for name in self.config.transforms.keys() {
            let kind = frame.kind(name)?;
            if kind != ColumnKind::Number {
                return Err(Error::schema(format!(
                    "transform target '{name}' is a {kind} column, expected number"
                )));
            }
        }
        Ok(())
    }

    pub fn derive(&self, frame: Frame) -> Result<DerivedFeatures> {
        self.validate_schema(&frame)?;
        let mut frame = frame;
        let width = frame.width();

        self.apply_transforms(&mut frame)?;
        if self.config.encode_temporal {
            encode_temporal(&mut frame)?;
        }
        add_advanced(&mut frame, &self.config.advanced)?;
        self.prune(&mut frame)?;
        if self.config.drop_null_rows {
            frame = drop_null_rows(&frame)?;
        }

        let balance = if frame.contains(TARGET) {
            ClassBalance::from_labels(&frame.numbers(TARGET)?, self.config.min_class_share)
        } else {
            None
        };
        if let Some(b) = balance.as_ref().filter(|b| b.needs_rebalancing) {
            warn!(
                minority_share = b.minority_share,
                threshold = ?b.threshold,
                "label imbalance, rebalance before training"
            );
        }

        info!(
            rows = frame.len(),
            columns_in = width,
            columns_out = frame.width(),
            "features derived"
        );
        Ok(DerivedFeatures { frame, balance })
    }

    /// Lags for every column first, then moving averages, then diffs.
    ///
    /// All transforms read the column as it was before this step.
    fn apply_transforms(&self, frame: &mut Frame) -> Result<()> {
        let sources: Vec<(&String, Vec<Option<f64>>)> = self
            .config
            .transforms
            .keys()
            .map(|name| -> Result<(&String, Vec<Option<f64>>)> {
                Ok((name, frame.numbers(name)?))
            })
            .collect::<Result<_>>()?;
        let transforms_of = |name: &String| self.config.transforms.get(name).into_iter().flatten();

        for (name, values) in &sources {
            for transform in transforms_of(*name) {
                if let ColumnTransform::Lag { steps } = transform {
                    for &k in steps {
                        frame.insert(format!("{name}_lag{k}"), Column::Number(shift(values, k as isize)?))?;
                    }
                }
            }
        }
        for (name, values) in &sources {
            for transform in transforms_of(*name) {
                if let ColumnTransform::MovingAverage { windows } = transform {
                    for &w in windows {
                        frame.insert(format!("{name}_ma{w}"), Column::Number(rolling_mean(values, w, w)?))?;
                    }
                }
            }
        }
        for (name, values) in &sources {
            if transforms_of(*name).any(|t| *t == ColumnTransform::Diff) {
                frame.insert(format!("{name}_diff"), Column::Number(diff(values)?))?;
                if PCT_CHANGE_COLUMNS.contains(&name.as_str()) {
                    let change = round_all(&pct_change(values)?, PCT_CHANGE_DECIMALS);
                    frame.insert(format!("{name}_pct_change"), Column::Number(change))?;
                }
            }
        }
        debug!(columns = sources.len(), "column transforms applied");
        Ok(())
    }

    fn prune(&self, frame: &mut Frame) -> Result<()> {
        for name in &self.config.drop_columns {
            if !frame.remove(name) {
                debug!(column = %name, "drop requested for absent column");
            }
        }
        if !self.config.columns_to_keep.is_empty() {
            let keep: Vec<&str> = self.config.columns_to_keep.iter().map(String::as_str).collect();
            frame.require(&keep)?;
            let extra: Vec<String> = frame
                .names()
                .iter()
                .filter(|n| !keep.contains(&n.as_str()))
                .cloned()
                .collect();
            for name in extra {
                frame.remove(&name);
            }
        }
        Ok(())
    }
}

fn hours_of(frame: &Frame) -> Result<Vec<Option<TimePoint>>> {
    frame.times(DATETIME)
}

/// `hour_sin`/`hour_cos` over a 24-hour period and one-hot
/// `day_of_week_0..6` (Monday = 0).
pub fn encode_temporal(frame: &mut Frame) -> Result<()> {
    let times = hours_of(frame)?;
    let angle = |t: &TimePoint| 2.0 * PI * t.hour() as f64 / 24.0;

    let sin = times.iter().map(|t| t.as_ref().map(|t| angle(t).sin())).collect();
    let cos = times.iter().map(|t| t.as_ref().map(|t| angle(t).cos())).collect();
    frame.insert("hour_sin", Column::Number(sin))?;
    frame.insert("hour_cos", Column::Number(cos))?;

    for day in 0..7 {
        let one_hot = times
            .iter()
            .map(|t| t.map(|t| if t.weekday() == day { 1.0 } else { 0.0 }))
            .collect();
        frame.insert(format!("day_of_week_{day}"), Column::Number(one_hot))?;
    }
    Ok(())
}

fn ratio(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<Option<f64>> {
    a.iter()
        .zip(b)
        .map(|pair| match pair {
            (Some(x), Some(y)) => nan_to_none(x / y),
            _ => None,
        })
        .collect()
}

/// Price and volume features, each behind its own toggle.
pub fn add_advanced(frame: &mut Frame, config: &AdvancedFeatureConfig) -> Result<()> {
    if config.intraday_volatility {
        let spread: Vec<Option<f64>> = frame
            .numbers("high")?
            .iter()
            .zip(frame.numbers("low")?)
            .map(|pair| match pair {
                (Some(h), Some(l)) => Some(h - l),
                _ => None,
            })
            .collect();
        frame.insert("intraday_volatility", Column::Number(round_all(&spread, ADVANCED_DECIMALS)))?;
    }
    if config.volume_ratio {
        let volume = frame.numbers("volume")?;
        let values = ratio(&volume, &rolling_mean(&volume, SHORT_WINDOW, 1)?);
        frame.insert("volume_ratio", Column::Number(round_all(&values, ADVANCED_DECIMALS)))?;
    }
    if config.price_trend {
        let trend = round_all(&pct_change(&frame.numbers(CLOSE)?)?, ADVANCED_DECIMALS);
        frame.insert("price_trend", Column::Number(trend))?;
    }
    if config.previous_hours_close {
        let close = frame.numbers(CLOSE)?;
        for i in 1..=PREVIOUS_HOURS {
            frame.insert(format!("close_prev_{i}"), Column::Number(shift(&close, i as isize)?))?;
        }
    }
    if config.monthly_cycle {
        let days = hours_of(frame)?.iter().map(|t| t.map(|t| t.day() as f64)).collect();
        frame.insert("month_cycle", Column::Number(days))?;
    }
    if config.yearly_cycle {
        let quarters = hours_of(frame)?.iter().map(|t| t.map(|t| t.quarter() as f64)).collect();
        frame.insert("yearly_cycle", Column::Number(quarters))?;
    }
    if config.closing_moving_avg {
        let avg = round_all(&rolling_mean(&frame.numbers(CLOSE)?, SHORT_WINDOW, 1)?, ADVANCED_DECIMALS);
        frame.insert("closing_moving_avg", Column::Number(avg))?;
    }
    if config.cumulative_change_in_volume {
        let total = round_all(&cumsum(&frame.numbers("volume")?)?, ADVANCED_DECIMALS);
        frame.insert("cumulative_change_in_volume", Column::Number(total))?;
    }
    if config.sentiment_interaction {
        add_sentiment_interactions(frame)?;
    }
    Ok(())
}

fn product(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<Option<f64>> {
    a.iter()
        .zip(b)
        .map(|pair| match pair {
            (Some(x), Some(y)) => nan_to_none(x * y),
            _ => None,
        })
        .collect()
}

/// `sentiment_price_interaction` and `sentiment_volume_interaction`.
///
/// Ticker sentiment comes from `w_ticker_ssm`, else `avg_ticker_ssm`. Each
/// column is only written when both of its inputs are present.
fn add_sentiment_interactions(frame: &mut Frame) -> Result<()> {
    let Some(source) = SENTIMENT_SOURCES.into_iter().find(|n| frame.contains(n)) else {
        debug!("no ticker sentiment column, interactions skipped");
        return Ok(());
    };
    let sentiment = frame.numbers(source)?;
    for (other, name) in [
        ("price_trend", "sentiment_price_interaction"),
        ("volume", "sentiment_volume_interaction"),
    ] {
        if frame.contains(other) {
            let values = product(&sentiment, &frame.numbers(other)?);
            frame.insert(name, Column::Number(values))?;
        }
    }
    Ok(())
}

/// Keep only rows without a null cell.
pub fn drop_null_rows(frame: &Frame) -> Result<Frame> {
    let kept = frame.drop_nulls()?;
    let dropped = frame.len() - kept.len();
    if dropped > 0 {
        info!(dropped, "removed rows with null cells");
    }
    Ok(kept)
}
