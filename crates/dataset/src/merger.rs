//! Technical/news/economic alignment and labelling.
//!
//! The technical table owns the timeline: news is reindexed onto its hours
//! and zero-filled, so a merge never adds rows.

use newsbar_core::config::MergeConfig;
use newsbar_core::rolling::nan_to_none;
use newsbar_core::{
    round_dp, Column, ColumnKind, Error, Frame, JoinKind, Result, TimePoint, CLOSE, CLOSE_PCT_CHANGE,
    DATETIME, TARGET,
};
use newsbar_ingestion::EconomicSeries;
use polars::prelude::{col, ClosedWindow, Duration, RollingOptionsDynamicWindow};
use std::collections::BTreeSet;
use tracing::{debug, info};

const PCT_CHANGE_DECIMALS: u32 = 6;

/// Aligns the per-source tables on the technical hours.
pub struct DatasetMerger {
    config: MergeConfig,
}

impl DatasetMerger {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Merge news and economic series onto `technical`, then label.
    ///
    /// Output is sorted by hour with one row per hour; when an hour repeats
    /// the last row wins.
    pub fn merge(
        &self,
        technical: &Frame,
        news: &Frame,
        economic: &[EconomicSeries],
    ) -> Result<Frame> {
        technical.require(&[DATETIME, CLOSE])?;

        let mut aligned = align_news(technical, news)?;
        if self.config.rolling_enabled {
            smooth_news(&mut aligned, self.config.rolling_hours)?;
        }

        let mut merged = technical.clone();
        merged.sort_by_time(DATETIME)?;
        let mut merged = merged.join(&aligned, &[DATETIME], JoinKind::Left)?;
        for series in economic {
            series.attach(&mut merged)?;
        }

        add_label(&mut merged)?;
        let merged = merged.dedup_keep_last(&[DATETIME])?;

        info!(
            rows = merged.len(),
            columns = merged.width(),
            news_columns = aligned.width().saturating_sub(1),
            economic = economic.len(),
            "merged dataset"
        );
        Ok(merged)
    }
}

/// Reindex `news` onto the distinct hours of `technical`, zero-filling
/// hours without news.
pub fn align_news(technical: &Frame, news: &Frame) -> Result<Frame> {
    news.require(&[DATETIME])?;
    let hours: BTreeSet<TimePoint> = technical.times(DATETIME)?.into_iter().flatten().collect();
    let timeline = Frame::from_columns(vec![(
        DATETIME,
        Column::Time(hours.into_iter().map(Some).collect()),
    )])?;

    let news = news.dedup_keep_last(&[DATETIME])?;
    let mut aligned = timeline.join(&news, &[DATETIME], JoinKind::Left)?;
    aligned.fill_numeric_nulls(0.0)?;
    debug!(hours = aligned.len(), news_hours = news.len(), "aligned news");
    Ok(aligned)
}

/// Replace every number column by its trailing mean over `(t - hours, t]`.
///
/// The window is measured in hours, not rows, so gaps in the timeline
/// shorten it. A window holding no valid value yields null.
pub fn smooth_news(frame: &mut Frame, hours: u32) -> Result<()> {
    if hours == 0 {
        return Err(Error::config("rolling news window must be at least one hour"));
    }
    frame.sort_by_time(DATETIME)?;
    let window = RollingOptionsDynamicWindow {
        window_size: Duration::parse(&format!("{hours}h")),
        min_periods: 1,
        closed_window: ClosedWindow::Right,
        fn_params: None,
    };
    let exprs = frame
        .names_of(ColumnKind::Number)?
        .iter()
        .map(|name| col(name.as_str()).rolling_mean_by(col(DATETIME), window.clone()))
        .collect();
    frame.with_exprs(exprs)
}

/// Add `target` (next close strictly higher) and `close_pct_change`.
///
/// Rows must already be in time order. The last row has no target.
pub fn add_label(frame: &mut Frame) -> Result<()> {
    let close = frame.numbers(CLOSE)?;
    let n = close.len();

    let target: Vec<Option<f64>> = (0..n)
        .map(|i| {
            let next = close.get(i + 1)?;
            let up = matches!((close[i], next), (Some(cur), Some(next)) if *next > cur);
            Some(if up { 1.0 } else { 0.0 })
        })
        .collect();
    let change: Vec<Option<f64>> = (0..n)
        .map(|i| match (i.checked_sub(1).and_then(|p| close[p]), close[i]) {
            (Some(prev), Some(cur)) => nan_to_none((cur - prev) / prev).map(|v| round_dp(v, PCT_CHANGE_DECIMALS)),
            _ => None,
        })
        .collect();

    frame.insert(TARGET, Column::Number(target))?;
    frame.insert(CLOSE_PCT_CHANGE, Column::Number(change))
}
