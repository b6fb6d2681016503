//! Missing-value correction passes for the technical table.
//!
//! Passes run in a fixed order (forward fill, backward fill, rolling-mean
//! fill, incomplete-row removal) and each one only touches null cells or
//! rows that still hold one.

use newsbar_core::config::CorrectionConfig;
use newsbar_core::{Column, ColumnKind, Frame, Result};
use polars::prelude::{col, RollingOptionsFixedWindow};
use tracing::info;

/// Flag column added by [`CorrectionPipeline::mark_incomplete_days`].
pub const IS_INCOMPLETE: &str = "is_incomplete";

/// Window of the rolling-mean fill.
const MOVING_AVERAGE_WINDOW: usize = 5;

/// Applies the configured correction passes in place.
pub struct CorrectionPipeline {
    config: CorrectionConfig,
}

impl CorrectionPipeline {
    pub fn new(config: &CorrectionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Run every enabled pass. Errors propagate uncorrected.
    pub fn apply(&self, frame: &mut Frame) -> Result<()> {
        if self.config.forward_fill {
            Self::forward_fill(frame)?;
        }
        if self.config.backward_fill {
            Self::backward_fill(frame)?;
        }
        if self.config.moving_average {
            Self::moving_average(frame)?;
        }
        if self.config.mark_incomplete_days {
            Self::mark_incomplete_days(frame)?;
        }
        Ok(())
    }

    /// Propagate the last valid value forward in every column.
    pub fn forward_fill(frame: &mut Frame) -> Result<()> {
        frame.fill_forward()
    }

    /// Propagate the next valid value backward in every column.
    pub fn backward_fill(frame: &mut Frame) -> Result<()> {
        frame.fill_backward()
    }

    /// Fill remaining numeric nulls with a 5-row trailing mean of the
    /// column's current values.
    pub fn moving_average(frame: &mut Frame) -> Result<()> {
        let window = RollingOptionsFixedWindow {
            window_size: MOVING_AVERAGE_WINDOW,
            min_periods: 1,
            ..Default::default()
        };
        let exprs = frame
            .names_of(ColumnKind::Number)?
            .iter()
            .map(|name| col(name.as_str()).fill_null(col(name.as_str()).rolling_mean(window.clone())))
            .collect();
        frame.with_exprs(exprs)
    }

    /// Flag rows that still hold a null, then drop them.
    pub fn mark_incomplete_days(frame: &mut Frame) -> Result<usize> {
        let flags = frame.null_rows();
        frame.insert(IS_INCOMPLETE, Column::Flag(flags))?;
        Self::remove_incomplete_records(frame)
    }

    /// Drop flagged rows and the flag column; returns the number removed.
    ///
    /// Without the flag column the frame is left unchanged.
    pub fn remove_incomplete_records(frame: &mut Frame) -> Result<usize> {
        if !frame.contains(IS_INCOMPLETE) {
            info!("column '{IS_INCOMPLETE}' not present; no records or columns removed");
            return Ok(0);
        }
        let keep: Vec<bool> = frame.flags(IS_INCOMPLETE)?.iter().map(|f| !f).collect();
        let before = frame.len();
        *frame = frame.filter(&keep)?;
        frame.remove(IS_INCOMPLETE);

        let removed = before - frame.len();
        info!(removed, "removed incomplete records");
        Ok(removed)
    }
}
