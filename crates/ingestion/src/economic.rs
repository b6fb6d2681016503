//! Monthly macroeconomic series.
//!
//! A value published for month M is attributed to month M+1 so that no hour
//! sees a figure before it was released.

use chrono::NaiveDate;
use newsbar_core::{Column, Frame, Result, YearMonth, DATETIME};
use std::collections::BTreeMap;
use tracing::warn;

/// One named monthly series keyed by the month it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicSeries {
    name: String,
    values: BTreeMap<YearMonth, f64>,
}

impl EconomicSeries {
    /// Build from dated observations, shifting each one month forward.
    ///
    /// If two observations land in the same month the later one in input
    /// order wins.
    pub fn from_observations(
        name: impl Into<String>,
        observations: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        let values = observations
            .into_iter()
            .map(|(date, value)| (YearMonth::from(date).next(), value))
            .collect();
        Self {
            name: name.into(),
            values,
        }
    }

    /// Output column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value attributed to `month`, if any.
    pub fn value_for(&self, month: YearMonth) -> Option<f64> {
        self.values.get(&month).copied()
    }

    /// Add a column named after the series, looked up by each row's month.
    ///
    /// Rows in months without a value stay null.
    pub fn attach(&self, frame: &mut Frame) -> Result<()> {
        let column: Vec<Option<f64>> = frame
            .times(DATETIME)?
            .iter()
            .map(|t| t.and_then(|t| self.value_for(t.year_month())))
            .collect();
        let missing = column.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            warn!(series = %self.name, rows = missing, "no economic value for some rows");
        }
        frame.insert(self.name.as_str(), Column::Number(column))
    }
}
