//! Whole-column window kernels over nullable series.
//!
//! Every kernel runs over the full column and returns a new vector of the
//! same length. A `NaN` result is reported as `None`; infinities pass through.
//! Windowed kernels run as polars expressions; the exponential mean keeps its
//! own recursion.

use polars::prelude::{
    col, df, lit, DataType, Expr, FillNullStrategy, IntoLazy, NamedFrom, RollingOptionsFixedWindow,
    Series,
};

use crate::error::Result;
use crate::types::round_dp;

const VALUES: &str = "values";

/// Map a computed `NaN` to the null marker.
#[inline]
pub fn nan_to_none(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// Evaluate `expr` over a one-column frame holding `values`.
fn eval(values: &[Option<f64>], expr: Expr) -> Result<Vec<Option<f64>>> {
    let frame = df!(VALUES => values)?;
    let out = frame.lazy().select([expr.alias(VALUES)]).collect()?;
    let series = out
        .column(VALUES)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.and_then(nan_to_none))
        .collect())
}

/// Trailing mean over `window` rows.
///
/// Null cells are skipped; a window with fewer than `min_periods` valid cells
/// yields null.
pub fn rolling_mean(values: &[Option<f64>], window: usize, min_periods: usize) -> Result<Vec<Option<f64>>> {
    let window = window.max(1);
    let options = RollingOptionsFixedWindow {
        window_size: window,
        min_periods: min_periods.clamp(1, window),
        ..Default::default()
    };
    eval(values, col(VALUES).rolling_mean(options))
}

/// Exponential mean with `a = 2/(span+1)` and no warm-up adjustment.
///
/// `ema[0] = x[0]`, `ema[t] = a*x[t] + (1-a)*ema[t-1]`. Weights follow row
/// position: a run of `k` nulls before `x[t]` decays the previous mean by
/// `(1-a)^(k+1)` and the result is renormalised. Leading nulls stay null;
/// later nulls repeat the previous mean.
pub fn ewm_mean(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut state: Option<f64> = None;
    let mut decay = 1.0;
    values
        .iter()
        .map(|value| {
            match (state, value) {
                (Some(prev), value) => {
                    decay *= 1.0 - alpha;
                    if let Some(x) = value {
                        state = Some((decay * prev + alpha * x) / (decay + alpha));
                        decay = 1.0;
                    }
                }
                (None, Some(x)) => state = Some(*x),
                (None, None) => {}
            }
            state.and_then(nan_to_none)
        })
        .collect()
}

/// Shift by `steps` rows; positive moves values later (a lag).
pub fn shift(values: &[Option<f64>], steps: isize) -> Result<Vec<Option<f64>>> {
    eval(values, col(VALUES).shift(lit(steps as i64)))
}

/// First difference `x[t] - x[t-1]`.
pub fn diff(values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    eval(values, col(VALUES) - col(VALUES).shift(lit(1)))
}

/// One-step relative change after forward-filling gaps.
pub fn pct_change(values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    let padded = Series::new(VALUES.into(), values).fill_null(FillNullStrategy::Forward(None))?;
    let padded: Vec<Option<f64>> = padded.f64()?.into_iter().collect();
    eval(&padded, col(VALUES) / col(VALUES).shift(lit(1)) - lit(1.0))
}

/// Running sum; null cells stay null and do not reset the total.
pub fn cumsum(values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    eval(values, col(VALUES).cum_sum(false))
}

/// Round every valid cell.
pub fn round_all(values: &[Option<f64>], decimals: u32) -> Vec<Option<f64>> {
    values.iter().map(|v| v.map(|x| round_dp(x, decimals))).collect()
}
