//! Technical indicators with masked, fill-only writes.
//!
//! Every indicator series is computed over the whole `close` column, but only
//! cells that are currently null are written. Re-running on a fully
//! populated table is a no-op.

use newsbar_core::config::IndicatorConfig;
use newsbar_core::rolling::{diff, ewm_mean, nan_to_none, rolling_mean};
use newsbar_core::{round_dp, Column, Error, Frame, Result, CLOSE};
use tracing::{debug, info};

pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_Signal";
pub const MACD_HIST: &str = "MACD_Hist";

/// Decimal places applied to freshly written indicator cells.
pub const INDICATOR_DECIMALS: u32 = 4;

/// Simple moving average, min periods 1.
pub fn sma(close: &[Option<f64>], period: usize) -> Result<Vec<Option<f64>>> {
    rolling_mean(close, period, 1)
}

/// RSI from simple rolling means of gains and losses.
///
/// A zero average loss with positive gains yields 100; a flat window (0/0)
/// yields null.
pub fn rsi(close: &[Option<f64>], period: usize) -> Result<Vec<Option<f64>>> {
    let delta = diff(close)?;
    let gain: Vec<Option<f64>> = delta
        .iter()
        .map(|d| Some(d.filter(|d| *d > 0.0).unwrap_or(0.0)))
        .collect();
    let loss: Vec<Option<f64>> = delta
        .iter()
        .map(|d| Some(d.filter(|d| *d < 0.0).map_or(0.0, |d| -d)))
        .collect();

    let avg_gain = rolling_mean(&gain, period, 1)?;
    let avg_loss = rolling_mean(&loss, period, 1)?;
    Ok(avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|pair| match pair {
            (Some(g), Some(l)) => nan_to_none(100.0 - 100.0 / (1.0 + g / l)),
            _ => None,
        })
        .collect())
}

/// MACD line, signal and histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

fn sub(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<Option<f64>> {
    a.iter()
        .zip(b)
        .map(|pair| match pair {
            (Some(x), Some(y)) => nan_to_none(x - y),
            _ => None,
        })
        .collect()
}

/// MACD from recursive EMAs (no warm-up adjustment).
pub fn macd(close: &[Option<f64>], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let line = sub(&ewm_mean(close, fast), &ewm_mean(close, slow));
    let signal = ewm_mean(&line, signal);
    let histogram = sub(&line, &signal);
    MacdSeries {
        line,
        signal,
        histogram,
    }
}

/// Write `candidates` into the null cells of `column`, rounded to
/// `decimals`; non-null cells are never touched.
///
/// The column is created all-null if absent. Returns the number of cells
/// written.
pub fn fill_missing(
    frame: &mut Frame,
    column: &str,
    candidates: &[Option<f64>],
    decimals: u32,
) -> Result<usize> {
    if candidates.len() != frame.len() {
        return Err(Error::schema(format!(
            "{} candidate values for '{column}', frame has {} rows",
            candidates.len(),
            frame.len()
        )));
    }
    let mut values = if frame.contains(column) {
        frame.numbers(column)?
    } else {
        vec![None; frame.len()]
    };

    let mut written = 0;
    for (cell, candidate) in values.iter_mut().zip(candidates) {
        if let (None, Some(value)) = (*cell, candidate) {
            *cell = Some(round_dp(*value, decimals));
            written += 1;
        }
    }
    frame.insert(column, Column::Number(values))?;
    Ok(written)
}

/// Back-fills SMA, RSI and MACD columns from `close`.
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Fill every enabled indicator column; returns the cells written.
    pub fn apply(&self, frame: &mut Frame) -> Result<usize> {
        let close = frame.numbers(CLOSE)?;
        let mut written = 0;

        if self.config.sma.enabled {
            for &period in &self.config.sma.periods {
                let n = fill_missing(frame, &format!("sma_{period}"), &sma(&close, period)?, INDICATOR_DECIMALS)?;
                debug!(period, filled = n, "sma");
                written += n;
            }
        }

        if self.config.rsi.enabled {
            for &period in &self.config.rsi.periods {
                let n = fill_missing(frame, &format!("rsi_{period}"), &rsi(&close, period)?, INDICATOR_DECIMALS)?;
                debug!(period, filled = n, "rsi");
                written += n;
            }
        }

        if self.config.macd.enabled {
            let m = &self.config.macd;
            let series = macd(&close, m.fast, m.slow, m.signal);
            written += fill_missing(frame, MACD, &series.line, INDICATOR_DECIMALS)?;
            written += fill_missing(frame, MACD_SIGNAL, &series.signal, INDICATOR_DECIMALS)?;
            written += fill_missing(frame, MACD_HIST, &series.histogram, INDICATOR_DECIMALS)?;
        }

        info!(cells = written, rows = frame.len(), "indicator gaps filled");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn closes(values: &[f64]) -> Frame {
        Frame::from_columns(vec![(
            CLOSE,
            Column::Number(values.iter().copied().map(Some).collect()),
        )])
        .unwrap()
    }

    #[test]
    fn test_rsi_known_value() {
        let out = rsi(&[Some(1.0), Some(2.0), Some(1.0), Some(2.0)], 3).unwrap();
        assert_eq!(out[0], None);
        // avg gain 2/3, avg loss 1/3
        assert_relative_eq!(out[3].unwrap(), 100.0 - 100.0 / 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rsi_monotonic_reaches_max() {
        let series: Vec<Option<f64>> = (1..=10).map(|x| Some(x as f64)).collect();
        let out = rsi(&series, 5).unwrap();
        assert!(out[1..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn test_rsi_flat_is_null() {
        let out = rsi(&[Some(5.0); 4], 3).unwrap();
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn test_macd_constant_series() {
        let m = macd(&[Some(10.0); 30], 12, 26, 9);
        for v in m.line.iter().chain(&m.histogram) {
            assert!(v.unwrap().abs() < 1e-10);
        }
    }

    #[test]
    fn test_macd_recursive_ema() {
        let close = [Some(1.0), Some(2.0)];
        let m = macd(&close, 1, 3, 1);
        // fast span 1 tracks the price, slow alpha 0.5: 1.0, 1.5
        assert_relative_eq!(m.line[1].unwrap(), 0.5);
        assert_relative_eq!(m.signal[1].unwrap(), 0.5);
        assert_relative_eq!(m.histogram[1].unwrap(), 0.0);
    }

    #[test]
    fn test_fill_missing_never_overwrites() {
        let mut frame = closes(&[1.0, 2.0, 3.0]);
        frame
            .insert("sma_2", Column::Number(vec![Some(42.0), None, None]))
            .unwrap();
        let n = fill_missing(&mut frame, "sma_2", &[Some(1.0), Some(1.23456), None], 4).unwrap();
        assert_eq!(n, 1);
        assert_eq!(frame.numbers("sma_2").unwrap(), &[Some(42.0), Some(1.2346), None]);
    }

    #[test]
    fn test_fill_missing_creates_column() {
        let mut frame = closes(&[1.0, 2.0]);
        fill_missing(&mut frame, "rsi_5", &[None, Some(50.0)], 4).unwrap();
        assert_eq!(frame.numbers("rsi_5").unwrap(), &[None, Some(50.0)]);
        assert!(fill_missing(&mut frame, "rsi_5", &[None], 4).is_err());
    }

    #[test]
    fn test_engine_idempotent() {
        let engine = IndicatorEngine::new(&IndicatorConfig::default());
        let mut once = closes(&[10.0, 11.0, 10.5, 12.0, 12.5, 11.0, 13.0]);
        let first = engine.apply(&mut once).unwrap();
        assert!(first > 0);

        let mut twice = once.clone();
        assert_eq!(engine.apply(&mut twice).unwrap(), 0);
        assert_eq!(once, twice);
        for name in ["sma_5", "sma_10", "sma_12", "rsi_5", "rsi_7", "rsi_9", MACD, MACD_SIGNAL, MACD_HIST] {
            assert!(once.contains(name), "{name}");
        }
    }

    #[test]
    fn test_engine_backfills_only_gaps() {
        let engine = IndicatorEngine::new(&IndicatorConfig::default());
        let mut frame = closes(&[10.0, 20.0, 30.0]);
        frame
            .insert("sma_5", Column::Number(vec![Some(-1.0), None, Some(-3.0)]))
            .unwrap();
        engine.apply(&mut frame).unwrap();
        // row 1 uses the full column for context: mean(10, 20)
        assert_eq!(frame.numbers("sma_5").unwrap(), &[Some(-1.0), Some(15.0), Some(-3.0)]);
    }

    #[test]
    fn test_engine_requires_close() {
        let engine = IndicatorEngine::new(&IndicatorConfig::default());
        let mut frame = Frame::from_columns(vec![("open", Column::Number(vec![Some(1.0)]))]).unwrap();
        assert!(matches!(engine.apply(&mut frame), Err(Error::Schema(_))));
    }
}
