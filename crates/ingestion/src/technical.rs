//! Technical table ingestion helpers.

use newsbar_core::{Error, Frame, JoinKind, Result, DATETIME, TICKER};
use tracing::debug;

/// The single ticker of a technical table.
///
/// Fails with a cardinality error when the table holds zero or several
/// distinct tickers.
pub fn target_ticker(frame: &Frame) -> Result<String> {
    let mut tickers = frame.distinct_texts(TICKER)?;
    match tickers.len() {
        1 => Ok(tickers.remove(0)),
        n => Err(Error::cardinality(format!(
            "expected exactly one ticker in technical table, found {n}: {tickers:?}"
        ))),
    }
}

/// Append `current` to `historical`, keeping the newest row per
/// (ticker, datetime).
pub fn combine(historical: &Frame, current: &Frame) -> Result<Frame> {
    let mut all = historical.clone();
    all.concat(current)?;
    all.dedup_keep_last(&[TICKER, DATETIME])
}

/// Pivot a long indicator table into one `{name}_{period}` column per
/// requested period and left-join each onto `frame` by (ticker, datetime).
///
/// `long` holds `ticker`, `datetime`, `period` and a value column named
/// `name`.
pub fn attach_period_indicator(
    frame: &Frame,
    long: &Frame,
    name: &str,
    periods: &[usize],
) -> Result<Frame> {
    long.require(&[TICKER, DATETIME, "period", name])?;
    let period_col = long.numbers("period")?;

    let mut out = frame.clone();
    for &period in periods {
        let keep: Vec<bool> = period_col
            .iter()
            .map(|p| *p == Some(period as f64))
            .collect();
        let mut slice = long.filter(&keep)?;
        let column = format!("{name}_{period}");
        slice.rename(name, &column)?;
        out = attach_columns(&out, &slice, &[column.as_str()])?;
    }
    Ok(out)
}

/// Left-join `columns` of `right` onto `left` by (ticker, datetime).
///
/// Left rows keep their order. When a key repeats on the right, the last
/// row wins.
pub fn attach_columns(left: &Frame, right: &Frame, columns: &[&str]) -> Result<Frame> {
    const KEYS: [&str; 2] = [TICKER, DATETIME];
    left.require(&KEYS)?;
    if let Some(dup) = columns.iter().find(|c| left.contains(c)) {
        return Err(Error::schema(format!("column '{dup}' already present")));
    }

    let wanted: Vec<&str> = KEYS.iter().chain(columns).copied().collect();
    let right = right.select(&wanted)?.dedup_keep_last(&KEYS)?;
    let out = left.join(&right, &KEYS, JoinKind::Left)?;

    debug!(rows = out.len(), right_rows = right.len(), ?columns, "attached columns");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsbar_core::{Column, TimePoint};

    fn tp(hour: u32) -> Option<TimePoint> {
        TimePoint::from_ymdh(2024, 3, 4, hour)
    }

    fn quotes(tickers: &[&str], closes: &[f64]) -> Frame {
        Frame::from_columns(vec![
            (
                TICKER,
                Column::Text(tickers.iter().map(|t| Some(t.to_string())).collect()),
            ),
            (
                DATETIME,
                Column::Time((0..closes.len() as u32).map(tp).collect()),
            ),
            ("close", Column::Number(closes.iter().copied().map(Some).collect())),
        ])
        .unwrap()
    }

    #[test]
    fn test_target_ticker() {
        assert_eq!(target_ticker(&quotes(&["NVDA", "NVDA"], &[1.0, 2.0])).unwrap(), "NVDA");
        assert!(matches!(
            target_ticker(&quotes(&["NVDA", "AMD"], &[1.0, 2.0])),
            Err(Error::Cardinality(_))
        ));
        assert!(matches!(
            target_ticker(&quotes(&[], &[])),
            Err(Error::Cardinality(_))
        ));
    }

    #[test]
    fn test_target_ticker_requires_column() {
        let frame = Frame::from_columns(vec![("close", Column::Number(vec![Some(1.0)]))]).unwrap();
        assert!(matches!(target_ticker(&frame), Err(Error::Schema(_))));
    }

    #[test]
    fn test_combine_newest_wins() {
        let historical = quotes(&["NVDA", "NVDA"], &[1.0, 2.0]);
        let current = quotes(&["NVDA"], &[9.0]);
        let combined = combine(&historical, &current).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.numbers("close").unwrap(), &[Some(2.0), Some(9.0)]);
    }

    #[test]
    fn test_attach_period_indicator() {
        let frame = quotes(&["NVDA", "NVDA", "NVDA"], &[1.0, 2.0, 3.0]);
        let long = Frame::from_columns(vec![
            (TICKER, Column::Text(vec![Some("NVDA".into()); 3])),
            (DATETIME, Column::Time(vec![tp(0), tp(2), tp(0)])),
            ("period", Column::Number(vec![Some(20.0), Some(20.0), Some(50.0)])),
            ("RSI", Column::Number(vec![Some(40.0), Some(60.0), Some(55.0)])),
        ])
        .unwrap();

        let out = attach_period_indicator(&frame, &long, "RSI", &[20, 50]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.numbers("RSI_20").unwrap(), &[Some(40.0), None, Some(60.0)]);
        assert_eq!(out.numbers("RSI_50").unwrap(), &[Some(55.0), None, None]);
    }

    #[test]
    fn test_attach_rejects_existing_column() {
        let frame = quotes(&["NVDA"], &[1.0]);
        assert!(attach_columns(&frame, &frame, &["close"]).is_err());
    }
}
