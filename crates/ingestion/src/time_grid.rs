//! Hourly timeline reconstruction.
//!
//! Splits `datetime` into calendar parts and densifies a single-ticker
//! technical table so every observed day spans 24 hours and every calendar
//! day between the first and last observation exists.

use chrono::NaiveDate;
use newsbar_core::config::{InteriorHours, TimeGridConfig};
use newsbar_core::{Column, ColumnKind, Error, Frame, Result, TimePoint, DATETIME, IS_SYNTHETIC};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const DAY: &str = "day";
/// Hour of day. Named `time` for compatibility with stored datasets.
pub const TIME: &str = "time";

const DATE_PARTS: [&str; 4] = [YEAR, MONTH, DAY, TIME];

/// Premarket, regular and postmarket NASDAQ hours (inclusive).
const PREMARKET: (u32, u32) = (4, 9);
const MARKET: (u32, u32) = (10, 16);
const POSTMARKET: (u32, u32) = (17, 20);

/// Builds the canonical hourly grid for one ticker.
pub struct TimeGridBuilder {
    config: TimeGridConfig,
}

impl TimeGridBuilder {
    pub fn new(config: &TimeGridConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Run the enabled steps: date split, missing days, missing hours,
    /// temporal flags.
    pub fn build(&self, frame: Frame) -> Result<Frame> {
        let mut frame = frame;
        if self.config.date_split {
            frame = split_date(frame)?;
        }
        if self.config.fill_missing_days {
            frame = self.fill_missing_days(frame)?;
        }
        if self.config.fill_missing_hours {
            frame = self.fill_missing_hours(frame)?;
        }
        if self.config.add_temporal_features {
            frame = add_temporal_features(frame)?;
        }
        Ok(frame)
    }

    /// Synthesize all 24 hours of each missing calendar day.
    ///
    /// Days are checked from the first observed day up to, but excluding, the
    /// last one. Each synthesized hour copies the latest observed row before
    /// the missing day; only the time keys are rewritten.
    pub fn fill_missing_days(&self, frame: Frame) -> Result<Frame> {
        let keys = row_keys(&frame)?;

        let mut observed: BTreeMap<TimePoint, usize> = BTreeMap::new();
        for (i, key) in keys.iter().enumerate() {
            if let Some(key) = key {
                observed.entry(*key).or_insert(i);
            }
        }
        let (Some(first), Some(last)) = (
            observed.keys().next().copied(),
            observed.keys().next_back().copied(),
        ) else {
            return self.append_synthetic(frame, Vec::new(), Vec::new(), &[]);
        };
        let days: BTreeSet<NaiveDate> = observed.keys().map(TimePoint::date).collect();

        let mut sources = Vec::new();
        let mut new_keys = Vec::new();
        let mut date = first.date();
        while date < last.date() {
            if !days.contains(&date) {
                let midnight = TimePoint::start_of(date);
                if let Some((_, &src)) = observed.range(..midnight).next_back() {
                    debug!(%date, "synthesizing missing day");
                    for hour in 0..24 {
                        if let Some(key) = midnight.with_hour(hour) {
                            sources.push(src);
                            new_keys.push(key);
                        }
                    }
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        info!(rows = new_keys.len(), "filled missing days");
        self.append_synthetic(frame, sources, new_keys, &[])
    }

    /// Pad each observed day out to 24 hours.
    ///
    /// Hours before the first observation copy the first observed row, hours
    /// after the last copy the last one. Interior gaps follow
    /// [`InteriorHours`]: skipped, or a key-only row whose measurements are
    /// null and whose text cells repeat the preceding observed hour.
    pub fn fill_missing_hours(&self, frame: Frame) -> Result<Frame> {
        let keys = row_keys(&frame)?;

        let mut days: BTreeMap<NaiveDate, BTreeMap<u32, usize>> = BTreeMap::new();
        for (i, key) in keys.iter().enumerate() {
            if let Some(key) = key {
                days.entry(key.date())
                    .or_default()
                    .entry(key.hour())
                    .or_insert(i);
            }
        }

        let mut sources = Vec::new();
        let mut new_keys = Vec::new();
        let mut blank = Vec::new();
        for (date, hours) in &days {
            let (Some((&first_hour, &first_row)), Some((&last_hour, &last_row))) =
                (hours.iter().next(), hours.iter().next_back())
            else {
                continue;
            };
            let midnight = TimePoint::start_of(*date);
            for hour in (0..24u32).filter(|h| !hours.contains_key(h)) {
                let Some(key) = midnight.with_hour(hour) else {
                    continue;
                };
                let source = if hour < first_hour {
                    first_row
                } else if hour > last_hour {
                    last_row
                } else {
                    match self.config.interior_hours {
                        InteriorHours::Skip => continue,
                        InteriorHours::NullRow => {
                            blank.push(sources.len());
                            hours
                                .range(..hour)
                                .next_back()
                                .map_or(first_row, |(_, &row)| row)
                        }
                    }
                };
                sources.push(source);
                new_keys.push(key);
            }
        }

        info!(
            rows = new_keys.len(),
            interior = blank.len(),
            days = days.len(),
            "filled missing hours"
        );
        self.append_synthetic(frame, sources, new_keys, &blank)
    }

    /// Append copies of `sources` rows keyed by `keys`, then rebuild
    /// `datetime` from the calendar parts and sort.
    fn append_synthetic(
        &self,
        mut frame: Frame,
        sources: Vec<usize>,
        keys: Vec<TimePoint>,
        blank: &[usize],
    ) -> Result<Frame> {
        let mut synthetic = frame.take(&sources)?;
        if !blank.is_empty() {
            blank_rows(&mut synthetic, blank)?;
        }
        write_keys(&mut synthetic, &keys)?;

        if self.config.track_provenance {
            if !frame.contains(IS_SYNTHETIC) {
                frame.insert(IS_SYNTHETIC, Column::Flag(vec![false; frame.len()]))?;
            }
            synthetic.insert(IS_SYNTHETIC, Column::Flag(vec![true; synthetic.len()]))?;
        }

        frame.concat(&synthetic)?;
        let rebuilt = row_keys(&frame)?;
        frame.insert(DATETIME, Column::Time(rebuilt))?;
        frame.sort_by_time(DATETIME)?;
        Ok(frame)
    }
}

/// Null the number and time cells of `rows`; text and flags are kept.
fn blank_rows(frame: &mut Frame, rows: &[usize]) -> Result<()> {
    for name in frame.names_of(ColumnKind::Number)? {
        let mut values = frame.numbers(&name)?;
        rows.iter().for_each(|&i| values[i] = None);
        frame.insert(name, Column::Number(values))?;
    }
    for name in frame.names_of(ColumnKind::Time)? {
        let mut values = frame.times(&name)?;
        rows.iter().for_each(|&i| values[i] = None);
        frame.insert(name, Column::Time(values))?;
    }
    Ok(())
}

/// Derive `day`, `month`, `year` and `time` (hour) from `datetime`.
///
/// Text timestamps are parsed; unparseable cells become null. The stale
/// `date` and `year_month` columns are dropped.
pub fn split_date(mut frame: Frame) -> Result<Frame> {
    coerce_times(&mut frame, DATETIME)?;
    frame.remove("date");
    frame.remove("year_month");

    let times = frame.times(DATETIME)?;
    let part = |f: fn(&TimePoint) -> f64| {
        Column::Number(times.iter().map(|t| t.as_ref().map(f)).collect())
    };
    frame.insert(DAY, part(|t| t.day() as f64))?;
    frame.insert(MONTH, part(|t| t.month() as f64))?;
    frame.insert(YEAR, part(|t| t.year() as f64))?;
    frame.insert(TIME, part(|t| t.hour() as f64))?;
    Ok(frame)
}

/// Add `day_of_week` (Monday = 0), `is_weekend` and the session flags
/// `is_premarket`, `is_market`, `is_postmarket` as 0/1 columns.
///
/// Session flags are zero on weekends and outside 04:00-20:00.
pub fn add_temporal_features(mut frame: Frame) -> Result<Frame> {
    coerce_times(&mut frame, DATETIME)?;
    let times = frame.times(DATETIME)?;
    let indicator = |pred: fn(&TimePoint) -> bool| {
        Column::Number(
            times
                .iter()
                .map(|t| t.as_ref().map(|t| if pred(t) { 1.0 } else { 0.0 }))
                .collect(),
        )
    };

    frame.insert(
        "day_of_week",
        Column::Number(times.iter().map(|t| t.map(|t| t.weekday() as f64)).collect()),
    )?;
    frame.insert("is_weekend", indicator(TimePoint::is_weekend))?;
    frame.insert("is_premarket", indicator(|t| in_session(t, PREMARKET)))?;
    frame.insert("is_market", indicator(|t| in_session(t, MARKET)))?;
    frame.insert("is_postmarket", indicator(|t| in_session(t, POSTMARKET)))?;
    Ok(frame)
}

fn in_session(t: &TimePoint, (open, close): (u32, u32)) -> bool {
    !t.is_weekend() && (open..=close).contains(&t.hour())
}

/// Parse a text `datetime` column in place.
fn coerce_times(frame: &mut Frame, name: &str) -> Result<()> {
    let parsed: Vec<Option<TimePoint>> = match frame.column(name)? {
        Column::Time(_) => return Ok(()),
        Column::Text(values) => values
            .iter()
            .map(|v| v.as_deref().and_then(|s| s.parse().ok()))
            .collect(),
        other => {
            return Err(Error::schema(format!(
                "column '{name}' is a {} column, expected timestamps",
                other.kind()
            )))
        }
    };
    frame.insert(name, Column::Time(parsed))
}

/// Per-row hour key rebuilt from the calendar parts.
fn row_keys(frame: &Frame) -> Result<Vec<Option<TimePoint>>> {
    frame.require(&DATE_PARTS)?;
    let year = frame.numbers(YEAR)?;
    let month = frame.numbers(MONTH)?;
    let day = frame.numbers(DAY)?;
    let hour = frame.numbers(TIME)?;

    Ok((0..frame.len())
        .map(|i| match (year[i], month[i], day[i], hour[i]) {
            (Some(y), Some(m), Some(d), Some(h)) => {
                TimePoint::from_ymdh(y as i32, m as u32, d as u32, h as u32)
            }
            _ => None,
        })
        .collect())
}

fn write_keys(frame: &mut Frame, keys: &[TimePoint]) -> Result<()> {
    let part = |f: fn(&TimePoint) -> f64| Column::Number(keys.iter().map(|k| Some(f(k))).collect());
    frame.insert(YEAR, part(|k| k.year() as f64))?;
    frame.insert(MONTH, part(|k| k.month() as f64))?;
    frame.insert(DAY, part(|k| k.day() as f64))?;
    frame.insert(TIME, part(|k| k.hour() as f64))?;
    frame.insert(DATETIME, Column::Time(keys.iter().copied().map(Some).collect()))
}
