//! Core data types for the newsbar pipeline.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Name of the hourly key column shared by every table.
pub const DATETIME: &str = "datetime";
/// Ticker column of the technical table.
pub const TICKER: &str = "ticker";
/// Closing price column.
pub const CLOSE: &str = "close";
/// Next-hour direction label.
pub const TARGET: &str = "target";
/// One-step relative change of `close`.
pub const CLOSE_PCT_CHANGE: &str = "close_pct_change";
/// Provenance flag for rows synthesized by gap filling.
pub const IS_SYNTHETIC: &str = "is_synthetic";

/// Round to `decimals` places, ties to even (matches numpy's `around`).
#[inline]
pub fn round_dp(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

/// An hourly timestamp bucket: the alignment key across all tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint(NaiveDateTime);

impl TimePoint {
    const DISPLAY_FORMAT: &'static str = "%Y-%m-%d %H:00:00";

    /// Build from calendar parts. Returns `None` for an invalid date or hour > 23.
    pub fn from_ymdh(year: i32, month: u32, day: u32, hour: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, 0, 0)
            .map(TimePoint)
    }

    /// Truncate an arbitrary timestamp to its hour.
    pub fn truncate(dt: NaiveDateTime) -> Self {
        let hour = dt.date().and_hms_opt(dt.hour(), 0, 0).unwrap_or(dt);
        TimePoint(hour)
    }

    /// Midnight of the given date.
    pub fn start_of(date: NaiveDate) -> Self {
        TimePoint(date.and_time(chrono::NaiveTime::MIN))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// Day of week, Monday = 0.
    pub fn weekday(&self) -> u32 {
        self.0.weekday().num_days_from_monday()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.0.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Calendar quarter, 1-4.
    pub fn quarter(&self) -> u32 {
        (self.month() - 1) / 3 + 1
    }

    pub fn year_month(&self) -> YearMonth {
        YearMonth::new(self.year(), self.month())
    }

    /// Same day, different hour.
    pub fn with_hour(&self, hour: u32) -> Option<Self> {
        self.date().and_hms_opt(hour, 0, 0).map(TimePoint)
    }

    /// Hours elapsed from `earlier` to `self`.
    pub fn hours_since(&self, earlier: &TimePoint) -> i64 {
        (self.0 - earlier.0).num_hours()
    }

    /// Milliseconds since the Unix epoch, read as UTC.
    pub fn timestamp_millis(&self) -> i64 {
        self.0.and_utc().timestamp_millis()
    }

    /// Inverse of [`TimePoint::timestamp_millis`], truncated to the hour.
    pub fn from_timestamp_millis(ms: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(ms).map(|dt| TimePoint::truncate(dt.naive_utc()))
    }
}

impl From<NaiveDateTime> for TimePoint {
    fn from(dt: NaiveDateTime) -> Self {
        TimePoint::truncate(dt)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::DISPLAY_FORMAT))
    }
}

impl FromStr for TimePoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        const FORMATS: [&str; 4] = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M",
        ];
        for fmt in FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(TimePoint::truncate(dt));
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(TimePoint::start_of)
            .map_err(|_| Error::data(format!("unparseable timestamp '{s}'")))
    }
}

impl Serialize for TimePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimePoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A calendar month, the grain of the economic series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// The following calendar month.
    pub fn next(self) -> Self {
        if self.month >= 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        YearMonth::new(date.year(), date.month())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One row per (article, ticker mention, topic mention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub title: String,
    /// Publish time truncated to the hour.
    pub datetime: TimePoint,
    pub ticker: String,
    pub overall_sentiment_score: Option<f64>,
    #[serde(default)]
    pub overall_sentiment_label: Option<String>,
    pub relevance_score: Option<f64>,
    pub ticker_sentiment_score: Option<f64>,
    #[serde(default)]
    pub ticker_sentiment_label: Option<String>,
    pub affected_topic: Option<String>,
    pub affected_topic_relevance_score: Option<f64>,
    /// Query topic the article was fetched under.
    #[serde(default)]
    pub topic: Option<String>,
}
