//! Per-hour news aggregation.
//!
//! Reduces per-(article, ticker, topic) rows to one row per hour in three
//! tracks: ticker-centric (weighted and/or plain averages), topic-centric
//! (one block of columns per enabled topic) and global sentiment. Tracks are
//! outer-joined on the hour into one widening table.

use newsbar_core::config::NewsConfig;
use newsbar_core::{round_dp, Column, Frame, JoinKind, NewsRecord, Result, TimePoint, DATETIME};
use newsbar_ingestion::news::normalize_topics;
use ordered_float::OrderedFloat;
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Decimal places of every aggregated mean.
const NEWS_DECIMALS: u32 = 6;

/// Multiplier of the per-article ticker score.
const TICKER_SCORE_SCALE: f64 = 5.0;

type Bucket<'a> = BTreeMap<TimePoint, Vec<&'a NewsRecord>>;

/// Group records by hour, ascending.
fn bucket<'a>(records: impl IntoIterator<Item = &'a NewsRecord>) -> Bucket<'a> {
    let mut hours: Bucket<'a> = BTreeMap::new();
    for record in records {
        hours.entry(record.datetime).or_default().push(record);
    }
    hours
}

/// Mean of the valid values, rounded; null when there are none.
fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let valid: Vec<f64> = values.flatten().collect();
    if valid.is_empty() {
        return None;
    }
    let m = valid.iter().mean();
    (!m.is_nan()).then(|| round_dp(m, NEWS_DECIMALS))
}

/// `sum / max(count, 1)` over the valid values, rounded.
fn mean_over_count(values: impl Iterator<Item = Option<f64>>) -> f64 {
    let (sum, count) = values.flatten().fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    round_dp(sum / count.max(1) as f64, NEWS_DECIMALS)
}

fn product(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? * b?)
}

fn distinct_titles(rows: &[&NewsRecord]) -> f64 {
    rows.iter()
        .map(|r| r.title.as_str())
        .collect::<HashSet<_>>()
        .len() as f64
}

/// Assemble an hour-keyed frame.
fn hourly_frame(hours: Vec<TimePoint>, columns: Vec<(String, Vec<Option<f64>>)>) -> Result<Frame> {
    let mut frame = Frame::new();
    frame.insert(DATETIME, Column::Time(hours.into_iter().map(Some).collect()))?;
    for (name, values) in columns {
        frame.insert(name, Column::Number(values))?;
    }
    Ok(frame)
}

/// Evaluate one metric over every bucket.
fn column<'a>(hours: &Bucket<'a>, metric: impl Fn(&[&'a NewsRecord]) -> Option<f64>) -> Vec<Option<f64>> {
    hours.values().map(|rows| metric(rows.as_slice())).collect()
}

fn hour_keys(hours: &Bucket<'_>) -> Vec<TimePoint> {
    hours.keys().copied().collect()
}

fn outer_merge(acc: Option<Frame>, track: Frame) -> Result<Frame> {
    match acc {
        None => Ok(track),
        Some(acc) => acc.join(&track, &[DATETIME], JoinKind::Outer),
    }
}

/// Builds the hourly news table for one target ticker.
pub struct NewsAggregator {
    config: NewsConfig,
    target_ticker: String,
}

impl NewsAggregator {
    pub fn new(config: &NewsConfig, target_ticker: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            target_ticker: target_ticker.into(),
        }
    }

    /// Run every enabled track and outer-join the results on the hour.
    ///
    /// Ticker and topic columns are zero-filled once both tracks are joined;
    /// the global track zero-fills its own scores.
    pub fn aggregate(&self, records: &[NewsRecord]) -> Result<Frame> {
        let mut records = records.to_vec();
        normalize_topics(&mut records);

        let mut acc = None;
        if self.config.weight_ticker_value {
            acc = Some(outer_merge(acc, self.weighted_ticker_metrics(&records)?)?);
        }
        if self.config.average_ticker_value {
            acc = Some(outer_merge(acc, self.average_ticker_metrics(&records)?)?);
        }
        for topic in self.config.enabled_topics() {
            let track = self.topic_metrics(&records, topic)?;
            debug!(topic, hours = track.len(), "topic track");
            acc = Some(outer_merge(acc, track)?);
        }

        let mut news = match acc {
            Some(frame) => frame,
            None => hourly_frame(Vec::new(), Vec::new())?,
        };
        news.fill_numeric_nulls(0.0)?;

        if self.config.global_metrics {
            news = outer_merge(Some(news), self.global_metrics(&records)?)?;
        }

        info!(
            ticker = %self.target_ticker,
            hours = news.len(),
            columns = news.width(),
            "aggregated news"
        );
        Ok(news)
    }

    fn ticker_rows<'a>(&self, records: &'a [NewsRecord]) -> impl Iterator<Item = &'a NewsRecord> + 'a {
        let target = self.target_ticker.clone();
        records.iter().filter(move |r| r.ticker == target)
    }

    /// Relevance-weighted ticker scores (`w_ticker_*`).
    ///
    /// Each score is multiplied by `relevance_score`, summed per hour and
    /// divided by the number of contributing rows.
    pub fn weighted_ticker_metrics(&self, records: &[NewsRecord]) -> Result<Frame> {
        let hours = bucket(self.ticker_rows(records));
        let weighted = |score: fn(&NewsRecord) -> Option<f64>| {
            column(&hours, |rows| {
                Some(mean_over_count(
                    rows.iter().map(|r| product(score(r), r.relevance_score)),
                ))
            })
        };

        hourly_frame(
            hour_keys(&hours),
            vec![
                ("w_ticker_ossm".to_string(), weighted(|r| r.overall_sentiment_score)),
                ("w_ticker_ssm".to_string(), weighted(|r| r.ticker_sentiment_score)),
                ("w_ticker_atrsm".to_string(), weighted(|r| r.affected_topic_relevance_score)),
                ("w_ticker_nc".to_string(), column(&hours, |rows| Some(distinct_titles(rows)))),
            ],
        )
    }

    /// Plain per-hour ticker means (`avg_ticker_*`).
    pub fn average_ticker_metrics(&self, records: &[NewsRecord]) -> Result<Frame> {
        let hours = bucket(self.ticker_rows(records));
        let averaged = |score: fn(&NewsRecord) -> Option<f64>| {
            column(&hours, |rows| mean(rows.iter().map(|r| score(r))))
        };

        hourly_frame(
            hour_keys(&hours),
            vec![
                ("avg_ticker_ossm".to_string(), averaged(|r| r.overall_sentiment_score)),
                ("avg_ticker_rsm".to_string(), averaged(|r| r.relevance_score)),
                ("avg_ticker_ssm".to_string(), averaged(|r| r.ticker_sentiment_score)),
                ("avg_ticker_atrsm".to_string(), averaged(|r| r.affected_topic_relevance_score)),
                ("avg_ticker_nc".to_string(), column(&hours, |rows| Some(distinct_titles(rows)))),
            ],
        )
    }

    /// Per-hour metrics of one topic (`{topic}_ossm`, `_atrsm`, `_nc`).
    ///
    /// Articles that also mention the target ticker are excluded, as are
    /// rows without a topic. Rows are deduplicated on
    /// (datetime, title, overall score, topic relevance) before counting.
    pub fn topic_metrics(&self, records: &[NewsRecord], topic: &str) -> Result<Frame> {
        let ticker_titles: HashSet<&str> = self
            .ticker_rows(records)
            .map(|r| r.title.as_str())
            .collect();

        let mut seen = HashSet::new();
        let rows = records.iter().filter(|r| {
            !ticker_titles.contains(r.title.as_str())
                && r.affected_topic.as_deref() == Some(topic)
                && seen.insert((
                    r.datetime,
                    r.title.as_str(),
                    r.overall_sentiment_score.map(OrderedFloat),
                    r.affected_topic_relevance_score.map(OrderedFloat),
                ))
        });
        let hours = bucket(rows);

        hourly_frame(
            hour_keys(&hours),
            vec![
                (
                    format!("{topic}_ossm"),
                    column(&hours, |rows| mean(rows.iter().map(|r| r.overall_sentiment_score))),
                ),
                (
                    format!("{topic}_atrsm"),
                    column(&hours, |rows| {
                        mean(rows.iter().map(|r| r.affected_topic_relevance_score))
                    }),
                ),
                (format!("{topic}_nc"), column(&hours, |rows| Some(rows.len() as f64))),
            ],
        )
    }

    /// `global_score` and `ticker_score` per hour.
    ///
    /// `global_score` is the product of the hour's mean overall sentiment and
    /// mean relevance across all tickers. `ticker_score` sums
    /// `relevance * ticker_sentiment * 5` over the target's deduplicated
    /// articles. Hours present in only one side score 0 on the other.
    pub fn global_metrics(&self, records: &[NewsRecord]) -> Result<Frame> {
        let mut seen = HashSet::new();
        let ticker_hours = bucket(self.ticker_rows(records).filter(|r| {
            seen.insert((
                r.title.as_str(),
                r.datetime,
                r.relevance_score.map(OrderedFloat),
                r.ticker_sentiment_score.map(OrderedFloat),
            ))
        }));

        let mut seen = HashSet::new();
        let all_hours = bucket(records.iter().filter(|r| {
            seen.insert((
                r.datetime,
                r.title.as_str(),
                r.overall_sentiment_score.map(OrderedFloat),
                r.relevance_score.map(OrderedFloat),
            ))
        }));

        let hours: BTreeSet<TimePoint> = ticker_hours.keys().chain(all_hours.keys()).copied().collect();
        let global_score: Vec<Option<f64>> = hours
            .iter()
            .map(|hour| {
                let score = all_hours.get(hour).and_then(|rows| {
                    product(
                        mean(rows.iter().map(|r| r.overall_sentiment_score)),
                        mean(rows.iter().map(|r| r.relevance_score)),
                    )
                });
                Some(score.unwrap_or(0.0))
            })
            .collect();
        let ticker_score: Vec<Option<f64>> = hours
            .iter()
            .map(|hour| {
                let sum = ticker_hours.get(hour).map_or(0.0, |rows| {
                    rows.iter()
                        .filter_map(|r| product(r.relevance_score, r.ticker_sentiment_score))
                        .map(|p| p * TICKER_SCORE_SCALE)
                        .sum::<f64>()
                });
                Some(sum)
            })
            .collect();

        hourly_frame(
            hours.into_iter().collect(),
            vec![
                ("global_score".to_string(), global_score),
                ("ticker_score".to_string(), ticker_score),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn news(title: &str, ticker: &str, hour: u32, topic: &str, rel: f64, tss: f64) -> NewsRecord {
        NewsRecord {
            title: title.to_string(),
            datetime: TimePoint::from_ymdh(2024, 5, 6, hour).unwrap(),
            ticker: ticker.to_string(),
            overall_sentiment_score: Some(0.2),
            overall_sentiment_label: Some("Somewhat-Bullish".to_string()),
            relevance_score: Some(rel),
            ticker_sentiment_score: Some(tss),
            ticker_sentiment_label: None,
            affected_topic: Some(topic.to_string()),
            affected_topic_relevance_score: Some(0.5),
            topic: None,
        }
    }

    fn config(weighted: bool, average: bool, global: bool, topics: &[&str]) -> NewsConfig {
        NewsConfig {
            weight_ticker_value: weighted,
            average_ticker_value: average,
            global_metrics: global,
            topics: topics.iter().map(|t| (t.to_string(), true)).collect(),
        }
    }

    #[test]
    fn test_weighted_single_article_conservation() {
        let records = vec![news("a", "NVDA", 9, "Technology", 0.7, 0.3)];
        let agg = NewsAggregator::new(&config(true, false, false, &[]), "NVDA");
        let frame = agg.weighted_ticker_metrics(&records).unwrap();

        assert_eq!(frame.len(), 1);
        assert_relative_eq!(frame.numbers("w_ticker_ssm").unwrap()[0].unwrap(), 0.21, epsilon = 1e-12);
        assert_relative_eq!(frame.numbers("w_ticker_ossm").unwrap()[0].unwrap(), 0.14, epsilon = 1e-12);
        assert_eq!(frame.numbers("w_ticker_nc").unwrap(), &[Some(1.0)]);
    }

    #[test]
    fn test_weighted_divides_by_row_count() {
        let records = vec![
            news("a", "NVDA", 9, "Technology", 0.5, 0.4),
            news("a", "NVDA", 9, "Earnings", 0.5, 0.8),
            news("b", "AMD", 9, "Technology", 0.9, 0.9),
        ];
        let agg = NewsAggregator::new(&config(true, false, false, &[]), "NVDA");
        let frame = agg.weighted_ticker_metrics(&records).unwrap();

        assert_relative_eq!(frame.numbers("w_ticker_ssm").unwrap()[0].unwrap(), 0.3, epsilon = 1e-12);
        // two rows, one distinct title
        assert_eq!(frame.numbers("w_ticker_nc").unwrap(), &[Some(1.0)]);
    }

    #[test]
    fn test_average_ticker_metrics() {
        let records = vec![
            news("a", "NVDA", 9, "Technology", 0.2, 0.4),
            news("b", "NVDA", 9, "Technology", 0.4, 0.8),
            news("c", "NVDA", 11, "Technology", 1.0, 1.0),
        ];
        let agg = NewsAggregator::new(&config(false, true, false, &[]), "NVDA");
        let frame = agg.average_ticker_metrics(&records).unwrap();

        assert_eq!(frame.len(), 2);
        assert_relative_eq!(frame.numbers("avg_ticker_rsm").unwrap()[0].unwrap(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(frame.numbers("avg_ticker_ssm").unwrap()[0].unwrap(), 0.6, epsilon = 1e-12);
        assert_eq!(frame.numbers("avg_ticker_nc").unwrap(), &[Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_topic_excludes_ticker_titles_and_dedups() {
        let mut records = vec![
            // shares a title with the target ticker
            news("t1", "NVDA", 9, "Technology", 0.5, 0.5),
            news("t1", "AMD", 9, "Technology", 0.5, 0.5),
            news("t2", "AMD", 9, "Technology", 0.5, 0.5),
            // fan-out of one article over two tickers
            news("t3", "AMD", 9, "Technology", 0.5, 0.5),
            news("t3", "MSFT", 9, "Technology", 0.5, 0.5),
            news("t4", "AMD", 10, "Earnings", 0.5, 0.5),
        ];
        normalize_topics(&mut records);

        let agg = NewsAggregator::new(&config(false, false, false, &["technology"]), "NVDA");
        let frame = agg.topic_metrics(&records, "technology").unwrap();

        assert_eq!(frame.len(), 1);
        assert_eq!(frame.numbers("technology_nc").unwrap(), &[Some(2.0)]);
        assert_relative_eq!(frame.numbers("technology_atrsm").unwrap()[0].unwrap(), 0.5);
    }

    #[test]
    fn test_global_metrics() {
        let records = vec![
            news("a", "NVDA", 9, "Technology", 0.5, 0.4),
            news("a", "NVDA", 9, "Earnings", 0.5, 0.4),
            news("b", "AMD", 10, "Technology", 1.0, 0.1),
        ];
        let agg = NewsAggregator::new(&config(false, false, true, &[]), "NVDA");
        let frame = agg.global_metrics(&records).unwrap();

        assert_eq!(frame.len(), 2);
        let ticker = frame.numbers("ticker_score").unwrap();
        // duplicate fan-out row counted once: 0.5 * 0.4 * 5
        assert_relative_eq!(ticker[0].unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(ticker[1], Some(0.0));

        let global = frame.numbers("global_score").unwrap();
        assert_relative_eq!(global[0].unwrap(), 0.2 * 0.5, epsilon = 1e-12);
        assert_relative_eq!(global[1].unwrap(), 0.2 * 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_joins_and_zero_fills() {
        let records = vec![
            news("a", "NVDA", 9, "Technology", 0.5, 0.4),
            news("b", "AMD", 11, "Technology", 0.5, 0.4),
        ];
        let agg = NewsAggregator::new(&config(true, false, true, &["technology", "blockchain"]), "NVDA");
        let frame = agg.aggregate(&records).unwrap();

        assert_eq!(
            frame.times(DATETIME).unwrap(),
            &[TimePoint::from_ymdh(2024, 5, 6, 9), TimePoint::from_ymdh(2024, 5, 6, 11)]
        );
        assert_eq!(frame.numbers("w_ticker_nc").unwrap(), &[Some(1.0), Some(0.0)]);
        assert_eq!(frame.numbers("technology_nc").unwrap(), &[Some(0.0), Some(1.0)]);
        assert_eq!(frame.numbers("blockchain_nc").unwrap(), &[Some(0.0), Some(0.0)]);
        assert!(frame.contains("global_score"));

        let names = frame.names();
        let blockchain = names.iter().position(|n| n == "blockchain_ossm").unwrap();
        let technology = names.iter().position(|n| n == "technology_ossm").unwrap();
        assert!(blockchain < technology);
    }
}
