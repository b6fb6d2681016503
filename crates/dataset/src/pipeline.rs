//! End-to-end dataset build for one ticker.
//!
//! Stages run in a fixed order; any error aborts the run before the failing
//! stage returns a table:
//! 1. Ticker check on the technical table
//! 2. Hourly grid reconstruction
//! 3. Indicator back-fill
//! 4. Missing-value correction
//! 5. News aggregation
//! 6. Merge with news and economic series, labelling
//! 7. Feature derivation and class-balance report

use newsbar_core::{Config, Frame, NewsRecord, Result};
use newsbar_features::{ClassBalance, FeatureDeriver, IndicatorEngine, NewsAggregator};
use newsbar_ingestion::technical::target_ticker;
use newsbar_ingestion::{CorrectionPipeline, EconomicSeries, TimeGridBuilder};
use std::path::Path;
use tracing::info;

use crate::io::save_frame;
use crate::merger::DatasetMerger;

/// Tables produced by one run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub ticker: String,
    /// Final training table after feature derivation.
    pub dataset: Frame,
    /// Labelled merge before feature derivation.
    pub merged: Frame,
    pub balance: Option<ClassBalance>,
}

impl PipelineOutput {
    /// Write `merged.csv` and `dataset.csv` into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        save_frame(&self.merged, dir.join("merged.csv"))?;
        save_frame(&self.dataset, dir.join("dataset.csv"))
    }
}

pub struct DatasetPipeline {
    config: Config,
}

impl DatasetPipeline {
    /// Validates the configuration up front.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(
        &self,
        technical: Frame,
        news: &[NewsRecord],
        economic: &[EconomicSeries],
    ) -> Result<PipelineOutput> {
        let ticker = target_ticker(&technical)?;
        info!(%ticker, rows = technical.len(), news = news.len(), "building dataset");

        let mut grid = TimeGridBuilder::new(&self.config.time_grid).build(technical)?;
        IndicatorEngine::new(&self.config.indicators).apply(&mut grid)?;
        CorrectionPipeline::new(&self.config.correction).apply(&mut grid)?;

        let hourly_news = NewsAggregator::new(&self.config.news, ticker.as_str()).aggregate(news)?;
        let merged = DatasetMerger::new(&self.config.merge).merge(&grid, &hourly_news, economic)?;
        let derived = FeatureDeriver::new(&self.config.features).derive(merged.clone())?;

        info!(
            %ticker,
            rows = derived.frame.len(),
            columns = derived.frame.width(),
            "dataset ready"
        );
        Ok(PipelineOutput {
            ticker,
            dataset: derived.frame,
            merged,
            balance: derived.balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_frame, write_frame};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use newsbar_core::config::{ColumnTransform, FeatureConfig};
    use newsbar_core::{Column, Error, TimePoint, CLOSE, CLOSE_PCT_CHANGE, DATETIME, TARGET, TICKER};

    fn tp(hour: u32) -> Option<TimePoint> {
        TimePoint::from_ymdh(2024, 3, 4, hour)
    }

    /// Hours 0, 1 and 3 of one day; hour 2 is missing.
    fn technical(ticker: &str) -> Frame {
        let closes = [100.0, 101.0, 103.0];
        let n = closes.len();
        Frame::from_columns(vec![
            (TICKER, Column::Text(vec![Some(ticker.to_string()); n])),
            (DATETIME, Column::Time(vec![tp(0), tp(1), tp(3)])),
            ("open", Column::Number(closes.iter().map(|c| Some(c - 0.5)).collect())),
            ("high", Column::Number(closes.iter().map(|c| Some(c + 1.0)).collect())),
            ("low", Column::Number(closes.iter().map(|c| Some(c - 1.0)).collect())),
            (CLOSE, Column::Number(closes.iter().copied().map(Some).collect())),
            ("volume", Column::Number(vec![Some(1000.0); n])),
        ])
        .unwrap()
    }

    fn article(title: &str, ticker: &str, hour: u32) -> NewsRecord {
        NewsRecord {
            title: title.to_string(),
            datetime: tp(hour).unwrap(),
            ticker: ticker.to_string(),
            overall_sentiment_score: Some(0.3),
            overall_sentiment_label: Some("Somewhat-Bullish".to_string()),
            relevance_score: Some(0.5),
            ticker_sentiment_score: Some(0.4),
            ticker_sentiment_label: Some("Bullish".to_string()),
            affected_topic: Some("Technology".to_string()),
            affected_topic_relevance_score: Some(0.9),
            topic: None,
        }
    }

    fn pipeline() -> DatasetPipeline {
        DatasetPipeline::new(Config::default()).unwrap()
    }

    #[test]
    fn test_missing_hour_scenario() {
        let out = pipeline().run(technical("NVDA"), &[], &[]).unwrap();
        let merged = &out.merged;
        assert_eq!(merged.len(), 24);
        assert_eq!(merged.times(DATETIME).unwrap()[2], tp(2));

        let close = merged.numbers(CLOSE).unwrap();
        assert_eq!(&close[..4], &[Some(100.0), Some(101.0), Some(101.0), Some(103.0)]);
        // hour 3 is measured against the forward-filled hour 2
        assert_eq!(merged.numbers(CLOSE_PCT_CHANGE).unwrap()[3], Some(0.019802));

        let target = merged.numbers(TARGET).unwrap();
        assert_eq!(&target[..4], &[Some(1.0), Some(0.0), Some(1.0), Some(0.0)]);
        assert_eq!(target[23], None);
    }

    #[test]
    fn test_news_aligned_to_technical_hours() {
        let news = vec![
            article("Chips rally", "NVDA", 1),
            article("Late story", "NVDA", 1),
            article("Off-grid", "NVDA", 5),
        ];
        let mut tech = technical("NVDA");
        // a news hour outside the grid must not add rows
        let out = DatasetPipeline::new(Config {
            time_grid: newsbar_core::config::TimeGridConfig {
                fill_missing_hours: false,
                ..Default::default()
            },
            ..Config::default()
        })
        .unwrap()
        .run(tech.clone(), &news, &[])
        .unwrap();
        assert_eq!(out.merged.len(), 3);

        let ssm = out.merged.numbers("w_ticker_ssm").unwrap();
        assert_eq!(ssm, &[Some(0.0), Some(0.2), Some(0.0)]);
        let nc = out.merged.numbers("w_ticker_nc").unwrap();
        assert_eq!(nc, &[Some(0.0), Some(2.0), Some(0.0)]);

        tech.remove(CLOSE);
        assert!(pipeline().run(tech, &news, &[]).is_err());
    }

    #[test]
    fn test_multiple_tickers_rejected() {
        let mut tech = technical("NVDA");
        tech.concat(&technical("AMD")).unwrap();
        assert!(matches!(
            pipeline().run(tech, &[], &[]),
            Err(Error::Cardinality(_))
        ));
    }

    #[test]
    fn test_economic_and_features() {
        let cpi = EconomicSeries::from_observations(
            "cpi",
            vec![(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), 3.2)],
        );
        let mut config = Config::default();
        config.features = FeatureConfig {
            transforms: [(CLOSE.to_string(), vec![ColumnTransform::Lag { steps: vec![1] }])]
                .into_iter()
                .collect(),
            encode_temporal: true,
            drop_null_rows: true,
            min_class_share: Some(0.39),
            ..FeatureConfig::default()
        };

        let out = DatasetPipeline::new(config)
            .unwrap()
            .run(technical("NVDA"), &[], &[cpi])
            .unwrap();
        assert!(out.merged.numbers("cpi").unwrap().iter().all(|v| *v == Some(3.2)));

        // first row has no lag, last row has no target
        assert_eq!(out.dataset.len(), 22);
        assert!(out.dataset.contains("close_lag1"));
        assert!(out.dataset.contains("hour_sin"));

        let balance = out.balance.unwrap();
        assert_eq!(balance.positives + balance.negatives, 22);
        assert_eq!(balance.positives, 1);
        assert!(balance.needs_rebalancing);
    }

    #[test]
    fn test_merged_csv_round_trip() {
        let out = pipeline().run(technical("NVDA"), &[article("a", "NVDA", 3)], &[]).unwrap();
        let mut buf = Vec::new();
        write_frame(&out.merged, &mut buf).unwrap();
        let loaded = read_frame(buf.as_slice()).unwrap();

        assert_eq!(loaded.names(), out.merged.names());
        assert_eq!(loaded.times(DATETIME).unwrap(), out.merged.times(DATETIME).unwrap());
        let (a, b) = (loaded.numbers(CLOSE).unwrap(), out.merged.numbers(CLOSE).unwrap());
        for (x, y) in a.iter().zip(b) {
            assert_relative_eq!(x.unwrap(), y.unwrap());
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.indicators.macd.fast = 30;
        assert!(matches!(DatasetPipeline::new(config), Err(Error::Config(_))));
    }
}
