//! Feature computation for the newsbar dataset builder.
//!
//! This crate handles:
//! - Technical indicator back-filling (SMA, RSI, MACD)
//! - Hourly news aggregation (ticker, topic and global tracks)
//! - Post-merge feature derivation and the label balance report

pub mod deriver;
pub mod indicators;
pub mod news_aggregator;

pub use deriver::{ClassBalance, DerivedFeatures, FeatureDeriver};
pub use indicators::IndicatorEngine;
pub use news_aggregator::NewsAggregator;
