//! Data ingestion and normalization for the newsbar dataset builder.
//!
//! This crate handles:
//! - Hourly grid reconstruction (date split, missing days and hours)
//! - Missing-value correction passes
//! - Technical table combination and indicator pivots
//! - News topic normalization and deduplication
//! - Monthly economic series with release-lag attribution

pub mod correction;
pub mod economic;
pub mod news;
pub mod technical;
pub mod time_grid;

pub use correction::CorrectionPipeline;
pub use economic::EconomicSeries;
pub use time_grid::TimeGridBuilder;
