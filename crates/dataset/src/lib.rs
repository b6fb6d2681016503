//! Dataset assembly for the newsbar builder.
//!
//! This crate handles:
//! - Aligning news and economic series onto the technical timeline
//! - Next-hour direction labelling
//! - CSV persistence of frames and raw news rows
//! - The end-to-end pipeline and log setup

pub mod io;
pub mod logging;
pub mod merger;
pub mod pipeline;

pub use logging::init_tracing;
pub use merger::DatasetMerger;
pub use pipeline::{DatasetPipeline, PipelineOutput};
