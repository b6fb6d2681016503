//! Core types and configuration for the newsbar dataset builder.
//!
//! This crate provides shared types used across all other crates:
//! - Hourly time keys and news records
//! - The polars-backed `Frame` every stage consumes and returns
//! - Null-aware rolling and exponential kernels
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod frame;
pub mod rolling;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use frame::{Column, ColumnKind, Frame, JoinKind};
pub use types::*;
