//! PriceVault Runner — pipeline orchestration, summary reports, artifacts.
//!
//! This crate builds on `pricevault-core` to provide:
//! - The acquisition-and-merge pipeline with its run report
//! - Price metrics and the summary report (rankings, sectors)
//! - CSV / JSON / Markdown artifact export
//! - Store status against the configured universe

pub mod export;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod status;

pub use pipeline::{
    execute, Pipeline, PipelineRun, RunFailure, RunReport, Selection, TickerOutcome, TickerStatus,
};
pub use report::{RankCategory, ReportGenerator, SummaryReport, TickerStats};
pub use status::StoreStatus;
