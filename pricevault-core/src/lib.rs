//! PriceVault Core — acquisition and merge of daily price history.
//!
//! This crate contains the batch pipeline's building blocks:
//! - Domain types (tickers, raw and merged series, OHLCV rows)
//! - Ticker registry with the protected subset
//! - Fetch client trait and the Yahoo Finance client
//! - Download scheduler with shared rate gate and retry state machine
//! - Validator and merge engine
//! - Parquet series store with atomic writes

pub mod config;
pub mod data;
pub mod domain;

pub use config::{ConfigError, PipelineConfig};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with scheduler workers are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::RawSeries>();
        require_sync::<domain::RawSeries>();
        require_send::<domain::MergedSeries>();
        require_sync::<domain::MergedSeries>();
        require_send::<data::DownloadJob>();
        require_sync::<data::DownloadJob>();
        require_send::<data::TickerFetch>();
        require_sync::<data::RateGate>();
        require_sync::<data::SeriesStore>();
        require_sync::<data::YahooClient>();
        require_sync::<data::DownloadScheduler<'static>>();
    }
}
