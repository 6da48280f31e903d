//! Fetch client trait and structured fetch errors.
//!
//! The FetchClient trait abstracts over the external data source so the
//! scheduler can be driven by a scripted fake in tests. Clients make exactly
//! one call per `fetch`; retry and rate limiting live in the scheduler.

use crate::domain::{Interval, RawSeries};
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// Why a single fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by data source")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("invalid or unlisted symbol: {symbol}")]
    InvalidTicker { symbol: String },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl FetchError {
    /// Whether another attempt may succeed. Only an invalid symbol is final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidTicker { .. })
    }

    /// Minimum wait requested by the data source, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Trait for external price sources.
pub trait FetchClient: Send + Sync {
    /// Human-readable name of this client.
    fn name(&self) -> &str;

    /// Fetch rows for a symbol over an inclusive date range.
    ///
    /// An empty series is a valid answer (no trading in the window).
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<RawSeries, FetchError>;
}
