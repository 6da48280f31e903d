//! Per-symbol series: what a fetch returns and what the store keeps.

use super::bar::{OhlcvRow, RawRow};
use chrono::NaiveDate;
use thiserror::Error;

/// Rows for one symbol as returned by a single fetch attempt.
///
/// Not guaranteed sorted; duplicate dates are possible and are reported by the
/// validator rather than rejected here.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub symbol: String,
    pub rows: Vec<RawRow>,
}

impl RawSeries {
    pub fn new(symbol: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            symbol: symbol.into(),
            rows,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::new(symbol, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Violations of the one-row-per-date, strictly-increasing invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("{symbol}: duplicate date {date}")]
    DuplicateDate { symbol: String, date: NaiveDate },

    #[error("{symbol}: dates out of order ({previous} followed by {next})")]
    OutOfOrder {
        symbol: String,
        previous: NaiveDate,
        next: NaiveDate,
    },
}

/// The authoritative series for a symbol.
///
/// Invariant: exactly one row per date, dates strictly increasing. Every
/// constructor verifies it, so a `MergedSeries` value is always well-formed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSeries {
    symbol: String,
    rows: Vec<OhlcvRow>,
}

impl MergedSeries {
    /// Build from rows that are expected to already be sorted.
    pub fn new(symbol: impl Into<String>, rows: Vec<OhlcvRow>) -> Result<Self, SeriesError> {
        let symbol = symbol.into();
        verify_order(&symbol, &rows)?;
        Ok(Self { symbol, rows })
    }

    /// Sort by date, then verify. Duplicate dates are still an error.
    pub fn from_unsorted(
        symbol: impl Into<String>,
        mut rows: Vec<OhlcvRow>,
    ) -> Result<Self, SeriesError> {
        rows.sort_by_key(|r| r.date);
        Self::new(symbol, rows)
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            rows: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn rows(&self) -> &[OhlcvRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<OhlcvRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// Row for an exact date.
    pub fn get(&self, date: NaiveDate) -> Option<&OhlcvRow> {
        self.rows
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    pub fn volumes(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.volume).collect()
    }
}

fn verify_order(symbol: &str, rows: &[OhlcvRow]) -> Result<(), SeriesError> {
    for pair in rows.windows(2) {
        let (previous, next) = (pair[0].date, pair[1].date);
        if previous == next {
            return Err(SeriesError::DuplicateDate {
                symbol: symbol.to_string(),
                date: next,
            });
        }
        if previous > next {
            return Err(SeriesError::OutOfOrder {
                symbol: symbol.to_string(),
                previous,
                next,
            });
        }
    }
    Ok(())
}
