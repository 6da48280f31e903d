//! Merge engine: reconcile fetched rows with stored history.
//!
//! The merge is a union keyed by date in which incoming rows win on overlap.
//! It never drops a stored date, so protected history survives any fetch.

use super::validate::{ValidationResult, Validator};
use crate::domain::{MergedSeries, OhlcvRow, RawSeries, SeriesError};
use std::collections::BTreeMap;

/// What a fetch contributes to the merge.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Validated, usable rows.
    Accepted(Vec<OhlcvRow>),
    /// The fetch produced nothing usable.
    Rejected { reason: String },
}

impl Incoming {
    /// Classify a validated series.
    ///
    /// Empty fetches, structurally invalid series and series whose rows were
    /// all rejected become `Rejected`.
    pub fn from_validated(
        validator: &Validator,
        series: &RawSeries,
        result: &ValidationResult,
    ) -> Self {
        if series.is_empty() {
            return Incoming::Rejected {
                reason: "no data returned".into(),
            };
        }
        if result.blocks_merge() {
            return Incoming::Rejected {
                reason: result.summary(),
            };
        }
        let rows = validator.usable_rows(series, result);
        if rows.is_empty() {
            return Incoming::Rejected {
                reason: format!("no usable rows ({})", result.summary()),
            };
        }
        Incoming::Accepted(rows)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Incoming::Rejected { .. })
    }
}

/// Result of a merge plus what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub series: MergedSeries,
    /// Dates not present before.
    pub added: usize,
    /// Overlapping dates whose values changed.
    pub replaced: usize,
    /// True when the existing series was returned unchanged because the
    /// incoming side was rejected.
    pub retained: bool,
}

impl MergeOutcome {
    /// Whether the merged series differs from what was stored.
    pub fn changed(&self) -> bool {
        !self.retained && (self.added > 0 || self.replaced > 0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Merge incoming rows into the existing series for `symbol`.
    ///
    /// A rejected incoming leaves the existing series untouched whether or not
    /// the ticker is protected. The result is always re-verified.
    pub fn merge(
        &self,
        symbol: &str,
        existing: Option<&MergedSeries>,
        incoming: Incoming,
        protected: bool,
    ) -> Result<MergeOutcome, SeriesError> {
        let rows = match incoming {
            Incoming::Rejected { reason } => {
                if protected {
                    tracing::info!(symbol, %reason, "protected ticker keeps stored history");
                }
                let series = existing
                    .cloned()
                    .unwrap_or_else(|| MergedSeries::empty(symbol));
                return Ok(MergeOutcome {
                    series,
                    added: 0,
                    replaced: 0,
                    retained: true,
                });
            }
            Incoming::Accepted(rows) => rows,
        };

        let mut by_date: BTreeMap<_, OhlcvRow> = existing
            .map(|s| s.rows().iter().map(|r| (r.date, r.clone())).collect())
            .unwrap_or_default();

        let mut added = 0;
        let mut replaced = 0;
        for row in rows {
            match by_date.insert(row.date, row.clone()) {
                None => added += 1,
                Some(old) if old != row => replaced += 1,
                Some(_) => {}
            }
        }

        let series = MergedSeries::new(symbol, by_date.into_values().collect())?;
        Ok(MergeOutcome {
            series,
            added,
            replaced,
            retained: false,
        })
    }
}
