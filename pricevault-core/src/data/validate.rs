//! Data validation for fetched series.
//!
//! Checks a RawSeries for structural problems and bad values before it is
//! allowed near the merge. Validation is pure: it reports issues and never
//! modifies the series.

use crate::domain::{OhlcvRow, RawSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    NoData,
    MissingField,
    DuplicateDate,
    NonPositiveClose,
    NegativeVolume,
    CloseOutsideRange,
    InvertedRange,
}

/// How an issue affects what reaches the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Reported only.
    Warning,
    /// The offending row is dropped; the rest of the series may merge.
    RowRejected,
    /// The whole series is unusable for this attempt.
    Structural,
}

impl IssueKind {
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::NoData | IssueKind::CloseOutsideRange | IssueKind::InvertedRange => {
                Severity::Warning
            }
            IssueKind::NonPositiveClose | IssueKind::NegativeVolume => Severity::RowRejected,
            IssueKind::MissingField | IssueKind::DuplicateDate => Severity::Structural,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueKind::NoData => "no_data",
            IssueKind::MissingField => "missing_field",
            IssueKind::DuplicateDate => "duplicate_date",
            IssueKind::NonPositiveClose => "non_positive_close",
            IssueKind::NegativeVolume => "negative_volume",
            IssueKind::CloseOutsideRange => "close_outside_range",
            IssueKind::InvertedRange => "inverted_range",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub date: Option<NaiveDate>,
    pub detail: String,
}

/// Outcome of validating one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub symbol: String,
    pub passed: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Any structural issue means nothing from this series may be merged.
    pub fn blocks_merge(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.kind.severity() == Severity::Structural)
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Dates carrying at least one row-rejected issue.
    pub fn rejected_dates(&self) -> BTreeSet<NaiveDate> {
        self.issues
            .iter()
            .filter(|i| i.kind.severity() == Severity::RowRejected)
            .filter_map(|i| i.date)
            .collect()
    }

    /// One-line description, e.g. `missing_field x2, negative_volume x1`.
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            return "ok".to_string();
        }
        let mut kinds: Vec<IssueKind> = Vec::new();
        for issue in &self.issues {
            if !kinds.contains(&issue.kind) {
                kinds.push(issue.kind);
            }
        }
        kinds
            .iter()
            .map(|k| format!("{k} x{}", self.count(*k)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Series validator with a configurable close-in-range tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validator {
    /// Relative slack allowed when checking `low <= close <= high`.
    pub close_tolerance: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            close_tolerance: 0.005,
        }
    }
}

impl Validator {
    pub fn new(close_tolerance: f64) -> Self {
        Self { close_tolerance }
    }

    pub fn validate(&self, series: &RawSeries) -> ValidationResult {
        let mut issues = Vec::new();

        if series.is_empty() {
            issues.push(ValidationIssue {
                kind: IssueKind::NoData,
                date: None,
                detail: "series is empty".into(),
            });
        }

        let mut seen = HashSet::with_capacity(series.len());
        let mut reported_dupes = HashSet::new();

        for row in &series.rows {
            let date = row.date;

            if !seen.insert(date) && reported_dupes.insert(date) {
                issues.push(issue(IssueKind::DuplicateDate, date, "date appears more than once"));
            }

            let missing = row.missing_fields();
            if !missing.is_empty() {
                issues.push(issue(
                    IssueKind::MissingField,
                    date,
                    format!("missing {}", missing.join(", ")),
                ));
            }

            if let Some(close) = row.close.filter(|c| !c.is_nan()) {
                if close <= 0.0 {
                    issues.push(issue(
                        IssueKind::NonPositiveClose,
                        date,
                        format!("close {close} <= 0"),
                    ));
                }
            }

            if let Some(volume) = row.volume {
                if volume < 0 {
                    issues.push(issue(
                        IssueKind::NegativeVolume,
                        date,
                        format!("volume {volume} < 0"),
                    ));
                }
            }

            if let (Some(high), Some(low)) = (row.high, row.low) {
                if high < low {
                    issues.push(issue(
                        IssueKind::InvertedRange,
                        date,
                        format!("high {high} < low {low}"),
                    ));
                } else if let Some(close) = row.close {
                    let lo = low * (1.0 - self.close_tolerance);
                    let hi = high * (1.0 + self.close_tolerance);
                    if close < lo || close > hi {
                        issues.push(issue(
                            IssueKind::CloseOutsideRange,
                            date,
                            format!("close {close} outside [{low}, {high}]"),
                        ));
                    }
                }
            }
        }

        let passed = !issues
            .iter()
            .any(|i| i.kind.severity() >= Severity::RowRejected);

        ValidationResult {
            symbol: series.symbol.clone(),
            passed,
            issues,
        }
    }

    /// Complete rows that carry no row-rejected issue, sorted by date.
    ///
    /// Returns nothing when the result blocks the merge.
    pub fn usable_rows(&self, series: &RawSeries, result: &ValidationResult) -> Vec<OhlcvRow> {
        if result.blocks_merge() {
            return Vec::new();
        }
        let rejected = result.rejected_dates();
        let mut rows: Vec<OhlcvRow> = series
            .rows
            .iter()
            .filter(|r| !rejected.contains(&r.date))
            .filter_map(|r| r.to_ohlcv())
            .collect();
        rows.sort_by_key(|r| r.date);
        rows
    }
}

/// Validate with default settings.
pub fn validate(series: &RawSeries) -> ValidationResult {
    Validator::default().validate(series)
}

fn issue(kind: IssueKind, date: NaiveDate, detail: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        kind,
        date: Some(date),
        detail: detail.into(),
    }
}
