//! OHLCV rows — the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar interval requested from the data source.
///
/// Only daily-or-coarser granularities exist; intraday bars are not supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    Monthly,
}

impl Interval {
    /// Wire code used by the data source and in record file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Interval::Daily),
            "1wk" => Ok(Interval::Weekly),
            "1mo" => Ok(Interval::Monthly),
            other => Err(format!("unsupported interval '{other}' (expected 1d, 1wk or 1mo)")),
        }
    }
}

/// One row as returned by a fetch, before validation.
///
/// Any field may be absent: the data source reports partial rows for halted
/// sessions and occasionally drops volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl RawRow {
    /// A row with every field present.
    pub fn complete(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            date,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    /// Names of the fields that are absent (or NaN) on this row.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let present = |v: Option<f64>| v.is_some_and(|x| !x.is_nan());
        let mut missing = Vec::new();
        if !present(self.open) {
            missing.push("open");
        }
        if !present(self.high) {
            missing.push("high");
        }
        if !present(self.low) {
            missing.push("low");
        }
        if !present(self.close) {
            missing.push("close");
        }
        if self.volume.is_none() {
            missing.push("volume");
        }
        missing
    }

    /// Convert to a complete row, or `None` if any field is missing.
    pub fn to_ohlcv(&self) -> Option<OhlcvRow> {
        if !self.missing_fields().is_empty() {
            return None;
        }
        Some(OhlcvRow {
            date: self.date,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume?,
        })
    }
}

/// A complete daily OHLCV row, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvRow {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl From<&OhlcvRow> for RawRow {
    fn from(row: &OhlcvRow) -> Self {
        RawRow::complete(row.date, row.open, row.high, row.low, row.close, row.volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn complete_row_converts() {
        let raw = RawRow::complete(d(2), 10.0, 11.0, 9.0, 10.5, 100);
        let row = raw.to_ohlcv().unwrap();
        assert_eq!(row, OhlcvRow::new(d(2), 10.0, 11.0, 9.0, 10.5, 100));
    }

    #[test]
    fn missing_fields_are_listed_in_column_order() {
        let raw = RawRow {
            date: d(2),
            open: None,
            high: Some(11.0),
            low: Some(f64::NAN),
            close: Some(10.0),
            volume: None,
        };
        assert_eq!(raw.missing_fields(), vec!["open", "low", "volume"]);
        assert!(raw.to_ohlcv().is_none());
    }

    #[test]
    fn interval_codes() {
        assert_eq!(Interval::Daily.to_string(), "1d");
        assert_eq!("1wk".parse::<Interval>().unwrap(), Interval::Weekly);
        assert!("5m".parse::<Interval>().is_err());
    }
}
