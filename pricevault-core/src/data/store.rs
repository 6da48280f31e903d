//! Parquet series store with atomic writes.
//!
//! Layout: `{data_dir}/{SYMBOL}_{start}_{interval}.parquet`, plus a
//! `{SYMBOL}_{start}_{interval}.meta.json` sidecar.
//!
//! Features:
//! - Atomic writes (write and sync `.parquet.tmp`, rename into place)
//! - Per-record write lock; different symbols write concurrently
//! - Sidecar names the owning symbol, so two symbols never share a record
//! - Ordering invariant re-verified on every read
//! - Metadata sidecar per symbol (row count, date range, blake3 hash)

use crate::domain::{Interval, MergedSeries, OhlcvRow};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("corrupt record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("record for '{symbol}' is owned by '{owner}'")]
    NameCollision { symbol: String, owner: String },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read access to previously persisted series.
pub trait ExistingDataStore: Send + Sync {
    /// The stored series, or `None` if nothing was ever written.
    fn read_existing(&self, symbol: &str) -> Result<Option<MergedSeries>, StoreError>;

    /// Last stored date, if any.
    fn last_date(&self, symbol: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.read_existing(symbol)?.and_then(|s| s.last_date()))
    }
}

/// Read and write access to persisted series.
pub trait PersistenceStore: ExistingDataStore {
    /// Replace the stored series for a symbol.
    fn write(&self, symbol: &str, series: &MergedSeries) -> Result<(), StoreError>;
}

/// Metadata sidecar for a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: usize,
    pub data_hash: String,
    pub interval: Interval,
    pub written_at: chrono::NaiveDateTime,
}

/// Store status for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub symbol: String,
    pub stored: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: Option<usize>,
    pub written_at: Option<chrono::NaiveDateTime>,
}

/// The Parquet store.
pub struct SeriesStore {
    data_dir: PathBuf,
    start: NaiveDate,
    interval: Interval,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SeriesStore {
    /// `start` and `interval` are part of every record name, so stores
    /// configured with different windows never share files.
    pub fn new(data_dir: impl Into<PathBuf>, start: NaiveDate, interval: Interval) -> Self {
        Self {
            data_dir: data_dir.into(),
            start,
            interval,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn stem(&self, symbol: &str) -> String {
        format!("{}_{}_{}", sanitize_symbol(symbol), self.start, self.interval)
    }

    /// Path of the Parquet record for a symbol.
    pub fn record_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.parquet", self.stem(symbol)))
    }

    fn staging_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.parquet.tmp", self.stem(symbol)))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.meta.json", self.stem(symbol)))
    }

    /// Keyed by record name, so symbols that sanitize alike share a lock.
    fn record_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(self.stem(symbol)).or_default())
    }

    fn check_owner(&self, symbol: &str) -> Result<(), StoreError> {
        match self.get_meta(symbol) {
            Some(meta) if meta.symbol != symbol => Err(StoreError::NameCollision {
                symbol: symbol.to_string(),
                owner: meta.symbol,
            }),
            _ => Ok(()),
        }
    }

    /// Read the stored series for a symbol.
    ///
    /// A missing record is `Ok(None)`. Staging files from an interrupted
    /// write are never looked at.
    pub fn read(&self, symbol: &str) -> Result<Option<MergedSeries>, StoreError> {
        let path = self.record_path(symbol);
        if !path.exists() {
            return Ok(None);
        }
        self.check_owner(symbol)?;
        let rows = load_parquet(&path)?;
        MergedSeries::new(symbol, rows)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path,
                reason: e.to_string(),
            })
    }

    /// Replace the stored series for a symbol.
    ///
    /// The record is written and synced to a staging file, then renamed over
    /// the previous one, so a crash leaves either the old or the new record.
    pub fn write(&self, symbol: &str, series: &MergedSeries) -> Result<(), StoreError> {
        let lock = self.record_lock(symbol);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        fs::create_dir_all(&self.data_dir).map_err(io_err(&self.data_dir))?;
        self.check_owner(symbol)?;

        let path = self.record_path(symbol);
        let tmp_path = self.staging_path(symbol);

        let mut df = rows_to_dataframe(series.rows())?;
        if let Err(e) = write_parquet(&mut df, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })?;

        let meta = RecordMeta {
            symbol: symbol.to_string(),
            start_date: series.first_date(),
            end_date: series.last_date(),
            row_count: series.len(),
            data_hash: content_hash(series.rows())?,
            interval: self.interval,
            written_at: chrono::Local::now().naive_local(),
        };
        self.write_meta(symbol, &meta)?;

        tracing::debug!(symbol, rows = series.len(), path = %path.display(), "record written");
        Ok(())
    }

    fn write_meta(&self, symbol: &str, meta: &RecordMeta) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| StoreError::Metadata(format!("serialize: {e}")))?;
        let path = self.meta_path(symbol);
        let tmp_path = self.data_dir.join(format!("{}.meta.json.tmp", self.stem(symbol)));
        let staged = fs::File::create(&tmp_path)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .map_err(io_err(&tmp_path));
        if let Err(e) = staged {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })
    }

    /// Metadata sidecar for a symbol, if present and readable.
    pub fn get_meta(&self, symbol: &str) -> Option<RecordMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Which symbols have stored records, and their date ranges.
    pub fn status(&self, symbols: &[&str]) -> Vec<RecordStatus> {
        symbols
            .iter()
            .map(|sym| {
                let stored = self.record_path(sym).exists();
                let meta = if stored { self.get_meta(sym) } else { None };
                RecordStatus {
                    symbol: sym.to_string(),
                    stored,
                    start_date: meta.as_ref().and_then(|m| m.start_date),
                    end_date: meta.as_ref().and_then(|m| m.end_date),
                    row_count: meta.as_ref().map(|m| m.row_count),
                    written_at: meta.as_ref().map(|m| m.written_at),
                }
            })
            .collect()
    }
}

impl PersistenceStore for SeriesStore {
    fn write(&self, symbol: &str, series: &MergedSeries) -> Result<(), StoreError> {
        SeriesStore::write(self, symbol, series)
    }
}

impl ExistingDataStore for SeriesStore {
    fn read_existing(&self, symbol: &str) -> Result<Option<MergedSeries>, StoreError> {
        self.read(symbol)
    }

    /// Uses the sidecar when present. A sidecar can only lag the record (it is
    /// written second), which at worst widens the next fetch window.
    fn last_date(&self, symbol: &str) -> Result<Option<NaiveDate>, StoreError> {
        if !self.record_path(symbol).exists() {
            return Ok(None);
        }
        self.check_owner(symbol)?;
        match self.get_meta(symbol) {
            Some(meta) => Ok(meta.end_date),
            None => Ok(self.read(symbol)?.and_then(|s| s.last_date())),
        }
    }
}

/// Record-name form of a symbol: characters outside `[A-Za-z0-9._-]` become `_`.
pub fn sanitize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn content_hash(rows: &[OhlcvRow]) -> Result<String, StoreError> {
    let bytes =
        serde_json::to_vec(rows).map_err(|e| StoreError::Metadata(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn rows_to_dataframe(rows: &[OhlcvRow]) -> Result<DataFrame, StoreError> {
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<i64> = rows.iter().map(|r| r.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    let mut file = fs::File::create(path).map_err(io_err(path))?;
    ParquetWriter::new(&mut file)
        .finish(df)
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    file.sync_all().map_err(io_err(path))
}

fn load_parquet(path: &Path) -> Result<Vec<OhlcvRow>, StoreError> {
    let file = fs::File::open(path).map_err(io_err(path))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read {}: {e}", path.display())))?;

    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let column = |name: &str| {
        df.column(name)
            .map_err(|_| corrupt(format!("missing column '{name}'")))
    };

    let date_ca = column("date")?
        .date()
        .map_err(|e| corrupt(format!("date column type: {e}")))?;
    let f64_col = |name: &str| -> Result<Vec<Option<f64>>, StoreError> {
        Ok(column(name)?
            .f64()
            .map_err(|e| corrupt(format!("{name} column type: {e}")))?
            .into_iter()
            .collect())
    };
    let opens = f64_col("open")?;
    let highs = f64_col("high")?;
    let lows = f64_col("low")?;
    let closes = f64_col("close")?;
    let volumes: Vec<Option<i64>> = column("volume")?
        .i64()
        .map_err(|e| corrupt(format!("volume column type: {e}")))?
        .into_iter()
        .collect();

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let days = date_ca
            .get(i)
            .ok_or_else(|| corrupt(format!("null date at row {i}")))?;
        let date = epoch() + chrono::Duration::days(days as i64);
        match (opens[i], highs[i], lows[i], closes[i], volumes[i]) {
            (Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
                rows.push(OhlcvRow::new(date, open, high, low, close, volume));
            }
            _ => return Err(corrupt(format!("null value on {date}"))),
        }
    }
    Ok(rows)
}
