//! Pipeline configuration loaded from TOML.
//!
//! Every section has documented defaults so a config file only needs the
//! `[[tickers]]` array. Validation happens at load time; a `ConfigError` is the
//! only error that aborts a whole run.

use crate::domain::{Interval, Ticker};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("ticker universe is empty")]
    EmptyUniverse,

    #[error("duplicate ticker symbol '{0}'")]
    DuplicateSymbol(String),

    #[error("ticker entry {index} has a blank symbol")]
    BlankSymbol { index: usize },

    #[error("ticker symbols '{first}' and '{second}' map to the same record name")]
    RecordNameCollision { first: String, second: String },

    #[error("unknown ticker symbol '{0}'")]
    UnknownSymbol(String),

    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Fetch window, retry policy and rate limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub start_date: NaiveDate,
    /// Defaults to today when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub interval: Interval,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_fraction: f64,
    pub rate_limit_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub workers: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            end_date: None,
            interval: Interval::Daily,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_fraction: 0.25,
            rate_limit_interval_ms: 1_000,
            request_timeout_secs: 30,
            workers: 1,
        }
    }
}

impl DownloadConfig {
    /// End of the fetch window, falling back to `today`.
    pub fn resolved_end(&self, today: NaiveDate) -> NaiveDate {
        self.end_date.unwrap_or(today)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where series records live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Report thresholds and output location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub min_rows: usize,
    pub top_n: usize,
    pub close_tolerance: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            min_rows: 20,
            top_n: 10,
            close_tolerance: 0.005,
        }
    }
}

/// Complete configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub download: DownloadConfig,
    pub storage: StorageConfig,
    pub report: ReportConfig,
    pub tickers: Vec<Ticker>,
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check settings that serde cannot express. Ticker-level checks
    /// (empty, blank, duplicate) belong to the registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.download;
        if d.max_attempts == 0 {
            return Err(invalid("download.max_attempts", "must be at least 1"));
        }
        if d.workers == 0 {
            return Err(invalid("download.workers", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&d.jitter_fraction) {
            return Err(invalid(
                "download.jitter_fraction",
                format!("{} is outside [0, 1]", d.jitter_fraction),
            ));
        }
        if d.max_delay_ms < d.base_delay_ms {
            return Err(invalid(
                "download.max_delay_ms",
                format!("{} is below base_delay_ms {}", d.max_delay_ms, d.base_delay_ms),
            ));
        }
        if let Some(end) = d.end_date {
            if end < d.start_date {
                return Err(invalid(
                    "download.end_date",
                    format!("{end} is before start_date {}", d.start_date),
                ));
            }
        }
        if !(0.0..1.0).contains(&self.report.close_tolerance) {
            return Err(invalid(
                "report.close_tolerance",
                format!("{} is outside [0, 1)", self.report.close_tolerance),
            ));
        }
        if self.report.min_rows < 2 {
            return Err(invalid("report.min_rows", "must be at least 2"));
        }
        Ok(())
    }

    /// A small sample universe written by `init-config`.
    ///
    /// The first five symbols are marked protected explicitly.
    pub fn default_universe() -> Self {
        let entries = [
            ("THYAO.IS", "Transportation", true),
            ("GARAN.IS", "Banking", true),
            ("ASELS.IS", "Defense", true),
            ("BIMAS.IS", "Retail", true),
            ("EREGL.IS", "Steel", true),
            ("AKBNK.IS", "Banking", false),
            ("YKBNK.IS", "Banking", false),
            ("ISCTR.IS", "Banking", false),
            ("KCHOL.IS", "Holding", false),
            ("SAHOL.IS", "Holding", false),
            ("TUPRS.IS", "Energy", false),
            ("PETKM.IS", "Chemicals", false),
            ("SISE.IS", "Glass", false),
            ("FROTO.IS", "Automotive", false),
            ("TOASO.IS", "Automotive", false),
            ("MGROS.IS", "Retail", false),
            ("PGSUS.IS", "Transportation", false),
            ("TCELL.IS", "Telecom", false),
        ];
        Self {
            tickers: entries
                .iter()
                .map(|(symbol, sector, protected)| {
                    Ticker::new(*symbol, *sector).with_protected(*protected)
                })
                .collect(),
            ..Self::default()
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = PipelineConfig::from_toml(
            r#"
            [[tickers]]
            symbol = "AAA"
            sector = "Tech"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.download.max_attempts, 3);
        assert_eq!(cfg.download.rate_limit_interval_ms, 1_000);
        assert_eq!(cfg.download.interval, Interval::Daily);
        assert_eq!(cfg.report.min_rows, 20);
        assert_eq!(cfg.storage.data_dir, PathBuf::from("data"));
        assert!(!cfg.tickers[0].protected);
    }

    #[test]
    fn end_date_defaults_to_today() {
        let cfg = DownloadConfig::default();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(cfg.resolved_end(today), today);
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = PipelineConfig::from_toml("[download]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidSetting { field: "download.max_attempts", .. }
        ));
    }

    #[test]
    fn rejects_inverted_window() {
        let err = PipelineConfig::from_toml(
            "[download]\nstart_date = \"2025-02-01\"\nend_date = \"2025-01-01\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { field: "download.end_date", .. }));
    }

    #[test]
    fn rejects_unknown_interval() {
        let err = PipelineConfig::from_toml("[download]\ninterval = \"5m\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn default_universe_roundtrips() {
        let cfg = PipelineConfig::default_universe();
        let text = cfg.to_toml().unwrap();
        let parsed = PipelineConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.tickers.iter().filter(|t| t.protected).count(), 5);
    }
}
