//! Pipeline orchestration — one acquisition-and-merge run over the universe.
//!
//! registry → scheduler (rate gate + retry) → validator → merge → store,
//! then the summary report over every ticker that made it through.
//! Each ticker is validated, merged and written as soon as its download
//! finishes; only a configuration error aborts the run.

use crate::export;
use crate::report::{ReportGenerator, SummaryReport};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use pricevault_core::data::{
    CancelToken, DownloadJob, DownloadProgress, DownloadScheduler, DownloadWindow, FailureReason,
    FetchClient, Incoming, MergeEngine, PersistenceStore, RateGate, RetryPolicy, SeriesStore,
    StoreError, TickerFetch, TickerRegistry, Validator,
};
use pricevault_core::domain::{Interval, MergedSeries, Ticker};
use pricevault_core::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why a ticker failed for this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    InvalidTicker,
    RetriesExhausted { attempts: u32 },
    Cancelled,
    Validation { reason: String },
    Persistence { error: String },
}

impl From<&FailureReason> for RunFailure {
    fn from(reason: &FailureReason) -> Self {
        match reason {
            FailureReason::InvalidTicker => RunFailure::InvalidTicker,
            FailureReason::RetriesExhausted { attempts } => RunFailure::RetriesExhausted {
                attempts: *attempts,
            },
            FailureReason::Cancelled => RunFailure::Cancelled,
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::InvalidTicker => f.write_str("invalid or unlisted symbol"),
            RunFailure::RetriesExhausted { attempts } => {
                write!(f, "retries exhausted after {attempts} attempts")
            }
            RunFailure::Cancelled => f.write_str("cancelled before start"),
            RunFailure::Validation { reason } => write!(f, "validation failed: {reason}"),
            RunFailure::Persistence { error } => write!(f, "persistence failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerStatus {
    Succeeded,
    RetriedThenSucceeded,
    Failed,
}

/// Per-ticker line of the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerOutcome {
    pub symbol: String,
    pub protected: bool,
    pub status: TickerStatus,
    pub attempts: u32,
    pub requested_start: Option<NaiveDate>,
    pub requested_end: Option<NaiveDate>,
    /// Validation summary, `ok` when clean.
    pub issues: Option<String>,
    pub rows_added: usize,
    pub rows_replaced: usize,
    pub stored_rows: usize,
    pub written: bool,
    pub failure: Option<RunFailure>,
}

impl TickerOutcome {
    fn new(ticker: &Ticker, job: &DownloadJob, requested: Option<(NaiveDate, NaiveDate)>) -> Self {
        Self {
            symbol: ticker.symbol.clone(),
            protected: ticker.protected,
            status: if job.was_retried() {
                TickerStatus::RetriedThenSucceeded
            } else {
                TickerStatus::Succeeded
            },
            attempts: job.attempt_count(),
            requested_start: requested.map(|(s, _)| s),
            requested_end: requested.map(|(_, e)| e),
            issues: None,
            rows_added: 0,
            rows_replaced: 0,
            stored_rows: 0,
            written: false,
            failure: None,
        }
    }

    fn fail(&mut self, failure: RunFailure) {
        self.status = TickerStatus::Failed;
        self.failure = Some(failure);
    }
}

/// The per-run record of succeeded, retried-then-succeeded and failed tickers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub interval: Interval,
    pub requests_issued: u64,
    pub cancelled: bool,
    pub outcomes: Vec<TickerOutcome>,
}

impl RunReport {
    pub fn with_status(&self, status: TickerStatus) -> impl Iterator<Item = &TickerOutcome> {
        self.outcomes.iter().filter(move |o| o.status == status)
    }

    pub fn succeeded(&self) -> usize {
        self.with_status(TickerStatus::Succeeded).count()
    }

    pub fn retried_then_succeeded(&self) -> usize {
        self.with_status(TickerStatus::RetriedThenSucceeded).count()
    }

    pub fn failed(&self) -> usize {
        self.with_status(TickerStatus::Failed).count()
    }

    pub fn outcome(&self, symbol: &str) -> Option<&TickerOutcome> {
        self.outcomes.iter().find(|o| o.symbol == symbol)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            succeeded = self.succeeded(),
            retried = self.retried_then_succeeded(),
            failed = self.failed(),
            requests = self.requests_issued,
            cancelled = self.cancelled,
            "run complete"
        );
        for o in self.with_status(TickerStatus::Failed) {
            if let Some(f) = &o.failure {
                tracing::warn!(symbol = %o.symbol, reason = %f, "ticker failed");
            }
        }
    }
}

/// Run report plus the summary built from it.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: RunReport,
    pub summary: SummaryReport,
}

struct Processed {
    outcome: TickerOutcome,
    series: Option<(Ticker, MergedSeries)>,
}

/// Wires the core components together for one run.
pub struct Pipeline<'a, S: PersistenceStore = SeriesStore> {
    config: &'a PipelineConfig,
    client: &'a dyn FetchClient,
    store: &'a S,
    progress: &'a dyn DownloadProgress,
    cancel: CancelToken,
    validator: Validator,
    merger: MergeEngine,
}

impl<'a, S: PersistenceStore> Pipeline<'a, S> {
    pub fn new(
        config: &'a PipelineConfig,
        client: &'a dyn FetchClient,
        store: &'a S,
        progress: &'a dyn DownloadProgress,
    ) -> Self {
        Self {
            config,
            client,
            store,
            progress,
            cancel: CancelToken::new(),
            validator: Validator::new(config.report.close_tolerance),
            merger: MergeEngine::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Download, validate, merge and persist every ticker, then summarise.
    pub fn run(&self, tickers: &[Ticker], today: NaiveDate) -> Result<PipelineRun> {
        let started_at = chrono::Local::now().naive_local();
        let dl = &self.config.download;
        let window = DownloadWindow {
            start: dl.start_date,
            end: dl.resolved_end(today),
            interval: dl.interval,
        };
        anyhow::ensure!(
            window.end >= window.start,
            "fetch window ends ({}) before it starts ({})",
            window.end,
            window.start
        );

        let policy = RetryPolicy {
            max_attempts: dl.max_attempts,
            base_delay: dl.base_delay(),
            max_delay: dl.max_delay(),
            jitter_fraction: dl.jitter_fraction,
        };
        let gate = RateGate::new(dl.rate_limit_interval());
        let scheduler = DownloadScheduler::new(self.client, &gate, self.store, policy, window)
            .with_workers(dl.workers)
            .with_cancel(self.cancel.clone());

        tracing::info!(
            tickers = tickers.len(),
            start = %window.start,
            end = %window.end,
            interval = %window.interval,
            workers = dl.workers,
            client = self.client.name(),
            "starting run"
        );

        let processed = scheduler.run(tickers, self.progress, |fetch| self.process(fetch));

        let mut outcomes = Vec::with_capacity(processed.len());
        let mut merged = Vec::new();
        for p in processed {
            outcomes.push(p.outcome);
            if let Some(entry) = p.series {
                merged.push(entry);
            }
        }

        let report = RunReport {
            started_at,
            finished_at: chrono::Local::now().naive_local(),
            window_start: window.start,
            window_end: window.end,
            interval: window.interval,
            requests_issued: gate.requests_issued(),
            cancelled: self.cancel.is_cancelled(),
            outcomes,
        };
        report.log_summary();

        let summary =
            ReportGenerator::new(self.config.report.min_rows, self.config.report.top_n)
                .generate(&merged);

        Ok(PipelineRun { report, summary })
    }

    /// Validate, merge and persist one downloaded ticker.
    fn process(&self, fetch: TickerFetch) -> Processed {
        let TickerFetch {
            ticker,
            job,
            series,
            requested,
        } = fetch;
        let mut outcome = TickerOutcome::new(&ticker, &job, requested);
        let symbol = ticker.symbol.as_str();

        let Some(raw) = series else {
            let failure = job
                .failure()
                .map(RunFailure::from)
                .unwrap_or(RunFailure::RetriesExhausted {
                    attempts: job.attempt_count(),
                });
            outcome.fail(failure);
            return Processed {
                outcome,
                series: None,
            };
        };

        let validation = self.validator.validate(&raw);
        if !validation.issues.is_empty() {
            tracing::warn!(symbol, issues = %validation.summary(), "validation issues");
        }
        outcome.issues = Some(validation.summary());

        let existing = match self.read_with_retry(symbol) {
            Ok(existing) => existing,
            Err(e) => {
                outcome.fail(RunFailure::Persistence {
                    error: format!("reading stored history: {e}"),
                });
                return Processed {
                    outcome,
                    series: None,
                };
            }
        };

        let incoming = Incoming::from_validated(&self.validator, &raw, &validation);
        let rejected = match &incoming {
            Incoming::Rejected { reason } => Some(reason.clone()),
            Incoming::Accepted(_) => None,
        };

        let merged = match self
            .merger
            .merge(symbol, existing.as_ref(), incoming, ticker.protected)
        {
            Ok(m) => m,
            Err(e) => {
                outcome.fail(RunFailure::Validation {
                    reason: e.to_string(),
                });
                return Processed {
                    outcome,
                    series: None,
                };
            }
        };
        outcome.stored_rows = merged.series.len();

        if let Some(reason) = rejected {
            // An empty answer is "nothing new", not a failure.
            if !raw.is_empty() {
                outcome.fail(RunFailure::Validation { reason });
                return Processed {
                    outcome,
                    series: None,
                };
            }
        }

        outcome.rows_added = merged.added;
        outcome.rows_replaced = merged.replaced;

        if merged.changed() {
            if let Err(e) = self.write_with_retry(symbol, &merged.series) {
                outcome.fail(RunFailure::Persistence {
                    error: format!("{e:#}"),
                });
                return Processed {
                    outcome,
                    series: None,
                };
            }
            outcome.written = true;
        }

        tracing::info!(
            symbol,
            added = merged.added,
            replaced = merged.replaced,
            rows = merged.series.len(),
            "merged"
        );

        let series = (!merged.series.is_empty()).then(|| (ticker.clone(), merged.series));
        Processed { outcome, series }
    }

    /// I/O errors on read get one more try; a corrupt record fails at once.
    fn read_with_retry(&self, symbol: &str) -> Result<Option<MergedSeries>, StoreError> {
        match self.store.read_existing(symbol) {
            Err(first @ StoreError::Io { .. }) => {
                tracing::warn!(symbol, error = %first, "read failed; retrying once");
                self.store.read_existing(symbol)
            }
            other => other,
        }
    }

    /// Persistence errors get one more try before the ticker fails.
    fn write_with_retry(&self, symbol: &str, series: &MergedSeries) -> Result<()> {
        match self.store.write(symbol, series) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(symbol, error = %first, "write failed; retrying once");
                self.store
                    .write(symbol, series)
                    .with_context(|| format!("writing {symbol} (after retry)"))
            }
        }
    }
}

/// Which tickers a run covers.
#[derive(Debug, Clone, Default)]
pub enum Selection {
    #[default]
    All,
    /// The protected subset only.
    Protected,
    Only(Vec<String>),
}

/// Load the registry, run the pipeline against the configured store and write
/// the report artifacts. Returns the run and the artifact directory.
pub fn execute(
    config: &PipelineConfig,
    client: &dyn FetchClient,
    selection: &Selection,
    progress: &dyn DownloadProgress,
    cancel: CancelToken,
    today: NaiveDate,
) -> Result<(PipelineRun, PathBuf)> {
    let registry = TickerRegistry::load(&config.tickers).context("invalid ticker universe")?;
    let tickers = match selection {
        Selection::All => registry.tickers().to_vec(),
        Selection::Protected => registry.protected_only().into_iter().cloned().collect(),
        Selection::Only(symbols) => registry.select(symbols)?,
    };
    if tickers.is_empty() {
        tracing::warn!(?selection, "selection matched no tickers");
    }

    let store = SeriesStore::new(
        &config.storage.data_dir,
        config.download.start_date,
        config.download.interval,
    );
    let run = Pipeline::new(config, client, &store, progress)
        .with_cancel(cancel)
        .run(&tickers, today)?;

    let out_dir = &config.report.output_dir;
    export::write_artifacts(out_dir, &run.summary, &run.report)
        .with_context(|| format!("writing report artifacts to {}", out_dir.display()))?;

    Ok((run, out_dir.clone()))
}
