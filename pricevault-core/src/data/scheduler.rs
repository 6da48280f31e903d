//! Download scheduler — rate-limited fetch with retry for a batch of tickers.
//!
//! Every attempt goes through the shared [`RateGate`]. Failures are retried
//! per [`RetryPolicy`] and recorded on the ticker's [`DownloadJob`]; nothing
//! here panics or aborts the batch. Tickers run in registry order, or on a
//! private rayon pool when `workers > 1`.

use super::job::{DownloadJob, JobState};
use super::provider::FetchClient;
use super::rate_gate::RateGate;
use super::retry::RetryPolicy;
use super::store::ExistingDataStore;
use crate::domain::{Interval, RawSeries, Ticker};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the scheduler and whoever
/// wants to stop it (e.g. a Ctrl-C handler).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress callback for multi-ticker downloads.
pub trait DownloadProgress: Send + Sync {
    /// Called when a ticker starts downloading.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a ticker's job reaches a terminal state.
    fn on_complete(&self, symbol: &str, index: usize, total: usize, job: &DownloadJob);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that logs through `tracing`.
pub struct TracingProgress;

impl DownloadProgress for TracingProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        tracing::info!("[{}/{}] fetching {symbol}", index + 1, total);
    }

    fn on_complete(&self, symbol: &str, _index: usize, _total: usize, job: &DownloadJob) {
        match (job.state(), job.failure()) {
            (JobState::Succeeded, _) => {
                tracing::info!(symbol, attempts = job.attempt_count(), "download ok")
            }
            (_, Some(reason)) => tracing::warn!(symbol, %reason, "download failed"),
            (state, None) => tracing::warn!(symbol, %state, "download ended unexpectedly"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("download complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Configured fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
}

/// Everything the scheduler learned about one ticker.
#[derive(Debug, Clone)]
pub struct TickerFetch {
    pub ticker: Ticker,
    pub job: DownloadJob,
    /// Present exactly when the job succeeded.
    pub series: Option<RawSeries>,
    /// Range actually requested; `None` when cancelled before start.
    pub requested: Option<(NaiveDate, NaiveDate)>,
}

pub struct DownloadScheduler<'a> {
    client: &'a dyn FetchClient,
    gate: &'a RateGate,
    existing: &'a dyn ExistingDataStore,
    policy: RetryPolicy,
    window: DownloadWindow,
    workers: usize,
    cancel: CancelToken,
}

impl<'a> DownloadScheduler<'a> {
    pub fn new(
        client: &'a dyn FetchClient,
        gate: &'a RateGate,
        existing: &'a dyn ExistingDataStore,
        policy: RetryPolicy,
        window: DownloadWindow,
    ) -> Self {
        Self {
            client,
            gate,
            existing,
            policy,
            window,
            workers: 1,
            cancel: CancelToken::new(),
        }
    }

    /// Bounded worker count; 1 (the default) is strictly sequential.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Date range to request for a ticker.
    ///
    /// Protected tickers with stored history resume from their last stored
    /// date, so that history is never re-requested. Everything else fetches
    /// the full configured window.
    pub fn plan_window(&self, ticker: &Ticker) -> (NaiveDate, NaiveDate) {
        let full = (self.window.start, self.window.end);
        if !ticker.protected {
            return full;
        }
        match self.existing.last_date(&ticker.symbol) {
            Ok(Some(last)) => (last.max(self.window.start).min(self.window.end), self.window.end),
            Ok(None) => full,
            Err(e) => {
                tracing::warn!(symbol = %ticker.symbol, error = %e, "cannot read stored history; fetching full window");
                full
            }
        }
    }

    /// Run the job state machine for one ticker until it is terminal.
    pub fn fetch_ticker(&self, ticker: &Ticker) -> TickerFetch {
        let (start, end) = self.plan_window(ticker);
        let mut job = DownloadJob::new(&ticker.symbol);
        let mut rng = rand::thread_rng();

        loop {
            if let Err(e) = job.begin_attempt() {
                tracing::error!(error = %e, "invalid job transition");
                break;
            }
            self.gate.acquire();

            match self
                .client
                .fetch(&ticker.symbol, start, end, self.window.interval)
            {
                Ok(series) => {
                    if let Err(e) = job.record_success() {
                        tracing::error!(error = %e, "invalid job transition");
                        break;
                    }
                    return TickerFetch {
                        ticker: ticker.clone(),
                        job,
                        series: Some(series),
                        requested: Some((start, end)),
                    };
                }
                Err(err) => {
                    let hint = err.retry_after();
                    tracing::warn!(
                        symbol = %ticker.symbol,
                        attempt = job.attempt_count(),
                        error = %err,
                        "fetch attempt failed"
                    );
                    match job.record_failure(err, self.policy.max_attempts) {
                        Ok(JobState::Retrying) => {
                            let delay =
                                self.policy
                                    .backoff_delay(job.attempt_count(), hint, &mut rng);
                            tracing::debug!(
                                symbol = %ticker.symbol,
                                delay_ms = delay.as_millis() as u64,
                                "backing off"
                            );
                            std::thread::sleep(delay);
                        }
                        Ok(_) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "invalid job transition");
                            break;
                        }
                    }
                }
            }
        }

        TickerFetch {
            ticker: ticker.clone(),
            job,
            series: None,
            requested: Some((start, end)),
        }
    }

    /// Download every ticker and hand each result to `handle` as soon as it
    /// is available. Results come back in input order.
    ///
    /// Cancellation is checked before each ticker starts; tickers not yet
    /// started are handed over with a `Cancelled` job. A ticker already
    /// started runs through `handle` to completion.
    pub fn run<T, F>(&self, tickers: &[Ticker], progress: &dyn DownloadProgress, handle: F) -> Vec<T>
    where
        T: Send,
        F: Fn(TickerFetch) -> T + Sync,
    {
        let total = tickers.len();

        let process = |index: usize, ticker: &Ticker| -> (JobState, T) {
            if self.cancel.is_cancelled() {
                let mut job = DownloadJob::new(&ticker.symbol);
                let _ = job.cancel();
                progress.on_complete(&ticker.symbol, index, total, &job);
                let state = job.state();
                let fetch = TickerFetch {
                    ticker: ticker.clone(),
                    job,
                    series: None,
                    requested: None,
                };
                return (state, handle(fetch));
            }
            progress.on_start(&ticker.symbol, index, total);
            let fetch = self.fetch_ticker(ticker);
            progress.on_complete(&ticker.symbol, index, total, &fetch.job);
            (fetch.job.state(), handle(fetch))
        };

        let pool = if self.workers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build worker pool; running sequentially");
                    None
                }
            }
        } else {
            None
        };

        let results: Vec<(JobState, T)> = if let Some(ref tp) = pool {
            tp.install(|| {
                tickers
                    .par_iter()
                    .enumerate()
                    .map(|(i, t)| process(i, t))
                    .collect()
            })
        } else {
            tickers
                .iter()
                .enumerate()
                .map(|(i, t)| process(i, t))
                .collect()
        };

        let succeeded = results
            .iter()
            .filter(|(s, _)| *s == JobState::Succeeded)
            .count();
        progress.on_batch_complete(succeeded, total - succeeded, total);

        results.into_iter().map(|(_, t)| t).collect()
    }

    /// Download every ticker without further processing.
    pub fn download_all(&self, tickers: &[Ticker], progress: &dyn DownloadProgress) -> Vec<TickerFetch> {
        self.run(tickers, progress, |fetch| fetch)
    }
}
