//! Integration tests for the download scheduler.
//!
//! Tests:
//! 1. Always-retryable failures end in Failed after exactly max_attempts
//! 2. Invalid symbols are terminal after one attempt
//! 3. Transient failures then success count as retried
//! 4. Every attempt consumes one unit of rate budget
//! 5. Protected tickers resume from their last stored date
//! 6. Cancellation before start marks every ticker Cancelled
//! 7. Worker pool preserves input order

use chrono::NaiveDate;
use pricevault_core::data::{
    CancelToken, DownloadJob, DownloadProgress, DownloadScheduler, DownloadWindow,
    ExistingDataStore, FailureReason, FetchClient, FetchError, JobState, RateGate, RetryPolicy,
    StoreError,
};
use pricevault_core::domain::{Interval, MergedSeries, OhlcvRow, RawRow, RawSeries, Ticker};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

/// Replays a fixed script of responses per symbol and records every call.
#[derive(Default)]
struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Result<RawSeries, FetchError>>>>,
    calls: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl ScriptedClient {
    fn script(self, symbol: &str, responses: Vec<Result<RawSeries, FetchError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), responses.into());
        self
    }

    fn calls_for(&self, symbol: &str) -> Vec<(NaiveDate, NaiveDate)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| s == symbol)
            .map(|(_, a, b)| (*a, *b))
            .collect()
    }
}

impl FetchClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _interval: Interval,
    ) -> Result<RawSeries, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), start, end));
        self.scripts
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(FetchError::Network("script exhausted".into())))
    }
}

#[derive(Default)]
struct MemoryStore(HashMap<String, MergedSeries>);

impl ExistingDataStore for MemoryStore {
    fn read_existing(&self, symbol: &str) -> Result<Option<MergedSeries>, StoreError> {
        Ok(self.0.get(symbol).cloned())
    }
}

struct Quiet;

impl DownloadProgress for Quiet {
    fn on_start(&self, _: &str, _: usize, _: usize) {}
    fn on_complete(&self, _: &str, _: usize, _: usize, _: &DownloadJob) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
}

fn instant_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter_fraction: 0.0,
    }
}

fn window() -> DownloadWindow {
    DownloadWindow {
        start: d(1),
        end: d(31),
        interval: Interval::Daily,
    }
}

fn series(symbol: &str, days: &[u32]) -> RawSeries {
    RawSeries::new(
        symbol,
        days.iter()
            .map(|&day| RawRow::complete(d(day), 10.0, 10.0, 10.0, 10.0, 100))
            .collect(),
    )
}

fn network() -> FetchError {
    FetchError::Network("connection reset".into())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn always_failing_ticker_fails_after_exactly_max_attempts() {
    let client = ScriptedClient::default().script("A", vec![Err(network()); 10]);
    let gate = RateGate::new(Duration::ZERO);
    let store = MemoryStore::default();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window());

    let fetch = scheduler.fetch_ticker(&Ticker::new("A", "Tech"));

    assert_eq!(fetch.job.state(), JobState::Failed);
    assert_eq!(fetch.job.attempt_count(), 3);
    assert_eq!(
        fetch.job.failure(),
        Some(&FailureReason::RetriesExhausted { attempts: 3 })
    );
    assert!(fetch.series.is_none());
    assert_eq!(client.calls_for("A").len(), 3);
}

#[test]
fn invalid_ticker_is_not_retried() {
    let client = ScriptedClient::default().script(
        "NOPE",
        vec![Err(FetchError::InvalidTicker {
            symbol: "NOPE".into(),
        })],
    );
    let gate = RateGate::new(Duration::ZERO);
    let store = MemoryStore::default();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(5), window());

    let fetch = scheduler.fetch_ticker(&Ticker::new("NOPE", "Tech"));

    assert_eq!(fetch.job.failure(), Some(&FailureReason::InvalidTicker));
    assert_eq!(fetch.job.attempt_count(), 1);
    assert_eq!(gate.requests_issued(), 1);
}

#[test]
fn transient_failures_then_success() {
    let client = ScriptedClient::default().script(
        "A",
        vec![
            Err(FetchError::RateLimited {
                retry_after_secs: None,
            }),
            Err(network()),
            Ok(series("A", &[2, 3])),
        ],
    );
    let gate = RateGate::new(Duration::ZERO);
    let store = MemoryStore::default();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window());

    let fetch = scheduler.fetch_ticker(&Ticker::new("A", "Tech"));

    assert_eq!(fetch.job.state(), JobState::Succeeded);
    assert!(fetch.job.was_retried());
    assert_eq!(fetch.series.unwrap().len(), 2);
    assert_eq!(gate.requests_issued(), 3);
}

#[test]
fn empty_series_is_a_successful_fetch() {
    let client = ScriptedClient::default().script("A", vec![Ok(RawSeries::empty("A"))]);
    let gate = RateGate::new(Duration::ZERO);
    let store = MemoryStore::default();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window());

    let fetch = scheduler.fetch_ticker(&Ticker::new("A", "Tech"));

    assert_eq!(fetch.job.state(), JobState::Succeeded);
    assert!(fetch.series.unwrap().is_empty());
}

#[test]
fn every_attempt_consumes_rate_budget_across_batch() {
    let client = ScriptedClient::default()
        .script("A", vec![Err(network()), Ok(series("A", &[2]))])
        .script("B", vec![Ok(series("B", &[2]))])
        .script("C", vec![Err(FetchError::InvalidTicker { symbol: "C".into() })]);
    let gate = RateGate::new(Duration::ZERO);
    let store = MemoryStore::default();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window());

    let tickers = vec![
        Ticker::new("A", "Tech"),
        Ticker::new("B", "Tech"),
        Ticker::new("C", "Tech"),
    ];
    let results = scheduler.download_all(&tickers, &Quiet);

    assert_eq!(results.len(), 3);
    assert_eq!(gate.requests_issued(), 4);
    assert_eq!(results[2].job.state(), JobState::Failed);
}

#[test]
fn protected_ticker_resumes_from_last_stored_date() {
    let stored = MergedSeries::new(
        "A",
        vec![
            OhlcvRow::new(d(2), 1.0, 1.0, 1.0, 1.0, 1),
            OhlcvRow::new(d(10), 1.0, 1.0, 1.0, 1.0, 1),
        ],
    )
    .unwrap();
    let mut store = MemoryStore::default();
    store.0.insert("A".into(), stored.clone());
    store.0.insert("B".into(), stored);

    let client = ScriptedClient::default()
        .script("A", vec![Ok(series("A", &[10, 13]))])
        .script("B", vec![Ok(series("B", &[2, 3]))]);
    let gate = RateGate::new(Duration::ZERO);
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window());

    scheduler.download_all(
        &[
            Ticker::new("A", "Tech").with_protected(true),
            Ticker::new("B", "Tech"),
        ],
        &Quiet,
    );

    assert_eq!(client.calls_for("A"), vec![(d(10), d(31))]);
    assert_eq!(client.calls_for("B"), vec![(d(1), d(31))]);
}

#[test]
fn cancelled_before_start_marks_all_cancelled() {
    let client = ScriptedClient::default().script("A", vec![Ok(series("A", &[2]))]);
    let gate = RateGate::new(Duration::ZERO);
    let store = MemoryStore::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window())
        .with_cancel(cancel);

    let results = scheduler.download_all(
        &[Ticker::new("A", "Tech"), Ticker::new("B", "Tech")],
        &Quiet,
    );

    assert!(results
        .iter()
        .all(|r| r.job.failure() == Some(&FailureReason::Cancelled)));
    assert_eq!(gate.requests_issued(), 0);
}

#[test]
fn cancellation_lets_the_running_ticker_finish() {
    let client = ScriptedClient::default()
        .script("A", vec![Ok(series("A", &[2]))])
        .script("B", vec![Ok(series("B", &[2]))]);
    let gate = RateGate::new(Duration::ZERO);
    let store = MemoryStore::default();
    let cancel = CancelToken::new();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window())
        .with_cancel(cancel.clone());

    let handled = scheduler.run(
        &[Ticker::new("A", "Tech"), Ticker::new("B", "Tech")],
        &Quiet,
        |fetch| {
            // Simulates Ctrl-C arriving while the first ticker is processed.
            cancel.cancel();
            fetch.job.state()
        },
    );

    assert_eq!(handled, vec![JobState::Succeeded, JobState::Failed]);
}

#[test]
fn worker_pool_preserves_order() {
    let symbols: Vec<String> = (0..12).map(|i| format!("S{i:02}")).collect();
    let mut client = ScriptedClient::default();
    for s in &symbols {
        client = client.script(s, vec![Ok(series(s, &[2]))]);
    }
    let gate = RateGate::new(Duration::from_millis(1));
    let store = MemoryStore::default();
    let scheduler = DownloadScheduler::new(&client, &gate, &store, instant_policy(3), window())
        .with_workers(4);

    let tickers: Vec<Ticker> = symbols.iter().map(|s| Ticker::new(s.as_str(), "X")).collect();
    let results = scheduler.download_all(&tickers, &Quiet);

    let got: Vec<&str> = results.iter().map(|r| r.ticker.symbol.as_str()).collect();
    let want: Vec<&str> = symbols.iter().map(String::as_str).collect();
    assert_eq!(got, want);
    assert!(results.iter().all(|r| r.job.state() == JobState::Succeeded));
    assert_eq!(gate.requests_issued(), 12);
}
