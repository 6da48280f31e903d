//! Per-ticker download job and its state machine.
//!
//! ```text
//! Pending -> InFlight -> Succeeded
//!                     -> Retrying -> InFlight ...
//!                     -> Failed            (terminal)
//! ```
//!
//! Jobs live for one run and are never persisted.

use super::provider::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    InFlight,
    Retrying,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::InFlight => "in_flight",
            JobState::Retrying => "retrying",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a download job ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    InvalidTicker,
    RetriesExhausted { attempts: u32 },
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InvalidTicker => f.write_str("invalid or unlisted symbol"),
            FailureReason::RetriesExhausted { attempts } => {
                write!(f, "retries exhausted after {attempts} attempts")
            }
            FailureReason::Cancelled => f.write_str("cancelled before start"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{symbol}: invalid job transition {from} -> {to}")]
pub struct JobTransitionError {
    pub symbol: String,
    pub from: JobState,
    pub to: JobState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    ticker: String,
    attempt_count: u32,
    last_error: Option<FetchError>,
    state: JobState,
    failure: Option<FailureReason>,
}

impl DownloadJob {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            attempt_count: 0,
            last_error: None,
            state: JobState::Pending,
            failure: None,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    /// True when the job succeeded only after at least one failed attempt.
    pub fn was_retried(&self) -> bool {
        self.state == JobState::Succeeded && self.attempt_count > 1
    }

    /// `Pending | Retrying -> InFlight`; counts the attempt.
    pub fn begin_attempt(&mut self) -> Result<(), JobTransitionError> {
        match self.state {
            JobState::Pending | JobState::Retrying => {
                self.attempt_count += 1;
                self.state = JobState::InFlight;
                Ok(())
            }
            from => Err(self.invalid(from, JobState::InFlight)),
        }
    }

    /// `InFlight -> Succeeded`.
    pub fn record_success(&mut self) -> Result<(), JobTransitionError> {
        match self.state {
            JobState::InFlight => {
                self.state = JobState::Succeeded;
                Ok(())
            }
            from => Err(self.invalid(from, JobState::Succeeded)),
        }
    }

    /// `InFlight -> Retrying | Failed`.
    ///
    /// Terminal immediately for a non-retryable error; otherwise `Failed` once
    /// `max_attempts` attempts have been made.
    pub fn record_failure(
        &mut self,
        err: FetchError,
        max_attempts: u32,
    ) -> Result<JobState, JobTransitionError> {
        if self.state != JobState::InFlight {
            let to = if err.is_retryable() && self.attempt_count < max_attempts {
                JobState::Retrying
            } else {
                JobState::Failed
            };
            return Err(self.invalid(self.state, to));
        }

        let next = if !err.is_retryable() {
            self.failure = Some(FailureReason::InvalidTicker);
            JobState::Failed
        } else if self.attempt_count >= max_attempts {
            self.failure = Some(FailureReason::RetriesExhausted {
                attempts: self.attempt_count,
            });
            JobState::Failed
        } else {
            JobState::Retrying
        };
        self.last_error = Some(err);
        self.state = next;
        Ok(next)
    }

    /// `Pending -> Failed(Cancelled)`. A job that has started is never cancelled.
    pub fn cancel(&mut self) -> Result<(), JobTransitionError> {
        match self.state {
            JobState::Pending => {
                self.state = JobState::Failed;
                self.failure = Some(FailureReason::Cancelled);
                Ok(())
            }
            from => Err(self.invalid(from, JobState::Failed)),
        }
    }

    fn invalid(&self, from: JobState, to: JobState) -> JobTransitionError {
        JobTransitionError {
            symbol: self.ticker.clone(),
            from,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> FetchError {
        FetchError::Network("connection reset".into())
    }

    #[test]
    fn success_on_first_attempt() {
        let mut job = DownloadJob::new("A");
        job.begin_attempt().unwrap();
        job.record_success().unwrap();
        assert_eq!(job.state(), JobState::Succeeded);
        assert_eq!(job.attempt_count(), 1);
        assert!(!job.was_retried());
    }

    #[test]
    fn retry_then_succeed() {
        let mut job = DownloadJob::new("A");
        job.begin_attempt().unwrap();
        assert_eq!(job.record_failure(network(), 3).unwrap(), JobState::Retrying);
        job.begin_attempt().unwrap();
        job.record_success().unwrap();
        assert!(job.was_retried());
        assert_eq!(job.last_error(), Some(&network()));
    }

    #[test]
    fn fails_after_max_attempts() {
        let mut job = DownloadJob::new("A");
        for _ in 0..2 {
            job.begin_attempt().unwrap();
            assert_eq!(job.record_failure(network(), 3).unwrap(), JobState::Retrying);
        }
        job.begin_attempt().unwrap();
        assert_eq!(job.record_failure(network(), 3).unwrap(), JobState::Failed);
        assert_eq!(
            job.failure(),
            Some(&FailureReason::RetriesExhausted { attempts: 3 })
        );
        assert!(job.begin_attempt().is_err());
    }

    #[test]
    fn invalid_ticker_is_terminal_immediately() {
        let mut job = DownloadJob::new("NOPE");
        job.begin_attempt().unwrap();
        let next = job
            .record_failure(FetchError::InvalidTicker { symbol: "NOPE".into() }, 3)
            .unwrap();
        assert_eq!(next, JobState::Failed);
        assert_eq!(job.failure(), Some(&FailureReason::InvalidTicker));
        assert_eq!(job.attempt_count(), 1);
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let mut job = DownloadJob::new("A");
        assert!(job.record_success().is_err());
        assert!(job.record_failure(network(), 3).is_err());
        job.begin_attempt().unwrap();
        assert!(job.begin_attempt().is_err());
        assert!(job.cancel().is_err());
        assert_eq!(job.state(), JobState::InFlight);
    }

    #[test]
    fn cancel_pending_job() {
        let mut job = DownloadJob::new("A");
        job.cancel().unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.failure(), Some(&FailureReason::Cancelled));
        assert_eq!(job.attempt_count(), 0);
    }
}
