//! Data acquisition: registry, fetch, scheduling, validation, merge and storage

pub mod job;
pub mod merge;
pub mod provider;
pub mod rate_gate;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod universe;
pub mod validate;
pub mod yahoo;

pub use job::{DownloadJob, FailureReason, JobState, JobTransitionError};
pub use merge::{Incoming, MergeEngine, MergeOutcome};
pub use provider::{FetchClient, FetchError};
pub use rate_gate::RateGate;
pub use retry::RetryPolicy;
pub use scheduler::{
    CancelToken, DownloadProgress, DownloadScheduler, DownloadWindow, TickerFetch,
    TracingProgress,
};
pub use store::{
    sanitize_symbol, ExistingDataStore, PersistenceStore, RecordMeta, RecordStatus, SeriesStore,
    StoreError,
};
pub use universe::TickerRegistry;
pub use validate::{IssueKind, Severity, ValidationIssue, ValidationResult, Validator};
pub use yahoo::YahooClient;
