//! Store status — which configured tickers already have stored history.

use pricevault_core::data::{RecordStatus, SeriesStore, TickerRegistry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub records: Vec<RecordStatus>,
    /// Configured symbols with no stored record.
    pub missing: Vec<String>,
    /// Protected symbols with no stored record.
    pub protected_missing: Vec<String>,
}

impl StoreStatus {
    pub fn collect(registry: &TickerRegistry, store: &SeriesStore) -> Self {
        let symbols: Vec<&str> = registry.tickers().iter().map(|t| t.symbol.as_str()).collect();
        let records = store.status(&symbols);
        let missing: Vec<String> = records
            .iter()
            .filter(|r| !r.stored)
            .map(|r| r.symbol.clone())
            .collect();
        let protected_missing = missing
            .iter()
            .filter(|s| registry.is_protected(s))
            .cloned()
            .collect();
        Self {
            records,
            missing,
            protected_missing,
        }
    }

    pub fn configured(&self) -> usize {
        self.records.len()
    }

    pub fn stored(&self) -> usize {
        self.records.len() - self.missing.len()
    }

    /// Stored share of the configured universe, in percent.
    pub fn completion_pct(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.stored() as f64 / self.records.len() as f64 * 100.0
    }
}
