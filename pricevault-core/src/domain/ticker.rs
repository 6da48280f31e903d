//! Ticker — a symbol plus its sector and protection flag.

use serde::{Deserialize, Serialize};

/// A configured symbol.
///
/// `protected` marks tickers whose stored history must survive any bad fetch.
/// It is always set explicitly in configuration, never inferred from position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub sector: String,
    #[serde(default)]
    pub protected: bool,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sector: sector.into(),
            protected: false,
        }
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }
}
