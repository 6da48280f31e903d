//! Ticker registry — the configured universe and its protected subset.
//!
//! Registry order is config order, and that is the order the scheduler
//! processes tickers in.

use super::store::sanitize_symbol;
use crate::config::ConfigError;
use crate::domain::Ticker;
use std::collections::HashMap;

/// The loaded universe. Immutable once built.
#[derive(Debug, Clone)]
pub struct TickerRegistry {
    tickers: Vec<Ticker>,
    index: HashMap<String, usize>,
}

impl TickerRegistry {
    /// Build the registry from config entries.
    ///
    /// Symbols are trimmed. Fails on an empty universe, a blank symbol, a
    /// duplicate symbol, or two symbols that share a store record name.
    pub fn load(entries: &[Ticker]) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }

        let mut tickers = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        let mut record_names: HashMap<String, String> = HashMap::with_capacity(entries.len());

        for (i, entry) in entries.iter().enumerate() {
            let symbol = entry.symbol.trim();
            if symbol.is_empty() {
                return Err(ConfigError::BlankSymbol { index: i });
            }
            if index.insert(symbol.to_string(), tickers.len()).is_some() {
                return Err(ConfigError::DuplicateSymbol(symbol.to_string()));
            }
            if let Some(first) = record_names.insert(sanitize_symbol(symbol), symbol.to_string()) {
                return Err(ConfigError::RecordNameCollision {
                    first,
                    second: symbol.to_string(),
                });
            }
            tickers.push(Ticker {
                symbol: symbol.to_string(),
                sector: entry.sector.trim().to_string(),
                protected: entry.protected,
            });
        }

        Ok(Self { tickers, index })
    }

    /// All tickers in config order.
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn get(&self, symbol: &str) -> Option<&Ticker> {
        self.index.get(symbol).map(|&i| &self.tickers[i])
    }

    /// Unknown symbols are never protected.
    pub fn is_protected(&self, symbol: &str) -> bool {
        self.get(symbol).is_some_and(|t| t.protected)
    }

    pub fn protected_only(&self) -> Vec<&Ticker> {
        self.tickers.iter().filter(|t| t.protected).collect()
    }

    /// Distinct sectors in first-seen order.
    pub fn sectors(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for t in &self.tickers {
            if !seen.contains(&t.sector.as_str()) {
                seen.push(&t.sector);
            }
        }
        seen
    }

    /// Restrict to the named symbols, keeping registry order.
    pub fn select(&self, symbols: &[String]) -> Result<Vec<Ticker>, ConfigError> {
        for s in symbols {
            if self.get(s.trim()).is_none() {
                return Err(ConfigError::UnknownSymbol(s.clone()));
            }
        }
        Ok(self
            .tickers
            .iter()
            .filter(|t| symbols.iter().any(|s| s.trim() == t.symbol))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<Ticker> {
        vec![
            Ticker::new("AAA", "Tech").with_protected(true),
            Ticker::new(" BBB ", "Banks"),
            Ticker::new("CCC", "Tech"),
        ]
    }

    #[test]
    fn load_keeps_config_order_and_trims() {
        let reg = TickerRegistry::load(&entries()).unwrap();
        let symbols: Vec<_> = reg.tickers().iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "BBB", "CCC"]);
        assert!(reg.get("BBB").is_some());
    }

    #[test]
    fn empty_universe_is_a_config_error() {
        assert!(matches!(TickerRegistry::load(&[]), Err(ConfigError::EmptyUniverse)));
    }

    #[test]
    fn duplicate_symbol_is_a_config_error() {
        let mut e = entries();
        e.push(Ticker::new("AAA", "Other"));
        let err = TickerRegistry::load(&e).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSymbol(s) if s == "AAA"));
    }

    #[test]
    fn blank_symbol_is_a_config_error() {
        let err = TickerRegistry::load(&[Ticker::new("  ", "Tech")]).unwrap_err();
        assert!(matches!(err, ConfigError::BlankSymbol { index: 0 }));
    }

    #[test]
    fn symbols_sharing_a_record_name_are_a_config_error() {
        let err =
            TickerRegistry::load(&[Ticker::new("A/B", "Tech"), Ticker::new("A_B", "Tech")])
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::RecordNameCollision { first, second } if first == "A/B" && second == "A_B"
        ));
    }

    #[test]
    fn protection_lookup() {
        let reg = TickerRegistry::load(&entries()).unwrap();
        assert!(reg.is_protected("AAA"));
        assert!(!reg.is_protected("BBB"));
        assert!(!reg.is_protected("ZZZ"));
        assert_eq!(reg.protected_only().len(), 1);
    }

    #[test]
    fn sectors_in_first_seen_order() {
        let reg = TickerRegistry::load(&entries()).unwrap();
        assert_eq!(reg.sectors(), vec!["Tech", "Banks"]);
    }

    #[test]
    fn select_rejects_unknown_symbols() {
        let reg = TickerRegistry::load(&entries()).unwrap();
        let picked = reg.select(&["CCC".into(), "AAA".into()]).unwrap();
        assert_eq!(picked[0].symbol, "AAA");
        assert_eq!(picked[1].symbol, "CCC");
        assert!(matches!(
            reg.select(&["NOPE".into()]),
            Err(ConfigError::UnknownSymbol(_))
        ));
    }
}
