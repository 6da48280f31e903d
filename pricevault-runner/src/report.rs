//! Summary report — per-ticker statistics, rankings and sector overview.
//!
//! Pure aggregation over merged series. Tickers with fewer than `min_rows`
//! rows are reported with their raw stats but left out of every ranking.

use crate::metrics;
use chrono::NaiveDate;
use pricevault_core::domain::{MergedSeries, Ticker};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Statistics for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStats {
    pub ticker: String,
    pub sector: String,
    pub rows: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub first_close: f64,
    pub last_close: f64,
    pub min_close: f64,
    pub max_close: f64,
    pub total_return: f64,
    pub volatility: f64,
    pub avg_volume: f64,
    /// Whether the ticker had enough rows to be ranked.
    pub ranked: bool,
    pub return_rank: Option<usize>,
    pub volatility_rank: Option<usize>,
    pub volume_rank: Option<usize>,
}

impl TickerStats {
    /// Raw stats for a non-empty series; ranks are filled in later.
    pub fn compute(ticker: &Ticker, series: &MergedSeries, min_rows: usize) -> Option<Self> {
        let (start_date, end_date) = (series.first_date()?, series.last_date()?);
        let closes = series.closes();
        let min_close = closes.iter().copied().fold(f64::INFINITY, f64::min);
        let max_close = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            ticker: ticker.symbol.clone(),
            sector: ticker.sector.clone(),
            rows: series.len(),
            start_date,
            end_date,
            first_close: closes[0],
            last_close: closes[closes.len() - 1],
            min_close,
            max_close,
            total_return: metrics::total_return(&closes),
            volatility: metrics::annualized_volatility(&closes),
            avg_volume: metrics::mean_volume(&series.volumes()),
            ranked: series.len() >= min_rows,
            return_rank: None,
            volatility_rank: None,
            volume_rank: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankCategory {
    TopPerformers,
    MostVolatile,
    HighestVolume,
}

impl RankCategory {
    pub const ALL: [RankCategory; 3] = [
        RankCategory::TopPerformers,
        RankCategory::MostVolatile,
        RankCategory::HighestVolume,
    ];

    fn value(self, stats: &TickerStats) -> f64 {
        match self {
            RankCategory::TopPerformers => stats.total_return,
            RankCategory::MostVolatile => stats.volatility,
            RankCategory::HighestVolume => stats.avg_volume,
        }
    }
}

impl fmt::Display for RankCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RankCategory::TopPerformers => "top_performers",
            RankCategory::MostVolatile => "most_volatile",
            RankCategory::HighestVolume => "highest_volume",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub category: RankCategory,
    pub rank: usize,
    pub ticker: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorSummary {
    pub sector: String,
    pub tickers: usize,
    pub ranked: usize,
    /// Mean total return over ranked tickers; `None` when none are ranked.
    pub mean_total_return: Option<f64>,
    pub best_ticker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub stats: Vec<TickerStats>,
    pub rankings: Vec<RankingEntry>,
    pub sectors: Vec<SectorSummary>,
}

impl SummaryReport {
    pub fn ranking(&self, category: RankCategory) -> impl Iterator<Item = &RankingEntry> {
        self.rankings.iter().filter(move |r| r.category == category)
    }

    pub fn stats_for(&self, ticker: &str) -> Option<&TickerStats> {
        self.stats.iter().find(|s| s.ticker == ticker)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportGenerator {
    pub min_rows: usize,
    pub top_n: usize,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self {
            min_rows: 20,
            top_n: 10,
        }
    }
}

impl ReportGenerator {
    pub fn new(min_rows: usize, top_n: usize) -> Self {
        Self { min_rows, top_n }
    }

    /// Build the report. Empty series are skipped; input order is kept in
    /// `stats`.
    pub fn generate(&self, entries: &[(Ticker, MergedSeries)]) -> SummaryReport {
        let mut stats: Vec<TickerStats> = entries
            .iter()
            .filter_map(|(t, s)| TickerStats::compute(t, s, self.min_rows))
            .collect();

        let mut rankings = Vec::new();
        for category in RankCategory::ALL {
            let order = rank_order(&stats, category);
            for (pos, &idx) in order.iter().enumerate() {
                let rank = pos + 1;
                let s = &mut stats[idx];
                match category {
                    RankCategory::TopPerformers => s.return_rank = Some(rank),
                    RankCategory::MostVolatile => s.volatility_rank = Some(rank),
                    RankCategory::HighestVolume => s.volume_rank = Some(rank),
                }
                if rank <= self.top_n {
                    rankings.push(RankingEntry {
                        category,
                        rank,
                        ticker: s.ticker.clone(),
                        value: category.value(s),
                    });
                }
            }
        }

        let sectors = sector_summaries(&stats);
        SummaryReport {
            stats,
            rankings,
            sectors,
        }
    }
}

/// Indices of ranked tickers, best first. Ties break on symbol.
fn rank_order(stats: &[TickerStats], category: RankCategory) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..stats.len()).filter(|&i| stats[i].ranked).collect();
    idx.sort_by(|&a, &b| {
        category
            .value(&stats[b])
            .total_cmp(&category.value(&stats[a]))
            .then_with(|| stats[a].ticker.cmp(&stats[b].ticker))
    });
    idx
}

fn sector_summaries(stats: &[TickerStats]) -> Vec<SectorSummary> {
    let mut order: Vec<&str> = Vec::new();
    for s in stats {
        if !order.contains(&s.sector.as_str()) {
            order.push(&s.sector);
        }
    }

    order
        .into_iter()
        .map(|sector| {
            let members: Vec<&TickerStats> = stats.iter().filter(|s| s.sector == sector).collect();
            let ranked: Vec<&TickerStats> = members.iter().copied().filter(|s| s.ranked).collect();
            let returns: Vec<f64> = ranked.iter().map(|s| s.total_return).collect();
            let best = ranked
                .iter()
                .max_by(|a, b| {
                    a.total_return
                        .partial_cmp(&b.total_return)
                        .unwrap_or(Ordering::Equal)
                })
                .map(|s| s.ticker.clone());
            SectorSummary {
                sector: sector.to_string(),
                tickers: members.len(),
                ranked: ranked.len(),
                mean_total_return: (!returns.is_empty()).then(|| metrics::mean_f64(&returns)),
                best_ticker: best,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricevault_core::domain::OhlcvRow;

    fn series(symbol: &str, closes: &[f64], volume: i64) -> MergedSeries {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        MergedSeries::new(
            symbol,
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| {
                    OhlcvRow::new(start + chrono::Duration::days(i as i64), c, c, c, c, volume)
                })
                .collect(),
        )
        .unwrap()
    }

    fn ramp(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn stats_for_three_rows() {
        let t = Ticker::new("A", "Tech");
        let s = TickerStats::compute(&t, &series("A", &[100.0, 110.0, 115.0], 10), 20).unwrap();
        assert_eq!(s.rows, 3);
        assert!((s.total_return - 0.15).abs() < 1e-12);
        assert_eq!(s.min_close, 100.0);
        assert_eq!(s.max_close, 115.0);
        assert!(!s.ranked);
    }

    #[test]
    fn short_series_are_reported_but_not_ranked() {
        let gen = ReportGenerator::new(20, 10);
        let entries = vec![
            (Ticker::new("LONG", "Tech"), series("LONG", &ramp(100.0, 1.0, 25), 500)),
            (Ticker::new("SHORT", "Tech"), series("SHORT", &[100.0, 200.0], 9_999)),
        ];
        let report = gen.generate(&entries);

        assert_eq!(report.stats.len(), 2);
        assert!(report.rankings.iter().all(|r| r.ticker == "LONG"));
        assert_eq!(report.stats_for("SHORT").unwrap().return_rank, None);
        assert_eq!(report.stats_for("LONG").unwrap().return_rank, Some(1));
    }

    #[test]
    fn rankings_order_and_top_n() {
        let gen = ReportGenerator::new(5, 2);
        let entries = vec![
            (Ticker::new("A", "Tech"), series("A", &ramp(100.0, 1.0, 10), 100)),
            (Ticker::new("B", "Banks"), series("B", &ramp(100.0, 3.0, 10), 300)),
            (Ticker::new("C", "Tech"), series("C", &ramp(100.0, 2.0, 10), 200)),
        ];
        let report = gen.generate(&entries);

        let top: Vec<&str> = report
            .ranking(RankCategory::TopPerformers)
            .map(|r| r.ticker.as_str())
            .collect();
        assert_eq!(top, vec!["B", "C"]);

        let vol: Vec<&str> = report
            .ranking(RankCategory::HighestVolume)
            .map(|r| r.ticker.as_str())
            .collect();
        assert_eq!(vol, vec!["B", "C"]);

        // Ranks are assigned beyond top_n.
        assert_eq!(report.stats_for("A").unwrap().return_rank, Some(3));
    }

    #[test]
    fn sector_summary_means_ranked_returns() {
        let gen = ReportGenerator::new(3, 10);
        let entries = vec![
            (Ticker::new("A", "Tech"), series("A", &[100.0, 105.0, 110.0], 1)),
            (Ticker::new("B", "Tech"), series("B", &[100.0, 110.0, 130.0], 1)),
            (Ticker::new("C", "Banks"), series("C", &[100.0, 90.0], 1)),
        ];
        let report = gen.generate(&entries);

        let tech = &report.sectors[0];
        assert_eq!(tech.sector, "Tech");
        assert_eq!(tech.tickers, 2);
        assert!((tech.mean_total_return.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(tech.best_ticker.as_deref(), Some("B"));

        let banks = &report.sectors[1];
        assert_eq!(banks.ranked, 0);
        assert_eq!(banks.mean_total_return, None);
    }

    #[test]
    fn empty_series_are_skipped() {
        let report = ReportGenerator::default()
            .generate(&[(Ticker::new("A", "Tech"), MergedSeries::empty("A"))]);
        assert!(report.stats.is_empty());
        assert!(report.rankings.is_empty());
    }
}
