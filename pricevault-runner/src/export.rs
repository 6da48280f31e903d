//! Report artifacts — CSV tables, JSON run summary and a Markdown overview.
//!
//! Written to `{output_dir}`:
//! - `ticker_stats.csv` — one row per reported ticker
//! - `rankings.csv` — top-N tables, long format
//! - `sectors.csv` — per-sector summary
//! - `run_summary.json` — the full run report
//!
//! Column order is stable; downstream charting reads these by position.

use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::{RunReport, TickerStatus};
use crate::report::{RankCategory, SectorSummary, SummaryReport, TickerStats};

pub const TICKER_STATS_FILE: &str = "ticker_stats.csv";
pub const RANKINGS_FILE: &str = "rankings.csv";
pub const SECTORS_FILE: &str = "sectors.csv";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: ticker, sector, rows, start_date, end_date, first_close,
/// last_close, min_close, max_close, total_return, volatility, avg_volume,
/// return_rank, volatility_rank, volume_rank
pub fn export_ticker_stats_csv(stats: &[TickerStats]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "ticker",
        "sector",
        "rows",
        "start_date",
        "end_date",
        "first_close",
        "last_close",
        "min_close",
        "max_close",
        "total_return",
        "volatility",
        "avg_volume",
        "return_rank",
        "volatility_rank",
        "volume_rank",
    ])?;

    let rank = |r: Option<usize>| r.map(|v| v.to_string()).unwrap_or_default();

    for s in stats {
        wtr.write_record([
            &s.ticker,
            &s.sector,
            &s.rows.to_string(),
            &s.start_date.to_string(),
            &s.end_date.to_string(),
            &format!("{:.4}", s.first_close),
            &format!("{:.4}", s.last_close),
            &format!("{:.4}", s.min_close),
            &format!("{:.4}", s.max_close),
            &format!("{:.6}", s.total_return),
            &format!("{:.6}", s.volatility),
            &format!("{:.2}", s.avg_volume),
            &rank(s.return_rank),
            &rank(s.volatility_rank),
            &rank(s.volume_rank),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: category, rank, ticker, value
pub fn export_rankings_csv(report: &SummaryReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["category", "rank", "ticker", "value"])?;
    for r in &report.rankings {
        wtr.write_record([
            &r.category.to_string(),
            &r.rank.to_string(),
            &r.ticker,
            &format!("{:.6}", r.value),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: sector, tickers, ranked, mean_total_return, best_ticker
pub fn export_sectors_csv(sectors: &[SectorSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["sector", "tickers", "ranked", "mean_total_return", "best_ticker"])?;
    for s in sectors {
        wtr.write_record([
            &s.sector,
            &s.tickers.to_string(),
            &s.ranked.to_string(),
            &s.mean_total_return
                .map(|v| format!("{v:.6}"))
                .unwrap_or_default(),
            &s.best_ticker.clone().unwrap_or_default(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_run_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

pub fn import_run_json(json: &str) -> Result<RunReport> {
    serde_json::from_str(json).context("failed to deserialize RunReport from JSON")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write every artifact into `output_dir`, replacing previous ones.
pub fn write_artifacts(output_dir: &Path, summary: &SummaryReport, run: &RunReport) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let files = [
        (TICKER_STATS_FILE, export_ticker_stats_csv(&summary.stats)?),
        (RANKINGS_FILE, export_rankings_csv(summary)?),
        (SECTORS_FILE, export_sectors_csv(&summary.sectors)?),
        (RUN_SUMMARY_FILE, export_run_json(run)?),
    ];
    for (name, content) in files {
        let path = output_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    tracing::info!(dir = %output_dir.display(), "report artifacts written");
    Ok(())
}

// ─── Markdown report ────────────────────────────────────────────────

/// Human-readable overview of a run, printed by the CLI.
pub fn generate_report(summary: &SummaryReport, run: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("# PriceVault Run Report\n\n");
    out.push_str(&format!(
        "**Window:** {} .. {} ({})  \n",
        run.window_start, run.window_end, run.interval
    ));
    out.push_str(&format!("**Requests issued:** {}  \n", run.requests_issued));
    if run.cancelled {
        out.push_str("**Cancelled:** yes  \n");
    }
    out.push('\n');

    out.push_str("## Outcome\n\n");
    out.push_str("| Status | Count |\n|--------|-------|\n");
    out.push_str(&format!("| Succeeded | {} |\n", run.succeeded()));
    out.push_str(&format!(
        "| Retried then succeeded | {} |\n",
        run.retried_then_succeeded()
    ));
    out.push_str(&format!("| Failed | {} |\n\n", run.failed()));

    let failed: Vec<_> = run.with_status(TickerStatus::Failed).collect();
    if !failed.is_empty() {
        out.push_str("## Failed Tickers\n\n");
        out.push_str("| Ticker | Attempts | Reason |\n|--------|----------|--------|\n");
        for o in failed {
            let reason = o.failure.as_ref().map(|f| f.to_string()).unwrap_or_default();
            out.push_str(&format!("| {} | {} | {} |\n", o.symbol, o.attempts, reason));
        }
        out.push('\n');
    }

    for (category, title, is_pct) in [
        (RankCategory::TopPerformers, "Top Performers", true),
        (RankCategory::MostVolatile, "Most Volatile", true),
        (RankCategory::HighestVolume, "Highest Volume", false),
    ] {
        let entries: Vec<_> = summary.ranking(category).collect();
        if entries.is_empty() {
            continue;
        }
        out.push_str(&format!("## {title}\n\n"));
        out.push_str("| # | Ticker | Value |\n|---|--------|-------|\n");
        for e in entries {
            let value = if is_pct {
                pct(e.value)
            } else {
                format!("{:.0}", e.value)
            };
            out.push_str(&format!("| {} | {} | {} |\n", e.rank, e.ticker, value));
        }
        out.push('\n');
    }

    if !summary.sectors.is_empty() {
        out.push_str("## Sectors\n\n");
        out.push_str("| Sector | Tickers | Mean Return | Best |\n|--------|---------|-------------|------|\n");
        for s in &summary.sectors {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                s.sector,
                s.tickers,
                s.mean_total_return.map(pct).unwrap_or_else(|| "-".into()),
                s.best_ticker.as_deref().unwrap_or("-"),
            ));
        }
    }

    out
}

fn pct(v: f64) -> String {
    format!("{:.2}%", v * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TickerOutcome;
    use crate::report::{RankingEntry, SectorSummary};
    use chrono::NaiveDate;
    use pricevault_core::domain::Interval;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn sample_stats() -> TickerStats {
        TickerStats {
            ticker: "THYAO.IS".into(),
            sector: "Transportation".into(),
            rows: 3,
            start_date: d(2),
            end_date: d(6),
            first_close: 100.0,
            last_close: 115.0,
            min_close: 100.0,
            max_close: 115.0,
            total_return: 0.15,
            volatility: 0.5,
            avg_volume: 1_000.0,
            ranked: false,
            return_rank: None,
            volatility_rank: None,
            volume_rank: None,
        }
    }

    fn sample_run() -> RunReport {
        let at = d(6).and_hms_opt(12, 0, 0).unwrap();
        RunReport {
            started_at: at,
            finished_at: at,
            window_start: d(1),
            window_end: d(6),
            interval: Interval::Daily,
            requests_issued: 2,
            cancelled: false,
            outcomes: vec![TickerOutcome {
                symbol: "BAD".into(),
                protected: false,
                status: TickerStatus::Failed,
                attempts: 1,
                requested_start: Some(d(1)),
                requested_end: Some(d(6)),
                issues: None,
                rows_added: 0,
                rows_replaced: 0,
                stored_rows: 0,
                written: false,
                failure: Some(crate::pipeline::RunFailure::InvalidTicker),
            }],
        }
    }

    fn sample_summary() -> SummaryReport {
        SummaryReport {
            stats: vec![sample_stats()],
            rankings: vec![RankingEntry {
                category: RankCategory::TopPerformers,
                rank: 1,
                ticker: "THYAO.IS".into(),
                value: 0.15,
            }],
            sectors: vec![SectorSummary {
                sector: "Transportation".into(),
                tickers: 1,
                ranked: 0,
                mean_total_return: None,
                best_ticker: None,
            }],
        }
    }

    #[test]
    fn ticker_stats_columns_are_stable() {
        let csv = export_ticker_stats_csv(&[sample_stats()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ticker,sector,rows,start_date,end_date,first_close,last_close,min_close,\
             max_close,total_return,volatility,avg_volume,return_rank,volatility_rank,volume_rank"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("THYAO.IS,Transportation,3,2025-01-02,2025-01-06,100.0000"));
        assert!(row.ends_with(",,,"));
    }

    #[test]
    fn rankings_long_format() {
        let csv = export_rankings_csv(&sample_summary()).unwrap();
        assert_eq!(
            csv,
            "category,rank,ticker,value\ntop_performers,1,THYAO.IS,0.150000\n"
        );
    }

    #[test]
    fn sectors_leave_missing_values_blank() {
        let csv = export_sectors_csv(&sample_summary().sectors).unwrap();
        assert!(csv.ends_with("Transportation,1,0,,\n"));
    }

    #[test]
    fn run_json_roundtrip() {
        let run = sample_run();
        let json = export_run_json(&run).unwrap();
        assert!(json.contains("\"kind\": \"invalid_ticker\""));
        assert_eq!(import_run_json(&json).unwrap(), run);
    }

    #[test]
    fn markdown_lists_failures_and_rankings() {
        let md = generate_report(&sample_summary(), &sample_run());
        assert!(md.contains("## Failed Tickers"));
        assert!(md.contains("| BAD | 1 | invalid or unlisted symbol |"));
        assert!(md.contains("## Top Performers"));
        assert!(md.contains("15.00%"));
    }

    #[test]
    fn write_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), &sample_summary(), &sample_run()).unwrap();
        for name in [TICKER_STATS_FILE, RANKINGS_FILE, SECTORS_FILE, RUN_SUMMARY_FILE] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
    }
}
