//! Price metrics — pure functions over a close series.
//!
//! Every metric is a pure function: closes in, scalar out. No dependencies on
//! the scheduler, store or network.

/// Trading days per year used for annualisation.
pub const TRADING_DAYS: f64 = 252.0;

/// Total return as a fraction: (last - first) / first.
pub fn total_return(closes: &[f64]) -> f64 {
    match (closes.first(), closes.last()) {
        (Some(&first), Some(&last)) if closes.len() >= 2 && first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

/// Simple day-over-day returns.
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    if closes.len() < 2 {
        return Vec::new();
    }
    closes
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

/// Annualized volatility: sample std-dev of daily returns × √252.
///
/// Returns 0.0 with fewer than two returns.
pub fn annualized_volatility(closes: &[f64]) -> f64 {
    std_dev(&daily_returns(closes)) * TRADING_DAYS.sqrt()
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Mean of integer volumes.
pub fn mean_volume(volumes: &[i64]) -> f64 {
    if volumes.is_empty() {
        return 0.0;
    }
    volumes.iter().map(|&v| v as f64).sum::<f64>() / volumes.len() as f64
}
