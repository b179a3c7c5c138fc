//! Derived comparison figures for resolved records.

use serde::Serialize;

use crate::{CompanyResult, PERIOD_SLOTS};

/// Percent change from `prev` to `curr`. NaN when either side is NaN or when
/// `prev` is zero, so undefined changes drop out of rankings.
pub fn pct_change(curr: f64, prev: f64) -> f64 {
    if curr.is_nan() || prev.is_nan() || prev == 0.0 {
        return f64::NAN;
    }
    (curr - prev) / prev.abs() * 100.0
}

/// Mean of the non-NaN values; NaN when there are none.
pub fn mean_ignoring_nan(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedStats {
    pub latest_rev_pct: f64,
    pub latest_np_pct: f64,
    pub avg3_rev_pct: f64,
    pub avg3_np_pct: f64,
}

pub fn derive_stats(result: &CompanyResult) -> DerivedStats {
    let revenue = result.revenue_numeric();
    let net_profit = result.net_profit_numeric();
    let resolved = result.resolved_periods();

    DerivedStats {
        latest_rev_pct: pct_change(revenue[0], revenue[1]),
        latest_np_pct: pct_change(net_profit[0], net_profit[1]),
        avg3_rev_pct: trailing_change(&revenue, resolved),
        avg3_np_pct: trailing_change(&net_profit, resolved),
    }
}

// Mean of the newest three against the mean of the three before them; needs
// every slot resolved so the two windows cover distinct periods.
fn trailing_change(values: &[f64; PERIOD_SLOTS], resolved: usize) -> f64 {
    if resolved < PERIOD_SLOTS {
        return f64::NAN;
    }
    pct_change(mean_ignoring_nan(&values[0..3]), mean_ignoring_nan(&values[1..4]))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mover {
    pub display_id: String,
    pub pct: f64,
}

/// Batch-level overview of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total_companies: usize,
    pub not_declared_revenue_slots: usize,
    pub top_revenue_mover: Option<Mover>,
    pub worst_revenue_mover: Option<Mover>,
    pub top_profit_mover: Option<Mover>,
    pub top_avg3_revenue_mover: Option<Mover>,
    pub avg_latest_rev_pct: Option<f64>,
    pub avg_latest_np_pct: Option<f64>,
}

pub fn summarize(results: &[CompanyResult]) -> BatchSummary {
    let rows = results
        .iter()
        .map(|r| (r.display_id.as_str(), derive_stats(r)))
        .collect::<Vec<_>>();

    let not_declared_revenue_slots = results
        .iter()
        .flat_map(|r| r.revenue_numeric())
        .filter(|v| v.is_nan())
        .count();

    BatchSummary {
        total_companies: results.len(),
        not_declared_revenue_slots,
        top_revenue_mover: pick_mover(&rows, |s| s.latest_rev_pct, |a, b| a > b),
        worst_revenue_mover: pick_mover(&rows, |s| s.latest_rev_pct, |a, b| a < b),
        top_profit_mover: pick_mover(&rows, |s| s.latest_np_pct, |a, b| a > b),
        top_avg3_revenue_mover: pick_mover(&rows, |s| s.avg3_rev_pct, |a, b| a > b),
        avg_latest_rev_pct: finite_mean(rows.iter().map(|(_, s)| s.latest_rev_pct)),
        avg_latest_np_pct: finite_mean(rows.iter().map(|(_, s)| s.latest_np_pct)),
    }
}

// First-seen wins on ties.
fn pick_mover(
    rows: &[(&str, DerivedStats)],
    metric: impl Fn(&DerivedStats) -> f64,
    better: impl Fn(f64, f64) -> bool,
) -> Option<Mover> {
    let mut best: Option<Mover> = None;
    for (display_id, stats) in rows {
        let pct = metric(stats);
        if pct.is_nan() {
            continue;
        }
        if best.as_ref().map_or(true, |b| better(pct, b.pct)) {
            best = Some(Mover {
                display_id: display_id.to_string(),
                pct,
            });
        }
    }
    best
}

fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values = values.collect::<Vec<_>>();
    let mean = mean_ignoring_nan(&values);
    (!mean.is_nan()).then_some(mean)
}
