//! Run reports: machine-readable results, a markdown brief and the
//! data-quality trail.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use qcmp_core::stats::{derive_stats, summarize, BatchSummary, DerivedStats, Mover};
use qcmp_core::{CompanyResult, PERIOD_SLOTS};
use qcmp_extract::DiagnosticEvent;
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct RunInfo {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct CompanyRow<'a> {
    display_id: &'a str,
    long_label: &'a str,
    periods: &'a [String; PERIOD_SLOTS],
    revenue: [String; PERIOD_SLOTS],
    net_profit: [String; PERIOD_SLOTS],
    revenue_numeric: [f64; PERIOD_SLOTS],
    net_profit_numeric: [f64; PERIOD_SLOTS],
    stats: DerivedStats,
}

impl<'a> CompanyRow<'a> {
    fn new(result: &'a CompanyResult) -> Self {
        Self {
            display_id: &result.display_id,
            long_label: &result.long_label,
            periods: &result.periods,
            revenue: result.revenue.each_ref().map(|o| o.display_text()),
            net_profit: result.net_profit.each_ref().map(|o| o.display_text()),
            revenue_numeric: result.revenue_numeric(),
            net_profit_numeric: result.net_profit_numeric(),
            stats: derive_stats(result),
        }
    }
}

/// Writes `results.json`, `brief.md` and `data_quality.json` into `dir` and
/// returns the batch summary. An empty batch still gets a full report.
pub async fn write_reports(
    dir: &Path,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    results: &[CompanyResult],
    diagnostics: &[DiagnosticEvent],
) -> Result<BatchSummary> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let run = RunInfo {
        run_id,
        started_at,
        finished_at,
    };
    let summary = summarize(results);
    let rows = results.iter().map(CompanyRow::new).collect::<Vec<_>>();

    // Non-finite numbers serialize as null.
    let results_json = serde_json::to_vec_pretty(&serde_json::json!({
        "run": run,
        "summary": summary,
        "companies": rows,
    }))
    .context("serializing results")?;
    fs::write(dir.join("results.json"), results_json)
        .await
        .context("writing results.json")?;

    fs::write(dir.join("brief.md"), render_brief(&run, &summary, &rows))
        .await
        .context("writing brief.md")?;

    let mut gaps_by_entity: BTreeMap<&str, usize> = BTreeMap::new();
    for event in diagnostics.iter().filter(|e| e.is_gap()) {
        *gaps_by_entity.entry(event.entity()).or_default() += 1;
    }
    let quality_json = serde_json::to_vec_pretty(&serde_json::json!({
        "run_id": run_id,
        "gaps_by_entity": gaps_by_entity,
        "events": diagnostics,
    }))
    .context("serializing data quality events")?;
    fs::write(dir.join("data_quality.json"), quality_json)
        .await
        .context("writing data_quality.json")?;

    Ok(summary)
}

fn pct(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.2}%")
    } else {
        "n/a".to_string()
    }
}

fn mover(label: &str, mover: &Option<Mover>) -> String {
    match mover {
        Some(m) => format!("- {label}: {} ({})", m.display_id, pct(m.pct)),
        None => format!("- {label}: n/a"),
    }
}

fn render_brief(run: &RunInfo, summary: &BatchSummary, rows: &[CompanyRow<'_>]) -> String {
    let mut lines = vec![
        "# Quarter Compare Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", run.run_id),
        format!("- Started: {}", run.started_at),
        format!("- Finished: {}", run.finished_at),
        format!("- Companies resolved: {}", summary.total_companies),
        format!("- Not-declared revenue slots: {}", summary.not_declared_revenue_slots),
        String::new(),
        "## Movers".to_string(),
        mover("Top revenue growth", &summary.top_revenue_mover),
        mover("Weakest revenue growth", &summary.worst_revenue_mover),
        mover("Top net profit growth", &summary.top_profit_mover),
        mover("Top 3-quarter average revenue change", &summary.top_avg3_revenue_mover),
        format!(
            "- Average latest revenue change: {}",
            summary.avg_latest_rev_pct.map_or_else(|| "n/a".to_string(), pct)
        ),
        format!(
            "- Average latest net profit change: {}",
            summary.avg_latest_np_pct.map_or_else(|| "n/a".to_string(), pct)
        ),
        String::new(),
        "## Companies".to_string(),
    ];

    if rows.is_empty() {
        lines.push("No companies resolved in this run.".to_string());
    } else {
        lines.push("| Company | Latest period | Revenue | Net profit | Rev Δ | NP Δ | Rev avg-3 Δ |".to_string());
        lines.push("|---|---|---|---|---|---|---|".to_string());
        for row in rows {
            lines.push(format!(
                "| {} ({}) | {} | {} | {} | {} | {} | {} |",
                row.long_label,
                row.display_id,
                row.periods[0],
                row.revenue[0],
                row.net_profit[0],
                pct(row.stats.latest_rev_pct),
                pct(row.stats.latest_np_pct),
                pct(row.stats.avg3_rev_pct),
            ));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}
