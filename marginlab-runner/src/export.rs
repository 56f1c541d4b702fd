//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for backtest results:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: daily valuation table and trade tape for external analysis tools
//! - **Markdown**: human-readable single-run report
//!
//! All persisted artifacts include a `schema_version` field. Unknown versions
//! are rejected on load.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use marginlab_core::engine::TradeRecord;

use crate::config::StrategyConfig;
use crate::metrics::PeriodStats;
use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the daily valuation table.
///
/// Columns: date, valuation, ratio (valuation / initial deposit), drawdown,
/// unbound_cash, positions, required_margin
pub fn export_valuations_csv(result: &BacktestResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "valuation",
        "ratio",
        "drawdown",
        "unbound_cash",
        "positions",
        "required_margin",
    ])?;

    let initial = result.stats.initial_deposit;
    for (v, dd) in result.valuations.iter().zip(&result.drawdowns) {
        let ratio = if initial > 0.0 { v.valuation / initial } else { 0.0 };
        wtr.write_record([
            &v.date.to_string(),
            &format!("{:.2}", v.valuation),
            &format!("{ratio:.6}"),
            &format!("{dd:.6}"),
            &format!("{:.2}", v.unbound_cash),
            &v.position_count.to_string(),
            &format!("{:.2}", v.required_margin),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the trade tape.
///
/// Columns: date, position_id, reason, entry_price, exit_price, bound_margin,
/// proceeds, pnl
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "position_id",
        "reason",
        "entry_price",
        "exit_price",
        "bound_margin",
        "proceeds",
        "pnl",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.date.to_string(),
            &t.position_id.0.to_string(),
            &format!("{:?}", t.reason),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.exit_price),
            &format!("{:.6}", t.bound_margin),
            &format!("{:.2}", t.proceeds),
            &format!("{:.2}", t.pnl),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates a directory named `{strategy}_{timestamp}/` under `output_dir`
/// containing:
/// - `manifest.json` - the full `BacktestResult`
/// - `valuations.csv` - daily valuation, ratio, and drawdown
/// - `trades.csv` - trade tape
/// - `report.md` - Markdown summary
/// - `config.toml` - the config that produced the run
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        result.strategy,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("manifest.json", export_json(result)?),
        ("valuations.csv", export_valuations_csv(result)?),
        ("trades.csv", export_trades_csv(&result.trades)?),
        ("report.md", generate_report(result)),
        ("config.toml", result.config.to_toml()?),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
///
/// Rejects unknown schema versions.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown reports ───────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);
    let s = &result.stats;
    let b = &result.config.backtest;

    md.push_str("# Backtest Report\n\n");

    // Metadata
    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    let _ = writeln!(md, "| Strategy | {} |", describe_strategy(&result.config.strategy));
    let _ = writeln!(md, "| Period | {} to {} |", result.start_date, result.end_date);
    let _ = writeln!(md, "| Days | {} |", result.day_count);
    let _ = writeln!(md, "| Initial Deposit | {:.2} |", b.initial_deposit);
    let _ = writeln!(
        md,
        "| Periodic Deposit | {:.2} every {} days |",
        b.periodic_deposit, b.deposit_interval_days
    );
    let _ = writeln!(
        md,
        "| Spread | bid x{} / ask x{} |",
        result.config.spread.bid_factor, result.config.spread.ask_factor
    );
    let _ = writeln!(md, "| Dataset Hash | {} |", result.dataset_hash);
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    // Performance Summary
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    let _ = writeln!(md, "| Total Deposit | {:.2} |", s.total_deposit);
    let _ = writeln!(md, "| Final Valuation | {:.2} |", s.final_valuation);
    let _ = writeln!(md, "| Total Return | {:.4}x |", s.total_return);
    let _ = writeln!(md, "| CAGR | {:.2}% |", s.cagr * 100.0);
    let _ = writeln!(md, "| Max Drawdown | {:.2}% |", s.max_drawdown * 100.0);
    push_period_rows(&mut md, "Monthly", &s.monthly);
    push_period_rows(&mut md, "Yearly", &s.yearly);
    let _ = writeln!(md, "| Closed Positions | {} |", s.trade_count);
    let _ = writeln!(md, "| Win Rate | {:.1}% |", s.win_rate * 100.0);
    let _ = writeln!(md, "| Losscuts | {} |", s.losscut_count);
    let _ = writeln!(md, "| Margin Calls | {} |", s.margin_call_count);
    md.push('\n');

    // Yearly returns
    if !s.yearly.returns.is_empty() {
        md.push_str("## Yearly Returns\n\n");
        md.push_str("| Period End | Valuation | Return |\n");
        md.push_str("| --- | --- | --- |\n");
        for r in &s.yearly.returns {
            let _ = writeln!(md, "| {} | {:.2} | {:.2}% |", r.date, r.valuation, r.ret * 100.0);
        }
        md.push('\n');
    }

    md
}

fn push_period_rows(md: &mut String, label: &str, p: &PeriodStats) {
    let _ = writeln!(md, "| {label} Return (mean) | {:.2}% |", p.mean * 100.0);
    let _ = writeln!(md, "| {label} Return (stdev) | {:.2}% |", p.stdev * 100.0);
    let _ = writeln!(md, "| {label} Sharpe | {:.3} |", p.sharpe);
}

fn describe_strategy(strategy: &StrategyConfig) -> String {
    match strategy {
        StrategyConfig::LosscutValue(p) => format!(
            "losscut_value ({:?}, windows {}/{}, carry={})",
            p.formula, p.index_window, p.volatility_window, p.carry_losing_positions
        ),
        StrategyConfig::LeverageRatio(p) => format!(
            "leverage_ratio ({:?}, windows {}/{}, max {}x, carry={})",
            p.formula, p.index_window, p.volatility_window, p.max_leverage, p.carry_losing_positions
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacktestConfig;
    use crate::runner::run_backtest;

    fn sample() -> BacktestResult {
        run_backtest(&BacktestConfig::synthetic(9, 80)).unwrap()
    }

    #[test]
    fn json_roundtrip() {
        let result = sample();
        let json = export_json(&result).unwrap();
        assert!(json.contains("\"schema_version\": 1"));
        let back = import_json(&json).unwrap();
        assert_eq!(back.strategy, result.strategy);
        assert_eq!(back.dataset_hash, result.dataset_hash);
        assert_eq!(back.valuations.len(), result.valuations.len());
        assert_eq!(back.stats.trade_count, result.stats.trade_count);
        assert_eq!(back.config, result.config);
    }

    #[test]
    fn rejects_future_schema() {
        let mut result = sample();
        result.schema_version = SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&result).unwrap();
        assert!(import_json(&json).is_err());
    }

    #[test]
    fn valuations_csv_has_one_row_per_day() {
        let result = sample();
        let csv = export_valuations_csv(&result).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,valuation,ratio,drawdown,unbound_cash,positions,required_margin"
        );
        assert_eq!(lines.count(), result.valuations.len());
    }

    #[test]
    fn trades_csv_header_only_when_empty() {
        let csv = export_trades_csv(&[]).unwrap();
        assert_eq!(
            csv.trim_end(),
            "date,position_id,reason,entry_price,exit_price,bound_margin,proceeds,pnl"
        );
    }

    #[test]
    fn report_mentions_key_figures() {
        let result = sample();
        let md = generate_report(&result);
        assert!(md.starts_with("# Backtest Report"));
        assert!(md.contains("leverage_ratio"));
        assert!(md.contains("**SYNTHETIC**"));
        assert!(md.contains("Max Drawdown"));
        assert!(md.contains(&result.dataset_hash));
    }
}
