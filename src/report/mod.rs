//! Human-readable performance report.
//!
//! Groups the metrics into return, risk, prediction-quality, trade and
//! capital sections. Percentages print with 2 decimals, ratios with 4 and
//! currency as thousands-separated whole numbers.

use crate::backtest::BacktestResult;
use crate::metrics::{Metric, PerformanceMetrics};

const SEPARATOR: &str = "============================================================";
const RULE: &str = "----------------------------------------";

/// Renders metrics as text.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Full report for a run, including its date span.
    pub fn for_result(result: &BacktestResult) -> String {
        let span = match (result.portfolio_dates.first(), result.portfolio_dates.last()) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "no dates".to_string(),
        };
        format!(
            "{}\nBacktest Report ({}, {} signals)\n{}",
            SEPARATOR,
            span,
            result.predictions.len(),
            Self::render(&result.metrics)
        )
    }

    /// Report body for a metrics mapping. Absent metrics print as zero.
    pub fn render(metrics: &PerformanceMetrics) -> String {
        let m = |metric: Metric| metrics.value_or_zero(metric);
        let pct = |metric: Metric| format!("   {}: {:.2}%\n", label(metric), m(metric));
        let ratio = |metric: Metric| format!("   {}: {:.4}\n", label(metric), m(metric));
        let money = |name: &str, value: f64| format!("   {}: ${}\n", name, format_currency(value));

        let mut out = String::new();
        out.push_str(SEPARATOR);
        out.push('\n');
        if metrics.is_empty() {
            out.push_str("Not enough portfolio history to compute metrics\n");
        }

        out.push_str("\nReturns:\n");
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&pct(Metric::TotalReturn));
        out.push_str(&pct(Metric::AnnualReturn));
        out.push_str(&pct(Metric::AnnualVolatility));
        out.push_str(&ratio(Metric::SharpeRatio));

        out.push_str("\nRisk:\n");
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&pct(Metric::MaxDrawdown));
        out.push_str(&ratio(Metric::SortinoRatio));
        out.push_str(&ratio(Metric::CalmarRatio));
        // stored as a fraction
        out.push_str(&format!("   Win Rate: {:.4}\n", m(Metric::WinRate)));

        out.push_str("\nPrediction Quality:\n");
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&ratio(Metric::PredictionCorrelation));
        out.push_str(&ratio(Metric::InformationCoefficient));
        out.push_str(&ratio(Metric::PredictionMse));
        out.push_str(&ratio(Metric::DirectionAccuracy));

        out.push_str("\nTrades:\n");
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!("   Number of Trades: {:.0}\n", m(Metric::NumberOfTrades)));
        out.push_str(&pct(Metric::TradeWinRate));
        out.push_str(&pct(Metric::AveragePositionSize));

        let initial = m(Metric::InitialCapital);
        let last = m(Metric::FinalPortfolioValue);
        out.push_str("\nCapital:\n");
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&money("Initial Capital", initial));
        out.push_str(&money("Final Value", last));
        out.push_str(&money("Absolute P&L", last - initial));
        out.push_str(SEPARATOR);
        out
    }
}

fn label(metric: Metric) -> &'static str {
    metric.key().trim_end_matches(" (%)")
}

/// Round half to even and group thousands with commas.
pub fn format_currency(value: f64) -> String {
    let rounded = value.round_ties_even();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCalculator;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "0");
        assert_eq!(format_currency(999.4), "999");
        assert_eq!(format_currency(1_000.0), "1,000");
        assert_eq!(format_currency(1_234_567.89), "1,234,568");
        assert_eq!(format_currency(-25_000.0), "-25,000");
        assert_eq!(format_currency(-0.4), "0");
        // halves round to even
        assert_eq!(format_currency(2.5), "2");
        assert_eq!(format_currency(3.5), "4");
        assert_eq!(format_currency(1_000_000.5), "1,000,000");
    }

    #[test]
    fn test_render_rounding() {
        let values = [1_000_000.0, 1_012_345.678, 1_050_000.0];
        let metrics = MetricsCalculator::compute(&values, &[], &[0.1, 0.2], &[0.1, 0.3], 1_000_000.0);
        let report = ReportGenerator::render(&metrics);

        assert!(report.contains("   Total Return: 5.00%\n"));
        assert!(report.contains(&format!(
            "   Sharpe Ratio: {:.4}\n",
            metrics.get(Metric::SharpeRatio).unwrap()
        )));
        assert!(report.contains("   Max Drawdown: 0.00%\n"));
        assert!(report.contains("   Direction Accuracy: 1.0000\n"));
        assert!(report.contains("   Initial Capital: $1,000,000\n"));
        assert!(report.contains("   Final Value: $1,050,000\n"));
        assert!(report.contains("   Absolute P&L: $50,000\n"));
    }

    #[test]
    fn test_render_groups_in_order() {
        let metrics = MetricsCalculator::compute(&[100.0, 90.0], &[], &[], &[], 100.0);
        let report = ReportGenerator::render(&metrics);
        let positions: Vec<usize> = ["Returns:", "Risk:", "Prediction Quality:", "Trades:", "Capital:"]
            .iter()
            .map(|header| report.find(header).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(report.contains("   Absolute P&L: $-10\n"));
    }

    #[test]
    fn test_render_empty_metrics() {
        let report = ReportGenerator::render(&PerformanceMetrics::empty());
        assert!(report.contains("Not enough portfolio history"));
        assert!(report.contains("   Total Return: 0.00%\n"));
    }
}
