//! Results reporting

pub mod tables;

pub use tables::{
    certainty_table, read_certainty_records, read_sweep_observations, scored_run_table, sweep_table,
};

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::analysis::{AnalysisReport, ChiSquareOutcome, ConfusionMatrix, SIGNIFICANCE};

/// JSON summary export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    pub run_id: String,
    pub timestamp: String,
    pub sweep_file: String,
    pub significant: bool,
    pub report: AnalysisReport,
}

impl JsonSummary {
    pub fn from_report(run_id: impl Into<String>, report: &AnalysisReport, sweep_file: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            sweep_file: sweep_file.into(),
            significant: report.is_significant(),
            report: report.clone(),
        }
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

fn fmt_ratio(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "n/a".to_string(),
    }
}

fn write_matrix(out: &mut String, title: &str, matrix: &ConfusionMatrix) {
    let labels = matrix.labels();
    let _ = writeln!(out, "\n{} (counts):", title);
    let _ = writeln!(out, "{:-<50}", "");
    let mut header = format!("{:>12}", "");
    for p in 0..labels {
        let _ = write!(header, "{:>12}", format!("Predicted {}", p));
    }
    let _ = writeln!(out, "{}{:>10}", header, "Unscored");
    for (actual, row) in matrix.counts.iter().enumerate() {
        let _ = write!(out, "{:>12}", format!("Actual {}", actual));
        for count in row {
            let _ = write!(out, "{:>12}", count);
        }
        let _ = writeln!(out, "{:>10}", matrix.unscored[actual]);
    }

    let _ = writeln!(out, "\n{} (normalized):", title);
    let _ = writeln!(out, "{:-<50}", "");
    let _ = writeln!(out, "{}", header);
    for (actual, row) in matrix.normalized().iter().enumerate() {
        let _ = write!(out, "{:>12}", format!("Actual {}", actual));
        for share in row {
            let _ = write!(out, "{:>12.2}", share);
        }
        let _ = writeln!(out);
    }
}

/// Render the analysis as a console report
pub fn format_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Position Bias Analysis: {} ===\n", report.name);
    let _ = writeln!(
        out,
        "Questions: {} (certain: {}, uncertain: {})",
        report.question_count,
        report.certain_count,
        report.question_count - report.certain_count
    );

    for position in &report.positions {
        let _ = writeln!(out, "\nAnswer at position {}:", position.position);
        let _ = writeln!(out, "{:-<50}", "");
        let _ = writeln!(out, "  Correctness:");
        let _ = writeln!(out, "    overall: {}", fmt_ratio(position.correctness.overall));
        let _ = writeln!(out, "    across certain questions: {}", fmt_ratio(position.correctness.certain));
        let _ = writeln!(out, "    across uncertain questions: {}", fmt_ratio(position.correctness.uncertain));

        for (label, distribution) in [
            ("certain", &position.distribution_certain),
            ("uncertain", &position.distribution_uncertain),
        ] {
            let _ = writeln!(out, "  Choice distribution ({} questions):", label);
            for (option, share) in distribution.iter().enumerate() {
                let _ = writeln!(out, "    option {}: {:.2}%", option, share);
            }
        }

        let _ = writeln!(
            out,
            "  Precision: {:.3}, Recall: {:.3}, F1: {:.3}",
            position.metrics.precision, position.metrics.recall, position.metrics.f1
        );
    }

    write_matrix(&mut out, "Confusion matrix, certain questions", &report.confusion_certain);
    write_matrix(&mut out, "Confusion matrix, uncertain questions", &report.confusion_uncertain);

    let _ = writeln!(out, "\nChi-square test:");
    let _ = writeln!(out, "{:-<50}", "");
    match &report.chi_square {
        ChiSquareOutcome::Tested(chi) => {
            let _ = writeln!(out, "  statistic: {:.4}", chi.statistic);
            let _ = writeln!(out, "  degrees of freedom: {}", chi.dof);
            let _ = writeln!(out, "  p-value: {:.4e}", chi.p_value);
            if chi.is_significant(SIGNIFICANCE) {
                let _ = writeln!(
                    out,
                    "  Result: correctness differs significantly across positions (p < {})",
                    SIGNIFICANCE
                );
            } else {
                let _ = writeln!(
                    out,
                    "  Result: no significant difference in correctness across positions (p >= {})",
                    SIGNIFICANCE
                );
            }
        }
        ChiSquareOutcome::Undefined { reason } => {
            let _ = writeln!(out, "  chi-square: n/a ({})", reason);
        }
    }

    let _ = writeln!(out, "\n{:=<50}", "");
    out
}

/// Print the analysis to stdout
pub fn print_console_report(report: &AnalysisReport) {
    print!("{}", format_report(report));
}
