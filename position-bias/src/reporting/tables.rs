//! Column layouts for persisted run, certainty and sweep artifacts

use std::collections::BTreeSet;

use crate::analysis::SweepObservation;
use crate::dataset::{DatasetError, QuestionRow, Table, TableRow};
use crate::experiments::{CertaintyRecord, CertaintyRow, CertaintySummary, PositionLockedRow};
use crate::runner::ScoredRow;

const CERTAINTY_COLUMNS: [&str; 4] = ["correctness", "response_set", "consistency", "is_certain"];

fn base_headers() -> Vec<String> {
    QuestionRow::COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// `response_json`, `response_proba`, `response_idx`, `response`, `options`
/// and `correctness` cells for one scored row
fn response_cells(scored: &ScoredRow) -> Result<[String; 6], DatasetError> {
    let json = match &scored.response {
        Some(response) => serde_json::to_string(response)?,
        None => String::new(),
    };
    let proba = match scored.response_proba() {
        Some(proba) => serde_json::to_string(proba)?,
        None => String::new(),
    };
    Ok([
        json,
        proba,
        scored.response_idx().to_string(),
        scored.response_text().unwrap_or_default().to_string(),
        serde_json::to_string(&scored.row.options)?,
        u8::from(scored.is_correct()).to_string(),
    ])
}

fn summary_cells(summary: &CertaintySummary) -> Result<Vec<String>, DatasetError> {
    Ok(vec![
        summary.correctness.to_string(),
        serde_json::to_string(&summary.response_set)?,
        summary.consistency.to_string(),
        summary.is_certain.to_string(),
    ])
}

/// One run of the dataset scorer
pub fn scored_run_table(rows: &[ScoredRow]) -> Result<Table, DatasetError> {
    let mut headers = base_headers();
    headers.extend(
        ["response_json", "response_proba", "response_idx", "response"]
            .iter()
            .map(|c| c.to_string()),
    );
    let mut table = Table::new(headers);
    for scored in rows {
        let mut cells = scored.row.cells()?;
        let [json, proba, idx, text, _, _] = response_cells(scored)?;
        cells.extend([json, proba, idx, text]);
        table.push(cells);
    }
    Ok(table)
}

/// Certainty-annotated rows with every run's response
pub fn certainty_table(rows: &[CertaintyRow]) -> Result<Table, DatasetError> {
    let runs = rows.iter().map(|r| r.runs.len()).max().unwrap_or(0);
    let mut headers = base_headers();
    headers.extend(CERTAINTY_COLUMNS.iter().map(|c| c.to_string()));
    for i in 0..runs {
        for suffix in ["response_json", "response_idx", "response", "options"] {
            headers.push(format!("run_{}_{}", i, suffix));
        }
    }

    let mut table = Table::new(headers);
    for row in rows {
        let mut cells = row.row.cells()?;
        cells.extend(summary_cells(&row.summary)?);
        for run in &row.runs {
            let [json, _, idx, text, options, _] = response_cells(run)?;
            cells.extend([json, idx, text, options]);
        }
        table.push(cells);
    }
    Ok(table)
}

fn read_summary(row: &TableRow<'_>) -> Result<CertaintySummary, DatasetError> {
    let raw_set = row.get("response_set")?;
    let response_set: BTreeSet<Option<String>> = serde_json::from_str(raw_set)
        .map_err(|e| row.invalid(format!("column response_set: '{}': {}", raw_set, e)))?;
    Ok(CertaintySummary {
        correctness: row.parse("correctness")?,
        response_set,
        consistency: row.parse("consistency")?,
        is_certain: row.parse_bool("is_certain")?,
    })
}

/// Read back the question and certainty columns of a certainty table.
///
/// Every question must carry exactly `option_count` distinct options; the
/// error names the first row that does not.
pub fn read_certainty_records(table: &Table, option_count: usize) -> Result<Vec<CertaintyRecord>, DatasetError> {
    table
        .rows()
        .map(|row| -> Result<CertaintyRecord, DatasetError> {
            let question = QuestionRow::from_table_row(&row)?;
            question
                .validate(option_count)
                .map_err(|e| row.invalid(e.to_string()))?;
            Ok(CertaintyRecord {
                row: question,
                summary: read_summary(&row)?,
            })
        })
        .collect()
}

/// Position-locked rows, one column group per forced position
pub fn sweep_table(rows: &[PositionLockedRow]) -> Result<Table, DatasetError> {
    let positions = rows.iter().map(|r| r.positions.len()).max().unwrap_or(0);
    let mut headers = base_headers();
    headers.extend(CERTAINTY_COLUMNS.iter().map(|c| c.to_string()));
    for i in 0..positions {
        for suffix in [
            "response_json",
            "response_proba",
            "response_idx",
            "response",
            "options",
            "correctness",
        ] {
            headers.push(format!("pos_{}_{}", i, suffix));
        }
    }

    let mut table = Table::new(headers);
    for row in rows {
        let mut cells = row.record.row.cells()?;
        cells.extend(summary_cells(&row.record.summary)?);
        for scored in &row.positions {
            cells.extend(response_cells(scored)?);
        }
        table.push(cells);
    }
    Ok(table)
}

/// Certainty flag and per-position picks from a sweep table.
///
/// Empty pick cells read as unscored.
pub fn read_sweep_observations(table: &Table, option_count: usize) -> Result<Vec<SweepObservation>, DatasetError> {
    let columns: Vec<String> = (0..option_count).map(|i| format!("pos_{}_response_idx", i)).collect();
    if let Some(missing) = columns.iter().find(|c| !table.has_column(c)) {
        return Err(DatasetError::MissingColumn(missing.clone()));
    }

    table
        .rows()
        .map(|row| -> Result<SweepObservation, DatasetError> {
            let predicted = columns
                .iter()
                .map(|column| -> Result<i64, DatasetError> {
                    match row.get(column)?.trim() {
                        "" => Ok(-1),
                        _ => row.parse_index(column),
                    }
                })
                .collect::<Result<Vec<i64>, DatasetError>>()?;
            Ok(SweepObservation {
                is_certain: row.parse_bool("is_certain")?,
                predicted,
            })
        })
        .collect()
}
