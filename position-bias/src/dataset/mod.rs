//! Multiple-choice question rows and the operations the experiments apply
//! to them

pub mod sources;
pub mod table;

pub use sources::{assemble, load_jsonl, normalize_records, SourceFamily};
pub use table::{read_table, write_table, Table, TableRow};

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Error type for dataset handling
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),
}

/// One multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRow {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    /// Invariant: `options[answer_idx] == answer`
    pub answer_idx: usize,
    /// Dataset family the question came from
    #[serde(default)]
    pub source: Option<String>,
}

impl QuestionRow {
    /// Build a row, locating the answer among the options
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        answer: impl Into<String>,
    ) -> Result<Self, DatasetError> {
        let answer = answer.into();
        let answer_idx = options
            .iter()
            .position(|o| *o == answer)
            .ok_or_else(|| DatasetError::InvalidQuestion(format!("answer '{}' is not among the options", answer)))?;
        Ok(Self {
            question: question.into(),
            options,
            answer,
            answer_idx,
            source: None,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Check the row invariants against the expected option count
    pub fn validate(&self, option_count: usize) -> Result<(), DatasetError> {
        if self.options.len() != option_count {
            return Err(DatasetError::InvalidQuestion(format!(
                "expected {} options, found {}",
                option_count,
                self.options.len()
            )));
        }
        for (i, option) in self.options.iter().enumerate() {
            if self.options[..i].contains(option) {
                return Err(DatasetError::InvalidQuestion(format!("duplicate option '{}'", option)));
            }
        }
        match self.options.get(self.answer_idx) {
            Some(option) if *option == self.answer => Ok(()),
            _ => Err(DatasetError::InvalidQuestion(format!(
                "options[{}] is not the answer '{}'",
                self.answer_idx, self.answer
            ))),
        }
    }

    /// Move the answer to `target`, optionally shuffling the distractors first.
    ///
    /// The option multiset is unchanged; only the order moves.
    pub fn relocate_answer<R: Rng + ?Sized>(
        &mut self,
        target: usize,
        shuffle: bool,
        rng: &mut R,
    ) -> Result<(), DatasetError> {
        if target >= self.options.len() {
            return Err(DatasetError::InvalidQuestion(format!(
                "cannot move answer to index {} of {} options",
                target,
                self.options.len()
            )));
        }
        let current = self
            .options
            .iter()
            .position(|o| *o == self.answer)
            .ok_or_else(|| DatasetError::InvalidQuestion(format!("answer '{}' is not among the options", self.answer)))?;

        let answer = self.options.remove(current);
        if shuffle {
            self.options.shuffle(rng);
        }
        self.options.insert(target, answer);
        self.answer_idx = target;
        Ok(())
    }

    /// Shuffle all options and track the answer's new position
    pub fn shuffle_options<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.options.shuffle(rng);
        if let Some(idx) = self.options.iter().position(|o| *o == self.answer) {
            self.answer_idx = idx;
        }
    }
}

/// Relocate every row's answer to `target`, returning new rows
pub fn relocate_all<R: Rng + ?Sized>(
    rows: &[QuestionRow],
    target: usize,
    shuffle: bool,
    rng: &mut R,
) -> Result<Vec<QuestionRow>, DatasetError> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            row.relocate_answer(target, shuffle, rng)?;
            Ok(row)
        })
        .collect()
}

/// Draw `n` rows without replacement (all rows, shuffled, when `n` exceeds the count)
pub fn sample_rows<T: Clone, R: Rng + ?Sized>(rows: &[T], n: usize, rng: &mut R) -> Vec<T> {
    rows.choose_multiple(rng, n).cloned().collect()
}

/// Row counts per source family, in first-seen order
pub fn counts_by_source(rows: &[QuestionRow]) -> IndexMap<String, usize> {
    let mut counts = IndexMap::new();
    for row in rows {
        let source = row.source.clone().unwrap_or_else(|| "unknown".to_string());
        *counts.entry(source).or_insert(0) += 1;
    }
    counts
}

/// Load question rows from a CSV (optionally gzip-compressed) file
pub fn load_questions(path: impl AsRef<Path>) -> Result<Vec<QuestionRow>, DatasetError> {
    let table = read_table(path)?;
    table.rows().map(|row| QuestionRow::from_table_row(&row)).collect()
}

/// Save question rows to a CSV (optionally gzip-compressed) file
pub fn save_questions(path: impl AsRef<Path>, rows: &[QuestionRow]) -> Result<(), DatasetError> {
    let mut table = Table::new(QuestionRow::COLUMNS.iter().map(|c| c.to_string()).collect());
    for row in rows {
        table.push(row.cells()?);
    }
    write_table(path, &table)
}

impl QuestionRow {
    pub const COLUMNS: [&'static str; 5] = ["question", "options", "answer", "answer_idx", "source"];

    /// Cells in [`QuestionRow::COLUMNS`] order
    pub fn cells(&self) -> Result<Vec<String>, DatasetError> {
        Ok(vec![
            self.question.clone(),
            serde_json::to_string(&self.options)?,
            self.answer.clone(),
            self.answer_idx.to_string(),
            self.source.clone().unwrap_or_default(),
        ])
    }

    pub fn from_table_row(row: &TableRow<'_>) -> Result<Self, DatasetError> {
        let options = row.string_list("options")?;
        let answer = row.get("answer")?.to_string();
        let answer_idx = row.parse::<usize>("answer_idx")?;
        if options.get(answer_idx) != Some(&answer) {
            return Err(row.invalid(format!("options[{}] is not the answer '{}'", answer_idx, answer)));
        }
        Ok(Self {
            question: row.get("question")?.to_string(),
            options,
            answer,
            answer_idx,
            source: row.get_opt("source").filter(|s| !s.is_empty()).map(str::to_string),
        })
    }
}
