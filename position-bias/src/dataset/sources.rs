//! Normalization of the four MCQ dataset families into [`QuestionRow`]s
//!
//! Records are the JSON rows exported from the dataset hub (one object per
//! line). Families whose questions carry more candidates than needed, or only
//! a bag of aliases, are reduced to random distractors plus the answer.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::io::BufRead;
use std::path::Path;

use super::{DatasetError, QuestionRow};

/// Dataset families the pipeline knows how to normalize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFamily {
    /// Reading comprehension: article, question, options, answer letter
    Race,
    /// AI2 reasoning challenge: choices with labels and an answer key
    Arc,
    /// CommonsenseQA: five labelled choices
    CommonsenseQa,
    /// TriviaQA: a normalized answer and its aliases
    TriviaQa,
}

impl SourceFamily {
    pub fn all() -> Vec<SourceFamily> {
        vec![
            SourceFamily::Race,
            SourceFamily::Arc,
            SourceFamily::CommonsenseQa,
            SourceFamily::TriviaQa,
        ]
    }

    /// Tag written to the `source` column
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFamily::Race => "race",
            SourceFamily::Arc => "arc",
            SourceFamily::CommonsenseQa => "csqa",
            SourceFamily::TriviaQa => "trivia",
        }
    }
}

impl std::str::FromStr for SourceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "race" => Ok(SourceFamily::Race),
            "arc" | "ai2_arc" => Ok(SourceFamily::Arc),
            "csqa" | "commonsense_qa" | "commonsenseqa" => Ok(SourceFamily::CommonsenseQa),
            "trivia" | "trivia_qa" | "triviaqa" => Ok(SourceFamily::TriviaQa),
            _ => {
                let known: Vec<&str> = SourceFamily::all().iter().map(SourceFamily::as_str).collect();
                Err(format!("Unknown dataset family: {} (expected one of {})", s, known.join(", ")))
            }
        }
    }
}

impl std::fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read JSON Lines records
pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Vec<Value>, DatasetError> {
    let file = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut records = Vec::new();
    for line in file.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

fn str_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    value?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn race(record: &Value) -> Option<QuestionRow> {
    let options = string_array(record.get("options"))?;
    let letter = str_field(record, "answer")?.trim().to_lowercase();
    let answer_idx = (letter.chars().next()? as usize).checked_sub('a' as usize)?;
    let answer = options.get(answer_idx)?.clone();
    let question = format!(
        "{}\n\n{}",
        str_field(record, "article")?,
        str_field(record, "question")?
    );
    Some(QuestionRow {
        question,
        options,
        answer,
        answer_idx,
        source: None,
    })
}

/// Answer text from a `choices: {label, text}` block and an answer key
fn labelled_choices(record: &Value) -> Option<(Vec<String>, String)> {
    let choices = record.get("choices")?;
    let labels = string_array(choices.get("label"))?;
    let texts = string_array(choices.get("text"))?;
    let key = str_field(record, "answerKey")?;
    let answer = labels
        .iter()
        .zip(texts.iter())
        .find(|(label, _)| label.as_str() == key)
        .map(|(_, text)| text.clone())?;
    Some((texts, answer))
}

fn arc(record: &Value) -> Option<QuestionRow> {
    let (options, answer) = labelled_choices(record)?;
    QuestionRow::new(str_field(record, "question")?, options, answer).ok()
}

/// Keep `distractors` random wrong options and put the answer last
fn reduce_options<R: Rng + ?Sized>(
    question: &str,
    mut options: Vec<String>,
    answer: String,
    distractors: usize,
    rng: &mut R,
) -> Option<QuestionRow> {
    let at = options.iter().position(|o| *o == answer)?;
    options.remove(at);
    if options.len() < distractors {
        return None;
    }
    let mut picked: Vec<String> = options.choose_multiple(rng, distractors).cloned().collect();
    let answer_idx = picked.len();
    picked.push(answer.clone());
    Some(QuestionRow {
        question: question.to_string(),
        options: picked,
        answer,
        answer_idx,
        source: None,
    })
}

fn commonsense_qa<R: Rng + ?Sized>(record: &Value, option_count: usize, rng: &mut R) -> Option<QuestionRow> {
    let (options, answer) = labelled_choices(record)?;
    reduce_options(str_field(record, "question")?, options, answer, option_count - 1, rng)
}

fn trivia_qa<R: Rng + ?Sized>(record: &Value, option_count: usize, rng: &mut R) -> Option<QuestionRow> {
    let answer_block = record.get("answer")?;
    let answer = str_field(answer_block, "normalized_value")?.trim().to_lowercase();
    let aliases = string_array(answer_block.get("normalized_aliases"))?;
    reduce_options(str_field(record, "question")?, aliases, answer, option_count - 1, rng)
}

/// Normalize raw records of one family, skipping records that cannot form a
/// valid question. Returns the rows and the number skipped.
pub fn normalize_records<R: Rng + ?Sized>(
    family: SourceFamily,
    records: &[Value],
    option_count: usize,
    limit: Option<usize>,
    rng: &mut R,
) -> (Vec<QuestionRow>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0;

    for record in records {
        if limit.map(|l| rows.len() >= l).unwrap_or(false) {
            break;
        }
        let row = match family {
            SourceFamily::Race => race(record),
            SourceFamily::Arc => arc(record),
            SourceFamily::CommonsenseQa => commonsense_qa(record, option_count, rng),
            SourceFamily::TriviaQa => trivia_qa(record, option_count, rng),
        };
        match row {
            Some(row) => rows.push(row.with_source(family.as_str())),
            None => skipped += 1,
        }
    }

    (rows, skipped)
}

/// Build the combined MCQ dataset from every family's records.
///
/// Each family's records are shuffled before `limit` rows are taken; rows
/// whose option count differs from `option_count` (or that break any other
/// row invariant) are dropped with a warning; the combined set is shuffled.
pub fn assemble<R: Rng + ?Sized>(
    inputs: Vec<(SourceFamily, Vec<Value>)>,
    option_count: usize,
    limit: Option<usize>,
    rng: &mut R,
) -> Vec<QuestionRow> {
    let mut combined = Vec::new();

    for (family, mut records) in inputs {
        records.shuffle(rng);
        let (rows, skipped) = normalize_records(family, &records, option_count, limit, rng);
        tracing::info!("{}: {} questions ({} records skipped)", family, rows.len(), skipped);

        let before = rows.len();
        let valid: Vec<QuestionRow> = rows
            .into_iter()
            .filter(|row| row.validate(option_count).is_ok())
            .collect();
        if valid.len() < before {
            tracing::warn!(
                "{}: dropped {} questions without exactly {} distinct options",
                family,
                before - valid.len(),
                option_count
            );
        }
        combined.extend(valid);
    }

    combined.shuffle(rng);
    combined
}
