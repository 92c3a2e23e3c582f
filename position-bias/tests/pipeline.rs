//! Certainty, sweep and analysis run end to end against an in-memory model

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use position_bias::analysis::analyze_dataset;
use position_bias::dataset::{read_table, sample_rows, write_table, QuestionRow};
use position_bias::experiments::{position_sweep, score_certainty};
use position_bias::providers::{ChatModel, CompletionRequest, CompletionResponse, ProviderError, ProviderResult};
use position_bias::reporting::{certainty_table, read_certainty_records, read_sweep_observations, sweep_table};
use position_bias::runner::{BatchScheduler, DatasetScorer, ModelRowScorer, PromptTemplate, RetryPolicy, RetryingScorer};

/// Knows the answer to "easy" questions, always picks the first option for
/// "hard" ones and rambles on "mumble" ones. The first request for every
/// question is rate limited.
#[derive(Default)]
struct BiasedModel {
    seen: Mutex<HashSet<String>>,
}

impl BiasedModel {
    fn reply(question: &str, options: &[String]) -> String {
        if question.starts_with("mumble") {
            return "I am not sure about this one.".to_string();
        }
        let proba = vec![0.25; options.len()];
        if question.starts_with("easy") {
            let right = options.iter().find(|o| o.starts_with("right")).cloned().unwrap_or_default();
            return format!(
                "Answer: {}",
                serde_json::json!({"proba": proba, "response_idx": right})
            );
        }
        format!("{}", serde_json::json!({"proba": proba, "response_idx": 0}))
    }
}

#[async_trait]
impl ChatModel for BiasedModel {
    fn name(&self) -> &str {
        "biased"
    }

    fn default_model(&self) -> &str {
        "biased-1"
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let prompt = &request.messages[1].content;
        let (head, answers) = prompt.split_once("\n\nANSWERS:\n").unwrap();
        let question = head.trim_start_matches("QUESTION:\n").to_string();
        let options: Vec<String> = serde_json::from_str(answers).unwrap();

        if self.seen.lock().unwrap().insert(question.clone()) {
            return Err(ProviderError::RateLimited { retry_after_ms: 0 });
        }
        Ok(CompletionResponse {
            content: Self::reply(&question, &options),
            model: "biased-1".into(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: "stop".into(),
            latency_ms: 0,
        })
    }
}

fn question(kind: &str, i: usize) -> QuestionRow {
    let options = vec![
        format!("wrong-a-{}", i),
        format!("right-{}", i),
        format!("wrong-b-{}", i),
        format!("wrong-c-{}", i),
    ];
    QuestionRow::new(format!("{} {}", kind, i), options, format!("right-{}", i)).unwrap()
}

fn dataset() -> Vec<QuestionRow> {
    let mut rows = Vec::new();
    for i in 0..4 {
        rows.push(question("easy", i));
        rows.push(question("hard", i));
    }
    rows.push(question("mumble", 0));
    rows
}

fn scorer(model: Arc<BiasedModel>) -> DatasetScorer {
    let row_scorer = ModelRowScorer::new(model, PromptTemplate::new(4));
    let retrying = RetryingScorer::new(Arc::new(row_scorer), RetryPolicy::immediate(3));
    DatasetScorer::new(Arc::new(retrying), BatchScheduler::new(3), "biased-1")
}

#[tokio::test]
async fn test_certainty_sweep_and_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let scorer = scorer(Arc::new(BiasedModel::default()));
    let mut rng = StdRng::seed_from_u64(2024);
    let rows = dataset();

    // Certainty
    let annotated = score_certainty(&scorer, &rows, 4, true, &mut rng).await.unwrap();
    assert_eq!(annotated.len(), rows.len());
    for row in &annotated {
        assert_eq!(row.runs.len(), 4);
        assert_eq!(row.row.answer_idx, 0);
        let certain_expected = row.row.question.starts_with("easy");
        if certain_expected {
            assert!(row.summary.is_certain, "{} should be certain", row.row.question);
        }
        if row.row.question.starts_with("mumble") {
            assert!(!row.summary.is_certain);
            assert_eq!(row.summary.correctness, 0.0);
            assert!(row.summary.response_set.contains(&None));
        }
    }
    let certain_count = annotated.iter().filter(|r| r.summary.is_certain).count();
    assert!(certain_count >= 4);

    let certainty_path = dir.path().join("mcq-biased-1_certainty.csv.gz");
    write_table(&certainty_path, &certainty_table(&annotated).unwrap()).unwrap();
    let records = read_certainty_records(&read_table(&certainty_path).unwrap(), 4).unwrap();
    assert_eq!(records.len(), rows.len());

    // Sweep
    let locked = position_sweep(&scorer, &records, 4, true, &mut rng).await.unwrap();
    assert_eq!(locked.len(), rows.len());
    for row in &locked {
        let q = &row.record.row.question;
        for pos in 0..4 {
            let expected = if q.starts_with("easy") {
                Some(pos as i64)
            } else if q.starts_with("hard") {
                Some(0)
            } else {
                Some(-1)
            };
            assert_eq!(row.response_idx(pos), expected, "{} at {}", q, pos);
        }
    }

    let sweep_path = dir.path().join("mcq-biased-1_test.csv.gz");
    write_table(&sweep_path, &sweep_table(&locked).unwrap()).unwrap();
    let observations = read_sweep_observations(&read_table(&sweep_path).unwrap(), 4).unwrap();

    // Analysis
    let report = analyze_dataset("biased-1", &observations, 4).unwrap();
    assert_eq!(report.question_count, 9);
    assert_eq!(report.certain_count, certain_count);
    assert_eq!(report.positions[0].correctness.overall, Some(8.0 / 9.0));
    assert_eq!(report.positions[2].correctness.overall, Some(4.0 / 9.0));
    assert_eq!(report.positions[3].metrics.recall, 4.0 / 9.0);
    for actual in 0..4 {
        assert_eq!(report.confusion_certain.row_total(actual) as usize, certain_count);
        assert_eq!(report.confusion_uncertain.row_total(actual) as usize, 9 - certain_count);
    }
    assert_eq!(report.confusion_uncertain.unscored, vec![1, 1, 1, 1]);
    // [8, 1] at the first slot against [4, 5] everywhere else
    let chi = report.chi_square.test().unwrap();
    assert_eq!(chi.dof, 3);
    assert!((chi.statistic - 5.4).abs() < 1e-9);
    assert!(!report.is_significant());

    // Sweeping a seeded sample of the annotated set
    let sampled = sample_rows(&records, 5, &mut StdRng::seed_from_u64(0));
    let locked = position_sweep(&scorer, &sampled, 4, true, &mut rng).await.unwrap();
    assert_eq!(locked.len(), 5);
    let questions: HashSet<&str> = locked.iter().map(|r| r.record.row.question.as_str()).collect();
    assert_eq!(questions.len(), 5);
    assert!(questions.iter().all(|q| records.iter().any(|r| r.row.question == *q)));
    assert_eq!(sample_rows(&records, 250, &mut StdRng::seed_from_u64(0)).len(), records.len());
}
