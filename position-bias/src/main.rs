//! Positional bias harness CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use position_bias::{
    analysis::analyze_dataset,
    config::Config,
    dataset::{
        assemble, counts_by_source, load_jsonl, load_questions, read_table, sample_rows, save_questions,
        write_table, SourceFamily,
    },
    experiments::{position_sweep, score_certainty},
    providers::create_model,
    reporting::{
        certainty_table, print_console_report, read_certainty_records, read_sweep_observations, scored_run_table,
        sweep_table, JsonSummary,
    },
    runner::{
        BatchScheduler, DatasetScorer, Jitter, ModelRowScorer, PromptTemplate, RetryingScorer, SamplingParams,
        ScoredRow,
    },
};

#[derive(Parser)]
#[command(name = "position-bias")]
#[command(about = "Measure positional bias of LLMs on multiple-choice questions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the combined MCQ dataset from JSON Lines exports
    Assemble {
        /// Family and export file, e.g. `race=data/race.jsonl` (repeatable)
        #[arg(short, long = "input", value_parser = parse_source_input, required = true)]
        inputs: Vec<(SourceFamily, PathBuf)>,

        /// Questions kept per family
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output file (default: <data_dir>/mcq.csv.gz)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score every question several times with shuffled options
    Certainty {
        /// Provider section of the configuration
        #[arg(short, long, default_value = "openai")]
        provider: String,

        /// Model name (default: the provider's default_model)
        #[arg(short, long)]
        model: Option<String>,

        /// Assembled dataset (default: <data_dir>/mcq.csv.gz)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Score a random sample of this many questions
        #[arg(long)]
        sample: Option<usize>,

        /// Runs per question (default: scoring.certainty_runs)
        #[arg(long)]
        runs: Option<usize>,

        /// Output file (default: <dist_dir>/mcq-<model>_certainty.csv.gz)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Force the answer into each position and score every layout once
    Sweep {
        /// Provider section of the configuration
        #[arg(short, long, default_value = "openai")]
        provider: String,

        /// Model name (default: the provider's default_model)
        #[arg(short, long)]
        model: Option<String>,

        /// Certainty-annotated dataset (default: <dist_dir>/mcq-<model>_certainty.csv.gz)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Sweep a random sample of this many annotated questions
        #[arg(long)]
        sample: Option<usize>,

        /// Output file (default: <dist_dir>/mcq-<model>_test.csv.gz)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze position sweep results
    Analyze {
        /// Sweep result files
        #[arg(short, long = "input", required = true)]
        inputs: Vec<PathBuf>,

        /// Also write a JSON summary per input into this directory
        #[arg(long)]
        summary_dir: Option<PathBuf>,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/position-bias.toml")]
        output: PathBuf,
    },
}

fn parse_source_input(s: &str) -> Result<(SourceFamily, PathBuf), String> {
    let (family, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <family>=<path>, got '{}'", s))?;
    Ok((family.trim().parse()?, PathBuf::from(path.trim())))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("position_bias=debug,info")
    } else {
        EnvFilter::new("position_bias=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Assemble { inputs, limit, output } => {
            assemble_dataset(&config, inputs, limit, output)?;
        }

        Commands::Certainty {
            provider,
            model,
            input,
            sample,
            runs,
            output,
        } => {
            run_certainty(&config, &provider, model, input, sample, runs, output).await?;
        }

        Commands::Sweep {
            provider,
            model,
            input,
            sample,
            output,
        } => {
            run_sweep(&config, &provider, model, input, sample, output).await?;
        }

        Commands::Analyze { inputs, summary_dir } => {
            analyze_results(&config, inputs, summary_dir)?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

/// Seed for this invocation: configured, or drawn fresh and logged
fn seeded_rng(config: &Config) -> (StdRng, u64) {
    let seed = config.scoring.seed.unwrap_or_else(rand::random);
    tracing::info!("Random seed: {}", seed);
    (StdRng::seed_from_u64(seed), seed)
}

/// Model names end up in file names
fn file_slug(model: &str) -> String {
    model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
        .collect()
}

fn build_scorer(
    config: &Config,
    provider: &str,
    model: Option<String>,
    seed: u64,
) -> Result<DatasetScorer, Box<dyn std::error::Error>> {
    let chat = create_model(config, provider)?;
    let model_name = model.clone().unwrap_or_else(|| chat.default_model().to_string());
    let s = &config.scoring;

    let row_scorer = ModelRowScorer::new(chat, PromptTemplate::new(s.option_count))
        .with_sampling(SamplingParams {
            model,
            temperature: s.temperature,
            top_p: s.top_p,
            max_tokens: s.max_tokens,
        })
        .with_jitter(Jitter::new(s.jitter_min_ms, s.jitter_max_ms, seed));
    let retrying = RetryingScorer::new(Arc::new(row_scorer), config.retry.policy());
    let policy = retrying.policy();
    tracing::info!(
        "Rate limits retried up to {} attempts, waits {:?}..{:?}",
        policy.max_attempts,
        policy.min_wait,
        policy.max_wait
    );

    Ok(DatasetScorer::new(
        Arc::new(retrying),
        BatchScheduler::new(s.workers),
        model_name,
    ))
}

fn assemble_dataset(
    config: &Config,
    inputs: Vec<(SourceFamily, PathBuf)>,
    limit: Option<usize>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut rng, _) = seeded_rng(config);

    let mut records = Vec::new();
    for (family, path) in inputs {
        let loaded = load_jsonl(&path)?;
        tracing::info!("Loaded {} {} records from {}", loaded.len(), family, path.display());
        records.push((family, loaded));
    }

    let rows = assemble(records, config.scoring.option_count, limit, &mut rng);
    let output = output.unwrap_or_else(|| config.paths.data_dir.join("mcq.csv.gz"));
    save_questions(&output, &rows)?;

    println!("=== Dataset Assembled ===");
    println!("Questions: {}", rows.len());
    for (source, count) in counts_by_source(&rows) {
        println!("  {}: {}", source, count);
    }
    println!("Output: {}", output.display());
    Ok(())
}

async fn run_certainty(
    config: &Config,
    provider: &str,
    model: Option<String>,
    input: Option<PathBuf>,
    sample: Option<usize>,
    runs: Option<usize>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut rng, seed) = seeded_rng(config);
    let scorer = build_scorer(config, provider, model, seed)?;
    let slug = file_slug(scorer.model_name());
    let runs = runs.unwrap_or(config.scoring.certainty_runs);

    let input = input.unwrap_or_else(|| config.paths.data_dir.join("mcq.csv.gz"));
    let mut rows = load_questions(&input)?;
    if let Some(n) = sample {
        rows = sample_rows(&rows, n, &mut rng);
    }

    println!("=== Certainty Measurement ===");
    println!("Model: {}", scorer.model_name());
    println!("Questions: {}", rows.len());
    println!("Runs: {}", runs);
    println!();

    let annotated = score_certainty(&scorer, &rows, runs, config.scoring.shuffle_distractors, &mut rng).await?;

    for i in 0..runs {
        let run: Vec<ScoredRow> = annotated.iter().filter_map(|r| r.runs.get(i).cloned()).collect();
        let path = config
            .paths
            .tmp_dir
            .join(format!("mcq-{}_certainty_run_{}.csv.gz", slug, i));
        write_table(&path, &scored_run_table(&run)?)?;
    }

    let output = output.unwrap_or_else(|| {
        config
            .paths
            .dist_dir
            .join(format!("mcq-{}_certainty.csv.gz", slug))
    });
    write_table(&output, &certainty_table(&annotated)?)?;

    let certain = annotated.iter().filter(|r| r.summary.is_certain).count();
    println!("Certain: {}", certain);
    println!("Uncertain: {}", annotated.len() - certain);
    println!("Output: {}", output.display());
    Ok(())
}

async fn run_sweep(
    config: &Config,
    provider: &str,
    model: Option<String>,
    input: Option<PathBuf>,
    sample: Option<usize>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut rng, seed) = seeded_rng(config);
    let scorer = build_scorer(config, provider, model, seed)?;
    let slug = file_slug(scorer.model_name());
    let option_count = config.scoring.option_count;

    let input = input.unwrap_or_else(|| {
        config
            .paths
            .dist_dir
            .join(format!("mcq-{}_certainty.csv.gz", slug))
    });
    let mut records = read_certainty_records(&read_table(&input)?, option_count)?;
    if let Some(n) = sample {
        records = sample_rows(&records, n, &mut rng);
    }

    println!("=== Position Sweep ===");
    println!("Model: {}", scorer.model_name());
    println!("Questions: {}", records.len());
    println!("Positions: {}", option_count);
    println!();

    let locked = position_sweep(
        &scorer,
        &records,
        option_count,
        config.scoring.shuffle_distractors,
        &mut rng,
    )
    .await?;

    for pos in 0..option_count {
        let pass: Vec<ScoredRow> = locked.iter().filter_map(|r| r.positions.get(pos).cloned()).collect();
        let path = config
            .paths
            .tmp_dir
            .join(format!("mcq-{}_pos_{}.csv.gz", slug, pos));
        write_table(&path, &scored_run_table(&pass)?)?;
    }

    let output = output.unwrap_or_else(|| config.paths.dist_dir.join(format!("mcq-{}_test.csv.gz", slug)));
    write_table(&output, &sweep_table(&locked)?)?;
    println!("Output: {}", output.display());
    Ok(())
}

/// `mcq-gpt-4o-mini_test.csv.gz` -> `mcq-gpt-4o-mini_test`
fn dataset_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    name.trim_end_matches(".gz").trim_end_matches(".csv").to_string()
}

fn analyze_results(
    config: &Config,
    inputs: Vec<PathBuf>,
    summary_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let run_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();

    for input in inputs {
        let name = dataset_name(&input);
        tracing::info!("Loading {}", input.display());
        let observations = read_sweep_observations(&read_table(&input)?, config.scoring.option_count)?;
        let report = analyze_dataset(&name, &observations, config.scoring.option_count)?;
        print_console_report(&report);

        if let Some(dir) = &summary_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}_summary.json", name));
            JsonSummary::from_report(&run_id, &report, input.display().to_string()).write_to_file(&path)?;
            println!("Summary written to: {}", path.display());
        }
    }
    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}
