//! Command-line entry point
//!
//! ```bash
//! # Inspect a dataset
//! textcnn stats --data data/sample_exercises.json
//!
//! # Train with the tiny preset, overriding a few settings
//! textcnn train --data data/sample_exercises.json --preset tiny --epochs 20 --out artifacts
//!
//! # Classify exercises with the saved artifacts
//! textcnn predict --artifacts artifacts "find the shortest path in a maze"
//!
//! # Score saved artifacts on a labelled file
//! textcnn evaluate --artifacts artifacts --data data/sample_exercises.json
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `textcnn=info`).

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use textcnn::{
    evaluate, CheckpointMetadata, Dataset, DatasetStats, EncodedDataset, Predictor, Trainer,
    TrainingConfig, TrainingLogger,
};

#[derive(Parser, Debug)]
#[command(
    name = "textcnn",
    version,
    about = "Classify programming exercises by algorithmic technique"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a classifier and write its artifacts
    Train(TrainArgs),
    /// Predict labels for one or more exercise descriptions
    Predict(PredictArgs),
    /// Report loss and accuracy of saved artifacts on a dataset
    Evaluate(EvaluateArgs),
    /// Print dataset statistics
    Stats(StatsArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Dataset JSON file ({"data": [{"Exercise": ..., "Label": ...}]})
    #[arg(long)]
    data: PathBuf,

    /// Training configuration JSON (missing fields use defaults)
    #[arg(long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Named configuration preset: tiny or small
    #[arg(long)]
    preset: Option<String>,

    /// Directory for vocab.json, labels.json, model.bin and the CSV log
    #[arg(long, default_value = "artifacts")]
    out: PathBuf,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    #[arg(long)]
    max_len: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Directory written by `train`
    #[arg(long, default_value = "artifacts")]
    artifacts: PathBuf,

    /// Exercise descriptions to classify
    #[arg(required = true)]
    text: Vec<String>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[arg(long, default_value = "artifacts")]
    artifacts: PathBuf,

    #[arg(long)]
    data: PathBuf,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,
}

#[derive(Args, Debug)]
struct StatsArgs {
    #[arg(long)]
    data: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("textcnn=info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Train(args) => train(args),
        Commands::Predict(args) => predict(args),
        Commands::Evaluate(args) => evaluate_artifacts(args),
        Commands::Stats(args) => stats(args),
    }
}

fn training_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match (&args.config, args.preset.as_deref()) {
        (Some(path), _) => TrainingConfig::from_json_file(path)
            .with_context(|| format!("loading training config {}", path.display()))?,
        (None, Some("tiny")) => TrainingConfig::tiny(),
        (None, Some("small")) => TrainingConfig::small(),
        (None, Some(other)) => bail!("unknown preset '{other}' (expected tiny or small)"),
        (None, None) => TrainingConfig::default(),
    };

    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(max_len) = args.max_len {
        config.max_len = max_len;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;
    Ok(config)
}

fn train(args: TrainArgs) -> Result<()> {
    let config = training_config(&args)?;
    let dataset = Dataset::load(&args.data)
        .with_context(|| format!("loading dataset {}", args.data.display()))?;
    tracing::info!("dataset statistics\n{}", DatasetStats::compute(&dataset.data));

    std::fs::create_dir_all(&args.out)?;
    std::fs::write(args.out.join("training_config.json"), serde_json::to_string_pretty(&config)?)?;
    let logger = TrainingLogger::new(args.out.join("training_log.csv"))?;

    let run = Trainer::new(config)?.with_logger(logger).run(&dataset)?;
    let metadata = CheckpointMetadata {
        epoch: run.report.history.len(),
        train_loss: run.report.final_train_loss(),
        best_val_loss: run.report.best_val_loss,
    };

    let predictor = Predictor::new(run.vocab, run.labels, run.model)?;
    predictor.save_with_metadata(&args.out, metadata)?;

    println!("Artifacts written to {}", args.out.display());
    if let (Some(epoch), Some(loss)) = (run.report.best_epoch, run.report.best_val_loss) {
        println!("Best validation loss {loss:.4} at epoch {epoch}");
    }
    Ok(())
}

fn predict(args: PredictArgs) -> Result<()> {
    let predictor = Predictor::load(&args.artifacts)
        .with_context(|| format!("loading artifacts from {}", args.artifacts.display()))?;

    for (text, prediction) in args.text.iter().zip(predictor.predict_batch(&args.text)?) {
        println!("{:<24} {:>6.1}%  {}", prediction.label, prediction.confidence * 100.0, text);
    }
    Ok(())
}

fn evaluate_artifacts(args: EvaluateArgs) -> Result<()> {
    let predictor = Predictor::load(&args.artifacts)
        .with_context(|| format!("loading artifacts from {}", args.artifacts.display()))?;
    let dataset = Dataset::load(&args.data)
        .with_context(|| format!("loading dataset {}", args.data.display()))?;

    let encoded = EncodedDataset::encode(
        &dataset.data,
        predictor.vocab(),
        predictor.labels(),
        predictor.model().config().max_len,
    )?;
    let result = evaluate(predictor.model(), &encoded, args.batch_size)?;

    println!("examples: {}", result.examples);
    println!("loss:     {:.4}", result.loss);
    println!("accuracy: {:.1}%", result.accuracy * 100.0);
    Ok(())
}

fn stats(args: StatsArgs) -> Result<()> {
    let dataset = Dataset::load(&args.data)
        .with_context(|| format!("loading dataset {}", args.data.display()))?;
    print!("{}", DatasetStats::compute(&dataset.data));
    Ok(())
}
