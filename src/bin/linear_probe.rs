//! Linear-probe evaluation: trains a linear classifier on top of a frozen
//! encoder restored from a checkpoint.

use std::path::PathBuf;

use clap::Parser;

use supervised_trainer_rs::checkpoint::{strip_module_prefix, Checkpoint};
use supervised_trainer_rs::cli::{self, CommonArgs};
use supervised_trainer_rs::data::SyntheticStream;
use supervised_trainer_rs::models::{LinearProbeNet, MlpEncoder, SgdOptimizer};
use supervised_trainer_rs::report::ReportWriter;
use supervised_trainer_rs::{ExecutionContext, TrainResult, TrainingSession};

/// Linear probing of a pretrained encoder.
#[derive(Debug, Parser)]
#[command(name = "linear_probe", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Checkpoint to restore the encoder from.
    #[arg(long)]
    ckpt: PathBuf,

    /// Flat input width of each sample. Must match the checkpointed encoder.
    #[arg(long, default_value_t = 32)]
    input_dim: usize,

    /// Hidden width of the encoder MLP. Must match the checkpointed encoder.
    #[arg(long, default_value_t = 128)]
    hidden_dim: usize,

    /// Feature width of the encoder. Must match the checkpointed encoder.
    #[arg(long, default_value_t = 64)]
    feature_dim: usize,

    /// Training samples per epoch.
    #[arg(long, default_value_t = 5000)]
    train_samples: usize,

    /// Validation samples per epoch.
    #[arg(long, default_value_t = 1000)]
    val_samples: usize,
}

fn main() -> TrainResult<()> {
    cli::init_tracing();
    let cli = Cli::parse();

    let config = cli.common.run_config()?;
    let paths = cli.common.run_paths("SupCE_Linear", config.warm);
    let dataset = cli.common.dataset;
    let seed = cli.common.seed;

    let checkpoint = Checkpoint::load(&cli.ckpt)?;
    tracing::info!(
        ckpt = %cli.ckpt.display(),
        epoch = checkpoint.epoch,
        "restoring encoder"
    );

    // Checkpoints written from a data-parallel wrapper carry `module.`
    // prefixes; normalize before loading.
    let state = strip_module_prefix(&checkpoint.model);
    let mut encoder = MlpEncoder::new(cli.input_dim, cli.hidden_dim, cli.feature_dim, seed);
    encoder.load_state_dict(&state)?;

    let model = LinearProbeNet::new(encoder, config.num_classes, seed);
    let optimizer = SgdOptimizer::from_config(&config);

    let mut train_stream = SyntheticStream::new(
        dataset,
        cli.input_dim,
        cli.train_samples,
        config.batch_size,
        true,
        seed,
    )?;
    let mut val_stream = SyntheticStream::new(
        dataset,
        cli.input_dim,
        cli.val_samples,
        config.batch_size,
        false,
        seed.wrapping_add(1),
    )?;

    // The probe itself is not checkpointed; its output is the accuracy.
    let mut session =
        TrainingSession::new(config, model, optimizer, ExecutionContext::default(), None)?;
    let summary = session.run(&mut train_stream, &mut val_stream)?;

    let writer = ReportWriter::new(&paths.figure_dir)?;
    writer.write_curves(session.history())?;
    writer.write_history(session.history())?;

    tracing::info!(best_accuracy = summary.best_accuracy, "probe complete");
    Ok(())
}
