//! Joint cross-entropy training of an encoder/classifier pair, followed by
//! curve/history artifacts and 2-D embedding projections.

use clap::Parser;

use supervised_trainer_rs::checkpoint::CheckpointManager;
use supervised_trainer_rs::cli::{self, CommonArgs};
use supervised_trainer_rs::data::SyntheticStream;
use supervised_trainer_rs::models::{SgdOptimizer, SupCeNet};
use supervised_trainer_rs::projection::{pca_2d, tsne_2d, EmbeddingSet, TsneParams};
use supervised_trainer_rs::report::ReportWriter;
use supervised_trainer_rs::{ExecutionContext, TrainResult, TrainingSession};

/// Supervised cross-entropy training.
#[derive(Debug, Parser)]
#[command(name = "train_ce", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Flat input width of each sample.
    #[arg(long, default_value_t = 32)]
    input_dim: usize,

    /// Hidden width of the encoder MLP.
    #[arg(long, default_value_t = 128)]
    hidden_dim: usize,

    /// Feature width the encoder produces.
    #[arg(long, default_value_t = 64)]
    feature_dim: usize,

    /// Training samples per epoch.
    #[arg(long, default_value_t = 5000)]
    train_samples: usize,

    /// Validation samples per epoch.
    #[arg(long, default_value_t = 1000)]
    val_samples: usize,

    /// Project the learned embeddings to 2-D and write scatter plots.
    #[arg(long)]
    visualize: bool,

    /// Samples projected to 2-D after training. Exact t-SNE is quadratic in
    /// this count.
    #[arg(long, default_value_t = 500)]
    projection_samples: usize,
}

fn main() -> TrainResult<()> {
    cli::init_tracing();
    let cli = Cli::parse();

    let config = cli.common.run_config()?;
    let paths = cli.common.run_paths("SupCE", config.warm);
    let dataset = cli.common.dataset;
    let seed = cli.common.seed;

    tracing::info!(
        run = %cli.common.run_name("SupCE", config.warm),
        %dataset,
        epochs = config.epochs,
        "starting cross-entropy training"
    );

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

    let model = SupCeNet::new(
        cli.input_dim,
        cli.hidden_dim,
        cli.feature_dim,
        config.num_classes,
        seed,
    );
    let optimizer = SgdOptimizer::from_config(&config);
    let manager = CheckpointManager::new(&paths.save_dir)?;

    let mut session = TrainingSession::new(
        config,
        model,
        optimizer,
        ExecutionContext::default(),
        Some(manager),
    )?;
    let summary = session.run(&mut train_stream, &mut val_stream)?;

    let writer = ReportWriter::new(&paths.figure_dir)?;
    writer.write_curves(session.history())?;
    writer.write_history(session.history())?;

    if cli.visualize {
        // Post-hoc projection of the learned embedding space.
        let mut projection_stream = SyntheticStream::new(
            dataset,
            cli.input_dim,
            cli.projection_samples,
            session.config().batch_size,
            false,
            seed.wrapping_add(2),
        )?;
        let embeddings =
            EmbeddingSet::collect_from(session.model_mut(), &mut projection_stream)?;
        writer.write_projection("pca", &pca_2d(&embeddings)?)?;
        let tsne = tsne_2d(
            &embeddings,
            &TsneParams {
                seed,
                ..TsneParams::default()
            },
        )?;
        writer.write_projection("tsne", &tsne)?;
    }

    tracing::info!(
        best_accuracy = summary.best_accuracy,
        epochs = summary.epochs_completed,
        "run complete"
    );
    Ok(())
}
