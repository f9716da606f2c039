//! Shared command-line surface for the training binaries.
//!
//! Both entry points (joint cross-entropy training and linear probing)
//! parse the same hyperparameter flags through [`CommonArgs`], derive the
//! same canonical run name, and resolve the same save/figure folder layout.
//! Keeping this in one place means a flag added for one binary exists for
//! both, with identical parsing and defaults.

use std::path::PathBuf;

use clap::Args;

use crate::config::RunConfig;
use crate::data::DatasetKind;
use crate::error::TrainResult;

/// Hyperparameter and bookkeeping flags shared by every binary.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Batches between progress log lines.
    #[arg(long, default_value_t = 10)]
    pub print_freq: usize,

    /// Epochs between periodic checkpoints.
    #[arg(long, default_value_t = 50)]
    pub save_freq: usize,

    /// Samples per mini-batch.
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Total number of training epochs.
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Base learning rate.
    #[arg(long, default_value_t = 0.1)]
    pub learning_rate: f64,

    /// Epochs at which the stepwise schedule decays, comma separated.
    #[arg(long, value_delimiter = ',', default_values_t = [60, 75, 90])]
    pub lr_decay_epochs: Vec<usize>,

    /// Decay multiplier per crossed threshold.
    #[arg(long, default_value_t = 0.2)]
    pub lr_decay_rate: f64,

    /// Weight-decay (L2) coefficient.
    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f64,

    /// SGD momentum.
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    /// Dataset to train on.
    #[arg(long, default_value = "cifar10")]
    pub dataset: DatasetKind,

    /// Model architecture tag, recorded in the run name.
    #[arg(long, default_value = "mlp")]
    pub model: String,

    /// Use cosine annealing instead of stepwise decay.
    #[arg(long)]
    pub cosine: bool,

    /// Enable intra-epoch linear warmup.
    #[arg(long)]
    pub warm: bool,

    /// Trial index, for repeated runs with identical hyperparameters.
    #[arg(long, default_value_t = 0)]
    pub trial: usize,

    /// Seed for model initialization and synthetic data.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Root folder for checkpoints and figures.
    #[arg(long, default_value = "./save")]
    pub save_root: PathBuf,
}

impl CommonArgs {
    /// Builds the validated [`RunConfig`] these flags describe.
    pub fn run_config(&self) -> TrainResult<RunConfig> {
        RunConfig::builder()
            .print_freq(self.print_freq)
            .save_freq(self.save_freq)
            .batch_size(self.batch_size)
            .epochs(self.epochs)
            .learning_rate(self.learning_rate)
            .lr_decay_epochs(self.lr_decay_epochs.clone())
            .lr_decay_rate(self.lr_decay_rate)
            .weight_decay(self.weight_decay)
            .momentum(self.momentum)
            .cosine(self.cosine)
            .warm(self.warm)
            .num_classes(self.dataset.num_classes())
            .build()
    }

    /// Canonical run name under `method`, encoding the hyperparameters that
    /// distinguish runs.
    ///
    /// The `_warm` suffix reflects the effective warmup state, including the
    /// large-batch rule that forces it on.
    #[must_use]
    pub fn run_name(&self, method: &str, effective_warm: bool) -> String {
        let mut name = format!(
            "{method}_{}_{}_lr_{}_decay_{}_bsz_{}_trial_{}",
            self.dataset, self.model, self.learning_rate, self.weight_decay, self.batch_size,
            self.trial
        );
        if self.cosine {
            name.push_str("_cosine");
        }
        if effective_warm || self.batch_size > 256 {
            name.push_str("_warm");
        }
        name
    }

    /// Folder layout for one run's artifacts.
    #[must_use]
    pub fn run_paths(&self, method: &str, effective_warm: bool) -> RunPaths {
        let name = self.run_name(method, effective_warm);
        RunPaths {
            save_dir: self
                .save_root
                .join(method)
                .join(format!("{}_models", self.dataset))
                .join(&name),
            figure_dir: self
                .save_root
                .join(method)
                .join(format!("{}_figures", self.dataset))
                .join(&name),
        }
    }
}

/// Where one run writes checkpoints and figures.
#[derive(Debug, Clone)]
pub struct RunPaths {
    /// Checkpoint folder.
    pub save_dir: PathBuf,
    /// Figure and history-export folder.
    pub figure_dir: PathBuf,
}

/// Initializes the process-wide tracing subscriber for the binaries.
///
/// Honors `RUST_LOG`; defaults to `info` so the per-batch progress lines
/// are visible.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        common: CommonArgs,
    }

    #[test]
    fn test_defaults_parse() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.common.batch_size, 256);
        assert_eq!(cli.common.lr_decay_epochs, vec![60, 75, 90]);
        assert_eq!(cli.common.dataset, DatasetKind::Cifar10);
        assert!(cli.common.run_config().is_ok());
    }

    #[test]
    fn test_decay_epochs_comma_list() {
        let cli = TestCli::parse_from(["test", "--lr-decay-epochs", "30,50,70"]);
        assert_eq!(cli.common.lr_decay_epochs, vec![30, 50, 70]);
    }

    #[test]
    fn test_run_name_encodes_hyperparameters() {
        let cli = TestCli::parse_from([
            "test",
            "--dataset",
            "cifar100",
            "--learning-rate",
            "0.05",
            "--cosine",
            "--trial",
            "2",
        ]);
        let name = cli.common.run_name("SupCE", false);
        assert_eq!(name, "SupCE_cifar100_mlp_lr_0.05_decay_0.0001_bsz_256_trial_2_cosine");
    }

    #[test]
    fn test_large_batch_gets_warm_suffix() {
        let cli = TestCli::parse_from(["test", "--batch-size", "512"]);
        assert!(cli.common.run_name("SupCE", false).ends_with("_warm"));
    }

    #[test]
    fn test_run_paths_layout() {
        let cli = TestCli::parse_from(["test"]);
        let paths = cli.common.run_paths("SupCE", false);
        assert!(paths
            .save_dir
            .to_string_lossy()
            .contains("SupCE/cifar10_models"));
        assert!(paths
            .figure_dir
            .to_string_lossy()
            .contains("SupCE/cifar10_figures"));
    }
}
