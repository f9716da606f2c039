//! Run configuration and validation.
//!
//! [`RunConfig`] is the immutable record of one training run's
//! hyperparameters. It is derived once at startup (typically through
//! [`RunConfig::builder`]), validated eagerly, and then passed by shared
//! reference to every other component — nothing mutates it during a run.
//!
//! # Warmup precomputation
//!
//! The warmup target rate `warmup_to` is computed once at build time as the
//! base-schedule rate that applies at the end of the warmup window, so the
//! linear warmup ramp meets the base curve without a discontinuity. For the
//! stepwise (non-cosine) branch the target is simply the base learning rate;
//! this mirrors the reference behavior even though it differs in spirit from
//! the cosine branch.

use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

/// Immutable hyperparameter record for one training run.
///
/// # Defaults
///
/// | Parameter | Default | Notes |
/// |-----------|---------|-------|
/// | `epochs` | 100 | total training epochs |
/// | `batch_size` | 256 | > 256 forces warmup on |
/// | `learning_rate` | 0.1 | base rate of the schedule |
/// | `lr_decay_epochs` | [60, 75, 90] | stepwise decay thresholds |
/// | `lr_decay_rate` | 0.2 | multiplier per crossed threshold |
/// | `weight_decay` | 0.0 | L2 penalty |
/// | `momentum` | 0.9 | SGD momentum |
/// | `print_freq` | 10 | batches between progress lines |
/// | `save_freq` | 50 | epochs between checkpoints |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Samples per mini-batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Total number of training epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Base learning rate of the schedule.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Epoch thresholds for stepwise decay, in ascending order.
    #[serde(default = "default_lr_decay_epochs")]
    pub lr_decay_epochs: Vec<usize>,

    /// Rate multiplier applied once per crossed decay threshold.
    #[serde(default = "default_lr_decay_rate")]
    pub lr_decay_rate: f64,

    /// Weight-decay (L2) coefficient handed to the optimizer.
    #[serde(default)]
    pub weight_decay: f64,

    /// SGD momentum handed to the optimizer.
    #[serde(default = "default_momentum")]
    pub momentum: f64,

    /// Whether the base schedule uses cosine annealing instead of stepwise
    /// decay.
    #[serde(default)]
    pub cosine: bool,

    /// Whether intra-epoch linear warmup is enabled.
    #[serde(default)]
    pub warm: bool,

    /// Rate at the very first warmup step.
    #[serde(default = "default_warmup_from")]
    pub warmup_from: f64,

    /// Number of epochs the warmup ramp spans.
    #[serde(default = "default_warm_epochs")]
    pub warm_epochs: usize,

    /// Rate at the end of the warmup window. Precomputed at build time so
    /// the ramp meets the base schedule; never set directly.
    #[serde(default)]
    pub warmup_to: f64,

    /// Number of classes the classifier distinguishes.
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Batches between progress log lines.
    #[serde(default = "default_print_freq")]
    pub print_freq: usize,

    /// Epochs between periodic checkpoints.
    #[serde(default = "default_save_freq")]
    pub save_freq: usize,
}

fn default_batch_size() -> usize {
    256
}
fn default_epochs() -> usize {
    100
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_lr_decay_epochs() -> Vec<usize> {
    vec![60, 75, 90]
}
fn default_lr_decay_rate() -> f64 {
    0.2
}
fn default_momentum() -> f64 {
    0.9
}
fn default_warmup_from() -> f64 {
    0.01
}
fn default_warm_epochs() -> usize {
    10
}
fn default_num_classes() -> usize {
    10
}
fn default_print_freq() -> usize {
    10
}
fn default_save_freq() -> usize {
    50
}

impl Default for RunConfig {
    fn default() -> Self {
        // Builder with no overrides cannot fail validation.
        RunConfigBuilder::default()
            .build()
            .unwrap_or_else(|_| unreachable!("default configuration is valid"))
    }
}

impl RunConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// The minimum rate of the cosine schedule, `lr * decay_rate^3`.
    #[must_use]
    pub fn eta_min(&self) -> f64 {
        self.learning_rate * self.lr_decay_rate.powi(3)
    }

    /// Whether warmup applies during `epoch` (1-indexed).
    #[must_use]
    pub fn in_warmup(&self, epoch: usize) -> bool {
        self.warm && epoch <= self.warm_epochs
    }

    /// Validates cross-field invariants. Called by the builder; callers that
    /// deserialize a config from a file should invoke this eagerly.
    pub fn validate(&self) -> TrainResult<()> {
        if self.epochs == 0 {
            return Err(TrainError::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        if self.learning_rate <= 0.0 {
            return Err(TrainError::config("learning_rate must be positive"));
        }
        if self.lr_decay_rate <= 0.0 || self.lr_decay_rate > 1.0 {
            return Err(TrainError::config("lr_decay_rate must be in (0, 1]"));
        }
        if self.lr_decay_epochs.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TrainError::config(
                "lr_decay_epochs must be strictly ascending",
            ));
        }
        if self.num_classes < 2 {
            return Err(TrainError::config("num_classes must be at least 2"));
        }
        if self.print_freq == 0 || self.save_freq == 0 {
            return Err(TrainError::config(
                "print_freq and save_freq must be at least 1",
            ));
        }
        if self.warm {
            if self.warm_epochs == 0 {
                return Err(TrainError::config("warm_epochs must be at least 1"));
            }
            if self.warm_epochs >= self.epochs {
                return Err(TrainError::config(
                    "warm_epochs must be smaller than epochs",
                ));
            }
            if self.warmup_from < 0.0 {
                return Err(TrainError::config("warmup_from must be non-negative"));
            }
        }
        Ok(())
    }
}

/// Builder for [`RunConfig`].
///
/// `build` validates the configuration, applies the large-batch warmup rule
/// (`batch_size > 256` forces warmup on), and precomputes `warmup_to`.
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            config: RunConfig {
                batch_size: default_batch_size(),
                epochs: default_epochs(),
                learning_rate: default_learning_rate(),
                lr_decay_epochs: default_lr_decay_epochs(),
                lr_decay_rate: default_lr_decay_rate(),
                weight_decay: 0.0,
                momentum: default_momentum(),
                cosine: false,
                warm: false,
                warmup_from: default_warmup_from(),
                warm_epochs: default_warm_epochs(),
                warmup_to: 0.0,
                num_classes: default_num_classes(),
                print_freq: default_print_freq(),
                save_freq: default_save_freq(),
            },
        }
    }
}

impl RunConfigBuilder {
    /// Sets the mini-batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Sets the total epoch count.
    #[must_use]
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    /// Sets the base learning rate.
    #[must_use]
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.config.learning_rate = lr;
        self
    }

    /// Sets the stepwise decay thresholds.
    #[must_use]
    pub fn lr_decay_epochs(mut self, epochs: Vec<usize>) -> Self {
        self.config.lr_decay_epochs = epochs;
        self
    }

    /// Sets the decay multiplier.
    #[must_use]
    pub fn lr_decay_rate(mut self, rate: f64) -> Self {
        self.config.lr_decay_rate = rate;
        self
    }

    /// Sets the weight-decay coefficient.
    #[must_use]
    pub fn weight_decay(mut self, wd: f64) -> Self {
        self.config.weight_decay = wd;
        self
    }

    /// Sets the SGD momentum.
    #[must_use]
    pub fn momentum(mut self, momentum: f64) -> Self {
        self.config.momentum = momentum;
        self
    }

    /// Enables or disables cosine annealing.
    #[must_use]
    pub fn cosine(mut self, cosine: bool) -> Self {
        self.config.cosine = cosine;
        self
    }

    /// Enables or disables warmup.
    #[must_use]
    pub fn warm(mut self, warm: bool) -> Self {
        self.config.warm = warm;
        self
    }

    /// Sets the warmup starting rate.
    #[must_use]
    pub fn warmup_from(mut self, from: f64) -> Self {
        self.config.warmup_from = from;
        self
    }

    /// Sets the warmup window length in epochs.
    #[must_use]
    pub fn warm_epochs(mut self, epochs: usize) -> Self {
        self.config.warm_epochs = epochs;
        self
    }

    /// Sets the class count.
    #[must_use]
    pub fn num_classes(mut self, n: usize) -> Self {
        self.config.num_classes = n;
        self
    }

    /// Sets the progress-line frequency.
    #[must_use]
    pub fn print_freq(mut self, freq: usize) -> Self {
        self.config.print_freq = freq;
        self
    }

    /// Sets the checkpoint frequency.
    #[must_use]
    pub fn save_freq(mut self, freq: usize) -> Self {
        self.config.save_freq = freq;
        self
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> TrainResult<RunConfig> {
        let mut config = self.config;

        // Large-batch training is unstable without warmup.
        if config.batch_size > 256 {
            config.warm = true;
        }

        if config.warm {
            config.warmup_to = if config.cosine {
                let eta_min = config.eta_min();
                eta_min
                    + (config.learning_rate - eta_min)
                        * (1.0
                            + (std::f64::consts::PI * config.warm_epochs as f64
                                / config.epochs as f64)
                                .cos())
                        / 2.0
            } else {
                config.learning_rate
            };
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert_eq!(config.epochs, 100);
        assert_eq!(config.batch_size, 256);
        assert!(!config.warm);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_large_batch_forces_warmup() {
        let config = RunConfig::builder().batch_size(512).build().unwrap();
        assert!(config.warm);
        // Non-cosine branch reuses the base rate as the warmup target.
        assert!((config.warmup_to - config.learning_rate).abs() < 1e-12);
    }

    #[test]
    fn test_warmup_to_cosine_branch() {
        let config = RunConfig::builder()
            .epochs(500)
            .learning_rate(0.2)
            .lr_decay_rate(0.1)
            .cosine(true)
            .warm(true)
            .build()
            .unwrap();
        let eta_min = 0.2 * 0.1_f64.powi(3);
        let expected = eta_min
            + (0.2 - eta_min) * (1.0 + (std::f64::consts::PI * 10.0 / 500.0).cos()) / 2.0;
        assert!((config.warmup_to - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_unsorted_decay_epochs() {
        let err = RunConfig::builder()
            .lr_decay_epochs(vec![75, 60, 90])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ascending"));
    }

    #[test]
    fn test_rejects_warmup_longer_than_run() {
        let err = RunConfig::builder()
            .epochs(5)
            .warm(true)
            .warm_epochs(10)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("warm_epochs"));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = RunConfig::builder()
            .epochs(200)
            .cosine(true)
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let restored: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.epochs, 200);
        assert!(restored.cosine);
    }
}
