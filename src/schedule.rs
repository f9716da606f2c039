//! Learning-rate schedule state machine.
//!
//! The schedule is a pure function of position in the run: given the epoch
//! index (1-indexed), an optional step index within the epoch, and the run
//! configuration, it yields a scalar rate. No mutable schedule state is
//! persisted anywhere.
//!
//! Three policies interact:
//!
//! 1. **Base rate per epoch** — cosine annealing down to `eta_min`, or a
//!    stepwise decay that multiplies by `lr_decay_rate` once per crossed
//!    threshold. Computed once per epoch.
//! 2. **Warmup override per step** — during the first `warm_epochs` epochs
//!    the rate ramps linearly from `warmup_from` to the precomputed
//!    `warmup_to` as a function of global step progress within the warmup
//!    window, clamped to never exceed the target. Computed once per step,
//!    only inside the window.
//! 3. **Application** — the computed rate is written into every parameter
//!    group of the optimizer; this is the schedule's only side effect and is
//!    idempotent for repeated calls at the same position.
//!
//! Splitting the epoch-level base computation from the per-step warmup
//! override keeps the cosine/step logic out of the hot per-batch path while
//! still allowing a smooth sub-epoch ramp.

use crate::config::RunConfig;
use crate::{Batch, Model, Optimizer};

/// Learning-rate schedule over one run.
///
/// # Example
///
/// ```
/// use supervised_trainer_rs::{LrSchedule, RunConfig};
///
/// let config = RunConfig::builder()
///     .epochs(100)
///     .learning_rate(0.1)
///     .lr_decay_rate(0.1)
///     .lr_decay_epochs(vec![60, 75, 90])
///     .build()?;
/// let schedule = LrSchedule::new(&config);
/// assert!((schedule.base_rate(1) - 0.1).abs() < 1e-12);
/// assert!((schedule.base_rate(60) - 0.01).abs() < 1e-12);
/// assert!((schedule.base_rate(76) - 0.001).abs() < 1e-12);
/// # Ok::<(), supervised_trainer_rs::TrainError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LrSchedule {
    config: RunConfig,
}

impl LrSchedule {
    /// Creates a schedule for the given run configuration.
    #[must_use]
    pub fn new(config: &RunConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Base rate for `epoch` (1-indexed), ignoring warmup.
    #[must_use]
    pub fn base_rate(&self, epoch: usize) -> f64 {
        let lr = self.config.learning_rate;
        if self.config.cosine {
            let eta_min = self.config.eta_min();
            let progress = std::f64::consts::PI * epoch as f64 / self.config.epochs as f64;
            eta_min + (lr - eta_min) * (1.0 + progress.cos()) / 2.0
        } else {
            let crossed = self
                .config
                .lr_decay_epochs
                .iter()
                .filter(|&&threshold| threshold <= epoch)
                .count();
            lr * self.config.lr_decay_rate.powi(crossed as i32)
        }
    }

    /// Warmup rate for step `step_in_epoch` (0-indexed) of `epoch`, or
    /// `None` when the position is outside the warmup window.
    #[must_use]
    pub fn warmup_rate(
        &self,
        epoch: usize,
        step_in_epoch: usize,
        steps_per_epoch: usize,
    ) -> Option<f64> {
        if !self.config.in_warmup(epoch) || steps_per_epoch == 0 {
            return None;
        }
        let progress = (step_in_epoch + (epoch - 1) * steps_per_epoch) as f64
            / (self.config.warm_epochs * steps_per_epoch) as f64;
        let rate = self.config.warmup_from
            + progress * (self.config.warmup_to - self.config.warmup_from);
        Some(rate.min(self.config.warmup_to.max(self.config.warmup_from)))
    }

    /// Computes the base rate for `epoch` and writes it into every parameter
    /// group of `optimizer`. Called once at the top of each epoch.
    pub fn adjust_epoch<M, B, O>(&self, optimizer: &mut O, epoch: usize) -> f64
    where
        B: Batch,
        M: Model<B>,
        O: Optimizer<M, B>,
    {
        let rate = self.base_rate(epoch);
        optimizer.set_learning_rate(rate);
        rate
    }

    /// Applies the warmup override for one step, if the position is inside
    /// the warmup window. Called once per batch by the train pass; a no-op
    /// outside warmup.
    pub fn adjust_warmup<M, B, O>(
        &self,
        optimizer: &mut O,
        epoch: usize,
        step_in_epoch: usize,
        steps_per_epoch: usize,
    ) -> Option<f64>
    where
        B: Batch,
        M: Model<B>,
        O: Optimizer<M, B>,
    {
        let rate = self.warmup_rate(epoch, step_in_epoch, steps_per_epoch)?;
        optimizer.set_learning_rate(rate);
        Some(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stepwise_config() -> RunConfig {
        RunConfig::builder()
            .epochs(100)
            .learning_rate(0.1)
            .lr_decay_rate(0.1)
            .lr_decay_epochs(vec![60, 75, 90])
            .build()
            .unwrap()
    }

    #[test]
    fn test_stepwise_decay_table() {
        let schedule = LrSchedule::new(&stepwise_config());
        for (epoch, expected) in [(1, 0.1), (59, 0.1), (60, 0.01), (76, 0.001), (91, 0.0001)] {
            assert!(
                (schedule.base_rate(epoch) - expected).abs() < 1e-12,
                "epoch {epoch}: {} != {expected}",
                schedule.base_rate(epoch)
            );
        }
    }

    #[test]
    fn test_cosine_is_monotone_non_increasing_and_ends_at_eta_min() {
        let config = RunConfig::builder()
            .epochs(100)
            .learning_rate(0.1)
            .lr_decay_rate(0.2)
            .cosine(true)
            .build()
            .unwrap();
        let schedule = LrSchedule::new(&config);
        let mut previous = f64::INFINITY;
        for epoch in 1..=config.epochs {
            let rate = schedule.base_rate(epoch);
            assert!(rate <= previous + 1e-15, "rate increased at epoch {epoch}");
            previous = rate;
        }
        assert!((schedule.base_rate(config.epochs) - config.eta_min()).abs() < 1e-9);
    }

    #[test]
    fn test_warmup_starts_at_from_and_meets_target() {
        let config = RunConfig::builder()
            .epochs(100)
            .learning_rate(0.1)
            .warm(true)
            .warm_epochs(10)
            .build()
            .unwrap();
        let schedule = LrSchedule::new(&config);
        let steps_per_epoch = 50;

        let first = schedule.warmup_rate(1, 0, steps_per_epoch).unwrap();
        assert!((first - config.warmup_from).abs() < 1e-12);

        // The last warmup step sits one increment below the target; the ramp
        // meets the base schedule at the window boundary.
        let last = schedule
            .warmup_rate(10, steps_per_epoch - 1, steps_per_epoch)
            .unwrap();
        let increment =
            (config.warmup_to - config.warmup_from) / (10 * steps_per_epoch) as f64;
        assert!((last - config.warmup_to).abs() <= increment + 1e-12);
        assert!(last <= config.warmup_to);

        // Outside the window the override does not apply.
        assert!(schedule.warmup_rate(11, 0, steps_per_epoch).is_none());
    }

    #[test]
    fn test_warmup_disabled_yields_none() {
        let schedule = LrSchedule::new(&stepwise_config());
        assert!(schedule.warmup_rate(1, 0, 50).is_none());
    }

    #[test]
    fn test_warmup_never_exceeds_target() {
        let config = RunConfig::builder()
            .epochs(20)
            .learning_rate(0.1)
            .warm(true)
            .warm_epochs(2)
            .build()
            .unwrap();
        let schedule = LrSchedule::new(&config);
        for epoch in 1..=2 {
            for step in 0..10 {
                let rate = schedule.warmup_rate(epoch, step, 10).unwrap();
                assert!(rate <= config.warmup_to + 1e-15);
            }
        }
    }

    #[test]
    fn test_base_rate_is_pure() {
        let schedule = LrSchedule::new(&stepwise_config());
        assert_eq!(
            schedule.base_rate(42).to_bits(),
            schedule.base_rate(42).to_bits()
        );
    }
}
