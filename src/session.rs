//! Multi-epoch training session bookkeeping.
//!
//! A [`TrainingSession`] composes the epoch loop across epochs 1..=E: it
//! applies the epoch-level base learning rate, runs one train pass and one
//! validate pass, appends the four resulting scalars to its history, tracks
//! the best validation accuracy seen, and emits checkpoints at the
//! configured cadence plus a final `last` checkpoint. Epochs are never
//! re-run or rolled back; any failure propagates out and terminates the run.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::config::RunConfig;
use crate::data::DataStream;
use crate::epoch::{train_one_epoch, validate, ExecutionContext, PassStats};
use crate::error::TrainResult;
use crate::schedule::LrSchedule;
use crate::{Batch, Model, Optimizer};

/// The four scalars produced by one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Epoch index, 1-indexed.
    pub epoch: usize,
    /// Mean training loss over the train pass.
    pub train_loss: f64,
    /// Mean top-1 training accuracy in [0, 100].
    pub train_accuracy: f64,
    /// Mean validation loss over the validate pass.
    pub val_loss: f64,
    /// Mean top-1 validation accuracy in [0, 100].
    pub val_accuracy: f64,
}

/// Per-epoch history as four parallel ordered sequences.
///
/// Appended once per epoch, never mutated after append, and read only for
/// plotting and export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Mean training loss per epoch.
    pub train_loss: Vec<f64>,
    /// Mean training accuracy per epoch.
    pub train_accuracy: Vec<f64>,
    /// Mean validation loss per epoch.
    pub val_loss: Vec<f64>,
    /// Mean validation accuracy per epoch.
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    /// Appends one epoch's scalars to all four sequences.
    pub fn record(&mut self, record: &EpochRecord) {
        self.train_loss.push(record.train_loss);
        self.train_accuracy.push(record.train_accuracy);
        self.val_loss.push(record.val_loss);
        self.val_accuracy.push(record.val_accuracy);
    }

    /// Number of completed epochs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.train_loss.len()
    }

    /// Whether any epoch has completed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.train_loss.is_empty()
    }
}

/// Final report of a completed run.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Best validation accuracy observed across the whole run.
    pub best_accuracy: f64,
    /// Number of epochs completed.
    pub epochs_completed: usize,
    /// Path of the final checkpoint, when checkpointing was enabled.
    pub last_checkpoint: Option<std::path::PathBuf>,
}

/// Drives a full training run over a model/optimizer pair.
pub struct TrainingSession<B, M, O>
where
    B: Batch,
    M: Model<B>,
    O: Optimizer<M, B>,
{
    config: RunConfig,
    ctx: ExecutionContext,
    schedule: LrSchedule,
    model: M,
    optimizer: O,
    history: TrainingHistory,
    best_accuracy: f64,
    checkpoints: Option<CheckpointManager>,
    _batch: std::marker::PhantomData<fn(&B)>,
}

impl<B, M, O> TrainingSession<B, M, O>
where
    B: Batch,
    M: Model<B>,
    O: Optimizer<M, B>,
{
    /// Creates a session. Pass `checkpoints: None` to disable snapshotting
    /// (useful for probes and tests).
    pub fn new(
        config: RunConfig,
        model: M,
        optimizer: O,
        ctx: ExecutionContext,
        checkpoints: Option<CheckpointManager>,
    ) -> TrainResult<Self> {
        config.validate()?;
        let schedule = LrSchedule::new(&config);
        Ok(Self {
            config,
            ctx,
            schedule,
            model,
            optimizer,
            history: TrainingHistory::default(),
            best_accuracy: 0.0,
            checkpoints,
            _batch: std::marker::PhantomData,
        })
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Per-epoch history collected so far.
    #[must_use]
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Best validation accuracy observed so far.
    #[must_use]
    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    /// Shared access to the model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Exclusive access to the model (for projection after training).
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Consumes the session, returning the trained model and the history.
    #[must_use]
    pub fn into_parts(self) -> (M, TrainingHistory) {
        (self.model, self.history)
    }

    /// Runs one epoch: base-rate adjustment, train pass, validate pass,
    /// history append, best-accuracy update, and cadenced checkpointing.
    pub fn run_epoch<TS, VS>(
        &mut self,
        epoch: usize,
        train_stream: &mut TS,
        val_stream: &mut VS,
    ) -> TrainResult<EpochRecord>
    where
        TS: DataStream<B> + ?Sized,
        VS: DataStream<B> + ?Sized,
    {
        let rate = self.schedule.adjust_epoch(&mut self.optimizer, epoch);
        tracing::debug!(epoch, rate, "applied base learning rate");

        let start = Instant::now();
        let train_stats: PassStats = train_one_epoch(
            train_stream,
            &mut self.model,
            &mut self.optimizer,
            &self.schedule,
            epoch,
            &self.config,
            &self.ctx,
        )?;
        tracing::info!(
            "epoch {}, total time {:.2}, accuracy:{:.2}",
            epoch,
            start.elapsed().as_secs_f64(),
            train_stats.accuracy
        );

        let val_stats = validate(val_stream, &mut self.model, &self.config, &self.ctx)?;

        let record = EpochRecord {
            epoch,
            train_loss: train_stats.loss,
            train_accuracy: train_stats.accuracy,
            val_loss: val_stats.loss,
            val_accuracy: val_stats.accuracy,
        };
        self.history.record(&record);
        self.best_accuracy = self.best_accuracy.max(val_stats.accuracy);

        if epoch % self.config.save_freq == 0 {
            if let Some(manager) = &self.checkpoints {
                manager.save_epoch(&self.snapshot(epoch))?;
            }
        }

        Ok(record)
    }

    /// Runs a validation pass only, updating the best-accuracy watermark.
    ///
    /// The watermark is monotone: repeated calls can only raise it.
    pub fn validate_only<VS>(&mut self, val_stream: &mut VS) -> TrainResult<PassStats>
    where
        VS: DataStream<B> + ?Sized,
    {
        let stats = validate(val_stream, &mut self.model, &self.config, &self.ctx)?;
        self.best_accuracy = self.best_accuracy.max(stats.accuracy);
        Ok(stats)
    }

    /// Drives epochs 1..=E, then writes the final `last` checkpoint and
    /// reports the best accuracy observed.
    pub fn run<TS, VS>(
        &mut self,
        train_stream: &mut TS,
        val_stream: &mut VS,
    ) -> TrainResult<SessionSummary>
    where
        TS: DataStream<B> + ?Sized,
        VS: DataStream<B> + ?Sized,
    {
        for epoch in 1..=self.config.epochs {
            self.run_epoch(epoch, train_stream, val_stream)?;
        }

        let last_checkpoint = match &self.checkpoints {
            Some(manager) => Some(manager.save_last(&self.snapshot(self.config.epochs))?),
            None => None,
        };

        tracing::info!("best accuracy: {:.2}", self.best_accuracy);

        Ok(SessionSummary {
            best_accuracy: self.best_accuracy,
            epochs_completed: self.history.len(),
            last_checkpoint,
        })
    }

    fn snapshot(&self, epoch: usize) -> Checkpoint {
        Checkpoint::new(
            self.model.state_dict(),
            self.optimizer.state_dict(),
            self.config.clone(),
            epoch,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_parallel_append() {
        let mut history = TrainingHistory::default();
        assert!(history.is_empty());
        history.record(&EpochRecord {
            epoch: 1,
            train_loss: 2.3,
            train_accuracy: 11.0,
            val_loss: 2.2,
            val_accuracy: 13.0,
        });
        history.record(&EpochRecord {
            epoch: 2,
            train_loss: 1.9,
            train_accuracy: 25.0,
            val_loss: 1.8,
            val_accuracy: 28.0,
        });
        assert_eq!(history.len(), 2);
        assert_eq!(history.train_loss, vec![2.3, 1.9]);
        assert_eq!(history.val_accuracy, vec![13.0, 28.0]);
    }
}
