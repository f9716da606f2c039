//! One-pass train/validate orchestration.
//!
//! Both passes share structure: drain the stream, run the model forward,
//! compute the cross-entropy loss, and fold (loss, batch size) and
//! (top-1 accuracy, batch size) into fresh [`AverageMeter`]s. The train pass
//! additionally applies the intra-epoch warmup override before each batch
//! and runs backward + one optimizer step per batch (gradients cleared
//! first). The validate pass switches the model into inference mode and
//! never touches parameters.
//!
//! Progress lines are emitted every `print_freq` batches showing batch-local
//! and running-average timing, loss, and accuracy. They are observational
//! only and never affect control flow.

use std::time::Instant;

use crate::config::RunConfig;
use crate::data::DataStream;
use crate::error::{TrainError, TrainResult};
use crate::metrics::{topk_accuracy, AverageMeter};
use crate::schedule::LrSchedule;
use crate::{Batch, Model, Optimizer};

/// Accuracy ranks reported per batch; top-1 drives the meters and history.
const REPORT_TOPK: [usize; 2] = [1, 5];

/// Compute device a run executes on.
///
/// The harness itself is device-agnostic; this context replaces ambient
/// global backend flags so the execution target is an explicit value passed
/// into the epoch loop rather than process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    /// Host CPU execution.
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
        }
    }
}

/// Explicit execution context for a run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Device the model executes on.
    pub device: DeviceKind,
}

/// Mean metrics over one full pass.
#[derive(Debug, Clone, Copy)]
pub struct PassStats {
    /// Mean cross-entropy loss, weighted by batch size.
    pub loss: f64,
    /// Mean top-1 accuracy in [0, 100], weighted by batch size.
    pub accuracy: f64,
}

/// Numerically stable mean cross-entropy loss over a batch of logits.
///
/// Uses max-subtraction plus log-sum-exp; a non-finite input produces a
/// non-finite loss that propagates to the caller undetected, per the
/// harness's no-retry policy.
pub fn cross_entropy_loss(scores: &[Vec<f32>], labels: &[usize]) -> TrainResult<f64> {
    if scores.len() != labels.len() {
        return Err(TrainError::data(format!(
            "loss got {} score rows but {} labels",
            scores.len(),
            labels.len()
        )));
    }
    if scores.is_empty() {
        return Err(TrainError::data("loss over an empty batch"));
    }
    let mut total = 0.0f64;
    for (row, &label) in scores.iter().zip(labels.iter()) {
        if label >= row.len() {
            return Err(TrainError::data(format!(
                "label {label} out of range for {} classes",
                row.len()
            )));
        }
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
        let log_sum_exp: f64 = row
            .iter()
            .map(|&s| (f64::from(s) - max).exp())
            .sum::<f64>()
            .ln()
            + max;
        total += log_sum_exp - f64::from(row[label]);
    }
    Ok(total / scores.len() as f64)
}

/// Runs one full training pass over `stream` for `epoch` (1-indexed).
///
/// Mutates model parameters. Returns the mean (loss, top-1 accuracy) over
/// the whole pass.
pub fn train_one_epoch<B, M, O, S>(
    stream: &mut S,
    model: &mut M,
    optimizer: &mut O,
    schedule: &LrSchedule,
    epoch: usize,
    config: &RunConfig,
    ctx: &ExecutionContext,
) -> TrainResult<PassStats>
where
    B: Batch,
    M: Model<B>,
    O: Optimizer<M, B>,
    S: DataStream<B> + ?Sized,
{
    model.set_train_mode(true);

    let mut batch_time = AverageMeter::new();
    let mut data_time = AverageMeter::new();
    let mut losses = AverageMeter::new();
    let mut top1 = AverageMeter::new();

    let steps_per_epoch = stream.num_batches();
    stream.reset();

    let mut end = Instant::now();
    let mut idx = 0usize;
    while let Some(batch) = stream.next_batch() {
        data_time.update(end.elapsed().as_secs_f64(), 1);

        let bsz = batch.batch_size();
        if bsz == 0 {
            return Err(TrainError::data("stream produced an empty batch"));
        }

        // Warmup override; a no-op outside the warmup window.
        let _ = schedule.adjust_warmup(optimizer, epoch, idx, steps_per_epoch);

        // Forward and loss.
        let scores = model.forward(&batch)?;
        let loss = cross_entropy_loss(&scores, batch.labels())?;

        // Metric bookkeeping.
        losses.update(loss, bsz);
        let acc = topk_accuracy(&scores, batch.labels(), &REPORT_TOPK);
        top1.update(acc[0], bsz);

        // SGD.
        optimizer.zero_grad(model);
        let gradients = model.backward(batch.labels())?;
        optimizer.step(model, &gradients)?;

        batch_time.update(end.elapsed().as_secs_f64(), 1);
        end = Instant::now();

        if (idx + 1) % config.print_freq == 0 {
            tracing::info!(
                device = %ctx.device,
                "Train: [{}][{}/{}]\tBT {:.3} ({:.3})\tDT {:.3} ({:.3})\tloss {:.3} ({:.3})\tAcc@1 {:.3} ({:.3})",
                epoch,
                idx + 1,
                steps_per_epoch,
                batch_time.current(),
                batch_time.average(),
                data_time.current(),
                data_time.average(),
                losses.current(),
                losses.average(),
                top1.current(),
                top1.average(),
            );
        }
        idx += 1;
    }

    if idx == 0 {
        return Err(TrainError::data("training stream yielded no batches"));
    }

    Ok(PassStats {
        loss: losses.average(),
        accuracy: top1.average(),
    })
}

/// Runs one full validation pass over `stream`.
///
/// Identical metric bookkeeping to the train pass, but the model is put in
/// inference mode for the duration and no parameter update occurs.
pub fn validate<B, M, S>(
    stream: &mut S,
    model: &mut M,
    config: &RunConfig,
    ctx: &ExecutionContext,
) -> TrainResult<PassStats>
where
    B: Batch,
    M: Model<B>,
    S: DataStream<B> + ?Sized,
{
    model.set_train_mode(false);

    let mut batch_time = AverageMeter::new();
    let mut losses = AverageMeter::new();
    let mut top1 = AverageMeter::new();

    let steps_per_epoch = stream.num_batches();
    stream.reset();

    let mut end = Instant::now();
    let mut idx = 0usize;
    while let Some(batch) = stream.next_batch() {
        let bsz = batch.batch_size();
        if bsz == 0 {
            return Err(TrainError::data("stream produced an empty batch"));
        }

        let scores = model.forward(&batch)?;
        let loss = cross_entropy_loss(&scores, batch.labels())?;

        losses.update(loss, bsz);
        let acc = topk_accuracy(&scores, batch.labels(), &REPORT_TOPK);
        top1.update(acc[0], bsz);

        batch_time.update(end.elapsed().as_secs_f64(), 1);
        end = Instant::now();

        if idx % config.print_freq == 0 {
            tracing::info!(
                device = %ctx.device,
                "Test: [{}/{}]\tTime {:.3} ({:.3})\tLoss {:.4} ({:.4})\tAcc@1 {:.3} ({:.3})",
                idx,
                steps_per_epoch,
                batch_time.current(),
                batch_time.average(),
                losses.current(),
                losses.average(),
                top1.current(),
                top1.average(),
            );
        }
        idx += 1;
    }

    if idx == 0 {
        return Err(TrainError::data("validation stream yielded no batches"));
    }

    tracing::info!(" * Acc@1 {:.3}", top1.average());

    Ok(PassStats {
        loss: losses.average(),
        accuracy: top1.average(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_entropy_uniform_scores() {
        // Uniform logits over C classes give loss ln(C).
        let scores = vec![vec![0.0; 4]; 3];
        let loss = cross_entropy_loss(&scores, &[0, 1, 2]).unwrap();
        assert!((loss - 4.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_cross_entropy_confident_correct_is_small() {
        let scores = vec![vec![10.0, -10.0]];
        let loss = cross_entropy_loss(&scores, &[0]).unwrap();
        assert!(loss < 1e-6);
        let wrong = cross_entropy_loss(&scores, &[1]).unwrap();
        assert!(wrong > 10.0);
    }

    #[test]
    fn test_cross_entropy_is_shift_invariant() {
        let a = cross_entropy_loss(&[vec![1.0, 2.0, 0.5]], &[1]).unwrap();
        let b = cross_entropy_loss(&[vec![101.0, 102.0, 100.5]], &[1]).unwrap();
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_rejects_bad_label() {
        let err = cross_entropy_loss(&[vec![0.0, 0.0]], &[5]).unwrap_err();
        assert!(matches!(err, TrainError::Data { .. }));
    }
}
