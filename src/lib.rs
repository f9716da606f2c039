//! # supervised-trainer-rs
//!
//! Epoch-driven training harness for image classifiers. The crate drives
//! supervised cross-entropy training of an encoder/classifier pair and,
//! separately, linear-probe training on top of a frozen encoder. After
//! training it can project the learned embeddings to 2-D for visual
//! inspection of class separability.
//!
//! ## Overview
//!
//! The harness is framework-agnostic: models, encoders, and optimizers sit
//! behind small traits, so any implementation that can produce class scores
//! from a batch and apply gradient steps can be trained. The crate ships a
//! reference MLP implementation in [`models`] for end-to-end runs and tests.
//!
//! ```text
//! TrainingSession
//!     │  per epoch
//!     ├── LrSchedule::adjust (base rate: cosine or stepwise decay)
//!     ├── train_one_epoch ── warmup override ── forward/loss/backward/step
//!     │        └── AverageMeter (loss, top-1) + progress logging
//!     ├── validate ───────── forward/loss only, eval mode
//!     ├── history append + best-accuracy tracking
//!     └── CheckpointManager::save (every save_freq epochs + final "last")
//!
//! ProjectionPipeline (post-hoc)
//!     └── L2-normalized features ── t-SNE + PCA ── SVG scatter plots
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use supervised_trainer_rs::prelude::*;
//!
//! let config = RunConfig::builder()
//!     .epochs(100)
//!     .batch_size(256)
//!     .learning_rate(0.1)
//!     .cosine(true)
//!     .build()?;
//!
//! // let mut session = TrainingSession::new(config, model, optimizer, ctx, None)?;
//! // let summary = session.run(&mut train_stream, &mut val_stream)?;
//! # Ok::<(), supervised_trainer_rs::TrainError>(())
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Run configuration, builder, and validation
//! - [`error`] - Error types
//! - [`data`] - Dataset catalog, batch types, and data streams
//! - [`metrics`] - Streaming metric accumulation and top-K accuracy
//! - [`schedule`] - Learning-rate schedule state machine
//! - [`epoch`] - One-pass train/validate orchestration
//! - [`session`] - Multi-epoch session bookkeeping and checkpoint cadence
//! - [`checkpoint`] - Durable model/optimizer snapshots
//! - [`projection`] - Embedding collection and 2-D projections
//! - [`viz`] - SVG curve charts and scatter plots
//! - [`models`] - Reference encoder/classifier/optimizer implementations
//! - [`cli`] - Shared argument parsing and run-folder derivation
//! - [`report`] - Curve, history, and projection artifact emission

#![warn(missing_docs)]
#![deny(unsafe_code)]
// Precision-loss casts are routine in ML numerical code.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod epoch;
pub mod error;
pub mod metrics;
pub mod models;
pub mod projection;
pub mod report;
pub mod schedule;
pub mod session;
pub mod viz;

pub use config::RunConfig;
pub use epoch::ExecutionContext;
pub use error::{TrainError, TrainResult};
pub use metrics::AverageMeter;
pub use schedule::LrSchedule;
pub use session::{EpochRecord, SessionSummary, TrainingSession};

use std::collections::BTreeMap;

/// Named flat parameter tensors, as exported by models and optimizers for
/// checkpointing.
///
/// A `BTreeMap` keeps parameter order deterministic across save/load cycles,
/// which matters for bit-stable checkpoint round-trips.
pub type StateDict = BTreeMap<String, Vec<f32>>;

/// A batch of training data.
///
/// The harness never inspects inputs; it only needs the sample count and the
/// ground-truth labels. Input layout is a contract between the stream and the
/// model implementation.
pub trait Batch {
    /// Number of samples in this batch.
    fn batch_size(&self) -> usize;

    /// Ground-truth class indices, one per sample.
    fn labels(&self) -> &[usize];
}

/// Gradient information produced by a backward pass.
#[derive(Debug, Clone)]
pub struct GradientInfo {
    /// L2 norm over all parameter gradients.
    pub gradient_norm: f64,
}

/// A trainable classifier: anything that maps a batch to per-class scores
/// and can compute gradients of the cross-entropy loss.
///
/// # Why this trait?
///
/// The epoch loop is agnostic to model architecture. It only requires a
/// forward pass producing scores, a backward pass for the most recent
/// forward, a train/eval mode switch, and parameter export for checkpoints.
/// Any framework able to express these four operations can plug in.
pub trait Model<B: Batch>: Send {
    /// Runs the forward pass and returns per-sample class scores (logits),
    /// one `Vec<f32>` of length `num_classes` per sample.
    ///
    /// In train mode the implementation must retain whatever intermediate
    /// state its `backward` needs.
    fn forward(&mut self, batch: &B) -> TrainResult<Vec<Vec<f32>>>;

    /// Computes gradients of the cross-entropy loss for the most recent
    /// `forward` call against `labels`.
    ///
    /// Must only be called in train mode, immediately after `forward`.
    fn backward(&mut self, labels: &[usize]) -> TrainResult<GradientInfo>;

    /// Switches between train mode (`true`) and inference mode (`false`).
    ///
    /// Inference mode disables stochastic regularization layers; the epoch
    /// loop sets it for the duration of a validation pass.
    fn set_train_mode(&mut self, train: bool);

    /// Exports all trainable parameters by name.
    fn state_dict(&self) -> StateDict;

    /// Restores parameters previously exported by [`Model::state_dict`].
    fn load_state_dict(&mut self, state: &StateDict) -> TrainResult<()>;
}

/// A feature encoder: maps a batch to fixed-width feature vectors.
///
/// Used by the linear-probe entry point (frozen features feeding a probe
/// classifier) and by the embedding-projection pipeline.
pub trait Encoder<B: Batch>: Send {
    /// Width of the feature vectors this encoder produces.
    ///
    /// The projection pipeline sizes its buffers from this value at
    /// construction time, so encoders must report it accurately.
    fn feature_dim(&self) -> usize;

    /// Computes one feature vector per sample, each of length
    /// [`Encoder::feature_dim`]. Never updates parameters.
    fn encode(&mut self, batch: &B) -> TrainResult<Vec<Vec<f32>>>;
}

/// An optimizer that updates model parameters from computed gradients.
///
/// Separated from [`Model`] so optimizer state (momentum buffers) can be
/// swapped, checkpointed, and restored independently of the parameters.
pub trait Optimizer<M, B: Batch>: Send
where
    M: Model<B>,
{
    /// Clears any accumulated gradients before a fresh backward pass.
    fn zero_grad(&mut self, model: &mut M);

    /// Applies one parameter update using the gradients from the most recent
    /// backward pass.
    fn step(&mut self, model: &mut M, gradients: &GradientInfo) -> TrainResult<()>;

    /// Current learning rate of the first parameter group.
    fn learning_rate(&self) -> f64;

    /// Writes `lr` into every parameter group.
    ///
    /// This is the single side effect the learning-rate scheduler performs;
    /// it must be idempotent for repeated calls with the same value.
    fn set_learning_rate(&mut self, lr: f64);

    /// Exports optimizer state (e.g. momentum buffers) for checkpointing.
    fn state_dict(&self) -> StateDict;

    /// Restores state previously exported by [`Optimizer::state_dict`].
    fn load_state_dict(&mut self, state: &StateDict) -> TrainResult<()>;
}

/// Prelude for convenient imports.
///
/// ```
/// use supervised_trainer_rs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::checkpoint::{Checkpoint, CheckpointManager};
    pub use crate::config::RunConfig;
    pub use crate::data::{DataStream, DatasetKind};
    pub use crate::epoch::ExecutionContext;
    pub use crate::error::{TrainError, TrainResult};
    pub use crate::metrics::AverageMeter;
    pub use crate::schedule::LrSchedule;
    pub use crate::session::{EpochRecord, SessionSummary, TrainingSession};
    pub use crate::{Batch, Encoder, GradientInfo, Model, Optimizer, StateDict};
}
