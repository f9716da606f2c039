//! Reference encoder, classifier, and optimizer implementations.
//!
//! The harness itself is framework-agnostic; these types exist so the crate
//! is runnable end to end without an external tensor library. [`SupCeNet`]
//! is a small MLP encoder plus a linear classification head trained jointly;
//! [`LinearProbeNet`] trains only a linear head on top of a frozen encoder.
//! [`SgdOptimizer`] implements SGD with momentum and weight decay over named
//! parameter groups.
//!
//! Gradients live inside the model (each layer accumulates into its own
//! buffers during `backward`); the optimizer reads them back by parameter
//! name through [`ParamModel`].

use std::collections::BTreeMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::VecBatch;
use crate::error::{TrainError, TrainResult};
use crate::{Encoder, GradientInfo, Model, StateDict};

/// Named-parameter access for optimizers.
///
/// Splitting this from [`Model`] keeps the epoch loop blind to parameter
/// layout while still letting a concrete optimizer walk every tensor.
pub trait ParamModel {
    /// Names of all trainable parameters, in deterministic order.
    fn param_names(&self) -> Vec<String>;

    /// Shared view of a parameter's values.
    fn param(&self, name: &str) -> Option<&[f32]>;

    /// Exclusive view of a parameter's values.
    fn param_mut(&mut self, name: &str) -> Option<&mut Vec<f32>>;

    /// Shared view of the gradient accumulated for a parameter.
    fn grad(&self, name: &str) -> Option<&[f32]>;

    /// Clears all accumulated gradients.
    fn zero_grads(&mut self);
}

/// One fully connected layer with optional ReLU and manual backprop.
#[derive(Debug, Clone)]
struct DenseLayer {
    in_dim: usize,
    out_dim: usize,
    /// Row-major `out_dim x in_dim`.
    weights: Vec<f32>,
    bias: Vec<f32>,
    grad_weights: Vec<f32>,
    grad_bias: Vec<f32>,
    relu: bool,
    /// Inputs and post-activation outputs of the most recent retained
    /// forward, needed by `backward`.
    cached_inputs: Vec<Vec<f32>>,
    cached_outputs: Vec<Vec<f32>>,
}

impl DenseLayer {
    fn new(in_dim: usize, out_dim: usize, relu: bool, rng: &mut ChaCha8Rng) -> Self {
        // Uniform init scaled by fan-in.
        let bound = 1.0 / (in_dim as f32).sqrt();
        let weights = (0..out_dim * in_dim)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let bias = vec![0.0; out_dim];
        Self {
            in_dim,
            out_dim,
            weights,
            bias,
            grad_weights: vec![0.0; out_dim * in_dim],
            grad_bias: vec![0.0; out_dim],
            relu,
            cached_inputs: Vec::new(),
            cached_outputs: Vec::new(),
        }
    }

    fn forward(&mut self, inputs: &[Vec<f32>], retain: bool) -> TrainResult<Vec<Vec<f32>>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input.len() != self.in_dim {
                return Err(TrainError::ShapeMismatch {
                    context: "dense layer input".to_string(),
                    expected: self.in_dim,
                    actual: input.len(),
                });
            }
            let mut out = Vec::with_capacity(self.out_dim);
            for o in 0..self.out_dim {
                let row = &self.weights[o * self.in_dim..(o + 1) * self.in_dim];
                let mut acc = self.bias[o];
                for (w, x) in row.iter().zip(input.iter()) {
                    acc += w * x;
                }
                if self.relu {
                    acc = acc.max(0.0);
                }
                out.push(acc);
            }
            outputs.push(out);
        }
        if retain {
            self.cached_inputs = inputs.to_vec();
            self.cached_outputs = outputs.clone();
        }
        Ok(outputs)
    }

    /// Accumulates gradients from `delta` (dL/d-output, post-activation) and
    /// returns dL/d-input for the layer below.
    fn backward(&mut self, delta: &[Vec<f32>]) -> TrainResult<Vec<Vec<f32>>> {
        if delta.len() != self.cached_inputs.len() {
            return Err(TrainError::model(format!(
                "backward got {} delta rows for {} cached inputs",
                delta.len(),
                self.cached_inputs.len()
            )));
        }
        let mut input_delta = vec![vec![0.0f32; self.in_dim]; delta.len()];
        for (sample, row) in delta.iter().enumerate() {
            let input = &self.cached_inputs[sample];
            let output = &self.cached_outputs[sample];
            for o in 0..self.out_dim {
                let mut d = row[o];
                // ReLU gate: gradient passes only where the unit fired.
                if self.relu && output[o] <= 0.0 {
                    d = 0.0;
                }
                self.grad_bias[o] += d;
                let grad_row = &mut self.grad_weights[o * self.in_dim..(o + 1) * self.in_dim];
                let weight_row = &self.weights[o * self.in_dim..(o + 1) * self.in_dim];
                for i in 0..self.in_dim {
                    grad_row[i] += d * input[i];
                    input_delta[sample][i] += d * weight_row[i];
                }
            }
        }
        Ok(input_delta)
    }

    fn zero_grads(&mut self) {
        self.grad_weights.iter_mut().for_each(|g| *g = 0.0);
        self.grad_bias.iter_mut().for_each(|g| *g = 0.0);
    }

    fn grad_sq_norm(&self) -> f64 {
        self.grad_weights
            .iter()
            .chain(self.grad_bias.iter())
            .map(|&g| f64::from(g) * f64::from(g))
            .sum()
    }
}

/// Two-layer MLP feature encoder.
///
/// `fc1` applies ReLU; `fc2` emits raw features. Consumers that need unit
/// vectors (the projection pipeline) normalize on their side.
pub struct MlpEncoder {
    fc1: DenseLayer,
    fc2: DenseLayer,
}

impl MlpEncoder {
    /// Builds an encoder with the given layer widths, seeded for
    /// reproducible initialization.
    #[must_use]
    pub fn new(input_dim: usize, hidden_dim: usize, feature_dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            fc1: DenseLayer::new(input_dim, hidden_dim, true, &mut rng),
            fc2: DenseLayer::new(hidden_dim, feature_dim, false, &mut rng),
        }
    }

    fn forward(&mut self, inputs: &[Vec<f32>], retain: bool) -> TrainResult<Vec<Vec<f32>>> {
        let hidden = self.fc1.forward(inputs, retain)?;
        self.fc2.forward(&hidden, retain)
    }

    fn backward(&mut self, delta: &[Vec<f32>]) -> TrainResult<()> {
        let hidden_delta = self.fc2.backward(delta)?;
        self.fc1.backward(&hidden_delta)?;
        Ok(())
    }

    /// Exports encoder parameters under `encoder.`-prefixed names, matching
    /// the layout [`SupCeNet`] checkpoints use.
    #[must_use]
    pub fn state_dict(&self) -> StateDict {
        let mut state = BTreeMap::new();
        state.insert("encoder.fc1.weight".to_string(), self.fc1.weights.clone());
        state.insert("encoder.fc1.bias".to_string(), self.fc1.bias.clone());
        state.insert("encoder.fc2.weight".to_string(), self.fc2.weights.clone());
        state.insert("encoder.fc2.bias".to_string(), self.fc2.bias.clone());
        state
    }

    /// Restores encoder parameters from a state dict that contains the
    /// `encoder.*` entries, e.g. one loaded from a full-model checkpoint.
    pub fn load_state_dict(&mut self, state: &StateDict) -> TrainResult<()> {
        for (name, target) in [
            ("encoder.fc1.weight", &mut self.fc1.weights),
            ("encoder.fc1.bias", &mut self.fc1.bias),
            ("encoder.fc2.weight", &mut self.fc2.weights),
            ("encoder.fc2.bias", &mut self.fc2.bias),
        ] {
            let values = state
                .get(name)
                .ok_or_else(|| TrainError::model(format!("missing parameter {name}")))?;
            if values.len() != target.len() {
                return Err(TrainError::ShapeMismatch {
                    context: format!("load {name}"),
                    expected: target.len(),
                    actual: values.len(),
                });
            }
            target.copy_from_slice(values);
        }
        Ok(())
    }
}

impl Encoder<VecBatch> for MlpEncoder {
    fn feature_dim(&self) -> usize {
        self.fc2.out_dim
    }

    fn encode(&mut self, batch: &VecBatch) -> TrainResult<Vec<Vec<f32>>> {
        self.forward(&batch.inputs, false)
    }
}

/// Per-sample softmax minus one-hot, scaled by 1/batch. This is the
/// cross-entropy gradient at the logits.
fn softmax_delta(scores: &[Vec<f32>], labels: &[usize]) -> TrainResult<Vec<Vec<f32>>> {
    if scores.len() != labels.len() {
        return Err(TrainError::model(format!(
            "backward got {} score rows but {} labels",
            scores.len(),
            labels.len()
        )));
    }
    let scale = 1.0 / scores.len() as f32;
    let mut deltas = Vec::with_capacity(scores.len());
    for (row, &label) in scores.iter().zip(labels.iter()) {
        if label >= row.len() {
            return Err(TrainError::model(format!(
                "label {label} out of range for {} classes",
                row.len()
            )));
        }
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = row.iter().map(|&s| (s - max).exp()).collect();
        let sum: f32 = exp.iter().sum();
        let mut delta: Vec<f32> = exp.iter().map(|&e| e / sum * scale).collect();
        delta[label] -= scale;
        deltas.push(delta);
    }
    Ok(deltas)
}

/// MLP encoder with a jointly trained linear classification head.
pub struct SupCeNet {
    encoder: MlpEncoder,
    classifier: DenseLayer,
    train_mode: bool,
    cached_scores: Vec<Vec<f32>>,
}

impl SupCeNet {
    /// Builds the network with seeded initialization.
    #[must_use]
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        feature_dim: usize,
        num_classes: usize,
        seed: u64,
    ) -> Self {
        let encoder = MlpEncoder::new(input_dim, hidden_dim, feature_dim, seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        Self {
            encoder,
            classifier: DenseLayer::new(feature_dim, num_classes, false, &mut rng),
            train_mode: true,
            cached_scores: Vec::new(),
        }
    }

    /// The encoder half, for post-training embedding projection.
    pub fn encoder_mut(&mut self) -> &mut MlpEncoder {
        &mut self.encoder
    }
}

impl Model<VecBatch> for SupCeNet {
    fn forward(&mut self, batch: &VecBatch) -> TrainResult<Vec<Vec<f32>>> {
        let retain = self.train_mode;
        let features = self.encoder.forward(&batch.inputs, retain)?;
        let scores = self.classifier.forward(&features, retain)?;
        if retain {
            self.cached_scores = scores.clone();
        }
        Ok(scores)
    }

    fn backward(&mut self, labels: &[usize]) -> TrainResult<GradientInfo> {
        if !self.train_mode {
            return Err(TrainError::model("backward called in inference mode"));
        }
        let delta = softmax_delta(&self.cached_scores, labels)?;
        let feature_delta = self.classifier.backward(&delta)?;
        self.encoder.backward(&feature_delta)?;

        let sq = self.classifier.grad_sq_norm()
            + self.encoder.fc1.grad_sq_norm()
            + self.encoder.fc2.grad_sq_norm();
        Ok(GradientInfo {
            gradient_norm: sq.sqrt(),
        })
    }

    fn set_train_mode(&mut self, train: bool) {
        self.train_mode = train;
    }

    fn state_dict(&self) -> StateDict {
        let mut state = self.encoder.state_dict();
        state.insert(
            "classifier.weight".to_string(),
            self.classifier.weights.clone(),
        );
        state.insert("classifier.bias".to_string(), self.classifier.bias.clone());
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> TrainResult<()> {
        self.encoder.load_state_dict(state)?;
        for (name, target) in [
            ("classifier.weight", &mut self.classifier.weights),
            ("classifier.bias", &mut self.classifier.bias),
        ] {
            let values = state
                .get(name)
                .ok_or_else(|| TrainError::model(format!("missing parameter {name}")))?;
            if values.len() != target.len() {
                return Err(TrainError::ShapeMismatch {
                    context: format!("load {name}"),
                    expected: target.len(),
                    actual: values.len(),
                });
            }
            target.copy_from_slice(values);
        }
        Ok(())
    }
}

impl Encoder<VecBatch> for SupCeNet {
    fn feature_dim(&self) -> usize {
        self.encoder.feature_dim()
    }

    fn encode(&mut self, batch: &VecBatch) -> TrainResult<Vec<Vec<f32>>> {
        self.encoder.encode(batch)
    }
}

impl ParamModel for SupCeNet {
    fn param_names(&self) -> Vec<String> {
        vec![
            "classifier.bias".to_string(),
            "classifier.weight".to_string(),
            "encoder.fc1.bias".to_string(),
            "encoder.fc1.weight".to_string(),
            "encoder.fc2.bias".to_string(),
            "encoder.fc2.weight".to_string(),
        ]
    }

    fn param(&self, name: &str) -> Option<&[f32]> {
        let values: Option<&Vec<f32>> = match name {
            "classifier.weight" => Some(&self.classifier.weights),
            "classifier.bias" => Some(&self.classifier.bias),
            "encoder.fc1.weight" => Some(&self.encoder.fc1.weights),
            "encoder.fc1.bias" => Some(&self.encoder.fc1.bias),
            "encoder.fc2.weight" => Some(&self.encoder.fc2.weights),
            "encoder.fc2.bias" => Some(&self.encoder.fc2.bias),
            _ => None,
        };
        values.map(Vec::as_slice)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut Vec<f32>> {
        match name {
            "classifier.weight" => Some(&mut self.classifier.weights),
            "classifier.bias" => Some(&mut self.classifier.bias),
            "encoder.fc1.weight" => Some(&mut self.encoder.fc1.weights),
            "encoder.fc1.bias" => Some(&mut self.encoder.fc1.bias),
            "encoder.fc2.weight" => Some(&mut self.encoder.fc2.weights),
            "encoder.fc2.bias" => Some(&mut self.encoder.fc2.bias),
            _ => None,
        }
    }

    fn grad(&self, name: &str) -> Option<&[f32]> {
        let values: Option<&Vec<f32>> = match name {
            "classifier.weight" => Some(&self.classifier.grad_weights),
            "classifier.bias" => Some(&self.classifier.grad_bias),
            "encoder.fc1.weight" => Some(&self.encoder.fc1.grad_weights),
            "encoder.fc1.bias" => Some(&self.encoder.fc1.grad_bias),
            "encoder.fc2.weight" => Some(&self.encoder.fc2.grad_weights),
            "encoder.fc2.bias" => Some(&self.encoder.fc2.grad_bias),
            _ => None,
        };
        values.map(Vec::as_slice)
    }

    fn zero_grads(&mut self) {
        self.classifier.zero_grads();
        self.encoder.fc1.zero_grads();
        self.encoder.fc2.zero_grads();
    }
}

/// Linear classifier over a frozen encoder.
///
/// Only the head's parameters are trained, exported, and checkpointed; the
/// encoder is read-only for the lifetime of the probe.
pub struct LinearProbeNet {
    encoder: MlpEncoder,
    classifier: DenseLayer,
    train_mode: bool,
    cached_scores: Vec<Vec<f32>>,
}

impl LinearProbeNet {
    /// Wraps `encoder` (already loaded from a checkpoint) with a fresh
    /// linear head.
    #[must_use]
    pub fn new(encoder: MlpEncoder, num_classes: usize, seed: u64) -> Self {
        let feature_dim = encoder.feature_dim();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            encoder,
            classifier: DenseLayer::new(feature_dim, num_classes, false, &mut rng),
            train_mode: true,
            cached_scores: Vec::new(),
        }
    }
}

impl Model<VecBatch> for LinearProbeNet {
    fn forward(&mut self, batch: &VecBatch) -> TrainResult<Vec<Vec<f32>>> {
        // The encoder never retains: its parameters take no gradient.
        let features = self.encoder.forward(&batch.inputs, false)?;
        let retain = self.train_mode;
        let scores = self.classifier.forward(&features, retain)?;
        if retain {
            self.cached_scores = scores.clone();
        }
        Ok(scores)
    }

    fn backward(&mut self, labels: &[usize]) -> TrainResult<GradientInfo> {
        if !self.train_mode {
            return Err(TrainError::model("backward called in inference mode"));
        }
        let delta = softmax_delta(&self.cached_scores, labels)?;
        self.classifier.backward(&delta)?;
        Ok(GradientInfo {
            gradient_norm: self.classifier.grad_sq_norm().sqrt(),
        })
    }

    fn set_train_mode(&mut self, train: bool) {
        self.train_mode = train;
    }

    fn state_dict(&self) -> StateDict {
        let mut state = BTreeMap::new();
        state.insert(
            "classifier.weight".to_string(),
            self.classifier.weights.clone(),
        );
        state.insert("classifier.bias".to_string(), self.classifier.bias.clone());
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> TrainResult<()> {
        for (name, target) in [
            ("classifier.weight", &mut self.classifier.weights),
            ("classifier.bias", &mut self.classifier.bias),
        ] {
            let values = state
                .get(name)
                .ok_or_else(|| TrainError::model(format!("missing parameter {name}")))?;
            if values.len() != target.len() {
                return Err(TrainError::ShapeMismatch {
                    context: format!("load {name}"),
                    expected: target.len(),
                    actual: values.len(),
                });
            }
            target.copy_from_slice(values);
        }
        Ok(())
    }
}

impl Encoder<VecBatch> for LinearProbeNet {
    fn feature_dim(&self) -> usize {
        self.encoder.feature_dim()
    }

    fn encode(&mut self, batch: &VecBatch) -> TrainResult<Vec<Vec<f32>>> {
        self.encoder.encode(batch)
    }
}

impl ParamModel for LinearProbeNet {
    fn param_names(&self) -> Vec<String> {
        vec![
            "classifier.bias".to_string(),
            "classifier.weight".to_string(),
        ]
    }

    fn param(&self, name: &str) -> Option<&[f32]> {
        match name {
            "classifier.weight" => Some(&self.classifier.weights),
            "classifier.bias" => Some(&self.classifier.bias),
            _ => None,
        }
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut Vec<f32>> {
        match name {
            "classifier.weight" => Some(&mut self.classifier.weights),
            "classifier.bias" => Some(&mut self.classifier.bias),
            _ => None,
        }
    }

    fn grad(&self, name: &str) -> Option<&[f32]> {
        match name {
            "classifier.weight" => Some(&self.classifier.grad_weights),
            "classifier.bias" => Some(&self.classifier.grad_bias),
            _ => None,
        }
    }

    fn zero_grads(&mut self) {
        self.classifier.zero_grads();
    }
}

/// One learning-rate group, matched to parameters by name prefix.
#[derive(Debug, Clone)]
pub struct ParamGroup {
    /// Parameter-name prefix this group covers. The empty prefix matches
    /// everything and serves as the default group.
    pub prefix: String,
    /// Learning rate for parameters in this group.
    pub lr: f64,
}

/// SGD with momentum and weight decay over named parameters.
pub struct SgdOptimizer {
    groups: Vec<ParamGroup>,
    momentum: f64,
    weight_decay: f64,
    velocity: BTreeMap<String, Vec<f32>>,
}

impl SgdOptimizer {
    /// Creates an optimizer with a single default parameter group.
    #[must_use]
    pub fn new(lr: f64, momentum: f64, weight_decay: f64) -> Self {
        Self {
            groups: vec![ParamGroup {
                prefix: String::new(),
                lr,
            }],
            momentum,
            weight_decay,
            velocity: BTreeMap::new(),
        }
    }

    /// Creates an optimizer from a run configuration.
    #[must_use]
    pub fn from_config(config: &crate::config::RunConfig) -> Self {
        Self::new(config.learning_rate, config.momentum, config.weight_decay)
    }

    /// Replaces the parameter groups. Groups are matched longest-prefix
    /// first; keep an empty-prefix group as the fallback.
    #[must_use]
    pub fn with_groups(mut self, groups: Vec<ParamGroup>) -> Self {
        self.groups = groups;
        self
    }

    fn rate_for(&self, name: &str) -> f64 {
        self.groups
            .iter()
            .filter(|g| name.starts_with(&g.prefix))
            .max_by_key(|g| g.prefix.len())
            .map_or(0.0, |g| g.lr)
    }
}

impl<M> crate::Optimizer<M, VecBatch> for SgdOptimizer
where
    M: Model<VecBatch> + ParamModel,
{
    fn zero_grad(&mut self, model: &mut M) {
        model.zero_grads();
    }

    fn step(&mut self, model: &mut M, _gradients: &GradientInfo) -> TrainResult<()> {
        for name in model.param_names() {
            let grad = model
                .grad(&name)
                .ok_or_else(|| TrainError::model(format!("no gradient for parameter {name}")))?
                .to_vec();
            let lr = self.rate_for(&name) as f32;
            let momentum = self.momentum as f32;
            let weight_decay = self.weight_decay as f32;

            let param = model
                .param_mut(&name)
                .ok_or_else(|| TrainError::model(format!("unknown parameter {name}")))?;
            let velocity = self
                .velocity
                .entry(name.clone())
                .or_insert_with(|| vec![0.0; param.len()]);
            if velocity.len() != param.len() {
                return Err(TrainError::ShapeMismatch {
                    context: format!("momentum buffer for {name}"),
                    expected: param.len(),
                    actual: velocity.len(),
                });
            }
            for ((p, v), g) in param.iter_mut().zip(velocity.iter_mut()).zip(grad.iter()) {
                let d = g + weight_decay * *p;
                *v = momentum * *v + d;
                *p -= lr * *v;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.groups.first().map_or(0.0, |g| g.lr)
    }

    fn set_learning_rate(&mut self, lr: f64) {
        for group in &mut self.groups {
            group.lr = lr;
        }
    }

    fn state_dict(&self) -> StateDict {
        self.velocity
            .iter()
            .map(|(name, buf)| (format!("velocity.{name}"), buf.clone()))
            .collect()
    }

    fn load_state_dict(&mut self, state: &StateDict) -> TrainResult<()> {
        self.velocity = state
            .iter()
            .filter_map(|(name, buf)| {
                name.strip_prefix("velocity.")
                    .map(|stripped| (stripped.to_string(), buf.clone()))
            })
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Optimizer;

    fn tiny_batch() -> VecBatch {
        VecBatch {
            inputs: vec![vec![1.0, 0.0, -1.0, 0.5], vec![-0.5, 1.0, 0.0, 0.25]],
            labels: vec![0, 1],
        }
    }

    #[test]
    fn test_forward_shape() {
        let mut net = SupCeNet::new(4, 8, 6, 3, 11);
        let scores = net.forward(&tiny_batch()).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|row| row.len() == 3));
        assert_eq!(net.feature_dim(), 6);
    }

    #[test]
    fn test_gradient_step_reduces_loss() {
        let mut net = SupCeNet::new(4, 8, 6, 3, 11);
        let mut opt = SgdOptimizer::new(0.5, 0.0, 0.0);
        let batch = tiny_batch();

        let scores = net.forward(&batch).unwrap();
        let before = crate::epoch::cross_entropy_loss(&scores, &batch.labels).unwrap();

        for _ in 0..20 {
            net.forward(&batch).unwrap();
            opt.zero_grad(&mut net);
            let info = net.backward(&batch.labels).unwrap();
            assert!(info.gradient_norm.is_finite());
            opt.step(&mut net, &info).unwrap();
        }

        let scores = net.forward(&batch).unwrap();
        let after = crate::epoch::cross_entropy_loss(&scores, &batch.labels).unwrap();
        assert!(after < before, "loss did not decrease: {before} -> {after}");
    }

    #[test]
    fn test_softmax_delta_rows_sum_to_zero() {
        let deltas = softmax_delta(&[vec![2.0, -1.0, 0.5]], &[2]).unwrap();
        let sum: f32 = deltas[0].iter().sum();
        assert!(sum.abs() < 1e-6);
    }

    #[test]
    fn test_state_dict_round_trip() {
        let net = SupCeNet::new(4, 8, 6, 3, 11);
        let state = net.state_dict();
        let mut other = SupCeNet::new(4, 8, 6, 3, 99);
        other.load_state_dict(&state).unwrap();
        assert_eq!(other.state_dict(), state);
    }

    #[test]
    fn test_encoder_loads_from_full_checkpoint_state() {
        let net = SupCeNet::new(4, 8, 6, 3, 11);
        let state = net.state_dict();
        let mut encoder = MlpEncoder::new(4, 8, 6, 0);
        encoder.load_state_dict(&state).unwrap();
        assert_eq!(encoder.state_dict()["encoder.fc1.weight"], state["encoder.fc1.weight"]);
    }

    #[test]
    fn test_probe_trains_only_the_head() {
        let encoder = MlpEncoder::new(4, 8, 6, 5);
        let frozen = encoder.state_dict();
        let mut probe = LinearProbeNet::new(encoder, 3, 7);
        let mut opt = SgdOptimizer::new(0.1, 0.9, 0.0);
        let batch = tiny_batch();

        probe.forward(&batch).unwrap();
        opt.zero_grad(&mut probe);
        let info = probe.backward(&batch.labels).unwrap();
        opt.step(&mut probe, &info).unwrap();

        assert_eq!(probe.encoder.state_dict(), frozen);
        assert_eq!(probe.param_names().len(), 2);
    }

    #[test]
    fn test_set_learning_rate_covers_all_groups() {
        let mut opt = SgdOptimizer::new(0.1, 0.9, 0.0).with_groups(vec![
            ParamGroup {
                prefix: String::new(),
                lr: 0.1,
            },
            ParamGroup {
                prefix: "classifier".to_string(),
                lr: 0.5,
            },
        ]);
        <SgdOptimizer as Optimizer<SupCeNet, VecBatch>>::set_learning_rate(&mut opt, 0.02);
        assert!((opt.rate_for("classifier.bias") - 0.02).abs() < 1e-12);
        assert!((opt.rate_for("encoder.fc1.weight") - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_backward_in_eval_mode_is_an_error() {
        let mut net = SupCeNet::new(4, 8, 6, 3, 11);
        net.forward(&tiny_batch()).unwrap();
        net.set_train_mode(false);
        let err = net.backward(&[0, 1]).unwrap_err();
        assert!(matches!(err, TrainError::Model { .. }));
    }
}
