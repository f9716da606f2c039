//! Dataset catalog, batch container, and data streams.
//!
//! The harness treats data loading as an opaque collaborator: a
//! [`DataStream`] is a finite, restartable sequence of already-assembled
//! batches, re-iterated once per epoch. Batches arrive pre-normalized with
//! the fixed per-dataset mean/std pairs in [`DatasetKind`].
//!
//! [`SyntheticStream`] is the in-crate stand-in for an image loader: a
//! seeded, deterministic stream of Gaussian class blobs used by the binaries
//! and the end-to-end tests.

use std::str::FromStr;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};
use crate::Batch;

/// Supported datasets and their fixed statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// CIFAR-10, 10 classes, 3 channels.
    Cifar10,
    /// CIFAR-100, 100 classes, 3 channels.
    Cifar100,
    /// MNIST, 10 classes, 1 channel.
    Mnist,
}

impl DatasetKind {
    /// Number of classes in the dataset.
    #[must_use]
    pub fn num_classes(self) -> usize {
        match self {
            Self::Cifar10 | Self::Mnist => 10,
            Self::Cifar100 => 100,
        }
    }

    /// Per-channel normalization means.
    #[must_use]
    pub fn mean(self) -> &'static [f32] {
        match self {
            Self::Cifar10 => &[0.4914, 0.4822, 0.4465],
            Self::Cifar100 => &[0.5071, 0.4867, 0.4408],
            Self::Mnist => &[0.1307],
        }
    }

    /// Per-channel normalization standard deviations.
    #[must_use]
    pub fn std(self) -> &'static [f32] {
        match self {
            Self::Cifar10 => &[0.2023, 0.1994, 0.2010],
            Self::Cifar100 => &[0.2675, 0.2565, 0.2761],
            Self::Mnist => &[0.3081],
        }
    }

    /// Canonical lowercase name, used in run names and save paths.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Cifar10 => "cifar10",
            Self::Cifar100 => "cifar100",
            Self::Mnist => "mnist",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = TrainError;

    /// Parses a dataset name. Unsupported names are a configuration error,
    /// raised before any training work begins.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cifar10" => Ok(Self::Cifar10),
            "cifar100" => Ok(Self::Cifar100),
            "mnist" => Ok(Self::Mnist),
            other => Err(TrainError::config(format!(
                "dataset not supported: {other}"
            ))),
        }
    }
}

/// A batch of flat input vectors with parallel integer labels.
#[derive(Debug, Clone)]
pub struct VecBatch {
    /// One flat input vector per sample.
    pub inputs: Vec<Vec<f32>>,
    /// Ground-truth class index per sample.
    pub labels: Vec<usize>,
}

impl VecBatch {
    /// Builds a batch, checking that inputs and labels are parallel.
    pub fn new(inputs: Vec<Vec<f32>>, labels: Vec<usize>) -> TrainResult<Self> {
        if inputs.len() != labels.len() {
            return Err(TrainError::data(format!(
                "batch has {} inputs but {} labels",
                inputs.len(),
                labels.len()
            )));
        }
        Ok(Self { inputs, labels })
    }
}

impl Batch for VecBatch {
    fn batch_size(&self) -> usize {
        self.labels.len()
    }

    fn labels(&self) -> &[usize] {
        &self.labels
    }
}

/// A finite, restartable sequence of batches.
///
/// The epoch loop calls [`DataStream::reset`] at the start of each pass and
/// then drains [`DataStream::next_batch`] until exhaustion. Any batch-level
/// parallelism lives behind this trait and is invisible to the harness.
pub trait DataStream<B: Batch> {
    /// Rewinds the stream for a fresh pass. Implementations may reshuffle.
    fn reset(&mut self);

    /// Produces the next batch, or `None` when the pass is exhausted.
    fn next_batch(&mut self) -> Option<B>;

    /// Number of batches one full pass yields.
    fn num_batches(&self) -> usize;
}

/// Deterministic Gaussian class-blob stream.
///
/// Each class gets a fixed random centroid; samples are the centroid plus
/// isotropic noise, normalized with the dataset's per-channel statistics
/// (channels cycled across the flat input vector). Two streams built with
/// the same seed produce identical data, which keeps end-to-end tests
/// reproducible.
pub struct SyntheticStream {
    samples: Vec<(Vec<f32>, usize)>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
}

impl SyntheticStream {
    /// Builds a stream of `num_samples` samples of width `input_dim` for the
    /// given dataset.
    ///
    /// `shuffle` controls whether sample order is re-randomized on each
    /// [`DataStream::reset`] (train streams shuffle, validation streams do
    /// not).
    pub fn new(
        dataset: DatasetKind,
        input_dim: usize,
        num_samples: usize,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> TrainResult<Self> {
        if input_dim == 0 || num_samples == 0 || batch_size == 0 {
            return Err(TrainError::config(
                "synthetic stream needs non-zero input_dim, num_samples, and batch_size",
            ));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let num_classes = dataset.num_classes();
        let mean = dataset.mean();
        let std = dataset.std();

        let centroids: Vec<Vec<f32>> = (0..num_classes)
            .map(|_| (0..input_dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();

        let samples = (0..num_samples)
            .map(|i| {
                let label = i % num_classes;
                let input: Vec<f32> = centroids[label]
                    .iter()
                    .enumerate()
                    .map(|(d, &c)| {
                        let raw: f32 = c + rng.gen_range(-0.35..0.35);
                        let channel = d % mean.len();
                        (raw - mean[channel]) / std[channel]
                    })
                    .collect();
                (input, label)
            })
            .collect::<Vec<_>>();

        let order = (0..num_samples).collect();
        Ok(Self {
            samples,
            order,
            batch_size,
            cursor: 0,
            shuffle,
            rng,
        })
    }
}

impl DataStream<VecBatch> for SyntheticStream {
    fn reset(&mut self) {
        self.cursor = 0;
        if self.shuffle {
            // Fisher-Yates with the stream's own seeded generator.
            for i in (1..self.order.len()).rev() {
                let j = self.rng.gen_range(0..=i);
                self.order.swap(i, j);
            }
        }
    }

    fn next_batch(&mut self) -> Option<VecBatch> {
        if self.cursor >= self.samples.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.samples.len());
        let mut inputs = Vec::with_capacity(end - self.cursor);
        let mut labels = Vec::with_capacity(end - self.cursor);
        for &idx in &self.order[self.cursor..end] {
            let (input, label) = &self.samples[idx];
            inputs.push(input.clone());
            labels.push(*label);
        }
        self.cursor = end;
        Some(VecBatch { inputs, labels })
    }

    fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_dataset_is_config_error() {
        let err = DatasetKind::from_str("imagenet").unwrap_err();
        assert!(matches!(err, TrainError::Config { .. }));
        assert!(err.to_string().contains("imagenet"));
    }

    #[test]
    fn test_dataset_catalog() {
        assert_eq!(DatasetKind::Cifar10.num_classes(), 10);
        assert_eq!(DatasetKind::Cifar100.num_classes(), 100);
        assert_eq!(DatasetKind::Mnist.mean().len(), 1);
        assert_eq!(DatasetKind::Cifar10.mean().len(), 3);
        assert_eq!("cifar100".parse::<DatasetKind>().unwrap(), DatasetKind::Cifar100);
    }

    #[test]
    fn test_batch_length_mismatch_is_data_error() {
        let err = VecBatch::new(vec![vec![0.0]], vec![0, 1]).unwrap_err();
        assert!(matches!(err, TrainError::Data { .. }));
    }

    #[test]
    fn test_stream_is_restartable_and_finite() {
        let mut stream =
            SyntheticStream::new(DatasetKind::Mnist, 8, 25, 10, false, 7).unwrap();
        assert_eq!(stream.num_batches(), 3);

        stream.reset();
        let sizes: Vec<usize> = std::iter::from_fn(|| stream.next_batch())
            .map(|b| b.batch_size())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        // A second pass yields the same number of batches.
        stream.reset();
        let second: usize = std::iter::from_fn(|| stream.next_batch()).count();
        assert_eq!(second, 3);
    }

    #[test]
    fn test_same_seed_same_data() {
        let mut a = SyntheticStream::new(DatasetKind::Cifar10, 6, 12, 4, false, 42).unwrap();
        let mut b = SyntheticStream::new(DatasetKind::Cifar10, 6, 12, 4, false, 42).unwrap();
        a.reset();
        b.reset();
        let ba = a.next_batch().unwrap();
        let bb = b.next_batch().unwrap();
        assert_eq!(ba.labels, bb.labels);
        assert_eq!(ba.inputs, bb.inputs);
    }

    #[test]
    fn test_unshuffled_stream_preserves_order() {
        let mut stream =
            SyntheticStream::new(DatasetKind::Mnist, 4, 10, 10, false, 3).unwrap();
        stream.reset();
        let batch = stream.next_batch().unwrap();
        assert_eq!(batch.labels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }
}
