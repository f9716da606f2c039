//! Embedding collection and 2-D projection.
//!
//! After training, the encoder's feature vectors are collected into an
//! [`EmbeddingSet`], L2-normalized, and projected to two dimensions for
//! visual inspection of class separability. Two projections are produced:
//! a PCA projection (top two principal components, via `nalgebra`'s
//! symmetric eigendecomposition) and an exact t-SNE embedding with
//! per-point perplexity calibration, early exaggeration, and momentum.
//!
//! The projection step runs post-hoc on a finished encoder; it never feeds
//! back into training.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::DataStream;
use crate::error::{TrainError, TrainResult};
use crate::{Batch, Encoder};

/// A collection of unit-length feature vectors with parallel class labels.
///
/// The set is sized from the encoder's reported feature width at
/// construction; every appended row must match it exactly.
pub struct EmbeddingSet {
    feature_dim: usize,
    features: Vec<Vec<f32>>,
    labels: Vec<usize>,
}

impl EmbeddingSet {
    /// Creates an empty set for features of width `feature_dim`.
    pub fn new(feature_dim: usize) -> TrainResult<Self> {
        if feature_dim == 0 {
            return Err(TrainError::config("feature_dim must be at least 1"));
        }
        Ok(Self {
            feature_dim,
            features: Vec::new(),
            labels: Vec::new(),
        })
    }

    /// Appends a batch of raw feature rows, L2-normalizing each one.
    ///
    /// A zero vector is stored as-is; there is no direction to preserve.
    pub fn append(&mut self, rows: &[Vec<f32>], labels: &[usize]) -> TrainResult<()> {
        if rows.len() != labels.len() {
            return Err(TrainError::data(format!(
                "embedding append got {} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        for row in rows {
            if row.len() != self.feature_dim {
                return Err(TrainError::ShapeMismatch {
                    context: "embedding append".to_string(),
                    expected: self.feature_dim,
                    actual: row.len(),
                });
            }
            let norm = row.iter().map(|&x| x * x).sum::<f32>().sqrt();
            let unit = if norm > 0.0 {
                row.iter().map(|&x| x / norm).collect()
            } else {
                row.clone()
            };
            self.features.push(unit);
        }
        self.labels.extend_from_slice(labels);
        Ok(())
    }

    /// Drains `stream` through `encoder`, collecting every feature vector.
    pub fn collect_from<B, E, S>(encoder: &mut E, stream: &mut S) -> TrainResult<Self>
    where
        B: Batch,
        E: Encoder<B>,
        S: DataStream<B> + ?Sized,
    {
        let mut set = Self::new(encoder.feature_dim())?;
        stream.reset();
        while let Some(batch) = stream.next_batch() {
            let rows = encoder.encode(&batch)?;
            set.append(&rows, batch.labels())?;
        }
        Ok(set)
    }

    /// Number of collected samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature width of every row.
    #[must_use]
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// The normalized feature rows.
    #[must_use]
    pub fn features(&self) -> &[Vec<f32>] {
        &self.features
    }

    /// Class label per row.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

/// A 2-D projection of an embedding set.
#[derive(Debug, Clone)]
pub struct Projection {
    /// One 2-D point per sample.
    pub points: Vec<[f64; 2]>,
    /// Class label per point, parallel to `points`.
    pub labels: Vec<usize>,
}

/// Projects onto the top two principal components.
///
/// Centers the data, forms the `d x d` covariance matrix, and takes the two
/// eigenvectors with the largest eigenvalues.
pub fn pca_2d(set: &EmbeddingSet) -> TrainResult<Projection> {
    let n = set.len();
    if n < 3 {
        return Err(TrainError::data(
            "PCA projection needs at least 3 samples",
        ));
    }
    let d = set.feature_dim();

    let mut mean = vec![0.0f64; d];
    for row in set.features() {
        for (m, &x) in mean.iter_mut().zip(row.iter()) {
            *m += f64::from(x);
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }

    let centered = DMatrix::from_fn(n, d, |i, j| f64::from(set.features()[i][j]) - mean[j]);
    let covariance = (centered.transpose() * &centered) / (n as f64 - 1.0);

    let eigen = covariance.symmetric_eigen();
    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let axes: Vec<DVector<f64>> = order
        .iter()
        .take(2)
        .map(|&k| eigen.eigenvectors.column(k).into_owned())
        .collect();
    if axes.len() < 2 {
        return Err(TrainError::data(
            "PCA projection needs at least 2 feature dimensions",
        ));
    }

    let points = (0..n)
        .map(|i| {
            let row = centered.row(i);
            let dot = |axis: &DVector<f64>| -> f64 {
                row.iter().zip(axis.iter()).map(|(x, a)| x * a).sum()
            };
            [dot(&axes[0]), dot(&axes[1])]
        })
        .collect();

    Ok(Projection {
        points,
        labels: set.labels().to_vec(),
    })
}

/// t-SNE hyperparameters.
#[derive(Debug, Clone)]
pub struct TsneParams {
    /// Target perplexity of the conditional distributions.
    pub perplexity: f64,
    /// Gradient step size.
    pub learning_rate: f64,
    /// Total gradient iterations.
    pub iterations: usize,
    /// Multiplier applied to affinities during the early phase.
    pub early_exaggeration: f64,
    /// Length of the early-exaggeration phase in iterations.
    pub exaggeration_iters: usize,
    /// Seed for the initial layout.
    pub seed: u64,
}

impl Default for TsneParams {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            learning_rate: 200.0,
            iterations: 1000,
            early_exaggeration: 12.0,
            exaggeration_iters: 250,
            seed: 0,
        }
    }
}

/// Exact t-SNE to two dimensions.
///
/// Quadratic in sample count; intended for the post-training sample sizes
/// this harness projects (thousands, not millions). The perplexity is
/// clamped to `(n - 1) / 3` so the entropy search always converges.
pub fn tsne_2d(set: &EmbeddingSet, params: &TsneParams) -> TrainResult<Projection> {
    let n = set.len();
    if n < 4 {
        return Err(TrainError::data(
            "t-SNE projection needs at least 4 samples",
        ));
    }

    let perplexity = params
        .perplexity
        .min(((n - 1) as f64 / 3.0).max(1.0));
    let p = joint_affinities(set.features(), perplexity);

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(-1e-4..1e-4), rng.gen_range(-1e-4..1e-4)])
        .collect();
    let mut velocity = vec![[0.0f64; 2]; n];

    for iter in 0..params.iterations {
        let exaggeration = if iter < params.exaggeration_iters {
            params.early_exaggeration
        } else {
            1.0
        };
        let momentum = if iter < params.exaggeration_iters {
            0.5
        } else {
            0.8
        };

        // Student-t affinities in the embedding and their normalizer.
        let mut q_num = vec![0.0f64; n * n];
        let mut z = 0.0f64;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = y[i][0] - y[j][0];
                let dy = y[i][1] - y[j][1];
                let q = 1.0 / (1.0 + dx * dx + dy * dy);
                q_num[i * n + j] = q;
                q_num[j * n + i] = q;
                z += 2.0 * q;
            }
        }
        let z = z.max(f64::MIN_POSITIVE);

        for i in 0..n {
            let mut grad = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = q_num[i * n + j];
                let coeff = 4.0 * (exaggeration * p[i * n + j] - q / z) * q;
                grad[0] += coeff * (y[i][0] - y[j][0]);
                grad[1] += coeff * (y[i][1] - y[j][1]);
            }
            for k in 0..2 {
                velocity[i][k] = momentum * velocity[i][k] - params.learning_rate * grad[k];
            }
        }
        for i in 0..n {
            y[i][0] += velocity[i][0];
            y[i][1] += velocity[i][1];
        }
    }

    Ok(Projection {
        points: y,
        labels: set.labels().to_vec(),
    })
}

/// Symmetrized joint affinities `P`, with per-point precision found by
/// bisection on the Shannon entropy to hit the target perplexity.
fn joint_affinities(features: &[Vec<f32>], perplexity: f64) -> Vec<f64> {
    let n = features.len();
    let mut sq_dist = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d: f64 = features[i]
                .iter()
                .zip(features[j].iter())
                .map(|(&a, &b)| {
                    let diff = f64::from(a) - f64::from(b);
                    diff * diff
                })
                .sum();
            sq_dist[i * n + j] = d;
            sq_dist[j * n + i] = d;
        }
    }

    let target_entropy = perplexity.ln();
    let mut p_cond = vec![0.0f64; n * n];
    for i in 0..n {
        let mut beta = 1.0f64;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;
        let row = &sq_dist[i * n..(i + 1) * n];

        // 50 bisection steps pin the entropy well past f64 tolerance.
        for _ in 0..50 {
            let mut sum = 0.0f64;
            let mut weighted = 0.0f64;
            for (j, &d) in row.iter().enumerate() {
                if j == i {
                    continue;
                }
                let w = (-d * beta).exp();
                sum += w;
                weighted += d * w;
            }
            if sum <= 0.0 {
                break;
            }
            let entropy = sum.ln() + beta * weighted / sum;
            let diff = entropy - target_entropy;
            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_finite() {
                    (beta + beta_max) / 2.0
                } else {
                    beta * 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_finite() {
                    (beta + beta_min) / 2.0
                } else {
                    beta / 2.0
                };
            }
        }

        let mut sum = 0.0f64;
        for (j, &d) in row.iter().enumerate() {
            if j != i {
                let w = (-d * beta).exp();
                p_cond[i * n + j] = w;
                sum += w;
            }
        }
        if sum > 0.0 {
            for j in 0..n {
                p_cond[i * n + j] /= sum;
            }
        }
    }

    // Symmetrize and floor so every pair keeps a little attractive force.
    let mut p = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            p[i * n + j] =
                ((p_cond[i * n + j] + p_cond[j * n + i]) / (2.0 * n as f64)).max(1e-12);
        }
    }
    p
}
