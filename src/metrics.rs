//! Streaming metric accumulation and top-K accuracy scoring.
//!
//! [`AverageMeter`] tracks a weighted running mean over a stream of batch
//! observations (loss, accuracy, timings). Meters are created fresh at the
//! start of each pass and never shared across passes. Plain double-precision
//! summation is sufficient for run lengths up to tens of thousands of
//! batches; no compensated summation is needed at this scale.

/// Running mean/count tracker for scalar observations.
///
/// # Example
///
/// ```
/// use supervised_trainer_rs::metrics::AverageMeter;
///
/// let mut losses = AverageMeter::new();
/// losses.update(2.0, 32);
/// losses.update(1.0, 96);
/// assert!((losses.average() - 1.25).abs() < 1e-12);
/// assert!((losses.current() - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AverageMeter {
    val: f64,
    sum: f64,
    count: u64,
}

impl AverageMeter {
    /// Creates an empty meter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all accumulated state.
    pub fn reset(&mut self) {
        self.val = 0.0;
        self.sum = 0.0;
        self.count = 0;
    }

    /// Folds one observation of `value` with sample weight `weight` into the
    /// running sum and count.
    pub fn update(&mut self, value: f64, weight: usize) {
        self.val = value;
        self.sum += value * weight as f64;
        self.count += weight as u64;
    }

    /// The most recent raw value, for "instantaneous" log lines.
    #[must_use]
    pub fn current(&self) -> f64 {
        self.val
    }

    /// The weighted mean of all observations so far.
    ///
    /// Zero by convention when no update has occurred; callers are expected
    /// to only read the average after at least one update.
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Number of samples folded in so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Computes exact-match accuracy at each requested K, as percentages in
/// [0, 100].
///
/// For each sample the C class scores are ranked descending (ties broken by
/// stable index order) and the sample counts as correct at K if its true
/// label appears among the top K indices. A requested K larger than C is
/// defined as always-correct rather than an error.
///
/// # Panics
///
/// Panics if `scores` and `labels` lengths differ; the epoch loop always
/// passes parallel batches.
#[must_use]
pub fn topk_accuracy(scores: &[Vec<f32>], labels: &[usize], topk: &[usize]) -> Vec<f64> {
    assert_eq!(
        scores.len(),
        labels.len(),
        "scores and labels must be parallel"
    );
    let batch = scores.len();
    if batch == 0 {
        return topk.iter().map(|_| 0.0).collect();
    }
    let max_k = topk.iter().copied().max().unwrap_or(1);

    // Rank once per sample up to the largest requested K, then answer every
    // K from the same ranking.
    let mut correct_at = vec![0usize; topk.len()];
    for (sample_scores, &label) in scores.iter().zip(labels.iter()) {
        let classes = sample_scores.len();
        let mut order: Vec<usize> = (0..classes).collect();
        // Stable sort keeps equal scores in index order.
        order.sort_by(|&a, &b| {
            sample_scores[b]
                .partial_cmp(&sample_scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let depth = max_k.min(classes);
        let rank = order[..depth].iter().position(|&c| c == label);

        for (slot, &k) in correct_at.iter_mut().zip(topk.iter()) {
            let hit = if k >= classes {
                // Top-K over all classes trivially contains the label.
                true
            } else {
                matches!(rank, Some(r) if r < k)
            };
            if hit {
                *slot += 1;
            }
        }
    }

    correct_at
        .into_iter()
        .map(|c| 100.0 * c as f64 / batch as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_matches_independent_weighted_mean() {
        let observations = [(0.5, 10), (1.5, 30), (0.25, 4), (3.0, 256)];
        let mut meter = AverageMeter::new();
        let mut sum = 0.0;
        let mut count = 0usize;
        for &(value, weight) in &observations {
            meter.update(value, weight);
            sum += value * weight as f64;
            count += weight;
        }
        assert!((meter.average() - sum / count as f64).abs() < 1e-12);
        assert_eq!(meter.count(), count as u64);
        assert!((meter.current() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_meter_reset() {
        let mut meter = AverageMeter::new();
        meter.update(5.0, 2);
        meter.reset();
        assert_eq!(meter.count(), 0);
        assert!((meter.average()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_meter_average_is_zero() {
        let meter = AverageMeter::new();
        assert!((meter.average()).abs() < 1e-12);
    }

    #[test]
    fn test_top1_all_correct() {
        let scores = vec![vec![0.1, 0.9, 0.0], vec![0.8, 0.1, 0.1]];
        let acc = topk_accuracy(&scores, &[1, 0], &[1]);
        assert!((acc[0] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_top1_all_wrong() {
        let scores = vec![vec![0.1, 0.9, 0.0], vec![0.8, 0.1, 0.1]];
        let acc = topk_accuracy(&scores, &[0, 1], &[1]);
        assert!(acc[0].abs() < 1e-12);
    }

    #[test]
    fn test_top5_with_three_classes_is_always_correct() {
        let scores = vec![vec![0.1, 0.9, 0.0], vec![0.8, 0.1, 0.1]];
        let acc = topk_accuracy(&scores, &[2, 2], &[1, 5]);
        assert!(acc[0] < 100.0);
        assert!((acc[1] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_break_by_index_order() {
        // Classes 0 and 1 tie; stable ordering keeps index 0 first.
        let scores = vec![vec![0.5, 0.5, 0.0]];
        assert!((topk_accuracy(&scores, &[0], &[1])[0] - 100.0).abs() < 1e-12);
        assert!(topk_accuracy(&scores, &[1], &[1])[0].abs() < 1e-12);
        assert!((topk_accuracy(&scores, &[1], &[2])[0] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_batch_accuracy() {
        let scores = vec![
            vec![0.9, 0.1],
            vec![0.2, 0.8],
            vec![0.6, 0.4],
            vec![0.3, 0.7],
        ];
        let acc = topk_accuracy(&scores, &[0, 1, 1, 0], &[1]);
        assert!((acc[0] - 50.0).abs() < 1e-12);
    }
}
