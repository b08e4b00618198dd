//! Train/test splitting

use crate::error::{Result, TrainError};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Indices of a single train/test partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Materialized train/test partition
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub indices: SplitIndices,
}

impl TrainTestSplit {
    pub fn n_train(&self) -> usize {
        self.indices.train_indices.len()
    }

    pub fn n_test(&self) -> usize {
        self.indices.test_indices.len()
    }
}

/// Shuffled train/test splitter
#[derive(Debug, Clone)]
pub struct ShuffleSplit {
    test_size: f64,
    random_state: Option<u64>,
    stratify: bool,
}

impl ShuffleSplit {
    /// Create a splitter holding out `test_size` of the samples
    pub fn new(test_size: f64) -> Self {
        Self {
            test_size,
            random_state: None,
            stratify: false,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Preserve class proportions on both sides
    pub fn with_stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    /// Compute (n_train, n_test) for `n_samples`
    pub fn sizes(&self, n_samples: usize) -> Result<(usize, usize)> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(TrainError::invalid_param(
                "test_size",
                self.test_size,
                "must be strictly between 0 and 1",
            ));
        }

        let n_test = (self.test_size * n_samples as f64).ceil() as usize;
        let n_train = n_samples.saturating_sub(n_test);

        if n_train == 0 || n_test == 0 {
            return Err(TrainError::invalid_param(
                "test_size",
                self.test_size,
                format!("with n_samples = {} one of the splits would be empty", n_samples),
            ));
        }

        Ok((n_train, n_test))
    }

    /// Generate the index partition
    pub fn split_indices(&self, y: &Array1<f64>) -> Result<SplitIndices> {
        let n_samples = y.len();
        let (n_train, n_test) = self.sizes(n_samples)?;

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        if !self.stratify {
            let mut indices: Vec<usize> = (0..n_samples).collect();
            indices.shuffle(&mut rng);
            let test_indices = indices[..n_test].to_vec();
            let train_indices = indices[n_test..].to_vec();
            return Ok(SplitIndices { train_indices, test_indices });
        }

        // Group samples by class, ordered by class label
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        let n_classes = class_indices.len();
        if let Some((class, members)) = class_indices.iter().find(|(_, m)| m.len() < 2) {
            return Err(TrainError::InvalidInput(format!(
                "the least populated class in y ({}) has only {} member, too few to stratify",
                class,
                members.len()
            )));
        }
        if n_train < n_classes {
            return Err(TrainError::invalid_param(
                "test_size",
                self.test_size,
                format!("train size {} is smaller than the number of classes {}", n_train, n_classes),
            ));
        }
        if n_test < n_classes {
            return Err(TrainError::invalid_param(
                "test_size",
                self.test_size,
                format!("test size {} is smaller than the number of classes {}", n_test, n_classes),
            ));
        }

        let class_counts: Vec<usize> = class_indices.values().map(|m| m.len()).collect();
        let train_counts = allocate_proportionally(&class_counts, n_train);
        let remaining: Vec<usize> = class_counts
            .iter()
            .zip(train_counts.iter())
            .map(|(c, t)| c - t)
            .collect();
        let test_counts = allocate_proportionally(&remaining, n_test);

        let mut train_indices = Vec::with_capacity(n_train);
        let mut test_indices = Vec::with_capacity(n_test);

        for (k, members) in class_indices.values_mut().enumerate() {
            members.shuffle(&mut rng);
            let n_tr = train_counts[k];
            let n_te = test_counts[k];
            train_indices.extend_from_slice(&members[..n_tr]);
            test_indices.extend_from_slice(&members[n_tr..n_tr + n_te]);
        }

        train_indices.shuffle(&mut rng);
        test_indices.shuffle(&mut rng);

        Ok(SplitIndices { train_indices, test_indices })
    }

    /// Split features and labels
    pub fn split(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainTestSplit> {
        if x.nrows() != y.len() {
            return Err(TrainError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let indices = self.split_indices(y)?;

        Ok(TrainTestSplit {
            x_train: x.select(Axis(0), &indices.train_indices),
            x_test: x.select(Axis(0), &indices.test_indices),
            y_train: y.select(Axis(0), &indices.train_indices),
            y_test: y.select(Axis(0), &indices.test_indices),
            indices,
        })
    }
}

/// Split into random train and test subsets
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_size: f64,
    random_state: Option<u64>,
    stratify: bool,
) -> Result<TrainTestSplit> {
    let mut splitter = ShuffleSplit::new(test_size).with_stratify(stratify);
    if let Some(seed) = random_state {
        splitter = splitter.with_random_state(seed);
    }
    splitter.split(x, y)
}

/// Distribute `n_draws` across classes in proportion to `class_counts`.
///
/// Each class gets the floor of its share; leftover slots go to the classes
/// with the largest fractional parts, ties broken by class order. No class
/// receives more than it holds.
fn allocate_proportionally(class_counts: &[usize], n_draws: usize) -> Vec<usize> {
    let total: usize = class_counts.iter().sum();
    if total == 0 {
        return vec![0; class_counts.len()];
    }

    let shares: Vec<f64> = class_counts
        .iter()
        .map(|&c| n_draws as f64 * c as f64 / total as f64)
        .collect();
    let mut allocated: Vec<usize> = shares
        .iter()
        .zip(class_counts.iter())
        .map(|(s, &c)| (s.floor() as usize).min(c))
        .collect();

    let mut order: Vec<usize> = (0..class_counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = shares[a] - shares[a].floor();
        let rb = shares[b] - shares[b].floor();
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut left = n_draws.saturating_sub(allocated.iter().sum());
    while left > 0 {
        let mut progressed = false;
        for &k in &order {
            if left == 0 {
                break;
            }
            if allocated[k] < class_counts[k] {
                allocated[k] += 1;
                left -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    allocated
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use std::collections::HashSet;

    fn balanced_labels(per_class: usize, n_classes: usize) -> Array1<f64> {
        Array1::from_shape_fn(per_class * n_classes, |i| (i / per_class) as f64)
    }

    #[test]
    fn test_sizes_round_test_up() {
        let splitter = ShuffleSplit::new(0.2);
        assert_eq!(splitter.sizes(150).unwrap(), (120, 30));

        let splitter = ShuffleSplit::new(0.25);
        assert_eq!(splitter.sizes(10).unwrap(), (7, 3));
    }

    #[test]
    fn test_invalid_test_size() {
        for bad in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let splitter = ShuffleSplit::new(bad);
            assert!(matches!(
                splitter.sizes(100),
                Err(TrainError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_stratified_preserves_proportions() {
        let y = balanced_labels(50, 3);
        let splitter = ShuffleSplit::new(0.2).with_random_state(42).with_stratify(true);
        let split = splitter.split_indices(&y).unwrap();

        assert_eq!(split.train_indices.len(), 120);
        assert_eq!(split.test_indices.len(), 30);

        for class in 0..3 {
            let in_test = split
                .test_indices
                .iter()
                .filter(|&&i| y[i] as usize == class)
                .count();
            assert_eq!(in_test, 10, "class {} test count", class);
        }
    }

    #[test]
    fn test_partition_is_disjoint_and_covering() {
        let y = Array1::from_vec((0..37).map(|i| (i % 4) as f64).collect());
        let splitter = ShuffleSplit::new(0.3).with_random_state(7).with_stratify(true);
        let split = splitter.split_indices(&y).unwrap();

        let train: HashSet<usize> = split.train_indices.iter().copied().collect();
        let test: HashSet<usize> = split.test_indices.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 37);
        assert_eq!(test.len(), 12);
    }

    #[test]
    fn test_same_seed_same_split() {
        let y = balanced_labels(20, 2);
        let a = ShuffleSplit::new(0.25).with_random_state(3).with_stratify(true);
        let b = ShuffleSplit::new(0.25).with_random_state(3).with_stratify(true);
        assert_eq!(a.split_indices(&y).unwrap(), b.split_indices(&y).unwrap());

        let c = ShuffleSplit::new(0.25).with_random_state(4).with_stratify(true);
        assert_ne!(a.split_indices(&y).unwrap(), c.split_indices(&y).unwrap());
    }

    #[test]
    fn test_singleton_class_rejected() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let splitter = ShuffleSplit::new(0.5).with_random_state(0).with_stratify(true);
        assert!(matches!(splitter.split_indices(&y), Err(TrainError::InvalidInput(_))));
    }

    #[test]
    fn test_test_side_smaller_than_class_count() {
        let y = balanced_labels(10, 3);
        let splitter = ShuffleSplit::new(0.05).with_random_state(0).with_stratify(true);
        assert!(matches!(
            splitter.split_indices(&y),
            Err(TrainError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_split_materializes_rows() {
        let x = Array::from_shape_fn((10, 2), |(i, j)| (i * 10 + j) as f64);
        let y = balanced_labels(5, 2);
        let split = train_test_split(&x, &y, 0.2, Some(1), true).unwrap();

        assert_eq!(split.x_train.nrows(), 8);
        assert_eq!(split.x_test.nrows(), 2);
        for (row, &idx) in split.indices.test_indices.iter().enumerate() {
            assert_eq!(split.x_test[[row, 0]], (idx * 10) as f64);
            assert_eq!(split.y_test[row], y[idx]);
        }
    }

    #[test]
    fn test_allocate_proportionally() {
        assert_eq!(allocate_proportionally(&[50, 50, 50], 120), vec![40, 40, 40]);
        assert_eq!(allocate_proportionally(&[10, 10, 10], 10), vec![4, 3, 3]);
        assert_eq!(allocate_proportionally(&[1, 9], 5), vec![1, 4]);
    }
}
