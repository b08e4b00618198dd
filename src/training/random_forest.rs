//! Random forest classifier

use crate::error::{Result, TrainError};
use super::decision_tree::{argmax, encode_labels, unique_classes, Criterion, DecisionTree};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random forest classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state
    pub random_state: Option<u64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
    /// Class labels, sorted ascending
    classes: Vec<f64>,
}

/// Strategy for max features
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl std::fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::Fraction(v) => write!(f, "{}", v),
            MaxFeatures::Fixed(n) => write!(f, "{}", n),
            MaxFeatures::All => write!(f, "all"),
        }
    }
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestClassifier {
    /// Create a new forest with `n_estimators` trees
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
            feature_importances: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Enable or disable bootstrap sampling
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(TrainError::invalid_param("n_estimators", 0, "must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(TrainError::invalid_param("max_depth", 0, "must be at least 1"));
        }
        if self.min_samples_leaf == 0 {
            return Err(TrainError::invalid_param("min_samples_leaf", 0, "must be at least 1"));
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(TrainError::invalid_param("max_features", f, "fraction must be in (0, 1]"));
            }
        }
        Ok(())
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(TrainError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(TrainError::InvalidInput("cannot fit on an empty dataset".to_string()));
        }

        self.n_features = n_features;
        let max_features = self.compute_max_features(n_features);

        let classes = unique_classes(y);
        let encoded = encode_labels(y, &classes);

        // Seeds are drawn up front so the result is independent of scheduling
        let mut master = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.next_u64()).collect();

        let trees: Vec<DecisionTree> = seeds
            .into_par_iter()
            .map(|seed| -> Result<DecisionTree> {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Vec<usize> = sample_indices.iter().map(|&i| encoded[i]).collect();

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_criterion(self.criterion)
                    .with_max_features(max_features)
                    .with_random_state(rng.next_u64());

                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit_encoded(&x_boot, &y_boot, classes.clone())?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            n_trees = trees.len(),
            mean_depth = trees.iter().map(|t| t.get_depth()).sum::<usize>() as f64 / trees.len() as f64,
            "forest fitted"
        );

        self.trees = trees;
        self.classes = classes;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];

        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (i, &val) in imp.iter().enumerate() {
                    if i < self.n_features {
                        total_importances[i] += val;
                    }
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for imp in &mut total_importances {
            *imp /= n_trees;
        }

        // Normalize
        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Predict class probabilities as the mean of the tree distributions
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(TrainError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(TrainError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let sum = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .try_reduce(
                || Array2::zeros((x.nrows(), self.classes.len())),
                |a, b| Ok(a + b),
            )?;

        Ok(sum / self.trees.len() as f64)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    /// Mean accuracy on the given data
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let predictions = self.predict(x)?;
        super::metrics::accuracy_score(y, &predictions)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Class labels seen during fit
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fitted trees
    pub fn estimators(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Constructor parameters as name/value pairs
    pub fn hyperparameters(&self) -> Vec<(String, String)> {
        vec![
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            (
                "max_depth".to_string(),
                self.max_depth.map_or("None".to_string(), |d| d.to_string()),
            ),
            ("min_samples_split".to_string(), self.min_samples_split.to_string()),
            ("min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
            ("max_features".to_string(), self.max_features.to_string()),
            ("bootstrap".to_string(), self.bootstrap.to_string()),
            ("criterion".to_string(), self.criterion.to_string()),
            (
                "random_state".to_string(),
                self.random_state.map_or("None".to_string(), |s| s.to_string()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.2],
            [0.1, 0.0],
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.2],
            [1.1, 1.0],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_classifier() {
        let (x, y) = two_blobs();

        let mut rf = RandomForestClassifier::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let accuracy = rf.score(&x, &y).unwrap();
        assert!(accuracy >= 0.8, "Accuracy too low: {}", accuracy);
        assert_eq!(rf.n_trees(), 10);
    }

    #[test]
    fn test_predict_proba() {
        let (x, y) = two_blobs();

        let mut rf = RandomForestClassifier::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();

        assert_eq!(proba.nrows(), 8);
        assert_eq!(proba.ncols(), 2);

        for i in 0..proba.nrows() {
            let row_sum: f64 = proba.row(i).sum();
            assert!((row_sum - 1.0).abs() < 1e-6, "Row {} sum: {}", i, row_sum);
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let (x, y) = two_blobs();

        let mut a = RandomForestClassifier::new(15).with_max_depth(3).with_random_state(7);
        let mut b = RandomForestClassifier::new(15).with_max_depth(3).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_max_depth_respected() {
        let (x, y) = two_blobs();

        let mut rf = RandomForestClassifier::new(5).with_max_depth(1).with_random_state(0);
        rf.fit(&x, &y).unwrap();

        assert!(rf.estimators().iter().all(|t| t.get_depth() <= 1));
    }

    #[test]
    fn test_original_labels_returned() {
        let x = array![[0.0], [0.1], [0.2], [5.0], [5.1], [5.2]];
        let y = array![3.0, 3.0, 3.0, 8.0, 8.0, 8.0];

        let mut rf = RandomForestClassifier::new(5).with_random_state(1).with_bootstrap(false);
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.classes(), &[3.0, 8.0]);
        assert_eq!(rf.predict(&array![[0.05], [5.05]]).unwrap(), array![3.0, 8.0]);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![
            [1.0, 0.0],
            [2.0, 0.0],
            [3.0, 0.0],
            [4.0, 0.0],
        ];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut rf = RandomForestClassifier::new(10)
            .with_max_features(MaxFeatures::All)
            .with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!(importances[0] >= importances[1]);
    }

    #[test]
    fn test_invalid_parameters() {
        let (x, y) = two_blobs();

        let mut rf = RandomForestClassifier::new(0);
        assert!(matches!(rf.fit(&x, &y), Err(TrainError::InvalidParameter { .. })));

        let mut rf = RandomForestClassifier::new(3).with_max_depth(0);
        assert!(matches!(rf.fit(&x, &y), Err(TrainError::InvalidParameter { .. })));
    }

    #[test]
    fn test_not_fitted() {
        let rf = RandomForestClassifier::new(3);
        assert!(matches!(rf.predict(&array![[1.0, 2.0]]), Err(TrainError::ModelNotFitted)));
    }

    #[test]
    fn test_hyperparameters() {
        let rf = RandomForestClassifier::new(100).with_max_depth(5).with_random_state(42);
        let params = rf.hyperparameters();
        assert!(params.contains(&("n_estimators".to_string(), "100".to_string())));
        assert!(params.contains(&("max_depth".to_string(), "5".to_string())));
        assert!(params.contains(&("random_state".to_string(), "42".to_string())));
    }
}
