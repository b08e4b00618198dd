//! Built-in datasets
//!
//! Small canned tables that ship inside the binary, so a training job can run
//! without any data files on disk.

mod iris;

pub use iris::load_iris;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A labelled feature table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature matrix, one row per sample
    pub data: Array2<f64>,
    /// Class labels, encoded as 0..n_classes
    pub target: Array1<f64>,
    /// Column names of `data`
    pub feature_names: Vec<String>,
    /// Human-readable class names, indexed by label
    pub target_names: Vec<String>,
}

impl Dataset {
    /// (n_samples, n_features)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.target_names.len()
    }

    /// Count of samples per class, most frequent first.
    ///
    /// Ties are listed in ascending class order.
    pub fn value_counts(&self) -> Vec<(usize, usize)> {
        let mut counts = vec![0usize; self.n_classes()];
        for &label in self.target.iter() {
            let idx = label.round() as usize;
            if idx >= counts.len() {
                counts.resize(idx + 1, 0);
            }
            counts[idx] += 1;
        }

        let mut pairs: Vec<(usize, usize)> = counts.into_iter().enumerate().collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        pairs
    }

    /// Name of a class label, falling back to the label itself
    pub fn target_name(&self, label: usize) -> String {
        self.target_names
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.to_string())
    }
}
