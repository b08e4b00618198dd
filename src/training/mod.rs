//! Model training module
//!
//! Provides the pieces of a supervised classification job:
//! - Train/test splitting with optional stratification
//! - Decision trees and Random Forests
//! - Accuracy, confusion matrix and classification report
//! - The end-to-end training engine that records everything to a tracker

pub mod decision_tree;
mod engine;
pub mod metrics;
pub mod random_forest;
pub mod split;

pub use engine::{TrainEngine, TrainingEvent, TrainingOutcome};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use metrics::{accuracy_score, ClassificationReport, ClassMetrics, ConfusionMatrix};
pub use random_forest::{MaxFeatures, RandomForestClassifier};
pub use split::{train_test_split, ShuffleSplit, SplitIndices, TrainTestSplit};
