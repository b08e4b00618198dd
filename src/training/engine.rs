//! Training engine
//!
//! Runs the full job inside a tracking run: log parameters, load the
//! dataset, split, fit the forest, evaluate, log the metric and the model.

use std::time::Instant;
use tracing::{info, warn};

use super::metrics::{accuracy_score, ClassificationReport};
use super::random_forest::RandomForestClassifier;
use super::split::train_test_split;
use crate::config::TrainingConfig;
use crate::datasets::load_iris;
use crate::error::Result;
use crate::tracking::{ExperimentTracker, LoggedModel, ModelMetadata, RunStatus};

/// Everything a finished job reports back
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run_id: String,
    pub experiment_id: String,
    /// (n_samples, n_features) of the full dataset
    pub dataset_shape: (usize, usize),
    /// Samples per class name, most frequent first
    pub target_distribution: Vec<(String, usize)>,
    pub n_train: usize,
    pub n_test: usize,
    /// Test-set accuracy
    pub accuracy: f64,
    pub report: ClassificationReport,
    pub model: LoggedModel,
    pub training_time_secs: f64,
}

/// Progress reported while a job runs, in the order the stages complete
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    /// Dataset is in memory
    DatasetLoaded {
        shape: (usize, usize),
        target_distribution: Vec<(String, usize)>,
    },
    /// Train/test partition is ready
    DatasetSplit { n_train: usize, n_test: usize },
    /// Forest is fitted
    ModelFitted { training_time_secs: f64 },
    /// Test-set scores are computed, before the model is logged
    Evaluated {
        accuracy: f64,
        report: ClassificationReport,
    },
}

/// Training engine
pub struct TrainEngine {
    config: TrainingConfig,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Forest configured from the job parameters
    pub fn build_model(&self) -> RandomForestClassifier {
        RandomForestClassifier::new(self.config.n_estimators)
            .with_max_depth(self.config.max_depth)
            .with_random_state(self.config.random_state)
    }

    /// Run the job as a new tracking run.
    ///
    /// The run ends as `Finished` on success. Any failure after the run has
    /// started ends it as `Failed` and the original error is returned.
    pub fn run(&self, tracker: &ExperimentTracker) -> Result<TrainingOutcome> {
        self.run_with_progress(tracker, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_event` as each stage completes.
    ///
    /// Events already delivered stay valid when a later stage fails.
    pub fn run_with_progress<F>(&self, tracker: &ExperimentTracker, mut on_event: F) -> Result<TrainingOutcome>
    where
        F: FnMut(&TrainingEvent),
    {
        self.config.validate()?;

        let run_id = tracker.start_run(None)?;
        match self.execute(tracker, &run_id, &mut on_event) {
            Ok(outcome) => {
                tracker.end_run(RunStatus::Finished)?;
                Ok(outcome)
            }
            Err(err) => {
                warn!(%run_id, error = %err, "training run failed");
                if let Err(end_err) = tracker.end_run(RunStatus::Failed) {
                    warn!(%run_id, error = %end_err, "could not mark run as failed");
                }
                Err(err)
            }
        }
    }

    fn execute(
        &self,
        tracker: &ExperimentTracker,
        run_id: &str,
        on_event: &mut dyn FnMut(&TrainingEvent),
    ) -> Result<TrainingOutcome> {
        let config = &self.config;
        tracker.log_params(config.params())?;

        let dataset = load_iris();
        let dataset_shape = dataset.shape();
        let target_distribution: Vec<(String, usize)> = dataset
            .value_counts()
            .into_iter()
            .map(|(label, count)| (dataset.target_name(label), count))
            .collect();
        info!(n_samples = dataset_shape.0, n_features = dataset_shape.1, "loaded iris dataset");
        on_event(&TrainingEvent::DatasetLoaded {
            shape: dataset_shape,
            target_distribution: target_distribution.clone(),
        });

        let split = train_test_split(
            &dataset.data,
            &dataset.target,
            config.test_size,
            Some(config.random_state),
            true,
        )?;
        info!(n_train = split.n_train(), n_test = split.n_test(), "split dataset");
        on_event(&TrainingEvent::DatasetSplit {
            n_train: split.n_train(),
            n_test: split.n_test(),
        });

        let mut model = self.build_model();
        let start = Instant::now();
        model.fit(&split.x_train, &split.y_train)?;
        let training_time_secs = start.elapsed().as_secs_f64();
        info!(
            n_estimators = config.n_estimators,
            max_depth = config.max_depth,
            training_time_secs,
            "fitted random forest"
        );
        on_event(&TrainingEvent::ModelFitted { training_time_secs });

        let y_pred = model.predict(&split.x_test)?;
        let accuracy = accuracy_score(&split.y_test, &y_pred)?;
        let report = ClassificationReport::compute_with_names(&split.y_test, &y_pred, &dataset.target_names)?;
        info!(accuracy, "evaluated on test set");
        on_event(&TrainingEvent::Evaluated {
            accuracy,
            report: report.clone(),
        });

        tracker.log_metric("accuracy", accuracy, None)?;

        let metadata = ModelMetadata::new("random_forest_classifier")
            .with_features(dataset.feature_names.clone())
            .with_targets(dataset.target_names.clone())
            .with_hyperparameters(model.hyperparameters())
            .add_metric("accuracy", accuracy);
        let logged = tracker.log_model(
            &model,
            metadata,
            &config.artifact_path,
            config.registered_model_name.as_deref(),
        )?;

        Ok(TrainingOutcome {
            run_id: run_id.to_string(),
            experiment_id: tracker.experiment().experiment_id.clone(),
            dataset_shape,
            target_distribution,
            n_train: split.n_train(),
            n_test: split.n_test(),
            accuracy,
            report,
            model: logged,
            training_time_secs,
        })
    }
}
