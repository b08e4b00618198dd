//! Integration test: training pipeline end-to-end

use iris_train::config::{TrackingConfig, TrainingConfig};
use iris_train::datasets::load_iris;
use iris_train::tracking::{load_model, ExperimentTracker, ModelMetadata, RunStatus};
use iris_train::training::{
    accuracy_score, train_test_split, ClassificationReport, RandomForestClassifier, TrainEngine,
};

#[test]
fn test_random_forest_on_iris() {
    let iris = load_iris();
    let split = train_test_split(&iris.data, &iris.target, 0.2, Some(42), true).unwrap();

    let mut rf = RandomForestClassifier::new(100).with_max_depth(5).with_random_state(42);
    rf.fit(&split.x_train, &split.y_train).unwrap();

    let y_pred = rf.predict(&split.x_test).unwrap();
    let accuracy = accuracy_score(&split.y_test, &y_pred).unwrap();
    assert!(accuracy >= 0.85, "accuracy too low: {}", accuracy);

    let report = ClassificationReport::compute_with_names(&split.y_test, &y_pred, &iris.target_names).unwrap();
    assert_eq!(report.classes.len(), 3);
    assert!(report.classes.iter().all(|c| c.support == 10));

    // Petal measurements carry most of the signal
    let imp = rf.feature_importances().unwrap();
    assert!(imp[2] + imp[3] > imp[0] + imp[1]);
}

#[test]
fn test_single_tree_forest_still_trains() {
    let iris = load_iris();
    let mut rf = RandomForestClassifier::new(1).with_max_depth(1).with_random_state(0);
    rf.fit(&iris.data, &iris.target).unwrap();

    let accuracy = rf.score(&iris.data, &iris.target).unwrap();
    assert!((0.0..=1.0).contains(&accuracy));
    assert_eq!(rf.n_trees(), 1);
}

#[test]
fn test_engine_writes_local_store() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = ExperimentTracker::open(TrackingConfig::with_dir(dir.path())).unwrap();

    let config = TrainingConfig::new().with_n_estimators(20);
    let outcome = TrainEngine::new(config).run(&tracker).unwrap();

    assert!(outcome.accuracy >= 0.85, "accuracy too low: {}", outcome.accuracy);
    assert_eq!(outcome.target_distribution.len(), 3);
    assert_eq!(outcome.target_distribution[0], ("setosa".to_string(), 50));

    let run_dir = dir.path().join(&outcome.experiment_id).join(&outcome.run_id);
    assert!(run_dir.join("run.json").is_file());
    assert!(run_dir.join("artifacts/model/model.json").is_file());
    assert!(run_dir.join("artifacts/model/metadata.json").is_file());

    let (model, metadata): (RandomForestClassifier, ModelMetadata) =
        load_model(&outcome.model.model_uri).unwrap();
    assert_eq!(model.n_trees(), 20);
    assert_eq!(metadata.run_id.as_deref(), Some(outcome.run_id.as_str()));
    let logged_accuracy = metadata.metrics.get("accuracy").copied().unwrap();
    assert!((logged_accuracy - outcome.accuracy).abs() < 1e-12);
    assert_eq!(metadata.feature_names.len(), 4);

    let iris = load_iris();
    assert_eq!(model.predict(&iris.data).unwrap().len(), 150);
}

#[test]
fn test_repeated_runs_version_the_registered_model() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = ExperimentTracker::open(TrackingConfig::with_dir(dir.path())).unwrap();
    let config = TrainingConfig::new().with_n_estimators(10);

    let first = TrainEngine::new(config.clone()).run(&tracker).unwrap();
    let second = TrainEngine::new(config).run(&tracker).unwrap();

    assert_eq!(first.model.registered_version.as_ref().unwrap().version, 1);
    assert_eq!(second.model.registered_version.as_ref().unwrap().version, 2);

    // Same seed, same data: same model bytes
    assert_eq!(first.model.checksum, second.model.checksum);
    assert_eq!(first.accuracy, second.accuracy);

    let registered = tracker.get_registered_model("iris_random_forest").unwrap().unwrap();
    assert_eq!(registered.latest_version().unwrap().run_id, second.run_id);

    let runs = tracker.list_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Finished));
}

#[test]
fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::with_dir(dir.path()).with_experiment_name("iris");

    let run_id = {
        let tracker = ExperimentTracker::open(config.clone()).unwrap();
        TrainEngine::new(TrainingConfig::new().with_n_estimators(5))
            .run(&tracker)
            .unwrap()
            .run_id
    };

    let reopened = ExperimentTracker::open(config).unwrap();
    assert_eq!(reopened.experiment().name, "iris");
    let run = reopened.get_run(&run_id).unwrap();
    assert_eq!(run.params.get("n_estimators").map(String::as_str), Some("5"));
    assert!(run.metrics.contains_key("accuracy"));
}
