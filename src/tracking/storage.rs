//! Storage Backend for Experiment Tracking
//!
//! Provides storage backends for persisting experiments, runs, artifacts and
//! registered models.

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

use super::registry::RegisteredModel;
use super::tracker::{Experiment, Run};
use crate::error::{Result, TrainError};

/// Storage backend trait
pub trait StorageBackend: Send + Sync {
    /// Create or overwrite an experiment record
    fn save_experiment(&self, experiment: &Experiment) -> Result<()>;

    /// All known experiments
    fn load_experiments(&self) -> Result<Vec<Experiment>>;

    /// Create or overwrite a run record
    fn save_run(&self, run: &Run) -> Result<()>;

    /// Load a single run
    fn load_run(&self, experiment_id: &str, run_id: &str) -> Result<Run>;

    /// All runs of an experiment, oldest first
    fn list_runs(&self, experiment_id: &str) -> Result<Vec<Run>>;

    /// Store an artifact file under the run, returning its URI
    fn write_artifact(&self, experiment_id: &str, run_id: &str, rel_path: &str, bytes: &[u8]) -> Result<String>;

    /// Read an artifact file back
    fn read_artifact(&self, experiment_id: &str, run_id: &str, rel_path: &str) -> Result<Vec<u8>>;

    /// Root URI of a run's artifacts
    fn artifact_uri(&self, experiment_id: &str, run_id: &str) -> String;

    /// Create or overwrite a registered model
    fn save_registered_model(&self, model: &RegisteredModel) -> Result<()>;

    /// Look up a registered model by name
    fn load_registered_model(&self, name: &str) -> Result<Option<RegisteredModel>>;

    /// Run `f` while holding the store-wide write lock.
    ///
    /// Read-modify-write sequences on shared records (experiment ids,
    /// registry versions) go through here so concurrent writers to the same
    /// store never claim the same id.
    fn with_lock(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()>;

    /// Check if storage is available
    fn is_available(&self) -> bool;
}

/// Run `f` under the backend's store lock and return its value
pub(crate) fn locked<T>(storage: &dyn StorageBackend, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let mut f = Some(f);
    let mut out = None;
    storage.with_lock(&mut || {
        if let Some(f) = f.take() {
            out = Some(f()?);
        }
        Ok(())
    })?;
    out.ok_or_else(|| TrainError::TrackingError("store lock callback did not run".to_string()))
}

const EXPERIMENT_FILE: &str = "meta.json";
const RUN_FILE: &str = "run.json";
const REGISTERED_MODEL_FILE: &str = "registered_model.json";
const MODELS_DIR: &str = "models";
const ARTIFACTS_DIR: &str = "artifacts";
const LOCK_FILE: &str = ".lock";

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(5);

/// Exclusive lock held by creating a file, removed on drop
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> Result<Self> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(TrainError::TrackingError(format!(
                            "timed out waiting for store lock {} (remove it if no other writer is running)",
                            path.display()
                        )));
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "could not release store lock");
        }
    }
}

/// Local file system storage backend
///
/// ```text
/// <root>/<experiment_id>/meta.json
/// <root>/<experiment_id>/<run_id>/run.json
/// <root>/<experiment_id>/<run_id>/artifacts/...
/// <root>/models/<name>/registered_model.json
/// ```
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend, creating the root directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.base_dir.join(experiment_id)
    }

    fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment_id).join(run_id)
    }

    /// Directory holding a run's artifacts
    pub fn artifact_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join(ARTIFACTS_DIR)
    }

    fn registered_model_file(&self, name: &str) -> PathBuf {
        self.base_dir.join(MODELS_DIR).join(name).join(REGISTERED_MODEL_FILE)
    }
}

impl StorageBackend for LocalStorage {
    fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        let path = self.experiment_dir(&experiment.experiment_id).join(EXPERIMENT_FILE);
        write_json(&path, experiment)
    }

    fn load_experiments(&self) -> Result<Vec<Experiment>> {
        let mut experiments = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let meta = entry?.path().join(EXPERIMENT_FILE);
            if meta.is_file() {
                experiments.push(read_json(&meta)?);
            }
        }
        experiments.sort_by(|a: &Experiment, b: &Experiment| a.created_at.cmp(&b.created_at));
        Ok(experiments)
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        let path = self.run_dir(&run.experiment_id, &run.run_id).join(RUN_FILE);
        write_json(&path, run)
    }

    fn load_run(&self, experiment_id: &str, run_id: &str) -> Result<Run> {
        let path = self.run_dir(experiment_id, run_id).join(RUN_FILE);
        if !path.is_file() {
            return Err(TrainError::TrackingError(format!(
                "run '{}' not found in experiment '{}'",
                run_id, experiment_id
            )));
        }
        read_json(&path)
    }

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        let dir = self.experiment_dir(experiment_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let run_file = entry?.path().join(RUN_FILE);
            if run_file.is_file() {
                runs.push(read_json(&run_file)?);
            }
        }
        runs.sort_by(|a: &Run, b: &Run| a.start_time.cmp(&b.start_time));
        Ok(runs)
    }

    fn write_artifact(&self, experiment_id: &str, run_id: &str, rel_path: &str, bytes: &[u8]) -> Result<String> {
        let rel = checked_relative(rel_path)?;
        let path = self.artifact_dir(experiment_id, run_id).join(rel);
        write_bytes(&path, bytes)?;
        Ok(path.display().to_string())
    }

    fn read_artifact(&self, experiment_id: &str, run_id: &str, rel_path: &str) -> Result<Vec<u8>> {
        let rel = checked_relative(rel_path)?;
        Ok(fs::read(self.artifact_dir(experiment_id, run_id).join(rel))?)
    }

    fn artifact_uri(&self, experiment_id: &str, run_id: &str) -> String {
        self.artifact_dir(experiment_id, run_id).display().to_string()
    }

    fn save_registered_model(&self, model: &RegisteredModel) -> Result<()> {
        write_json(&self.registered_model_file(&model.name), model)
    }

    fn load_registered_model(&self, name: &str) -> Result<Option<RegisteredModel>> {
        let path = self.registered_model_file(name);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn with_lock(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _lock = LockFile::acquire(self.base_dir.join(LOCK_FILE))?;
        f()
    }

    fn is_available(&self) -> bool {
        fs::create_dir_all(&self.base_dir).is_ok()
    }
}

/// Volatile backend, handy for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    experiments: RwLock<HashMap<String, Experiment>>,
    runs: RwLock<HashMap<(String, String), Run>>,
    artifacts: RwLock<HashMap<String, Vec<u8>>>,
    models: RwLock<HashMap<String, RegisteredModel>>,
    lock: Mutex<()>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn artifact_key(&self, experiment_id: &str, run_id: &str, rel: &Path) -> String {
        format!("{}/{}", self.artifact_uri(experiment_id, run_id), rel.display())
    }
}

impl StorageBackend for InMemoryStorage {
    fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.experiments
            .write()
            .insert(experiment.experiment_id.clone(), experiment.clone());
        Ok(())
    }

    fn load_experiments(&self) -> Result<Vec<Experiment>> {
        let mut experiments: Vec<Experiment> = self.experiments.read().values().cloned().collect();
        experiments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(experiments)
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        self.runs
            .write()
            .insert((run.experiment_id.clone(), run.run_id.clone()), run.clone());
        Ok(())
    }

    fn load_run(&self, experiment_id: &str, run_id: &str) -> Result<Run> {
        self.runs
            .read()
            .get(&(experiment_id.to_string(), run_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                TrainError::TrackingError(format!(
                    "run '{}' not found in experiment '{}'",
                    run_id, experiment_id
                ))
            })
    }

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .read()
            .values()
            .filter(|r| r.experiment_id == experiment_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(runs)
    }

    fn write_artifact(&self, experiment_id: &str, run_id: &str, rel_path: &str, bytes: &[u8]) -> Result<String> {
        let rel = checked_relative(rel_path)?;
        let key = self.artifact_key(experiment_id, run_id, &rel);
        self.artifacts.write().insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    fn read_artifact(&self, experiment_id: &str, run_id: &str, rel_path: &str) -> Result<Vec<u8>> {
        let rel = checked_relative(rel_path)?;
        let key = self.artifact_key(experiment_id, run_id, &rel);
        self.artifacts
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| TrainError::TrackingError(format!("artifact '{}' not found", key)))
    }

    fn artifact_uri(&self, experiment_id: &str, run_id: &str) -> String {
        format!("memory://{}/{}/{}", experiment_id, run_id, ARTIFACTS_DIR)
    }

    fn save_registered_model(&self, model: &RegisteredModel) -> Result<()> {
        self.models.write().insert(model.name.clone(), model.clone());
        Ok(())
    }

    fn load_registered_model(&self, name: &str) -> Result<Option<RegisteredModel>> {
        Ok(self.models.read().get(name).cloned())
    }

    fn with_lock(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _lock = self.lock.lock();
        f()
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Artifact paths must stay inside the run's artifact directory
fn checked_relative(rel_path: &str) -> Result<PathBuf> {
    let path = Path::new(rel_path);
    let ok = !rel_path.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(TrainError::InvalidInput(format!(
            "artifact path '{}' must be relative and must not leave the artifact directory",
            rel_path
        )));
    }
    Ok(path.to_path_buf())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Write then rename so readers never observe a half-written file
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &json)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_storage_save_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();

        let mut exp = Experiment::new("0", "Test Experiment");
        exp.tags.insert("env".to_string(), "test".to_string());
        storage.save_experiment(&exp).unwrap();

        let loaded = storage.load_experiments().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Test Experiment");
        assert_eq!(loaded[0].tags.get("env").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_run_roundtrip_and_listing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();
        storage.save_experiment(&Experiment::new("0", "Default")).unwrap();

        let mut run = Run::new("0", Some("first"));
        run.params.insert("max_depth".to_string(), "5".to_string());
        storage.save_run(&run).unwrap();

        let loaded = storage.load_run("0", &run.run_id).unwrap();
        assert_eq!(loaded.params.get("max_depth").map(String::as_str), Some("5"));
        assert_eq!(storage.list_runs("0").unwrap().len(), 1);
        assert!(storage.list_runs("42").unwrap().is_empty());
        assert!(storage.load_run("0", "missing").is_err());
    }

    #[test]
    fn test_artifacts_stay_inside_run() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();

        let uri = storage.write_artifact("0", "abc", "model/model.json", b"{}").unwrap();
        assert!(uri.ends_with("model.json"));
        assert_eq!(storage.read_artifact("0", "abc", "model/model.json").unwrap(), b"{}");

        assert!(storage.write_artifact("0", "abc", "../escape.txt", b"x").is_err());
        assert!(storage.write_artifact("0", "abc", "/etc/passwd", b"x").is_err());
        assert!(storage.write_artifact("0", "abc", "", b"x").is_err());
    }

    #[test]
    fn test_registered_model_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();

        assert!(storage.load_registered_model("iris_random_forest").unwrap().is_none());

        let mut model = RegisteredModel::new("iris_random_forest").unwrap();
        model.add_version("abc", "/tmp/x", "deadbeef");
        storage.save_registered_model(&model).unwrap();

        let loaded = storage.load_registered_model("iris_random_forest").unwrap().unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_lock_file_released_after_use() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();
        let lock_path = temp_dir.path().join(LOCK_FILE);

        let value = locked(&storage, || {
            assert!(lock_path.exists());
            Ok(7)
        })
        .unwrap();
        assert_eq!(value, 7);
        assert!(!lock_path.exists());

        // Released on error too
        let result: Result<()> = locked(&storage, || Err(TrainError::TrackingError("boom".to_string())));
        assert!(result.is_err());
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();
        let run = Run::new("0", None);
        storage.save_run(&run).unwrap();
        assert_eq!(storage.load_run("0", &run.run_id).unwrap().run_id, run.run_id);

        let uri = storage.write_artifact("0", &run.run_id, "a/b.txt", b"hi").unwrap();
        assert!(uri.starts_with("memory://0/"));
        assert_eq!(storage.read_artifact("0", &run.run_id, "a/b.txt").unwrap(), b"hi");
        assert!(storage.is_available());
    }
}
