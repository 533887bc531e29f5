//! Filesystem artifact store.
//!
//! Layout:
//!
//! ```text
//! <base>/<run_id>/
//!     results.json
//!     tasks/<task_id>/<harness_id>/
//!         metadata.json
//!         trajectory.jsonl
//!         stdout.log, stderr.log, job_metadata.json
//!         workspace/
//!         scores/<scorer>.json
//! ```
//!
//! Every (task, harness) pair owns a distinct directory, so concurrent
//! workers never write the same files.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::is_valid_path_name;
use crate::error::StorageError;
use crate::harness::TRAJECTORY_FILE;
use crate::runner::EvalResult;

/// Run-level results file.
pub const RESULTS_FILE: &str = "results.json";

/// Per-task metadata file.
pub const METADATA_FILE: &str = "metadata.json";

const TASKS_DIR: &str = "tasks";
const SCORES_DIR: &str = "scores";

/// Root of all runs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_path: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `base_path`. Nothing is created on disk yet.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the base storage path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Creates the directory for a new run.
    pub async fn create_run(&self, run_id: &str) -> Result<RunArtifacts, StorageError> {
        let path = self.base_path.join(run_id);
        create_dir(&path).await?;
        Ok(RunArtifacts {
            run_id: run_id.to_string(),
            path,
        })
    }

    /// Opens an existing run.
    pub async fn get_run(&self, run_id: &str) -> Result<RunArtifacts, StorageError> {
        let path = self.base_path.join(run_id);
        if !fs::try_exists(&path).await? {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }
        Ok(RunArtifacts {
            run_id: run_id.to_string(),
            path,
        })
    }
}

/// Directory of one run.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    run_id: String,
    path: PathBuf,
}

impl RunArtifacts {
    /// Opens a run directory directly, e.g. from a CLI argument.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let run_id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { run_id, path }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn task_path(&self, task_id: &str, harness_id: Option<&str>) -> PathBuf {
        let mut path = self.path.join(TASKS_DIR).join(task_id);
        if let Some(harness_id) = harness_id {
            path = path.join(harness_id);
        }
        path
    }

    /// Creates the directory for one task, optionally scoped to a harness.
    pub async fn create_task(
        &self,
        task_id: &str,
        harness_id: Option<&str>,
    ) -> Result<TaskArtifacts, StorageError> {
        let path = self.task_path(task_id, harness_id);
        create_dir(&path.join(SCORES_DIR)).await?;
        Ok(TaskArtifacts { path })
    }

    /// Opens an existing task directory.
    pub async fn get_task(
        &self,
        task_id: &str,
        harness_id: Option<&str>,
    ) -> Result<TaskArtifacts, StorageError> {
        let path = self.task_path(task_id, harness_id);
        if !fs::try_exists(&path).await? {
            return Err(StorageError::TaskNotFound(path.display().to_string()));
        }
        Ok(TaskArtifacts { path })
    }

    /// Writes `results.json` at the run root.
    pub async fn write_results(&self, result: &EvalResult) -> Result<PathBuf, StorageError> {
        let path = self.path.join(RESULTS_FILE);
        write_json(&path, result).await?;
        Ok(path)
    }

    /// Reads `results.json` back.
    pub async fn read_results(&self) -> Result<EvalResult, StorageError> {
        let path = self.path.join(RESULTS_FILE);
        if !fs::try_exists(&path).await? {
            return Err(StorageError::RunNotFound(self.path.display().to_string()));
        }
        read_json(&path).await
    }
}

/// Directory of one (task, harness) combination.
#[derive(Debug, Clone)]
pub struct TaskArtifacts {
    path: PathBuf,
}

impl TaskArtifacts {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trajectory_path(&self) -> PathBuf {
        self.path.join(TRAJECTORY_FILE)
    }

    pub fn workspace_path(&self) -> PathBuf {
        self.path.join("workspace")
    }

    fn score_path(&self, scorer: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_path_name(scorer) {
            return Err(StorageError::InvalidName(scorer.to_string()));
        }
        Ok(self.path.join(SCORES_DIR).join(format!("{}.json", scorer)))
    }

    /// Writes `metadata.json`, replacing any previous content.
    pub async fn write_metadata(&self, metadata: &serde_json::Value) -> Result<(), StorageError> {
        write_json(&self.path.join(METADATA_FILE), metadata).await
    }

    /// Reads `metadata.json`, or an empty object if none was written.
    pub async fn read_metadata(&self) -> Result<serde_json::Value, StorageError> {
        let path = self.path.join(METADATA_FILE);
        if !fs::try_exists(&path).await? {
            return Ok(serde_json::json!({}));
        }
        read_json(&path).await
    }

    /// Replaces the trajectory with the given events.
    pub async fn write_trajectory(&self, events: &[serde_json::Value]) -> Result<(), StorageError> {
        let mut content = String::new();
        for event in events {
            content.push_str(&serde_json::to_string(event)?);
            content.push('\n');
        }
        fs::write(self.trajectory_path(), content).await?;
        Ok(())
    }

    /// Appends one event to the trajectory.
    pub async fn append_trajectory(&self, event: &serde_json::Value) -> Result<(), StorageError> {
        let line = format!("{}\n", serde_json::to_string(event)?);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.trajectory_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads trajectory events. Lines that are not JSON are skipped.
    pub async fn read_trajectory(&self) -> Result<Vec<serde_json::Value>, StorageError> {
        let path = self.trajectory_path();
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).await?;
        Ok(crate::trajectory::parse_events(&content))
    }

    /// Persists one scorer's result under `scores/<name>.json`.
    pub async fn write_score<T: Serialize>(&self, scorer: &str, score: &T) -> Result<(), StorageError> {
        let path = self.score_path(scorer)?;
        create_dir(&self.path.join(SCORES_DIR)).await?;
        write_json(&path, score).await
    }

    /// Reads one scorer's result.
    pub async fn read_score<T: DeserializeOwned>(&self, scorer: &str) -> Result<T, StorageError> {
        read_json(&self.score_path(scorer)?).await
    }

    /// Names of all scorers with a recorded result, sorted.
    pub async fn list_scores(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.path.join(SCORES_DIR);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

async fn create_dir(path: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(path).await.map_err(|e| {
        StorageError::DirectoryCreationFailed(format!("{}: {}", path.display(), e))
    })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}
