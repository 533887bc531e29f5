//! Evaluation executor - the main run loop.
//!
//! One run expands the harness x task matrix and drives every combination
//! through build → run → metrics → score → persist → cleanup. Combination
//! failures become data on their `TaskResult`; only missing credentials
//! abort a run.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::progress::ProgressLog;
use super::reporter::ResultReporter;
use super::result::{EvalResult, ModelKey, TaskResult};
use super::tracker::ModelBatchTracker;
use crate::config::{EvalConfig, TaskConfig};
use crate::error::{EvalError, ScorerError};
use crate::harness::{create_adapter, HarnessConfig, InvocationRequest};
use crate::sandbox::dockerfile::container_skill_path;
use crate::sandbox::{ImageBuildRequest, JobRequest, JobResult, SandboxDriver};
use crate::scoring::{create_scorer, ScoreResult, Scorer};
use crate::storage::{ArtifactStore, RunArtifacts, TaskArtifacts};
use crate::trajectory;

/// Looks up a credential by environment variable name.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Max length of a Docker image reference component.
const MAX_TAG_LEN: usize = 128;

/// One (harness, task) pair of the matrix.
#[derive(Debug, Clone)]
pub struct Combination {
    pub harness: HarnessConfig,
    pub task: TaskConfig,
}

impl Combination {
    pub fn model_key(&self) -> ModelKey {
        ModelKey::new(self.harness.harness_type, self.harness.effective_model())
    }
}

/// Runs an evaluation against a sandbox driver.
pub struct Executor {
    config: EvalConfig,
    driver: Arc<dyn SandboxDriver>,
    store: ArtifactStore,
    reporter: Option<Arc<dyn ResultReporter>>,
    progress: Arc<ProgressLog>,
    env_lookup: EnvLookup,
    extra_scorers: Vec<Arc<dyn Scorer>>,
    run_id: Option<String>,
}

impl Executor {
    /// Creates an executor writing artifacts under the config's output dir.
    pub fn new(config: EvalConfig, driver: Arc<dyn SandboxDriver>) -> Self {
        let store = ArtifactStore::new(&config.execution.output_dir);
        Self {
            config,
            driver,
            store,
            reporter: None,
            progress: Arc::new(ProgressLog::disabled()),
            env_lookup: Arc::new(|name: &str| std::env::var(name).ok().filter(|v| !v.is_empty())),
            extra_scorers: Vec::new(),
            run_id: None,
        }
    }

    /// Receives per-model batches and the final run.
    pub fn with_reporter(mut self, reporter: Arc<dyn ResultReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Where per-combination progress lines go.
    pub fn with_progress(mut self, progress: Arc<ProgressLog>) -> Self {
        self.progress = progress;
        self
    }

    /// Replaces process environment lookup for credentials.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Arc::new(lookup);
        self
    }

    /// Adds a scorer applied to every task, after the configured ones.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.extra_scorers.push(scorer);
        self
    }

    /// Uses a fixed run id instead of a generated one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// The matrix in harness-major, task-minor order.
    pub fn matrix(&self) -> Vec<Combination> {
        let tasks = &self.config.tasks;
        self.config
            .effective_harnesses()
            .into_iter()
            .flat_map(|harness| {
                tasks.iter().map(move |task| Combination {
                    harness: harness.clone(),
                    task: task.clone(),
                })
            })
            .collect()
    }

    /// Every credential the run needs.
    pub fn required_env_keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self.config.environment.required_env.iter().cloned().collect();
        for harness in self.config.effective_harnesses() {
            keys.extend(create_adapter(&harness).required_env_keys(&harness));
        }
        for scorer in &self.config.scorers {
            keys.extend(scorer.required_env_keys());
        }
        for task in &self.config.tasks {
            for scorer in &task.scorers {
                keys.extend(scorer.required_env_keys());
            }
        }
        for scorer in &self.extra_scorers {
            keys.extend(scorer.required_env_keys());
        }
        keys
    }

    fn resolve_credentials(&self) -> Result<BTreeMap<String, String>, EvalError> {
        let mut resolved = BTreeMap::new();
        let mut missing = Vec::new();
        for key in self.required_env_keys() {
            match (self.env_lookup)(&key) {
                Some(value) => {
                    resolved.insert(key, value);
                }
                None => missing.push(key),
            }
        }
        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(EvalError::MissingCredentials(missing))
        }
    }

    /// Runs the whole matrix. Never fails as a call; a run-level failure is
    /// reported through `EvalResult::error`.
    pub async fn run(&self) -> EvalResult {
        let run_id = self.run_id.clone().unwrap_or_else(new_run_id);
        let mut eval = EvalResult::new(&run_id, &self.config.name);

        let credentials = match self.resolve_credentials() {
            Ok(credentials) => credentials,
            Err(e) => {
                error!(run_id = %run_id, "{}", e);
                eval.error = Some(e.to_string());
                eval.finalize();
                if let Some(reporter) = &self.reporter {
                    reporter.report_run(&eval).await;
                }
                return eval;
            }
        };

        let run = match self.store.create_run(&run_id).await {
            Ok(run) => run,
            Err(e) => {
                // Each combination will record its own storage failure.
                warn!(run_id = %run_id, error = %e, "Failed to create run directory");
                RunArtifacts::open(self.store.base_path().join(&run_id))
            }
        };

        let combinations = self.matrix();
        let max_parallel = self.config.execution.max_parallel.max(1);
        info!(
            run_id = %run_id,
            combinations = combinations.len(),
            max_parallel,
            "Starting evaluation run"
        );

        let ctx = Arc::new(RunContext {
            run_id: run_id.clone(),
            config: self.config.clone(),
            driver: Arc::clone(&self.driver),
            run: run.clone(),
            credentials,
            scorers: self.build_scorers(),
        });
        let mut collector = Collector::new(
            &combinations,
            self.reporter.clone(),
            Arc::clone(&self.progress),
        );

        let results = if max_parallel > 1 && combinations.len() > 1 {
            run_parallel(ctx, combinations, max_parallel, collector).await
        } else {
            for combination in combinations {
                let result = run_isolated(Arc::clone(&ctx), combination).await;
                collector.accept(result).await;
            }
            collector.into_results()
        };

        eval.task_results = results;
        eval.finalize();
        info!(
            run_id = %run_id,
            total = eval.summary.total,
            passed = eval.summary.passed,
            pass_rate = eval.summary.pass_rate,
            "Evaluation run finished"
        );

        if let Err(e) = run.write_results(&eval).await {
            warn!(run_id = %run_id, error = %e, "Failed to write results.json");
        }
        if let Some(reporter) = &self.reporter {
            reporter.report_run(&eval).await;
        }
        eval
    }

    /// Scorers per task id: configured ones first, then extra ones.
    fn build_scorers(&self) -> HashMap<String, Vec<Arc<dyn Scorer>>> {
        self.config
            .tasks
            .iter()
            .map(|task| {
                let mut scorers: Vec<Arc<dyn Scorer>> = self
                    .config
                    .scorers_for(task)
                    .map(|config| match create_scorer(config) {
                        Ok(scorer) => scorer,
                        Err(e) => Arc::new(BrokenScorer {
                            name: config.name(),
                            error: e.to_string(),
                        }) as Arc<dyn Scorer>,
                    })
                    .collect();
                scorers.extend(self.extra_scorers.iter().cloned());
                (task.id.clone(), scorers)
            })
            .collect()
    }
}

/// Shared, read-only state of one run.
struct RunContext {
    run_id: String,
    config: EvalConfig,
    driver: Arc<dyn SandboxDriver>,
    run: RunArtifacts,
    credentials: BTreeMap<String, String>,
    scorers: HashMap<String, Vec<Arc<dyn Scorer>>>,
}

impl RunContext {
    fn image_tag(&self, combination: &Combination) -> String {
        image_tag(&self.run_id, &combination.task.id, &combination.harness.identity())
    }

    /// Resolved credentials this combination's container may see.
    fn base_env(&self, harness: &HarnessConfig) -> BTreeMap<String, String> {
        let adapter = create_adapter(harness);
        let wanted: BTreeSet<String> = adapter
            .required_env_keys(harness)
            .into_iter()
            .chain(self.config.environment.required_env.iter().cloned())
            .collect();
        self.credentials
            .iter()
            .filter(|(key, _)| wanted.contains(*key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drives one combination to a `TaskResult`.
    async fn run_combination(&self, combination: &Combination) -> TaskResult {
        let harness = &combination.harness;
        let task = &combination.task;
        let harness_id = harness.identity();
        let model = harness.effective_model().to_string();
        let started_at = Utc::now();

        let mut result = TaskResult {
            task_id: task.id.clone(),
            harness: harness.harness_type,
            model: model.clone(),
            prompt: task.prompt.clone(),
            job: JobResult::not_run(self.run.path().join("tasks").join(&task.id).join(&harness_id), ""),
            scores: BTreeMap::new(),
            error: None,
            timeout_secs: task.timeout_secs,
            metrics: None,
        };

        let artifacts = match self.run.create_task(&task.id, Some(harness_id.as_str())).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                let message = format!("Failed to create artifact directory: {}", e);
                error!(task_id = %task.id, harness = %harness_id, "{}", message);
                result.job.error = Some(message.clone());
                result.error = Some(message);
                return result;
            }
        };

        let adapter = create_adapter(harness);
        let tag = self.image_tag(combination);
        let env_config = &self.config.environment;

        let mut setup_commands = adapter.setup_commands();
        setup_commands.extend(env_config.setup_commands.iter().cloned());
        let build_request = ImageBuildRequest {
            base_image: env_config.base_image.clone(),
            layers: env_config.layers.clone(),
            skill_path: self.config.skill.clone(),
            adapter_script: adapter.adapter_script_path().map(Path::to_path_buf),
            setup_commands,
            tag: tag.clone(),
            workdir: env_config.workdir.clone(),
        };

        info!(task_id = %task.id, harness = %harness_id, tag = %tag, "Building image");
        let build = self.driver.build_image(&build_request).await;

        if let Some(build_error) = &build.error {
            warn!(task_id = %task.id, harness = %harness_id, "Image build failed");
            let message = format!("Image build failed: {}", build_error);
            result.job = JobResult::not_run(artifacts.path(), message.clone());
            result.error = Some(message);
            write_metadata(&artifacts, &result, &tag, &build.build_logs, started_at).await;
            self.driver.cleanup(&tag).await;
            return result;
        }

        let skill_path = container_skill_path(&self.config.skill);
        let invocation = InvocationRequest {
            prompt: &task.prompt,
            skill_path: &skill_path,
            workdir: &env_config.workdir,
            timeout: task.timeout(),
            model: &model,
            extra_args: &harness.extra_args,
        };
        let command = adapter.build_command(&invocation);

        let mut env = self.base_env(harness);
        env.extend(harness.env.clone());
        env.extend(adapter.build_env(&invocation));

        let job_request = JobRequest {
            image: build.image_id.clone(),
            command,
            env,
            timeout: task.timeout(),
            artifacts_dir: artifacts.path().to_path_buf(),
            network_allowlist: env_config.network_allowlist.clone(),
            workdir: env_config.workdir.clone(),
            use_host_network: env_config.use_host_network,
        };

        info!(task_id = %task.id, harness = %harness_id, "Running job");
        result.job = self.driver.run_job(&job_request).await;
        result.metrics = trajectory::metrics_for_job(&result.job.artifacts_path, &result.job.stdout).await;
        write_metadata(&artifacts, &result, &tag, &build.build_logs, started_at).await;

        if result.job.success() {
            result.scores = self.score(task, &artifacts).await;
        } else {
            debug!(
                task_id = %task.id,
                harness = %harness_id,
                exit_code = result.job.exit_code,
                "Job failed, skipping scorers"
            );
        }

        self.driver.cleanup(&tag).await;
        result
    }

    /// Runs every scorer for a task concurrently. A scorer that errors or
    /// panics is recorded as a failed result.
    async fn score(&self, task: &TaskConfig, artifacts: &TaskArtifacts) -> BTreeMap<String, ScoreResult> {
        let scorers = self.scorers.get(&task.id).cloned().unwrap_or_default();
        let handles: Vec<_> = scorers
            .into_iter()
            .map(|scorer| {
                let path = artifacts.path().to_path_buf();
                let name = scorer.name().to_string();
                let handle = tokio::spawn(async move { scorer.score(&path).await });
                (name, handle)
            })
            .collect();

        let mut scores = BTreeMap::new();
        for (name, handle) in handles {
            let mut score = match handle.await {
                Ok(Ok(score)) => score,
                Ok(Err(e)) => {
                    warn!(task_id = %task.id, scorer = %name, error = %e, "Scorer failed");
                    ScoreResult::failed(&name, e.to_string())
                }
                Err(e) => {
                    let message = join_error_message(e);
                    error!(task_id = %task.id, scorer = %name, "Scorer panicked: {}", message);
                    ScoreResult::failed(&name, format!("scorer panicked: {}", message))
                }
            };
            score.scorer = name.clone();
            if let Err(e) = artifacts.write_score(&name, &score).await {
                warn!(task_id = %task.id, scorer = %name, error = %e, "Failed to persist score");
            }
            scores.insert(name, score);
        }
        scores
    }
}

async fn write_metadata(
    artifacts: &TaskArtifacts,
    result: &TaskResult,
    image_tag: &str,
    build_logs: &[String],
    started_at: chrono::DateTime<Utc>,
) {
    let metadata = json!({
        "task_id": result.task_id,
        "harness": result.harness,
        "model": result.model,
        "prompt": result.prompt,
        "image_tag": image_tag,
        "build_logs": build_logs,
        "exit_code": result.job.exit_code,
        "duration_seconds": result.job.duration_seconds,
        "timeout_secs": result.timeout_secs,
        "error": result.error.as_ref().or(result.job.error.as_ref()),
        "metrics": result.metrics,
        "started_at": started_at.to_rfc3339(),
        "completed_at": Utc::now().to_rfc3339(),
    });
    if let Err(e) = artifacts.write_metadata(&metadata).await {
        warn!(task_id = %result.task_id, error = %e, "Failed to write metadata.json");
    }
}

/// Runs one combination in its own task so a panic stays contained.
async fn run_isolated(ctx: Arc<RunContext>, combination: Combination) -> TaskResult {
    let handle = {
        let ctx = Arc::clone(&ctx);
        let combination = combination.clone();
        tokio::spawn(async move { ctx.run_combination(&combination).await })
    };

    match handle.await {
        Ok(result) => result,
        Err(e) => {
            let message = join_error_message(e);
            error!(
                task_id = %combination.task.id,
                harness = %combination.harness.display_name(),
                "Combination panicked: {}",
                message
            );
            // Container state is unknown here; the image tag is not.
            ctx.driver.cleanup(&ctx.image_tag(&combination)).await;

            let error = format!("Unexpected failure: {}", message);
            let path = ctx
                .run
                .path()
                .join("tasks")
                .join(&combination.task.id)
                .join(combination.harness.identity());
            TaskResult {
                task_id: combination.task.id.clone(),
                harness: combination.harness.harness_type,
                model: combination.harness.effective_model().to_string(),
                prompt: combination.task.prompt.clone(),
                job: JobResult::not_run(path, error.clone()),
                scores: BTreeMap::new(),
                error: Some(error),
                timeout_secs: combination.task.timeout_secs,
                metrics: None,
            }
        }
    }
}

/// Bounded worker pool: `max_parallel` workers pop from a shared queue and
/// send results to the collector.
async fn run_parallel(
    ctx: Arc<RunContext>,
    combinations: Vec<Combination>,
    max_parallel: usize,
    mut collector: Collector,
) -> Vec<TaskResult> {
    let workers = max_parallel.min(combinations.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(combinations)));
    let (tx, mut rx) = mpsc::unbounded_channel::<TaskResult>();

    let collector_handle = tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            collector.accept(result).await;
        }
        collector.into_results()
    });

    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let ctx = Arc::clone(&ctx);
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(combination) = next else {
                        break;
                    };
                    debug!(worker, task_id = %combination.task.id, "Worker picked combination");
                    let result = run_isolated(Arc::clone(&ctx), combination).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();
    drop(tx);

    for handle in futures::future::join_all(handles).await {
        if let Err(e) = handle {
            error!(error = %e, "Worker task failed");
        }
    }

    match collector_handle.await {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Result collector failed");
            Vec::new()
        }
    }
}

/// Receives finished combinations: prints progress, releases per-model
/// batches to the reporter, and keeps every result.
struct Collector {
    tracker: ModelBatchTracker,
    reporter: Option<Arc<dyn ResultReporter>>,
    progress: Arc<ProgressLog>,
    total: usize,
    results: Vec<TaskResult>,
}

impl Collector {
    fn new(
        combinations: &[Combination],
        reporter: Option<Arc<dyn ResultReporter>>,
        progress: Arc<ProgressLog>,
    ) -> Self {
        Self {
            tracker: ModelBatchTracker::new(combinations.iter().map(Combination::model_key)),
            reporter,
            progress,
            total: combinations.len(),
            results: Vec::with_capacity(combinations.len()),
        }
    }

    async fn accept(&mut self, result: TaskResult) {
        self.progress.line(progress_line(self.results.len() + 1, self.total, &result));

        if let Some((key, batch)) = self.tracker.record(&result) {
            if let Some(reporter) = &self.reporter {
                // A panicking reporter must not take the results with it.
                let reporter = Arc::clone(reporter);
                let model = key.to_string();
                let handle = tokio::spawn(async move { reporter.report_model(&key, &batch).await });
                if let Err(e) = handle.await {
                    error!(model = %model, "Reporter failed: {}", join_error_message(e));
                }
            }
        }

        self.results.push(result);
    }

    fn into_results(self) -> Vec<TaskResult> {
        self.results
    }
}

fn progress_line(done: usize, total: usize, result: &TaskResult) -> String {
    let mut line = format!(
        "[{}/{}] {:<5} {} {}:{} ({:.1}s)",
        done,
        total,
        result.status_label(),
        result.task_id,
        result.harness,
        result.model,
        result.job.duration_seconds
    );
    if let Some(error) = result.error.as_ref().or(result.job.error.as_ref()) {
        let first = error.lines().next().unwrap_or_default();
        line.push_str(" - ");
        line.push_str(&first.chars().take(120).collect::<String>());
    }
    line
}

/// Scorer standing in for one whose construction failed.
struct BrokenScorer {
    name: String,
    error: String,
}

#[async_trait]
impl Scorer for BrokenScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, _artifacts_path: &Path) -> Result<ScoreResult, ScorerError> {
        Err(ScorerError::Config(self.error.clone()))
    }
}

fn join_error_message(e: JoinError) -> String {
    if e.is_cancelled() {
        return "task was cancelled".to_string();
    }
    panic_message(e.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// `YYYYMMDD-HHMMSS-<8 hex>`.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
}

/// Hex digits of the combination digest appended to every tag.
const TAG_DIGEST_LEN: usize = 12;

/// Deterministic image tag for one combination of a run.
///
/// The readable prefix is lossy, so a digest of the raw identifiers keeps
/// distinct combinations on distinct tags.
pub fn image_tag(run_id: &str, task_id: &str, harness_id: &str) -> String {
    let run_short: String = run_id
        .chars()
        .rev()
        .take(8)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let raw = format!("skillbench-{}-{}-{}", run_short, task_id, harness_id).to_lowercase();

    let mut tag = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && tag.ends_with('-') {
            continue;
        }
        tag.push(c);
    }
    tag.truncate(MAX_TAG_LEN - TAG_DIGEST_LEN - 1);
    let prefix = tag.trim_end_matches('-');

    let identity = format!("{}\0{}\0{}", run_id, task_id, harness_id);
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, identity.as_bytes())
        .simple()
        .to_string();
    format!("{}-{}", prefix, &digest[..TAG_DIGEST_LEN])
}
