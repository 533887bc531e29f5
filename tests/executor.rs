//! Integration tests for the evaluation executor.
//!
//! The executor is driven against an in-memory sandbox driver whose
//! behaviour is keyed off the task id and prompt, so no container runtime is
//! needed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use skillbench::config::{EvalConfig, TaskConfig};
use skillbench::error::ScorerError;
use skillbench::harness::{env_keys, HarnessConfig, HarnessType};
use skillbench::runner::{image_tag, EvalResult, Executor, ModelKey, ResultReporter, TaskResult};
use skillbench::sandbox::{
    ImageBuildRequest, ImageBuildResult, JobRequest, JobResult, SandboxDriver, FAILED_EXIT_CODE,
};
use skillbench::scoring::{
    CheckKind, PatternCheck, PatternScorerConfig, RubricScorerConfig, ScoreResult, Scorer,
    ScorerConfig,
};
use tempfile::TempDir;

/// Prompt markers understood by [`FakeDriver`].
const EXIT_ONE: &str = "[exit-1]";
const PANIC_RUN: &str = "[panic]";

#[derive(Default)]
struct FakeDriver {
    builds: AtomicUsize,
    jobs: AtomicUsize,
    cleaned: Mutex<Vec<String>>,
    envs: Mutex<Vec<BTreeMap<String, String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl SandboxDriver for FakeDriver {
    async fn build_image(&self, request: &ImageBuildRequest) -> ImageBuildResult {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if request.tag.contains("broken") {
            return ImageBuildResult::failure(vec!["FROM x".into()], "no space left on device");
        }
        ImageBuildResult::success(format!("sha256:{}", request.tag), vec!["FROM x".into()])
    }

    async fn run_job(&self, request: &JobRequest) -> JobResult {
        self.jobs.fetch_add(1, Ordering::SeqCst);
        self.envs.lock().unwrap().push(request.env.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let prompt = request.env.get(env_keys::PROMPT).cloned().unwrap_or_default();
        if prompt.contains(PANIC_RUN) {
            panic!("driver exploded");
        }

        let workspace = request.artifacts_dir.join("workspace");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("answer.txt"), "42").unwrap();

        JobResult {
            exit_code: if prompt.contains(EXIT_ONE) { 1 } else { 0 },
            artifacts_path: request.artifacts_dir.clone(),
            duration_seconds: 0.02,
            stdout: "{\"type\":\"tool_call\",\"name\":\"bash\",\"command\":\"ls\"}\n".into(),
            stderr: String::new(),
            error: None,
        }
    }

    async fn cleanup(&self, image: &str) {
        self.cleaned.lock().unwrap().push(image.to_string());
    }
}

/// Scorer with a fixed verdict that counts its invocations.
struct CountingScorer {
    name: String,
    verdict: Result<bool, String>,
    calls: AtomicUsize,
}

impl CountingScorer {
    fn passing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            verdict: Ok(true),
            calls: AtomicUsize::new(0),
        })
    }

    fn erroring(name: &str, error: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            verdict: Err(error.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Scorer for CountingScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, _artifacts_path: &Path) -> Result<ScoreResult, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.verdict {
            Ok(pass) => Ok(ScoreResult::new(&self.name, *pass, if *pass { 1.0 } else { 0.0 })),
            Err(e) => Err(ScorerError::Verdict(e.clone())),
        }
    }
}

struct PanickingScorer;

#[async_trait]
impl Scorer for PanickingScorer {
    fn name(&self) -> &str {
        "explodes"
    }

    async fn score(&self, _artifacts_path: &Path) -> Result<ScoreResult, ScorerError> {
        panic!("scorer exploded");
    }
}

#[derive(Default)]
struct RecordingReporter {
    batches: Mutex<Vec<(ModelKey, usize)>>,
    runs: AtomicUsize,
}

#[async_trait]
impl ResultReporter for RecordingReporter {
    async fn report_model(&self, key: &ModelKey, batch: &[TaskResult]) {
        self.batches.lock().unwrap().push((key.clone(), batch.len()));
    }

    async fn report_run(&self, _result: &EvalResult) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

fn config(output: &TempDir, tasks: &[(&str, &str)]) -> EvalConfig {
    let mut config = EvalConfig::new("demo", "/skills/demo")
        .with_output_dir(output.path())
        .with_harness(HarnessConfig::new(HarnessType::ClaudeCode))
        .with_harness(HarnessConfig::new(HarnessType::Codex));
    for (id, prompt) in tasks {
        config = config.with_task(TaskConfig::new(*id, *prompt).with_timeout_secs(30));
    }
    config
}

fn executor(config: EvalConfig, driver: Arc<FakeDriver>) -> Executor {
    Executor::new(config, driver)
        .with_env_lookup(|_| Some("test-key".to_string()))
        .with_run_id("20260101-000000-deadbeef")
}

fn outcome_multiset(result: &EvalResult) -> Vec<(String, String, &'static str)> {
    let mut outcomes: Vec<_> = result
        .task_results
        .iter()
        .map(|r| (r.task_id.clone(), r.model_key().to_string(), r.status_label()))
        .collect();
    outcomes.sort();
    outcomes
}

#[tokio::test]
async fn test_full_matrix_passes() {
    let output = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::default());
    let scorer = CountingScorer::passing("always");

    let result = executor(config(&output, &[("one", "p1"), ("two", "p2")]), driver.clone())
        .with_scorer(scorer.clone())
        .run()
        .await;

    assert!(result.error.is_none());
    assert_eq!(result.task_results.len(), 4);
    assert!(result.success());
    assert!(result.all_passed());
    assert_eq!(result.pass_rate(), 100.0);
    assert_eq!(result.summary.total, 4);
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 4);
    assert_eq!(driver.cleaned.lock().unwrap().len(), 4);

    let run_dir = output.path().join("20260101-000000-deadbeef");
    assert!(run_dir.join("results.json").is_file());
    let task_dir = run_dir.join("tasks/one/claude-code_claude-sonnet-4-5");
    assert!(task_dir.join("metadata.json").is_file());
    assert!(task_dir.join("scores/always.json").is_file());

    let metrics = result.task_results[0].metrics.as_ref().unwrap();
    assert_eq!(metrics.tool_calls, 1);
}

#[tokio::test]
async fn test_missing_credentials_abort_before_any_work() {
    let output = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::default());
    let reporter = Arc::new(RecordingReporter::default());

    let result = Executor::new(config(&output, &[("one", "p")]), driver.clone())
        .with_env_lookup(|key| (key != "OPENAI_API_KEY").then(|| "x".to_string()))
        .with_reporter(reporter.clone())
        .run()
        .await;

    assert!(result.task_results.is_empty());
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("OPENAI_API_KEY"));
    assert!(!error.contains("ANTHROPIC_API_KEY"));
    assert!(!result.success());
    assert_eq!(result.pass_rate(), 0.0);
    assert_eq!(driver.builds.load(Ordering::SeqCst), 0);
    assert!(reporter.batches.lock().unwrap().is_empty());
    assert_eq!(reporter.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_build_failure_is_isolated() {
    let output = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::default());

    let result = executor(
        config(&output, &[("broken", "p"), ("fine", "p")]),
        driver.clone(),
    )
    .run()
    .await;

    assert_eq!(result.task_results.len(), 4);
    for r in &result.task_results {
        if r.task_id == "broken" {
            assert_eq!(r.job.exit_code, FAILED_EXIT_CODE);
            assert!(r.error.as_deref().unwrap().starts_with("Image build failed"));
            assert!(r.scores.is_empty());
        } else {
            assert!(r.overall_pass());
        }
    }
    // Only the good images reached a container; every image was cleaned.
    assert_eq!(driver.jobs.load(Ordering::SeqCst), 2);
    assert_eq!(driver.cleaned.lock().unwrap().len(), 4);
    assert_eq!(result.summary.errored, 2);
}

#[tokio::test]
async fn test_nonzero_exit_skips_scorers() {
    let output = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::default());
    let scorer = CountingScorer::passing("always");

    let result = executor(config(&output, &[("bad", EXIT_ONE)]), driver)
        .with_scorer(scorer.clone())
        .run()
        .await;

    assert_eq!(result.task_results.len(), 2);
    for r in &result.task_results {
        assert_eq!(r.job.exit_code, 1);
        assert!(r.scores.is_empty());
        assert!(!r.overall_pass());
        assert_eq!(r.status_label(), "ERROR");
    }
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_parallelism_does_not_change_outcomes() {
    let tasks = [("a", "p"), ("b", EXIT_ONE), ("broken", "p"), ("d", "p")];

    let sequential_dir = TempDir::new().unwrap();
    let sequential = executor(
        config(&sequential_dir, &tasks).with_max_parallel(1),
        Arc::new(FakeDriver::default()),
    )
    .run()
    .await;

    let parallel_dir = TempDir::new().unwrap();
    let parallel_driver = Arc::new(FakeDriver::default());
    let parallel = executor(
        config(&parallel_dir, &tasks).with_max_parallel(4),
        parallel_driver.clone(),
    )
    .run()
    .await;

    assert_eq!(outcome_multiset(&sequential), outcome_multiset(&parallel));
    assert_eq!(sequential.summary.passed, parallel.summary.passed);
    assert!(parallel_driver.peak.load(Ordering::SeqCst) <= 4);
}

#[tokio::test]
async fn test_parallelism_bound_is_respected() {
    let output = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::default());
    let tasks: Vec<(String, String)> = (0..6).map(|i| (format!("t{}", i), "p".to_string())).collect();
    let task_refs: Vec<(&str, &str)> = tasks.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();

    let result = executor(config(&output, &task_refs).with_max_parallel(2), driver.clone())
        .run()
        .await;

    assert_eq!(result.task_results.len(), 12);
    assert!(driver.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_reporter_called_once_per_model() {
    let output = TempDir::new().unwrap();
    let reporter = Arc::new(RecordingReporter::default());

    let result = executor(
        config(&output, &[("one", "p"), ("two", "p"), ("three", "p")]).with_max_parallel(3),
        Arc::new(FakeDriver::default()),
    )
    .with_reporter(reporter.clone())
    .run()
    .await;

    assert_eq!(result.task_results.len(), 6);
    let mut batches = reporter.batches.lock().unwrap().clone();
    batches.sort();
    assert_eq!(
        batches,
        vec![
            (ModelKey::new(HarnessType::ClaudeCode, "claude-sonnet-4-5"), 3),
            (ModelKey::new(HarnessType::Codex, "gpt-5-codex"), 3),
        ]
    );
    assert_eq!(reporter.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_scorers_pass_on_clean_exit() {
    let output = TempDir::new().unwrap();
    let result = executor(config(&output, &[("one", "p")]), Arc::new(FakeDriver::default()))
        .run()
        .await;

    for r in &result.task_results {
        assert!(r.scores.is_empty());
        assert!(r.overall_pass());
    }
}

#[test]
fn test_empty_run_has_zero_pass_rate() {
    let mut result = EvalResult::new("r", "demo");
    result.finalize();
    assert_eq!(result.pass_rate(), 0.0);
    assert_eq!(result.summary.pass_rate, 0.0);
}

#[tokio::test]
async fn test_panicking_combination_is_synthesized_and_cleaned() {
    let output = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::default());
    let run_id = "20260101-000000-deadbeef";
    let config = config(&output, &[("boom", PANIC_RUN), ("fine", "p")])
        .with_max_parallel(2);
    let codex_identity = HarnessConfig::new(HarnessType::Codex).identity();

    let result = executor(config, driver.clone()).run().await;

    assert_eq!(result.task_results.len(), 4);
    let boom: Vec<&TaskResult> = result
        .task_results
        .iter()
        .filter(|r| r.task_id == "boom")
        .collect();
    assert_eq!(boom.len(), 2);
    for r in boom {
        assert_eq!(r.job.exit_code, FAILED_EXIT_CODE);
        assert!(r.error.as_deref().unwrap().contains("driver exploded"));
    }
    assert!(result
        .task_results
        .iter()
        .filter(|r| r.task_id == "fine")
        .all(TaskResult::overall_pass));

    let cleaned = driver.cleaned.lock().unwrap();
    assert!(cleaned.contains(&image_tag(run_id, "boom", &codex_identity)));
}

#[tokio::test]
async fn test_failing_scorers_recorded_as_failed() {
    let output = TempDir::new().unwrap();
    let good = CountingScorer::passing("good");
    let bad = CountingScorer::erroring("bad", "judge unreachable");

    let result = executor(config(&output, &[("one", "p")]), Arc::new(FakeDriver::default()))
        .with_scorer(good.clone())
        .with_scorer(bad.clone())
        .with_scorer(Arc::new(PanickingScorer))
        .run()
        .await;

    for r in &result.task_results {
        assert!(r.success());
        assert!(!r.overall_pass());
        assert!(r.scores["good"].overall_pass);

        let bad = &r.scores["bad"];
        assert!(!bad.overall_pass);
        assert!(bad.error.as_deref().unwrap().contains("judge unreachable"));

        let exploded = &r.scores["explodes"];
        assert!(exploded.error.as_deref().unwrap().contains("scorer exploded"));
    }
    assert_eq!(good.calls.load(Ordering::SeqCst), 2);
    assert_eq!(bad.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_configured_pattern_scorer_runs_against_workspace() {
    let output = TempDir::new().unwrap();
    let pattern = PatternScorerConfig::new("files")
        .with_check(PatternCheck::new(CheckKind::FileMatches {
            path: "answer.txt".into(),
            pattern: "^42$".into(),
        }))
        .with_check(PatternCheck::new(CheckKind::FileExists {
            path: "missing.txt".into(),
        }));
    let config = config(&output, &[("one", "p")]).with_scorer(ScorerConfig::Pattern(pattern));

    let result = executor(config, Arc::new(FakeDriver::default())).run().await;

    let scores: BTreeMap<_, _> = result
        .task_results
        .iter()
        .map(|r| (r.model_key().to_string(), r.scores["files"].clone()))
        .collect();
    assert_eq!(scores.len(), 2);
    for score in scores.values() {
        assert!(!score.overall_pass);
        assert_eq!(score.score, 0.5);
        assert_eq!(score.checks.len(), 2);
    }
}

#[tokio::test]
async fn test_scorer_only_credentials_stay_out_of_containers() {
    let output = TempDir::new().unwrap();
    let driver = Arc::new(FakeDriver::default());
    let mut config = config(&output, &[("judged", "[exit-1] no scoring")]).with_scorer(
        ScorerConfig::Rubric(RubricScorerConfig::new("quality", vec!["Accurate".into()])),
    );
    config.environment.required_env.push("PIP_INDEX_URL".into());

    let result = executor(config, driver.clone()).run().await;

    assert!(result.error.is_none());
    let envs = driver.envs.lock().unwrap();
    assert_eq!(envs.len(), 2);
    for env in envs.iter() {
        assert!(!env.contains_key("OPENROUTER_API_KEY"));
        assert_eq!(env.get("PIP_INDEX_URL").map(String::as_str), Some("test-key"));
    }
    assert!(envs.iter().any(|env| env.contains_key("ANTHROPIC_API_KEY")));
}
