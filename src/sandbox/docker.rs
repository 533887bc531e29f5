//! Docker CLI implementation of [`SandboxDriver`].
//!
//! Containers are created without `--rm` so their filesystem can be copied
//! out after the process exits. A [`ContainerGuard`] owns every container
//! name and guarantees `docker rm -f` runs on all exit paths.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dockerfile::BuildContext;
use super::{
    tail, ImageBuildRequest, ImageBuildResult, JobRequest, JobResult, SandboxDriver,
    FAILED_EXIT_CODE,
};
use crate::error::DockerError;
use crate::harness::CONTAINER_ARTIFACTS_DIR;

/// Image builds install dependencies, so they get a long fixed budget.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// Max characters of build stderr embedded in a failure message.
pub const BUILD_ERROR_TAIL: usize = 2000;

/// Max characters of job stderr embedded in a failure message.
pub const JOB_ERROR_TAIL: usize = 1000;

/// Grace period given to `docker stop` before it kills.
const STOP_GRACE_SECS: u64 = 5;

/// Bound on every best-effort cleanup command.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Diagnostic file written when the workspace cannot be copied out.
pub const WORKSPACE_COPY_ERROR_FILE: &str = "workspace_copy_error.txt";

/// Structured record of one container job.
pub const JOB_METADATA_FILE: &str = "job_metadata.json";

/// Driver that shells out to the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerDriver {
    program: String,
    prefix_args: Vec<String>,
    build_timeout: Duration,
}

impl Default for DockerDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerDriver {
    /// Creates a driver that runs `docker` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
            prefix_args: Vec::new(),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    /// Uses another CLI (e.g. `podman`) or prepends global flags such as
    /// `--context remote`.
    pub fn with_command(program: impl Into<String>, prefix_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    /// Sets the image build timeout.
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args);
        cmd
    }

    /// Runs a cleanup command, ignoring failures.
    async fn best_effort(&self, args: &[&str]) {
        let mut cmd = self.command();
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(CLEANUP_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) if !status.success() => {
                debug!(args = ?args, code = ?status.code(), "Cleanup command failed");
            }
            Ok(Err(e)) => debug!(args = ?args, error = %e, "Cleanup command could not start"),
            Err(_) => debug!(args = ?args, "Cleanup command timed out"),
            Ok(Ok(_)) => {}
        }
    }

    /// Arguments for `docker run`.
    pub fn run_args(&self, request: &JobRequest, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--name".to_string(),
            container_name.to_string(),
        ];

        if request.use_host_network {
            args.push("--network=host".to_string());
        }
        if !request.network_allowlist.is_empty() {
            args.push("--label".to_string());
            args.push(format!(
                "skillbench.network_allowlist={}",
                request.network_allowlist.join(",")
            ));
        }

        args.push("-v".to_string());
        args.push(format!(
            "{}:{}",
            request.artifacts_dir.display(),
            CONTAINER_ARTIFACTS_DIR
        ));

        args.push("-w".to_string());
        args.push(request.workdir.clone());

        for (key, value) in &request.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(request.image.clone());
        args.extend(request.command.iter().cloned());
        args
    }

    /// Runs the container until it exits or the timeout elapses.
    async fn execute(&self, request: &JobRequest, container_name: &str) -> ContainerOutcome {
        let mut cmd = self.command();
        cmd.args(self.run_args(request, container_name))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ContainerOutcome::LaunchFailed(
                    DockerError::Spawn(format!("{}: {}", self.program, e)).to_string(),
                )
            }
        };

        match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => ContainerOutcome::Completed {
                exit_code: output.status.code().unwrap_or(FAILED_EXIT_CODE),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Ok(Err(e)) => ContainerOutcome::LaunchFailed(DockerError::Io(e).to_string()),
            Err(_) => {
                // The CLI process was killed when its future dropped; the
                // container itself may still be running.
                warn!(container = %container_name, timeout = ?request.timeout, "Container timed out");
                self.stop_and_kill(container_name).await;
                let (stdout, stderr) = self.collect_logs(container_name).await;
                ContainerOutcome::TimedOut { stdout, stderr }
            }
        }
    }

    async fn stop_and_kill(&self, container_name: &str) {
        let grace = STOP_GRACE_SECS.to_string();
        self.best_effort(&["stop", "-t", &grace, container_name]).await;
        self.best_effort(&["kill", container_name]).await;
    }

    /// Output produced before a timeout, read back from the stopped container.
    async fn collect_logs(&self, container_name: &str) -> (String, String) {
        let mut cmd = self.command();
        cmd.args(["logs", container_name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match tokio::time::timeout(CLEANUP_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => (
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ),
            _ => (String::new(), String::new()),
        }
    }

    /// Copies the container's working directory into `artifacts/workspace`.
    async fn copy_workspace(&self, container_name: &str, workdir: &str, artifacts_dir: &Path) {
        let target = artifacts_dir.join("workspace");
        let failure = match tokio::fs::create_dir_all(&target).await {
            Err(e) => Some(format!("Failed to create {}: {}", target.display(), e)),
            Ok(()) => {
                let source = format!("{}:{}/.", container_name, workdir.trim_end_matches('/'));
                let target_arg = target.display().to_string();
                let mut cmd = self.command();
                cmd.args(["cp", source.as_str(), target_arg.as_str()])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
                match tokio::time::timeout(CLEANUP_TIMEOUT, cmd.output()).await {
                    Ok(Ok(output)) if output.status.success() => None,
                    Ok(Ok(output)) => Some(format!(
                        "docker cp exited with {:?}: {}",
                        output.status.code(),
                        String::from_utf8_lossy(&output.stderr)
                    )),
                    Ok(Err(e)) => Some(format!("docker cp could not start: {}", e)),
                    Err(_) => Some("docker cp timed out".to_string()),
                }
            }
        };

        if let Some(message) = failure {
            warn!(container = %container_name, "Workspace copy failed: {}", message);
            let path = artifacts_dir.join(WORKSPACE_COPY_ERROR_FILE);
            if let Err(e) = tokio::fs::write(&path, message).await {
                debug!(path = %path.display(), error = %e, "Could not record workspace copy failure");
            }
        }
    }
}

/// Raw result of running a container.
enum ContainerOutcome {
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        stdout: String,
        stderr: String,
    },
    LaunchFailed(String),
}

/// Owns a container name and removes the container when released.
///
/// `release` is the normal path. If the guard is dropped unreleased (panic
/// or cancellation) a detached `rm -f` is spawned instead.
struct ContainerGuard<'a> {
    driver: &'a DockerDriver,
    name: String,
    released: bool,
}

impl<'a> ContainerGuard<'a> {
    fn new(driver: &'a DockerDriver, name: String) -> Self {
        Self {
            driver,
            name,
            released: false,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn release(mut self) {
        self.driver.best_effort(&["rm", "-f", &self.name]).await;
        self.released = true;
        debug!(container = %self.name, "Container removed");
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(container = %self.name, "Container guard dropped without release, removing");
        let spawned = std::process::Command::new(&self.driver.program)
            .args(&self.driver.prefix_args)
            .args(["rm", "-f", &self.name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            warn!(container = %self.name, error = %e, "Failed to spawn container removal");
        }
    }
}

#[async_trait]
impl SandboxDriver for DockerDriver {
    async fn build_image(&self, request: &ImageBuildRequest) -> ImageBuildResult {
        let mut logs = Vec::new();

        // Staging walks and copies the skill tree.
        let owned = request.clone();
        let staged = tokio::task::spawn_blocking(move || BuildContext::stage(&owned))
            .await
            .unwrap_or_else(|e| Err(DockerError::Staging(format!("Staging task failed: {}", e))));
        let context = match staged {
            Ok(context) => context,
            Err(e) => return ImageBuildResult::failure(logs, e.to_string()),
        };
        logs.extend(context.steps().iter().cloned());

        let iid_file = context.path().join(".image-id");
        let dockerfile = context.dockerfile_path().display().to_string();
        let iid_arg = iid_file.display().to_string();
        let context_arg = context.path().display().to_string();

        info!(tag = %request.tag, base = %request.base_image, "Building image");
        logs.push(format!("docker build --tag {}", request.tag));

        let mut cmd = self.command();
        cmd.args([
            "build",
            "--tag",
            request.tag.as_str(),
            "--file",
            dockerfile.as_str(),
            "--iidfile",
            iid_arg.as_str(),
            context_arg.as_str(),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let output = match tokio::time::timeout(self.build_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let err = DockerError::Spawn(format!("{}: {}", self.program, e));
                return ImageBuildResult::failure(logs, err.to_string());
            }
            Err(_) => {
                let err = DockerError::BuildTimeout {
                    seconds: self.build_timeout.as_secs(),
                };
                return ImageBuildResult::failure(logs, err.to_string());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = DockerError::BuildFailed(tail(&stderr, BUILD_ERROR_TAIL));
            warn!(tag = %request.tag, "Image build failed");
            return ImageBuildResult::failure(logs, err.to_string());
        }

        let image_id = tokio::fs::read_to_string(&iid_file)
            .await
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| request.tag.clone());
        logs.push(format!("Built image {}", image_id));
        info!(tag = %request.tag, image = %image_id, "Image built");

        ImageBuildResult::success(image_id, logs)
    }

    async fn run_job(&self, request: &JobRequest) -> JobResult {
        let start = Instant::now();
        let started_at = Utc::now();

        if let Err(e) = tokio::fs::create_dir_all(&request.artifacts_dir).await {
            return JobResult::not_run(
                &request.artifacts_dir,
                format!("Failed to create artifacts dir: {}", e),
            );
        }
        // Bind mounts need an absolute host path.
        let artifacts_dir = tokio::fs::canonicalize(&request.artifacts_dir)
            .await
            .unwrap_or_else(|_| request.artifacts_dir.clone());
        let request = JobRequest {
            artifacts_dir: artifacts_dir.clone(),
            ..request.clone()
        };

        let guard = ContainerGuard::new(self, format!("skillbench-{}", Uuid::new_v4().simple()));
        info!(container = %guard.name(), image = %request.image, "Starting container");

        let outcome = self.execute(&request, guard.name()).await;

        let (exit_code, stdout, stderr, error, timed_out) = match outcome {
            ContainerOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                let error = (exit_code != 0).then(|| {
                    DockerError::NonZeroExit {
                        code: exit_code,
                        stderr: tail(&stderr, JOB_ERROR_TAIL),
                    }
                    .to_string()
                });
                (exit_code, stdout, stderr, error, false)
            }
            ContainerOutcome::TimedOut { stdout, stderr } => {
                let error = DockerError::Timeout {
                    seconds: request.timeout.as_secs(),
                }
                .to_string();
                (FAILED_EXIT_CODE, stdout, stderr, Some(error), true)
            }
            ContainerOutcome::LaunchFailed(message) => {
                (FAILED_EXIT_CODE, String::new(), String::new(), Some(message), false)
            }
        };

        persist_stream(&artifacts_dir, "stdout.log", &stdout).await;
        persist_stream(&artifacts_dir, "stderr.log", &stderr).await;
        self.copy_workspace(guard.name(), &request.workdir, &artifacts_dir)
            .await;

        let container_name = guard.name().to_string();
        guard.release().await;

        let duration_seconds = start.elapsed().as_secs_f64();
        let metadata = json!({
            "container_name": container_name,
            "image": request.image,
            "command": request.command,
            "exit_code": exit_code,
            "timed_out": timed_out,
            "duration_seconds": duration_seconds,
            "started_at": started_at.to_rfc3339(),
            "stdout_bytes": stdout.len(),
            "stderr_bytes": stderr.len(),
            "use_host_network": request.use_host_network,
            "network_allowlist": request.network_allowlist,
        });
        write_json(&artifacts_dir.join(JOB_METADATA_FILE), &metadata).await;

        info!(
            container = %container_name,
            exit_code,
            duration_seconds,
            "Container job finished"
        );

        JobResult {
            exit_code,
            artifacts_path: artifacts_dir,
            duration_seconds,
            stdout,
            stderr,
            error,
        }
    }

    async fn cleanup(&self, image: &str) {
        if image.is_empty() {
            return;
        }
        debug!(image = %image, "Removing image");
        self.best_effort(&["rmi", "-f", image]).await;
    }
}

async fn persist_stream(dir: &Path, name: &str, content: &str) {
    if content.is_empty() {
        return;
    }
    let path: PathBuf = dir.join(name);
    if let Err(e) = tokio::fs::write(&path, content).await {
        warn!(path = %path.display(), error = %e, "Failed to write stream log");
    }
}

async fn write_json(path: &Path, value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(e) = tokio::fs::write(path, json).await {
                warn!(path = %path.display(), error = %e, "Failed to write job metadata");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize job metadata"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tempfile::TempDir;

    fn job_request(artifacts: &Path, timeout: Duration) -> JobRequest {
        JobRequest {
            image: "skillbench-test:latest".into(),
            command: vec!["claude".into(), "--print".into(), "hi".into()],
            env: BTreeMap::from([("SKILLBENCH_MODEL".to_string(), "m".to_string())]),
            timeout,
            artifacts_dir: artifacts.to_path_buf(),
            network_allowlist: vec!["api.anthropic.com".into()],
            workdir: "/workspace".into(),
            use_host_network: true,
        }
    }

    /// A shell stand-in for the docker CLI that logs every invocation.
    fn fake_docker(log: &Path, run_body: &str) -> DockerDriver {
        let script = format!(
            r#"echo "$@" >> '{log}'
case "$1" in
  run) {run_body} ;;
  *) exit 0 ;;
esac"#,
            log = log.display(),
            run_body = run_body
        );
        DockerDriver::with_command("sh", vec!["-c".into(), script, "docker".into()])
    }

    #[test]
    fn test_run_args() {
        let driver = DockerDriver::new();
        let args = driver.run_args(
            &job_request(Path::new("/tmp/artifacts"), Duration::from_secs(5)),
            "skillbench-abc",
        );

        assert_eq!(&args[..3], &["run", "--name", "skillbench-abc"]);
        assert!(!args.contains(&"--rm".to_string()));
        assert!(args.contains(&"--network=host".to_string()));
        assert!(args.contains(&"/tmp/artifacts:/skillbench/artifacts".to_string()));
        assert!(args.contains(&"SKILLBENCH_MODEL=m".to_string()));
        assert!(args.contains(&"skillbench.network_allowlist=api.anthropic.com".to_string()));

        let image = args.iter().position(|a| a == "skillbench-test:latest").unwrap();
        assert_eq!(&args[image + 1..], &["claude", "--print", "hi"]);
    }

    #[test]
    fn test_run_args_without_host_network() {
        let driver = DockerDriver::new();
        let mut request = job_request(Path::new("/tmp/a"), Duration::from_secs(5));
        request.use_host_network = false;
        let args = driver.run_args(&request, "c");
        assert!(!args.iter().any(|a| a.starts_with("--network")));
    }

    #[tokio::test]
    async fn test_successful_job_persists_streams_and_removes_container() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let driver = fake_docker(&log, "echo agent-output; echo agent-warning >&2; exit 0");
        let artifacts = temp.path().join("artifacts");

        let job = driver
            .run_job(&job_request(&artifacts, Duration::from_secs(30)))
            .await;

        assert!(job.success(), "unexpected error: {:?}", job.error);
        assert_eq!(job.stdout.trim(), "agent-output");
        let artifacts = job.artifacts_path.clone();
        assert_eq!(
            std::fs::read_to_string(artifacts.join("stdout.log")).unwrap().trim(),
            "agent-output"
        );
        assert!(artifacts.join("stderr.log").exists());
        assert!(artifacts.join(JOB_METADATA_FILE).exists());

        let calls = std::fs::read_to_string(&log).unwrap();
        assert!(calls.lines().any(|l| l.starts_with("cp ")));
        assert!(calls.lines().last().unwrap().starts_with("rm -f skillbench-"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_embeds_stderr() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let driver = fake_docker(&log, "echo 'model not found' >&2; exit 3");

        let job = driver
            .run_job(&job_request(&temp.path().join("a"), Duration::from_secs(30)))
            .await;

        assert_eq!(job.exit_code, 3);
        assert!(!job.success());
        let error = job.error.unwrap();
        assert!(error.contains("non-zero code 3"));
        assert!(error.contains("model not found"));
        assert!(std::fs::read_to_string(&log).unwrap().contains("rm -f"));
    }

    #[tokio::test]
    async fn test_timeout_stops_kills_and_removes() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let driver = fake_docker(&log, "sleep 5");

        let job = driver
            .run_job(&job_request(&temp.path().join("a"), Duration::from_millis(300)))
            .await;

        assert_eq!(job.exit_code, FAILED_EXIT_CODE);
        assert!(job.error.as_deref().unwrap().contains("timed out"));

        let calls = std::fs::read_to_string(&log).unwrap();
        let verbs: Vec<&str> = calls
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .collect();
        let stop = verbs.iter().position(|v| *v == "stop").unwrap();
        let kill = verbs.iter().position(|v| *v == "kill").unwrap();
        let rm = verbs.iter().position(|v| *v == "rm").unwrap();
        assert!(stop < kill && kill < rm);
    }

    #[tokio::test]
    async fn test_failed_copy_is_recorded_not_raised() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let script = format!(
            r#"echo "$@" >> '{}'
case "$1" in
  run) exit 0 ;;
  cp) echo 'no such container path' >&2; exit 1 ;;
  *) exit 0 ;;
esac"#,
            log.display()
        );
        let driver = DockerDriver::with_command("sh", vec!["-c".into(), script, "docker".into()]);

        let job = driver
            .run_job(&job_request(&temp.path().join("a"), Duration::from_secs(30)))
            .await;

        assert!(job.success());
        let note = std::fs::read_to_string(job.artifacts_path.join(WORKSPACE_COPY_ERROR_FILE)).unwrap();
        assert!(note.contains("no such container path"));
    }

    #[tokio::test]
    async fn test_build_failure_is_truncated() {
        let temp = TempDir::new().unwrap();
        let skill = temp.path().join("skill");
        std::fs::create_dir_all(&skill).unwrap();
        std::fs::write(skill.join("SKILL.md"), "x").unwrap();

        let driver = DockerDriver::with_command(
            "sh",
            vec![
                "-c".into(),
                "i=0; while [ $i -lt 500 ]; do echo 'layer error line' >&2; i=$((i+1)); done; exit 1"
                    .into(),
                "docker".into(),
            ],
        );
        let result = driver
            .build_image(&ImageBuildRequest {
                base_image: "alpine".into(),
                layers: Vec::new(),
                skill_path: skill,
                adapter_script: None,
                setup_commands: Vec::new(),
                tag: "t".into(),
                workdir: "/workspace".into(),
            })
            .await;

        assert!(!result.is_success());
        assert!(result.image_id.is_empty());
        let error = result.error.unwrap();
        assert!(error.starts_with("Docker build failed"));
        assert!(error.len() < BUILD_ERROR_TAIL + 100);
    }

    #[tokio::test]
    async fn test_build_success_reads_image_id() {
        let temp = TempDir::new().unwrap();
        let skill = temp.path().join("skill");
        std::fs::create_dir_all(&skill).unwrap();
        std::fs::write(skill.join("SKILL.md"), "x").unwrap();

        // Args: build --tag T --file F --iidfile PATH CONTEXT
        let driver = DockerDriver::with_command(
            "sh",
            vec![
                "-c".into(),
                "printf 'sha256:feedbeef' > \"$7\"".into(),
                "docker".into(),
            ],
        );
        let result = driver
            .build_image(&ImageBuildRequest {
                base_image: "alpine".into(),
                layers: Vec::new(),
                skill_path: skill,
                adapter_script: None,
                setup_commands: vec!["echo hi".into()],
                tag: "t".into(),
                workdir: "/workspace".into(),
            })
            .await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.image_id, "sha256:feedbeef");
        assert_eq!(result.build_logs.last().unwrap(), "Built image sha256:feedbeef");
    }

    #[tokio::test]
    async fn test_staging_failure_skips_docker_build() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("invoked");
        let driver = DockerDriver::with_command(
            "sh",
            vec![
                "-c".into(),
                format!("touch '{}'", marker.display()),
                "docker".into(),
            ],
        );
        let result = driver
            .build_image(&ImageBuildRequest {
                base_image: "alpine".into(),
                layers: Vec::new(),
                skill_path: temp.path().join("missing-skill"),
                adapter_script: None,
                setup_commands: Vec::new(),
                tag: "t".into(),
                workdir: "/workspace".into(),
            })
            .await;

        assert!(!result.is_success());
        assert!(result.error.unwrap().starts_with("Failed to stage build context"));
        assert!(!marker.exists());
    }

}
