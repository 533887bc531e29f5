//! Sandbox driver: image builds and container jobs.
//!
//! The driver turns "build an image, then run a command in it" into
//! operations against a container runtime. Every outcome is returned as
//! data ([`ImageBuildResult`], [`JobResult`]); driver methods never fail
//! with an `Err`, so callers can fold failures into task results.
//!
//! One container job moves through
//! `created → running → {completed | timed-out} → extracted → removed`,
//! and `removed` is reached from every state.

pub mod docker;
pub mod dockerfile;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use docker::DockerDriver;
pub use dockerfile::{BuildContext, DockerfileBuilder};

/// Exit code reserved for timeouts and orchestration-level failures.
pub const FAILED_EXIT_CODE: i32 = -1;

/// Outcome of an image build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuildResult {
    /// Resolved image identifier. Empty on failure.
    pub image_id: String,
    /// Human-readable build steps, in order.
    pub build_logs: Vec<String>,
    /// Failure description.
    pub error: Option<String>,
}

impl ImageBuildResult {
    /// Creates a successful build result.
    pub fn success(image_id: impl Into<String>, build_logs: Vec<String>) -> Self {
        Self {
            image_id: image_id.into(),
            build_logs,
            error: None,
        }
    }

    /// Creates a failed build result.
    pub fn failure(build_logs: Vec<String>, error: impl Into<String>) -> Self {
        Self {
            image_id: String::new(),
            build_logs,
            error: Some(error.into()),
        }
    }

    /// Returns true if the build produced an image.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one container job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Process exit code, or [`FAILED_EXIT_CODE`].
    pub exit_code: i32,
    /// Host directory holding the job's artifacts.
    pub artifacts_path: PathBuf,
    /// Wall-clock duration of the job.
    pub duration_seconds: f64,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Human-readable failure cause.
    pub error: Option<String>,
}

impl JobResult {
    /// Creates a job result that never reached a container.
    pub fn not_run(artifacts_path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            exit_code: FAILED_EXIT_CODE,
            artifacts_path: artifacts_path.into(),
            duration_seconds: 0.0,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.into()),
        }
    }

    /// Returns true if the job exited 0 without error.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }
}

/// Inputs for [`SandboxDriver::build_image`].
#[derive(Debug, Clone)]
pub struct ImageBuildRequest {
    /// Image to build from.
    pub base_image: String,
    /// Files or directories copied into the working directory.
    pub layers: Vec<PathBuf>,
    /// Skill directory on the host.
    pub skill_path: PathBuf,
    /// Adapter script on the host, if any.
    pub adapter_script: Option<PathBuf>,
    /// Build steps, run in order.
    pub setup_commands: Vec<String>,
    /// Tag for the built image.
    pub tag: String,
    /// Final working directory of the image.
    pub workdir: String,
}

/// Inputs for [`SandboxDriver::run_job`].
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Image to run.
    pub image: String,
    /// Command executed in the container.
    pub command: Vec<String>,
    /// Environment passed to the container.
    pub env: BTreeMap<String, String>,
    /// Hard limit on container run time.
    pub timeout: Duration,
    /// Host directory bind-mounted for artifacts.
    pub artifacts_dir: PathBuf,
    /// Hosts the job is expected to reach (recorded, not enforced).
    pub network_allowlist: Vec<String>,
    /// Working directory inside the container.
    pub workdir: String,
    /// Whether the container shares the host network.
    pub use_host_network: bool,
}

/// Trait for container runtimes.
#[async_trait]
pub trait SandboxDriver: Send + Sync {
    /// Builds an evaluation image.
    async fn build_image(&self, request: &ImageBuildRequest) -> ImageBuildResult;

    /// Runs one command in a fresh container and extracts its artifacts.
    async fn run_job(&self, request: &JobRequest) -> JobResult;

    /// Best-effort removal of a built image.
    async fn cleanup(&self, image: &str);
}

/// Keeps at most the last `max_chars` characters of `s`.
pub fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let skipped: String = s.chars().skip(count - max_chars).collect();
    format!("[...truncated] {}", skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_success_requires_zero_and_no_error() {
        let mut job = JobResult {
            exit_code: 0,
            artifacts_path: PathBuf::from("/tmp/a"),
            duration_seconds: 1.5,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
        };
        assert!(job.success());

        job.error = Some("copy failed".into());
        assert!(!job.success());

        job.error = None;
        job.exit_code = 2;
        assert!(!job.success());
    }

    #[test]
    fn test_not_run_uses_reserved_exit_code() {
        let job = JobResult::not_run("/tmp/a", "image build failed");
        assert_eq!(job.exit_code, FAILED_EXIT_CODE);
        assert!(!job.success());
    }

    #[test]
    fn test_build_result_invariant() {
        let ok = ImageBuildResult::success("sha256:abc", vec!["FROM x".into()]);
        assert!(ok.is_success());
        let failed = ImageBuildResult::failure(Vec::new(), "boom");
        assert!(!failed.is_success());
        assert!(failed.image_id.is_empty());
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("short", 10), "short");
        let long = "a".repeat(20) + "END";
        let t = tail(&long, 3);
        assert!(t.ends_with("END"));
        assert!(t.starts_with("[...truncated]"));
    }

    #[test]
    fn test_tail_is_char_safe() {
        let s = "ééééé";
        assert_eq!(tail(s, 2), "[...truncated] éé");
    }
}
