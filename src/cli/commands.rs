//! CLI command definitions for skillbench.
//!
//! `run` executes an evaluation, `validate` checks a config without touching
//! Docker, and `report` reprints a finished run from its `results.json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::config::EvalConfig;
use crate::runner::{
    model_table, run_summary_lines, ConsoleReporter, EvalResult, Executor, ModelKey, ProgressLog,
    TaskResult,
};
use crate::sandbox::DockerDriver;
use crate::storage::RunArtifacts;

/// Evaluate coding-agent CLIs against skill tasks in Docker sandboxes.
#[derive(Parser)]
#[command(name = "skillbench")]
#[command(about = "Evaluate coding-agent CLIs against skill tasks in isolated containers")]
#[command(version)]
#[command(
    long_about = "skillbench runs every task of an evaluation against every configured harness/model pair inside fresh Docker containers, then scores the results.\n\nExample usage:\n  skillbench run --config eval.yaml --parallel 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run an evaluation.
    Run(RunArgs),

    /// Load and validate a config, then print the evaluation matrix.
    Validate(ValidateArgs),

    /// Print the summary of a finished run.
    Report(ReportArgs),
}

/// Arguments for `skillbench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Evaluation config file (YAML).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Maximum number of combinations in flight (overrides the config).
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Root directory for run artifacts (overrides the config).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only run these harnesses, by type or `type:model`. Repeatable.
    #[arg(long = "harness")]
    pub harnesses: Vec<String>,

    /// Only run these task ids. Repeatable.
    #[arg(long = "task")]
    pub tasks: Vec<String>,
}

/// Arguments for `skillbench validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Evaluation config file (YAML).
    #[arg(short, long)]
    pub config: PathBuf,
}

/// Arguments for `skillbench report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Run directory containing `results.json`.
    pub run_dir: PathBuf,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_eval_command(args).await,
        Commands::Validate(args) => run_validate_command(args),
        Commands::Report(args) => run_report_command(args).await,
    }
}

/// Loads the config and applies command-line overrides and filters.
fn load_config(args: &RunArgs) -> anyhow::Result<EvalConfig> {
    let mut config = EvalConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    if let Some(parallel) = args.parallel {
        config.execution.max_parallel = parallel;
    }
    if let Some(output) = &args.output {
        config.execution.output_dir = output.clone();
    }

    let had_harnesses = !config.harnesses.is_empty();
    config.retain(&args.harnesses, &args.tasks);
    if had_harnesses && config.harnesses.is_empty() {
        anyhow::bail!("No configured harness matches {:?}", args.harnesses);
    }
    if config.tasks.is_empty() {
        anyhow::bail!("No configured task matches {:?}", args.tasks);
    }

    config.validate().context("Invalid config after applying overrides")?;
    Ok(config)
}

async fn run_eval_command(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    info!(
        config = %args.config.display(),
        tasks = config.tasks.len(),
        harnesses = config.effective_harnesses().len(),
        "Loaded evaluation config"
    );

    let progress = Arc::new(ProgressLog::stdout());
    let executor = Executor::new(config, Arc::new(DockerDriver::new()))
        .with_progress(Arc::clone(&progress))
        .with_reporter(Arc::new(ConsoleReporter::new(progress)));

    let result = executor.run().await;
    let run_dir = executor.config().execution.output_dir.join(&result.run_id);
    println!("\nArtifacts: {}", run_dir.display());

    if let Some(error) = &result.error {
        anyhow::bail!("Run failed: {}", error);
    }
    if !result.all_passed() {
        anyhow::bail!(
            "{} of {} combinations did not pass",
            result.summary.total - result.summary.passed,
            result.summary.total
        );
    }
    Ok(())
}

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let config = EvalConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    println!("✓ {} is valid", args.config.display());
    for line in matrix_lines(&config) {
        println!("{}", line);
    }
    Ok(())
}

async fn run_report_command(args: ReportArgs) -> anyhow::Result<()> {
    let run = RunArtifacts::open(&args.run_dir);
    let result = run
        .read_results()
        .await
        .with_context(|| format!("Failed to read results from {}", args.run_dir.display()))?;

    for line in report_lines(&result) {
        println!("{}", line);
    }
    Ok(())
}

/// Describes the harness × task matrix of a config.
fn matrix_lines(config: &EvalConfig) -> Vec<String> {
    let harnesses = config.effective_harnesses();
    let mut lines = vec![format!(
        "  {}: {} harness(es) x {} task(s) = {} combinations, max_parallel {}",
        config.name,
        harnesses.len(),
        config.tasks.len(),
        harnesses.len() * config.tasks.len(),
        config.execution.max_parallel
    )];
    for harness in &harnesses {
        lines.push(format!("  harness {}", harness.display_name()));
    }
    for task in &config.tasks {
        let scorers: Vec<String> = config.scorers_for(task).map(|s| s.name()).collect();
        lines.push(format!(
            "  task {} (timeout {}s, scorers: [{}])",
            task.id,
            task.timeout_secs,
            scorers.join(", ")
        ));
    }
    lines
}

/// Per-model tables followed by the run summary.
fn report_lines(result: &EvalResult) -> Vec<String> {
    let mut batches: std::collections::BTreeMap<ModelKey, Vec<TaskResult>> = Default::default();
    for task in &result.task_results {
        batches.entry(task.model_key()).or_default().push(task.clone());
    }

    let mut lines = Vec::new();
    for (key, batch) in &batches {
        lines.extend(model_table(key, batch));
    }
    lines.extend(run_summary_lines(result));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_with_filters() {
        let cli = Cli::try_parse_from([
            "skillbench",
            "run",
            "--config",
            "eval.yaml",
            "-p",
            "2",
            "--harness",
            "codex",
            "--harness",
            "gemini",
            "--task",
            "one",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("eval.yaml"));
                assert_eq!(args.parallel, Some(2));
                assert_eq!(args.harnesses, vec!["codex", "gemini"]);
                assert_eq!(args.tasks, vec!["one"]);
                assert!(args.output.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["skillbench", "report", "./runs/x", "--log-level", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Report(_)));
    }

    fn write_config(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("eval.yaml");
        fs::write(
            &path,
            "name: demo\nskill: skill\nharnesses:\n  - type: codex\n  - type: gemini\ntasks:\n  - id: one\n    prompt: p\n  - id: two\n    prompt: q\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let args = RunArgs {
            config: write_config(&dir),
            parallel: Some(3),
            output: Some(PathBuf::from("/tmp/out")),
            harnesses: vec!["gemini".into()],
            tasks: vec![],
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.execution.max_parallel, 3);
        assert_eq!(config.execution.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.harnesses.len(), 1);
        assert_eq!(config.tasks.len(), 2);
    }

    #[test]
    fn test_load_config_rejects_empty_filter_match() {
        let dir = TempDir::new().unwrap();
        let args = RunArgs {
            config: write_config(&dir),
            parallel: None,
            output: None,
            harnesses: vec![],
            tasks: vec!["missing".into()],
        };
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("No configured task"));
    }

    #[test]
    fn test_matrix_lines() {
        let dir = TempDir::new().unwrap();
        let config = EvalConfig::load(write_config(&dir)).unwrap();
        let lines = matrix_lines(&config);
        assert!(lines[0].contains("2 harness(es) x 2 task(s) = 4 combinations"));
        assert!(lines.iter().any(|l| l == "  harness codex:gpt-5-codex"));
    }
}
