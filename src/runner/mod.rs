//! Evaluation runner.
//!
//! # Architecture
//!
//! ```text
//! EvalConfig → Executor → (harness × task) combinations
//!                 │
//!                 ├─ build image → run job → metrics → scorers → cleanup
//!                 │
//!                 └─ Collector → ProgressLog / ResultReporter → results.json
//! ```
//!
//! # Example
//!
//! ```ignore
//! use skillbench::config::EvalConfig;
//! use skillbench::runner::{ConsoleReporter, Executor, ProgressLog};
//! use skillbench::sandbox::DockerDriver;
//!
//! let config = EvalConfig::load("eval.yaml")?;
//! let progress = Arc::new(ProgressLog::stdout());
//! let result = Executor::new(config, Arc::new(DockerDriver::new()))
//!     .with_progress(progress.clone())
//!     .with_reporter(Arc::new(ConsoleReporter::new(progress)))
//!     .run()
//!     .await;
//!
//! println!("Pass rate: {:.1}%", result.pass_rate());
//! ```

pub mod executor;
pub mod progress;
pub mod reporter;
pub mod result;
pub mod tracker;

pub use executor::{image_tag, new_run_id, Combination, EnvLookup, Executor};
pub use progress::ProgressLog;
pub use reporter::{model_table, run_summary_lines, ConsoleReporter, ResultReporter};
pub use result::{EvalResult, ModelKey, ModelSummary, RunSummary, TaskResult};
pub use tracker::ModelBatchTracker;
