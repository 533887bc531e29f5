//! On-disk artifact storage for evaluation runs.
//!
//! Runs, per-(task, harness) directories, metadata, trajectories and
//! per-scorer results all live under one base directory. See
//! [`artifacts`] for the layout.

pub mod artifacts;

pub use artifacts::{ArtifactStore, RunArtifacts, TaskArtifacts, METADATA_FILE, RESULTS_FILE};
