//! Errors that end the whole process rather than a single experiment.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("results directory not found: {0}")]
    ResultsRootNotFound(PathBuf),

    #[error("mutation workspace not found: {0}")]
    WorkspaceNotFound(PathBuf),

    #[error("experiment directory not found: {0}")]
    ExperimentNotFound(PathBuf),

    #[error("failed to load configuration: {0:#}")]
    Config(#[from] anyhow::Error),
}
