//! Mutation tool invocation.
//!
//! Handles staging the test source, resetting the shared workspace, running the
//! tool and collecting its results listing.

use crate::config::MutationToolConfig;
use crate::error::BackfillError;
use crate::outcome::Outcome;
use crate::process::{run_command, CommandStatus};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything captured from one mutation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRun {
    /// Combined stdout and stderr of `run`
    pub run_output: String,
    /// Exit code of `run`; non-zero is normal when mutants survive
    pub exit_code: Option<i32>,
    /// stdout of `results`, verbatim
    pub listing: String,
}

/// Owns every write to the mutation tool's workspace.
pub struct MutationInvoker<'a> {
    workspace: PathBuf,
    config: &'a MutationToolConfig,
}

impl<'a> MutationInvoker<'a> {
    /// Fails when the workspace directory does not exist.
    pub fn new(workspace: &Path, config: &'a MutationToolConfig) -> Result<Self, BackfillError> {
        if !workspace.is_dir() {
            return Err(BackfillError::WorkspaceNotFound(workspace.to_path_buf()));
        }
        Ok(Self {
            workspace: workspace.to_path_buf(),
            config,
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Stage `source`, reset the workspace, run the tool and list its results.
    ///
    /// The reset always completes before the run starts; a failed reset fails the
    /// invocation instead of running against stale state.
    pub async fn invoke(&self, source: &str) -> Outcome<MutationRun> {
        let staged = match self.stage(source).await {
            Ok(path) => path,
            Err(e) => return Outcome::failed(format!("{:#}", e)),
        };
        tracing::debug!("Staged test source at {}", staged.display());

        match self.reset() {
            Ok(removed) => tracing::debug!("Workspace reset removed {} entries", removed),
            Err(e) => return Outcome::failed(format!("{:#}", e)),
        }

        let (run_output, exit_code) = match self.run().await {
            Ok(run) => run,
            Err(reason) => return Outcome::failed(reason),
        };

        match self.results().await {
            Ok(listing) => Outcome::Success(MutationRun {
                run_output,
                exit_code,
                listing,
            }),
            Err(reason) => Outcome::degraded(
                MutationRun {
                    run_output,
                    exit_code,
                    listing: String::new(),
                },
                reason,
            ),
        }
    }

    async fn stage(&self, source: &str) -> Result<PathBuf> {
        let staged = self.workspace.join(&self.config.staged_test_path);
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&staged, source)
            .await
            .with_context(|| format!("Failed to stage test source at {}", staged.display()))?;
        Ok(staged)
    }

    /// Delete cache files and per-mutant metadata left by earlier runs.
    fn reset(&self) -> Result<usize> {
        let root = glob::Pattern::escape(&self.workspace.to_string_lossy());
        let mut removed = 0;

        for pattern in &self.config.reset_globs {
            let full = format!("{}/{}", root, pattern);
            let entries = glob::glob(&full)
                .with_context(|| format!("Invalid reset pattern: {}", pattern))?;

            for entry in entries {
                let path = entry.context("Failed to read workspace entry")?;
                let removal = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                removal.with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn run(&self) -> Result<(String, Option<i32>), String> {
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let result = run_command(&self.workspace, &self.config.command, &["run"], Some(timeout)).await;

        match &result.status {
            CommandStatus::Exited(code) => {
                tracing::debug!("Mutation run finished in {}ms", result.duration_ms);
                if !result.success() {
                    tracing::debug!("Mutation run exited with {:?}", code);
                }
                Ok((result.combined_output(), *code))
            }
            CommandStatus::TimedOut => Err(format!(
                "mutation run timed out after {}s",
                self.config.timeout_seconds
            )),
            CommandStatus::SpawnFailed(reason) => Err(reason.clone()),
        }
    }

    async fn results(&self) -> Result<String, String> {
        let result = run_command(&self.workspace, &self.config.command, &["results"], None).await;

        match result.status {
            CommandStatus::Exited(_) => Ok(result.stdout),
            CommandStatus::TimedOut => Err("results listing timed out".to_string()),
            CommandStatus::SpawnFailed(reason) => Err(reason),
        }
    }
}
