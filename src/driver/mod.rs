//! Batch driver.
//!
//! Discovers experiment directories under the results root and runs the backfill
//! pipeline over each eligible one, strictly one after another. An experiment whose
//! results file is already present and non-empty is skipped, which makes re-running
//! a batch safe: only experiments that failed or never ran are picked up again.

use crate::analysis::{merge_into_analysis, regenerate_report, write_json, ArtifactUpdate};
use crate::classifier::classify_tests;
use crate::config::{Config, FilesConfig};
use crate::error::BackfillError;
use crate::mutation::{parse_results, MutationInvoker};
use crate::outcome::{BatchSummary, ExperimentStatus, Outcome};
use crate::reducer::{reduce_source, test_identifiers};
use crate::rewriter::ImportRewriter;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One experiment directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentUnit {
    pub dir: PathBuf,
    pub test_file: PathBuf,
    /// A non-empty results file already exists
    pub has_results: bool,
}

impl ExperimentUnit {
    /// The experiment in `dir`, if it holds a test file.
    pub fn at(dir: &Path, files: &FilesConfig) -> Option<Self> {
        let test_file = dir.join(&files.test_file);
        if !test_file.is_file() {
            return None;
        }
        let has_results = std::fs::metadata(dir.join(&files.results_file))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);

        Some(Self {
            dir: dir.to_path_buf(),
            test_file,
            has_results,
        })
    }
}

/// Find every experiment below `results_root`, sorted by path.
///
/// With a `run_id`, only directories whose path contains `run_<run_id>` are kept.
pub fn discover(results_root: &Path, files: &FilesConfig, run_id: Option<&str>) -> Vec<ExperimentUnit> {
    let run_marker = run_id.map(|id| format!("run_{}", id));

    let mut units: Vec<ExperimentUnit> = WalkDir::new(results_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == files.test_file.as_str())
        .filter_map(|e| e.path().parent().and_then(|dir| ExperimentUnit::at(dir, files)))
        .filter(|unit| match &run_marker {
            Some(marker) => unit.dir.to_string_lossy().contains(marker.as_str()),
            None => true,
        })
        .collect();

    units.sort_by(|a, b| a.dir.cmp(&b.dir));
    units
}

/// Log a degraded step and turn a failed one into an error.
fn settle<T>(step: &str, outcome: Outcome<T>) -> Result<T> {
    if let Outcome::Degraded { reason, .. } = &outcome {
        tracing::warn!("{} degraded: {}", step, reason);
    }
    outcome
        .into_result()
        .map_err(|reason| anyhow!("{} failed: {}", step, reason))
}

pub struct BatchDriver<'a> {
    config: &'a Config,
    rewriter: ImportRewriter,
    dry_run: bool,
}

impl<'a> BatchDriver<'a> {
    pub fn new(config: &'a Config, dry_run: bool) -> Self {
        let rewriter = ImportRewriter::new(
            &config.module.name,
            &config.mutation.staged_test_path,
            &config.module.search_path,
        );
        Self {
            config,
            rewriter,
            dry_run,
        }
    }

    /// Process every eligible experiment under the configured results root.
    pub async fn run_batch(&self, run_id: Option<&str>) -> Result<BatchSummary, BackfillError> {
        let root = &self.config.paths.results_dir;
        if !root.is_dir() {
            return Err(BackfillError::ResultsRootNotFound(root.clone()));
        }
        let invoker = self.invoker()?;

        let units = discover(root, &self.config.files, run_id);
        tracing::info!("Found {} experiments under {}", units.len(), root.display());

        let mut summary = BatchSummary::default();
        for unit in &units {
            let status = if unit.has_results {
                tracing::info!("Skipping {}: results already present", unit.dir.display());
                ExperimentStatus::Skipped
            } else {
                self.process(unit, &invoker).await
            };
            summary.record(status);
        }

        self.log_summary(&summary);
        Ok(summary)
    }

    /// Process one experiment directory, even if it already has results.
    pub async fn run_single(&self, dir: &Path) -> Result<BatchSummary, BackfillError> {
        let unit = ExperimentUnit::at(dir, &self.config.files)
            .ok_or_else(|| BackfillError::ExperimentNotFound(dir.to_path_buf()))?;
        let invoker = self.invoker()?;

        if unit.has_results {
            tracing::warn!(
                "{} already has results; processing it again",
                unit.dir.display()
            );
        }

        let mut summary = BatchSummary::default();
        summary.record(self.process(&unit, &invoker).await);

        self.log_summary(&summary);
        Ok(summary)
    }

    fn invoker(&self) -> Result<MutationInvoker<'a>, BackfillError> {
        let invoker = MutationInvoker::new(&self.config.paths.workspace_dir, &self.config.mutation)?;
        tracing::info!("Mutation workspace: {}", invoker.workspace().display());
        tracing::debug!(
            "Tests are staged at {}",
            self.config.staged_test_file().display()
        );
        Ok(invoker)
    }

    fn log_summary(&self, summary: &BatchSummary) {
        tracing::info!(
            "Backfill finished{} ({} experiments): processed={} skipped={} failed={}",
            if self.dry_run { " (dry run)" } else { "" },
            summary.total(),
            summary.processed,
            summary.skipped,
            summary.failed
        );
    }

    async fn process(&self, unit: &ExperimentUnit, invoker: &MutationInvoker<'_>) -> ExperimentStatus {
        if self.dry_run {
            tracing::info!("Would process {}", unit.dir.display());
            return ExperimentStatus::Processed;
        }

        tracing::info!("Processing {}", unit.dir.display());
        let status = match self.pipeline(unit, invoker).await {
            Ok(()) => ExperimentStatus::Processed,
            Err(e) => {
                tracing::error!("Experiment {} failed: {:#}", unit.dir.display(), e);
                ExperimentStatus::Failed
            }
        };
        tracing::info!("{}: {}", unit.dir.display(), status);
        status
    }

    async fn pipeline(&self, unit: &ExperimentUnit, invoker: &MutationInvoker<'_>) -> Result<()> {
        let files = &self.config.files;
        let source = tokio::fs::read_to_string(&unit.test_file)
            .await
            .with_context(|| format!("Failed to read {}", unit.test_file.display()))?;

        let classification = classify_tests(&unit.test_file, &self.config.runner).await;
        if let Some(c) = classification.value() {
            tracing::debug!("{} passing, {} failing", c.passing.len(), c.failing.len());
        }
        let classification = settle("test classification", classification)?;

        let reduced = if classification.needs_filtering() {
            let reduction = reduce_source(&source, &classification.failing);
            let strategy = if reduction.is_degraded() {
                "textual"
            } else {
                "structural"
            };
            let reduced = settle("source reduction", reduction)?;
            match test_identifiers(&reduced) {
                Some(kept) => tracing::info!("Kept {} tests ({} reduction)", kept.len(), strategy),
                None => tracing::info!("Reduced tests ({} reduction)", strategy),
            }
            reduced
        } else {
            source
        };

        let staged = self.rewriter.rewrite(&reduced);
        let run = settle("mutation run", invoker.invoke(&staged).await)?;

        let parsed = parse_results(&run.run_output, &run.listing);
        tracing::info!(
            "{} mutants, {} killed, score {}% ({})",
            parsed.stats.total_mutants,
            parsed.stats.killed,
            parsed.stats.mutation_score,
            parsed.strategy
        );

        write_json(&unit.dir.join(&files.stats_file), &parsed.stats)?;

        match merge_into_analysis(&unit.dir.join(&files.analysis_file), &parsed.stats)? {
            ArtifactUpdate::Written(path) => tracing::debug!("Updated {}", path.display()),
            ArtifactUpdate::Skipped { reason } => {
                tracing::info!("Analysis record not updated: {}", reason)
            }
        }
        match regenerate_report(&unit.dir, files)? {
            ArtifactUpdate::Written(path) => tracing::debug!("Wrote {}", path.display()),
            ArtifactUpdate::Skipped { reason } => tracing::info!("Report not regenerated: {}", reason),
        }

        // Written last: its presence marks the experiment as done.
        let results_path = unit.dir.join(&files.results_file);
        tokio::fs::write(&results_path, &run.listing)
            .await
            .with_context(|| format!("Failed to write {}", results_path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    const TEST_SOURCE: &str = r#"import unittest
from calculator import Calculator


class TestCalculator(unittest.TestCase):
    def setUp(self):
        self.calc = Calculator()

    def test_a(self):
        self.assertEqual(self.calc.add(1, 2), 3)

    def test_c(self):
        self.assertEqual(self.calc.add(1, 2), 4)


if __name__ == "__main__":
    unittest.main()
"#;

    const RUNNER_SCRIPT: &str = r#"echo "test_a (mutmut_test.TestCalculator.test_a) ... ok" >&2
echo "test_c (mutmut_test.TestCalculator.test_c) ... FAIL" >&2
exit 1"#;

    const TOOL_SCRIPT: &str = r#"case "$1" in
run) echo '2/2  🎉 1 🫥 0  ⏰ 0  🤔 0  🙁 1  🔇 0' ; exit 2 ;;
results) echo "calculator.x_add__mutmut_1: survived" ;;
esac"#;

    fn sh(script: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "fake".to_string(),
        ]
    }

    struct Fixture {
        root: TempDir,
        workspace: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let workspace = TempDir::new().unwrap();
            let mut config = Config::default();
            config.paths.results_dir = root.path().to_path_buf();
            config.paths.workspace_dir = workspace.path().to_path_buf();
            config.runner.command = sh(RUNNER_SCRIPT);
            config.runner.timeout_seconds = 10;
            config.mutation.command = sh(TOOL_SCRIPT);
            config.mutation.timeout_seconds = 10;
            Self {
                root,
                workspace,
                config,
            }
        }

        /// Create an experiment directory with a test file and both records.
        fn experiment(&self, relative: &str) -> PathBuf {
            let dir = self.root.path().join(relative);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("mutmut_test.py"), TEST_SOURCE).unwrap();
            std::fs::write(
                dir.join("analysis_results.json"),
                r#"{"summary": {"total_tests": 2, "line_coverage": 88.0}}"#,
            )
            .unwrap();
            std::fs::write(dir.join("experiment.json"), r#"{"model_name": "gpt-4o"}"#).unwrap();
            dir
        }

        fn read(&self, dir: &Path, name: &str) -> String {
            std::fs::read_to_string(dir.join(name)).unwrap()
        }
    }

    // =========================================================================
    // discovery tests
    // =========================================================================

    #[test]
    fn test_discover_sorted_with_results_flag() {
        let fx = Fixture::new();
        let b = fx.experiment("run_1/b");
        let a = fx.experiment("run_1/a");
        std::fs::write(a.join("mutmut_results.txt"), "listing").unwrap();
        std::fs::create_dir_all(fx.root.path().join("run_1/no_tests")).unwrap();

        let units = discover(fx.root.path(), &fx.config.files, None);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].dir, a);
        assert!(units[0].has_results);
        assert_eq!(units[1].dir, b);
        assert!(!units[1].has_results);
        assert_eq!(units[1].test_file, b.join("mutmut_test.py"));
    }

    #[test]
    fn test_discover_filters_by_run_id() {
        let fx = Fixture::new();
        fx.experiment("run_1/model_x");
        let wanted = fx.experiment("run_2/model_x");
        fx.experiment("run_12/model_x");

        let units = discover(fx.root.path(), &fx.config.files, Some("2"));
        let dirs: Vec<&PathBuf> = units.iter().map(|u| &u.dir).collect();
        assert_eq!(dirs, vec![&wanted]);
    }

    #[test]
    fn test_empty_results_file_is_eligible() {
        let fx = Fixture::new();
        let dir = fx.experiment("run_1/a");
        std::fs::write(dir.join("mutmut_results.txt"), "").unwrap();

        let unit = ExperimentUnit::at(&dir, &fx.config.files).unwrap();
        assert!(!unit.has_results);
    }

    #[test]
    fn test_unit_requires_test_file() {
        let fx = Fixture::new();
        assert!(ExperimentUnit::at(fx.root.path(), &fx.config.files).is_none());
    }

    // =========================================================================
    // fatal precondition tests
    // =========================================================================

    #[tokio::test]
    async fn test_missing_results_root_is_fatal() {
        let mut fx = Fixture::new();
        fx.config.paths.results_dir = fx.root.path().join("missing");
        let driver = BatchDriver::new(&fx.config, false);

        let result = driver.run_batch(None).await;
        assert!(matches!(result, Err(BackfillError::ResultsRootNotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_workspace_is_fatal() {
        let mut fx = Fixture::new();
        fx.config.paths.workspace_dir = fx.workspace.path().join("missing");
        let driver = BatchDriver::new(&fx.config, false);

        let result = driver.run_batch(None).await;
        assert!(matches!(result, Err(BackfillError::WorkspaceNotFound(_))));
    }

    #[tokio::test]
    async fn test_run_single_missing_experiment_is_fatal() {
        let fx = Fixture::new();
        let driver = BatchDriver::new(&fx.config, false);

        let result = driver.run_single(&fx.root.path().join("nowhere")).await;
        assert!(matches!(result, Err(BackfillError::ExperimentNotFound(_))));
    }

    // =========================================================================
    // batch tests
    // =========================================================================

    #[tokio::test]
    async fn test_batch_processes_experiment_end_to_end() {
        let fx = Fixture::new();
        let dir = fx.experiment("run_1/gpt");
        let driver = BatchDriver::new(&fx.config, false);

        let summary = driver.run_batch(None).await.unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                processed: 1,
                skipped: 0,
                failed: 0
            }
        );

        // only the passing test was staged, behind the path prelude
        let staged = std::fs::read_to_string(fx.config.staged_test_file()).unwrap();
        assert!(staged.contains("def test_a"));
        assert!(!staged.contains("def test_c"));
        assert!(staged.contains("def setUp"));
        assert!(staged.contains("# mutation workspace path setup"));

        assert_eq!(
            fx.read(&dir, "mutmut_results.txt").trim(),
            "calculator.x_add__mutmut_1: survived"
        );

        let stats: Value = serde_json::from_str(&fx.read(&dir, "mutmut-stats.json")).unwrap();
        assert_eq!(stats["total_mutants"], 2);
        assert_eq!(stats["killed"], 1);
        assert_eq!(stats["survived"], 1);
        assert_eq!(stats["mutation_score"], 50.0);

        let analysis: Value =
            serde_json::from_str(&fx.read(&dir, "analysis_results.json")).unwrap();
        assert_eq!(analysis["summary"]["mutation_score"], 50.0);
        assert_eq!(analysis["summary"]["total_tests"], 2);
        assert_eq!(analysis["mutation"]["killed"], 1);

        assert!(fx.read(&dir, "podsumowanie-gpt-4o.md").contains("| 🎉 Zabite | 1 |"));
    }

    #[tokio::test]
    async fn test_batch_second_pass_skips_everything() {
        let mut fx = Fixture::new();
        let dir = fx.experiment("run_1/gpt");

        let first = BatchDriver::new(&fx.config, false).run_batch(None).await.unwrap();
        assert_eq!(first.processed, 1);
        let stats_before = fx.read(&dir, "mutmut-stats.json");

        // any subprocess would now fail the experiment
        fx.config.runner.command = vec!["no-such-runner".to_string()];
        fx.config.mutation.command = vec!["no-such-tool".to_string()];
        let second = BatchDriver::new(&fx.config, false).run_batch(None).await.unwrap();

        assert_eq!(
            second,
            BatchSummary {
                processed: 0,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(fx.read(&dir, "mutmut-stats.json"), stats_before);
    }

    #[tokio::test]
    async fn test_batch_continues_after_failed_experiment() {
        let fx = Fixture::new();
        let broken = fx.experiment("run_1/a");
        std::fs::write(broken.join("mutmut_test.py"), b"\xff\xfe\xfd").unwrap();
        let good = fx.experiment("run_1/b");

        let summary = BatchDriver::new(&fx.config, false)
            .run_batch(None)
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(!broken.join("mutmut_results.txt").exists());
        assert!(good.join("mutmut_results.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_merge_is_retried_on_next_batch() {
        let fx = Fixture::new();
        let dir = fx.experiment("run_1/a");
        std::fs::write(dir.join("analysis_results.json"), "{not json").unwrap();

        let first = BatchDriver::new(&fx.config, false)
            .run_batch(None)
            .await
            .unwrap();
        assert_eq!(first.failed, 1);
        assert!(!dir.join("mutmut_results.txt").exists());

        std::fs::write(dir.join("analysis_results.json"), r#"{"summary": {}}"#).unwrap();
        let second = BatchDriver::new(&fx.config, false)
            .run_batch(None)
            .await
            .unwrap();

        assert_eq!(
            second,
            BatchSummary {
                processed: 1,
                skipped: 0,
                failed: 0
            }
        );
        let analysis: Value =
            serde_json::from_str(&fx.read(&dir, "analysis_results.json")).unwrap();
        assert_eq!(analysis["summary"]["mutation_score"], 50.0);
        assert!(dir.join("mutmut_results.txt").exists());
    }

    #[tokio::test]
    async fn test_batch_without_records_still_writes_results() {
        let fx = Fixture::new();
        let dir = fx.experiment("run_1/a");
        std::fs::remove_file(dir.join("analysis_results.json")).unwrap();

        let summary = BatchDriver::new(&fx.config, false)
            .run_batch(None)
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert!(dir.join("mutmut-stats.json").exists());
        assert!(!dir.join("analysis_results.json").exists());
        assert!(!dir.join("podsumowanie-gpt-4o.md").exists());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let fx = Fixture::new();
        let dir = fx.experiment("run_1/a");
        let done = fx.experiment("run_1/b");
        std::fs::write(done.join("mutmut_results.txt"), "listing").unwrap();

        let summary = BatchDriver::new(&fx.config, true)
            .run_batch(None)
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!dir.join("mutmut_results.txt").exists());
        assert!(!fx.config.staged_test_file().exists());
    }

    #[tokio::test]
    async fn test_run_single_reprocesses_existing_results() {
        let fx = Fixture::new();
        let dir = fx.experiment("run_1/a");
        std::fs::write(dir.join("mutmut_results.txt"), "old listing").unwrap();

        let summary = BatchDriver::new(&fx.config, false)
            .run_single(&dir)
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert!(fx.read(&dir, "mutmut_results.txt").contains("x_add__mutmut_1"));
    }
}
