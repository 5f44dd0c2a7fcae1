//! Classifies the tests of one experiment as passing or failing.
//!
//! Runs the test runner in verbose mode once and scans its per-test status lines.
//! Nothing here returns an error: a runner that crashes, hangs or prints nothing
//! recognizable yields an empty classification, and the caller keeps the source as is.

use crate::config::RunnerConfig;
use crate::outcome::Outcome;
use crate::process::{run_command, CommandStatus};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Passing and failing test method names from a single runner invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestClassification {
    pub passing: BTreeSet<String>,
    pub failing: BTreeSet<String>,
}

impl TestClassification {
    /// Filtering only makes sense when some tests pass and some fail.
    ///
    /// With no passing tests the file is already minimal; with no failing tests
    /// it is fully passing. Either way the source is used unmodified.
    pub fn needs_filtering(&self) -> bool {
        !self.passing.is_empty() && !self.failing.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.passing.is_empty() && self.failing.is_empty()
    }
}

/// `test_x (module.Class.test_x) ... ok`, optionally with a description before the dots.
fn status_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\w+) \([\w.]+\).*\.\.\. (ok|FAIL|ERROR)\s*$").expect("valid regex")
    })
}

/// `test_x (module.Class.test_x)` alone on a line; a docstring line follows.
fn name_only_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+) \([\w.]+\)\s*$").expect("valid regex"))
}

/// Status on a docstring line following a name-only line.
fn trailing_status() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.\.\. (ok|FAIL|ERROR)\s*$").expect("valid regex"))
}

/// `FAIL: test_x (module.Class.test_x)` headers of the failure report.
fn failure_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:FAIL|ERROR): (\w+) \(").expect("valid regex"))
}

fn record(name: &str, status: &str, classification: &mut TestClassification) {
    if status == "ok" {
        classification.passing.insert(name.to_string());
    } else {
        classification.failing.insert(name.to_string());
    }
}

/// Parse verbose runner output into passing and failing name sets.
///
/// A name seen as both passing and failing is classified as failing.
pub fn classify_output(output: &str) -> TestClassification {
    let mut classification = TestClassification::default();
    let mut pending_name: Option<String> = None;

    for line in output.lines() {
        let line = line.trim_end_matches('\r');

        if let Some(caps) = status_line().captures(line) {
            record(&caps[1], &caps[2], &mut classification);
            pending_name = None;
        } else if let Some(caps) = name_only_line().captures(line) {
            pending_name = Some(caps[1].to_string());
        } else if let Some(caps) = failure_header().captures(line) {
            classification.failing.insert(caps[1].to_string());
            pending_name = None;
        } else if let Some(name) = pending_name.take() {
            if let Some(caps) = trailing_status().captures(line) {
                record(&name, &caps[1], &mut classification);
            }
        }
    }

    let failing = classification.failing.clone();
    classification.passing.retain(|name| !failing.contains(name));
    classification
}

/// Run the experiment's test file and classify its tests.
pub async fn classify_tests(test_file: &Path, runner: &RunnerConfig) -> Outcome<TestClassification> {
    let Some(module) = test_file.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return Outcome::degraded(
            TestClassification::default(),
            format!("no module name in {}", test_file.display()),
        );
    };
    let working_dir = test_file.parent().unwrap_or_else(|| Path::new("."));

    let result = run_command(
        working_dir,
        &runner.command,
        &[&module, "-v"],
        Some(Duration::from_secs(runner.timeout_seconds)),
    )
    .await;

    if result.timed_out() {
        return Outcome::degraded(
            TestClassification::default(),
            format!("test run timed out after {}s", runner.timeout_seconds),
        );
    }
    if let CommandStatus::SpawnFailed(reason) = result.status {
        return Outcome::degraded(TestClassification::default(), reason);
    }

    // unittest writes its verbose report to stderr
    let classification = classify_output(&format!("{}\n{}", result.stderr, result.stdout));
    if classification.is_empty() {
        return Outcome::degraded(classification, "no test status lines in runner output");
    }

    Outcome::Success(classification)
}
