//! Removes failing tests from a Python test module.
//!
//! Two strategies produce the same set of retained tests:
//! - **structural**: parse with tree-sitter, drop the failing definitions, splice the
//!   remaining source back together and re-parse it to make sure it is still valid
//! - **textual**: line scanning driven by indentation, used whenever the structural
//!   path cannot parse its input or output
//!
//! Non-test code, fixtures (`setUp`, `tearDown`, ...) and helper methods are always
//! kept. A test class that would be left without test methods is dropped entirely.

mod structural;
mod textual;

pub use structural::test_identifiers;

use crate::outcome::Outcome;
use std::collections::BTreeSet;

/// Prefix unittest uses to discover test methods.
const TEST_PREFIX: &str = "test";

/// Whether a function name denotes a test rather than a fixture or helper.
fn is_test_name(name: &str) -> bool {
    name.starts_with(TEST_PREFIX)
}

/// Reduce `source` to the tests not listed in `failing`.
///
/// Returns `Success` when the structural strategy produced the output and `Degraded`
/// when the textual fallback had to be used. Never fails.
pub fn reduce_source(source: &str, failing: &BTreeSet<String>) -> Outcome<String> {
    if failing.is_empty() {
        return Outcome::Success(source.to_string());
    }

    match structural::reduce(source, failing) {
        Ok(reduced) => Outcome::Success(reduced),
        Err(e) => {
            tracing::debug!("Structural reduction unavailable: {:#}", e);
            Outcome::degraded(textual::reduce(source, failing), e.to_string())
        }
    }
}

/// Leading whitespace width of a line.
fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}
