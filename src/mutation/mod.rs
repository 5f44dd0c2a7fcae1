//! Mutation tool integration.
//!
//! This module provides functionality for:
//! - Staging a test source into the shared mutation workspace and running the tool
//! - Extracting normalized statistics from the tool's console output

pub mod invoker;
pub mod parser;

pub use invoker::MutationInvoker;
pub use parser::parse_results;

use serde::{Deserialize, Serialize};

/// Normalized mutation testing statistics for one experiment.
///
/// `mutation_score` is always derived from `killed` and `total_mutants`, so build
/// values through [`MutationStats::new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationStats {
    pub total_mutants: u64,
    pub killed: u64,
    pub survived: u64,
    pub timeout: u64,
    pub suspicious: u64,
    pub skipped: u64,
    /// Percentage of mutants killed, one decimal place
    pub mutation_score: f64,
}

impl MutationStats {
    pub fn new(
        total_mutants: u64,
        killed: u64,
        survived: u64,
        timeout: u64,
        suspicious: u64,
        skipped: u64,
    ) -> Self {
        Self {
            total_mutants,
            killed,
            survived,
            timeout,
            suspicious,
            skipped,
            mutation_score: mutation_score(killed, total_mutants),
        }
    }

    /// Mutants the tool processed but that fall in none of the tracked categories
    /// (mutants no test covers).
    pub fn uncategorized(&self) -> u64 {
        self.total_mutants.saturating_sub(
            self.killed + self.survived + self.timeout + self.suspicious + self.skipped,
        )
    }
}

/// `round(100 * killed / total, 1)`, or 0.0 without mutants.
///
/// Exact ties go to the even digit, so 6.25 becomes 6.2. A value that only turns
/// into a tie when scaled (0.05 is stored slightly above) rounds by its exact value.
pub fn mutation_score(killed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percent = (100 * killed) as f64 / total as f64;
    let scaled = percent * 10.0;
    // exact rounding error of the multiplication above
    let error = percent.mul_add(10.0, -scaled);

    let rounded = if (scaled - scaled.trunc()) == 0.5 && error != 0.0 {
        if error > 0.0 {
            scaled.ceil()
        } else {
            scaled.floor()
        }
    } else {
        scaled.round_ties_even()
    };
    rounded / 10.0
}
