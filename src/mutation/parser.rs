//! Mutation tool output parsing.
//!
//! The tool's console format is not a stable contract, so extraction runs as an
//! ordered chain of strategies. Each strategy either matches or reports no match,
//! and a step only wins when its result passes that step's acceptance rule.

use crate::mutation::MutationStats;
use regex::Regex;
use std::sync::OnceLock;

/// Category markers of a progress line, in display order:
/// killed, no tests, timeout, suspicious, survived, skipped.
pub const CATEGORY_MARKERS: [&str; 6] = ["🎉", "🫥", "⏰", "🤔", "🙁", "🔇"];

/// Per-mutant status suffixes of the results listing.
const STATUS_SUFFIXES: [&str; 5] = [
    ": killed",
    ": survived",
    ": timeout",
    ": suspicious",
    ": skipped",
];

/// `processed/total` followed by the six marker-tagged counts.
fn progress_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let mut pattern = String::from(r"(\d+)/(\d+)");
        for marker in CATEGORY_MARKERS {
            // emoji may carry a variation selector
            pattern.push_str(&format!(r"\s*{}\x{{FE0F}}?\s*(\d+)", marker));
        }
        Regex::new(&pattern).expect("valid regex")
    })
}

/// Which extraction produced a set of statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Final progress snapshot of the run output.
    StructuredCounter,
    /// Tally of per-mutant status lines.
    CategorizedLines,
    /// Nothing recognizable; all counts are zero.
    NoMatch,
}

impl std::fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StructuredCounter => write!(f, "structured-counter"),
            Self::CategorizedLines => write!(f, "categorized-lines"),
            Self::NoMatch => write!(f, "no-match"),
        }
    }
}

/// Statistics together with the strategy that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedStats {
    pub stats: MutationStats,
    pub strategy: ParseStrategy,
}

/// Result of one extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Extraction {
    Matched(MutationStats),
    NoMatch,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    /// Combined stdout and stderr of the run step
    Run,
    /// stdout of the results listing
    Listing,
}

struct Step {
    strategy: ParseStrategy,
    source: Source,
    accept: fn(&MutationStats) -> bool,
}

/// Zero killed and zero survived out of a positive total means the counters
/// were not where the pattern expected them. A snapshot with no mutants at all
/// (`0/0`) is rejected too; the next step is tried, and it becomes the result
/// only if nothing else matches.
fn plausible_counters(stats: &MutationStats) -> bool {
    stats.total_mutants > 0 && (stats.killed > 0 || stats.survived > 0)
}

fn any_mutants(stats: &MutationStats) -> bool {
    stats.total_mutants > 0
}

const CHAIN: [Step; 3] = [
    Step {
        strategy: ParseStrategy::StructuredCounter,
        source: Source::Run,
        accept: plausible_counters,
    },
    Step {
        strategy: ParseStrategy::CategorizedLines,
        source: Source::Run,
        accept: any_mutants,
    },
    Step {
        strategy: ParseStrategy::CategorizedLines,
        source: Source::Listing,
        accept: any_mutants,
    },
];

impl ParseStrategy {
    fn extract(&self, text: &str) -> Extraction {
        match self {
            Self::StructuredCounter => structured_counter(text),
            Self::CategorizedLines => categorized_lines(text),
            Self::NoMatch => Extraction::NoMatch,
        }
    }
}

/// Use the last progress snapshot whose processed count equals its total; without
/// one, the last snapshot seen. The processed count is the number of mutants.
fn structured_counter(text: &str) -> Extraction {
    let mut last: Option<[u64; 8]> = None;
    let mut last_complete: Option<[u64; 8]> = None;

    for caps in progress_line().captures_iter(text) {
        let mut values = [0u64; 8];
        let parsed = (0..8).all(|i| match caps[i + 1].parse() {
            Ok(v) => {
                values[i] = v;
                true
            }
            Err(_) => false,
        });
        if !parsed {
            continue;
        }
        if values[0] == values[1] {
            last_complete = Some(values);
        }
        last = Some(values);
    }

    match last_complete.or(last) {
        Some([processed, _total, killed, _no_tests, timeout, suspicious, survived, skipped]) => {
            Extraction::Matched(MutationStats::new(
                processed, killed, survived, timeout, suspicious, skipped,
            ))
        }
        None => Extraction::NoMatch,
    }
}

/// Tally lines ending in a per-mutant status suffix.
fn categorized_lines(text: &str) -> Extraction {
    let mut tally = [0u64; 5];
    for line in text.split(['\n', '\r']) {
        let line = line.trim_end();
        if let Some(i) = STATUS_SUFFIXES.iter().position(|s| line.ends_with(*s)) {
            tally[i] += 1;
        }
    }

    let [killed, survived, timeout, suspicious, skipped] = tally;
    let total: u64 = tally.iter().sum();
    if total == 0 {
        return Extraction::NoMatch;
    }
    Extraction::Matched(MutationStats::new(
        total, killed, survived, timeout, suspicious, skipped,
    ))
}

/// Extract statistics from the run output, falling back to the results listing.
///
/// Never fails: unrecognizable output yields all-zero statistics.
pub fn parse_results(run_output: &str, listing_output: &str) -> ParsedStats {
    let mut rejected: Option<ParsedStats> = None;

    for step in &CHAIN {
        let text = match step.source {
            Source::Run => run_output,
            Source::Listing => listing_output,
        };
        if let Extraction::Matched(stats) = step.strategy.extract(text) {
            let parsed = ParsedStats {
                stats,
                strategy: step.strategy,
            };
            if (step.accept)(&stats) {
                return parsed;
            }
            tracing::debug!("{} result rejected: {:?}", step.strategy, stats);
            rejected.get_or_insert(parsed);
        }
    }

    // Counters in an unexpected shape still beat nothing at all.
    rejected.unwrap_or(ParsedStats {
        stats: MutationStats::default(),
        strategy: ParseStrategy::NoMatch,
    })
}
