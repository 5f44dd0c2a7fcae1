//! Per-experiment analysis artifacts.
//!
//! The analysis record is owned by whatever produced the experiment; only the
//! `mutation` key and the mutation fields of `summary` are written here, everything
//! else passes through untouched and in its original order.

pub mod report;

pub use report::regenerate_report;

use crate::mutation::MutationStats;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// What happened to an optional artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactUpdate {
    Written(PathBuf),
    /// A required input was missing; nothing was written.
    Skipped { reason: String },
}

/// Write `value` as two-space indented JSON with non-ASCII text kept as is.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    contents.push('\n');
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge `stats` into the analysis record at `path`.
///
/// A missing record is skipped, not an error.
pub fn merge_into_analysis(path: &Path, stats: &MutationStats) -> Result<ArtifactUpdate> {
    if !path.is_file() {
        return Ok(ArtifactUpdate::Skipped {
            reason: format!("{} not found", path.display()),
        });
    }

    let mut record = read_json(path)?;
    let object = record
        .as_object_mut()
        .ok_or_else(|| anyhow!("{} is not a JSON object", path.display()))?;

    object.insert("mutation".to_string(), serde_json::to_value(stats)?);
    if let Some(summary) = object.get_mut("summary").and_then(Value::as_object_mut) {
        summary.insert("mutation_score".to_string(), json!(stats.mutation_score));
        summary.insert("mutants_killed".to_string(), json!(stats.killed));
        summary.insert("mutants_survived".to_string(), json!(stats.survived));
        summary.insert("total_mutants".to_string(), json!(stats.total_mutants));
    }

    write_json(path, &record)?;
    Ok(ArtifactUpdate::Written(path.to_path_buf()))
}
