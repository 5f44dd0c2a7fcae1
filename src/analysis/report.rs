//! Markdown summary report for one experiment.

use super::{read_json, ArtifactUpdate};
use crate::config::FilesConfig;
use crate::mutation::MutationStats;
use anyhow::{Context, Result};
use askama::Template;
use serde_json::{Map, Value};
use std::path::Path;

const MISSING_TEXT: &str = "N/A";

/// One row of the test-quality table.
pub struct Metric {
    pub label: &'static str,
    pub value: String,
}

#[derive(Template)]
#[template(path = "report.md", escape = "none")]
pub struct ReportTemplate {
    pub model: String,
    pub strategy: String,
    pub context_type: String,
    pub generated_at: String,
    pub line_coverage: String,
    pub branch_coverage: String,
    pub mutation_score: String,
    pub total_mutants: u64,
    pub killed: u64,
    pub no_tests: u64,
    pub timeout: u64,
    pub suspicious: u64,
    pub survived: u64,
    pub skipped: u64,
    pub quality: Vec<Metric>,
}

enum Kind {
    Number,
    Percent,
    Text,
    Flag,
}

const QUALITY_METRICS: &[(&str, &str, Kind)] = &[
    ("total_tests", "Liczba testów", Kind::Number),
    ("passed_tests", "Testy zaliczone", Kind::Number),
    ("failed_tests", "Testy niezaliczone", Kind::Number),
    ("pass_rate", "Odsetek zaliczonych testów", Kind::Percent),
    ("assertions_count", "Liczba asercji", Kind::Number),
    ("avg_assertions_per_test", "Średnia liczba asercji na test", Kind::Number),
    ("test_framework", "Framework testowy", Kind::Text),
    ("execution_time", "Czas wykonania", Kind::Text),
    ("uses_mocks", "Użycie mocków", Kind::Flag),
    ("has_edge_cases", "Przypadki brzegowe", Kind::Flag),
    ("has_docstrings", "Dokumentacja testów", Kind::Flag),
];

fn display(summary: &Map<String, Value>, key: &str, kind: &Kind) -> String {
    let value = summary.get(key).filter(|v| !v.is_null());
    match kind {
        Kind::Number => match value {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => "0".to_string(),
        },
        Kind::Percent => match value {
            Some(Value::Number(n)) => format!("{}%", n),
            Some(Value::String(s)) if s.ends_with('%') => s.clone(),
            Some(Value::String(s)) => format!("{}%", s),
            _ => "0%".to_string(),
        },
        Kind::Text => match value {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => MISSING_TEXT.to_string(),
        },
        Kind::Flag => match value {
            Some(Value::Bool(true)) => "Yes".to_string(),
            _ => "No".to_string(),
        },
    }
}

fn text_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Replace every character that is not ASCII alphanumeric, `-` or `_` with `_`.
pub fn sanitize_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ReportTemplate {
    /// Build the view from the analysis and experiment records; missing fields get
    /// their display defaults.
    pub fn new(analysis: &Value, experiment: &Value, generated_at: String) -> Self {
        let empty = Map::new();
        let summary = analysis
            .get("summary")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let stats: MutationStats = analysis
            .get("mutation")
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default();

        let quality = QUALITY_METRICS
            .iter()
            .map(|(key, label, kind)| Metric {
                label: *label,
                value: display(summary, key, kind),
            })
            .collect();

        Self {
            model: text_field(experiment, &["model_name", "model"])
                .unwrap_or_else(|| MISSING_TEXT.to_string()),
            strategy: text_field(experiment, &["strategy"])
                .unwrap_or_else(|| MISSING_TEXT.to_string()),
            context_type: text_field(experiment, &["context_type"])
                .unwrap_or_else(|| MISSING_TEXT.to_string()),
            generated_at,
            line_coverage: display(summary, "line_coverage", &Kind::Percent),
            branch_coverage: display(summary, "branch_coverage", &Kind::Percent),
            mutation_score: format!("{:.1}", stats.mutation_score),
            total_mutants: stats.total_mutants,
            killed: stats.killed,
            no_tests: stats.uncategorized(),
            timeout: stats.timeout,
            suspicious: stats.suspicious,
            survived: stats.survived,
            skipped: stats.skipped,
            quality,
        }
    }
}

/// Render the summary report for the experiment in `dir`, replacing any earlier one.
///
/// Skipped when either the analysis record or the experiment record is missing.
pub fn regenerate_report(dir: &Path, files: &FilesConfig) -> Result<ArtifactUpdate> {
    let analysis_path = dir.join(&files.analysis_file);
    let experiment_path = dir.join(&files.experiment_file);

    for required in [&analysis_path, &experiment_path] {
        if !required.is_file() {
            return Ok(ArtifactUpdate::Skipped {
                reason: format!("{} not found", required.display()),
            });
        }
    }

    let analysis = read_json(&analysis_path)?;
    let experiment = read_json(&experiment_path)?;

    let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let template = ReportTemplate::new(&analysis, &experiment, generated_at);
    let rendered = template.render().context("Failed to render report")?;

    let model =
        text_field(&experiment, &["model_name", "model"]).unwrap_or_else(|| "unknown".to_string());
    let report_path = dir.join(format!(
        "{}-{}.md",
        files.report_prefix,
        sanitize_model_name(&model)
    ));
    std::fs::write(&report_path, rendered)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    Ok(ArtifactUpdate::Written(report_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn analysis() -> Value {
        json!({
            "summary": {
                "line_coverage": 92.5,
                "branch_coverage": "80%",
                "total_tests": 12,
                "pass_rate": 91.7,
                "test_framework": "unittest",
                "uses_mocks": true,
                "has_edge_cases": false
            },
            "mutation": MutationStats::new(10, 6, 2, 1, 0, 0)
        })
    }

    fn write(dir: &Path, name: &str, value: &Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    // =========================================================================
    // sanitize_model_name tests
    // =========================================================================

    #[test]
    fn test_sanitize_model_name() {
        assert_eq!(sanitize_model_name("gpt-4o"), "gpt-4o");
        assert_eq!(sanitize_model_name("claude 3.5/sonnet"), "claude_3_5_sonnet");
        assert_eq!(sanitize_model_name("llama3:70b"), "llama3_70b");
        assert_eq!(sanitize_model_name("mistral_large"), "mistral_large");
    }

    // =========================================================================
    // ReportTemplate tests
    // =========================================================================

    #[test]
    fn test_template_reads_summary_and_mutation() {
        let experiment = json!({"model_name": "gpt-4o", "strategy": "few-shot", "context_type": "full"});
        let view = ReportTemplate::new(&analysis(), &experiment, "2024-01-01 12:00:00".to_string());

        assert_eq!(view.model, "gpt-4o");
        assert_eq!(view.strategy, "few-shot");
        assert_eq!(view.line_coverage, "92.5%");
        assert_eq!(view.branch_coverage, "80%");
        assert_eq!(view.mutation_score, "60.0");
        assert_eq!(view.no_tests, 1);

        let rendered = view.render().unwrap();
        assert!(rendered.contains("| Model | gpt-4o |"));
        assert!(rendered.contains("| 🎉 Zabite | 6 |"));
        assert!(rendered.contains("| 🫥 Bez testów | 1 |"));
        assert!(rendered.contains("| ⏰ Przekroczony czas | 1 |"));
        assert!(rendered.contains("| 🙁 Przeżyły | 2 |"));
        assert!(rendered.contains("| Liczba testów | 12 |"));
        assert!(rendered.contains("| Framework testowy | unittest |"));
        assert!(rendered.contains("| Użycie mocków | Yes |"));
        assert!(rendered.contains("| Przypadki brzegowe | No |"));
        assert!(rendered.contains("2024-01-01 12:00:00"));
    }

    #[test]
    fn test_template_defaults_missing_fields() {
        let view = ReportTemplate::new(&json!({}), &json!({"model": "x"}), String::new());

        assert_eq!(view.model, "x");
        assert_eq!(view.strategy, "N/A");
        assert_eq!(view.line_coverage, "0%");
        assert_eq!(view.mutation_score, "0.0");
        assert_eq!(view.total_mutants, 0);

        let rendered = view.render().unwrap();
        assert!(rendered.contains("| Liczba testów | 0 |"));
        assert!(rendered.contains("| Odsetek zaliczonych testów | 0% |"));
        assert!(rendered.contains("| Czas wykonania | N/A |"));
        assert!(rendered.contains("| Dokumentacja testów | No |"));
    }

    #[test]
    fn test_template_does_not_escape() {
        let experiment = json!({"model_name": "a<b>&c"});
        let rendered = ReportTemplate::new(&json!({}), &experiment, String::new())
            .render()
            .unwrap();
        assert!(rendered.contains("a<b>&c"));
    }

    // =========================================================================
    // regenerate_report tests
    // =========================================================================

    #[test]
    fn test_regenerate_writes_named_report() {
        let dir = TempDir::new().unwrap();
        let files = FilesConfig::default();
        write(dir.path(), &files.analysis_file, &analysis());
        write(dir.path(), &files.experiment_file, &json!({"model_name": "claude 3.5"}));

        let update = regenerate_report(dir.path(), &files).unwrap();
        let expected = dir.path().join("podsumowanie-claude_3_5.md");
        assert_eq!(update, ArtifactUpdate::Written(expected.clone()));
        assert!(std::fs::read_to_string(&expected).unwrap().contains("60.0%"));
    }

    #[test]
    fn test_regenerate_overwrites_previous_report() {
        let dir = TempDir::new().unwrap();
        let files = FilesConfig::default();
        write(dir.path(), &files.analysis_file, &analysis());
        write(dir.path(), &files.experiment_file, &json!({"model_name": "m"}));
        let report = dir.path().join("podsumowanie-m.md");
        std::fs::write(&report, "stale content").unwrap();

        regenerate_report(dir.path(), &files).unwrap();
        let contents = std::fs::read_to_string(&report).unwrap();
        assert!(!contents.contains("stale content"));
    }

    #[test]
    fn test_regenerate_skips_without_records() {
        let dir = TempDir::new().unwrap();
        let files = FilesConfig::default();

        // no analysis record
        write(dir.path(), &files.experiment_file, &json!({"model_name": "m"}));
        let update = regenerate_report(dir.path(), &files).unwrap();
        assert!(matches!(update, ArtifactUpdate::Skipped { .. }));

        // no experiment record
        std::fs::remove_file(dir.path().join(&files.experiment_file)).unwrap();
        write(dir.path(), &files.analysis_file, &analysis());
        let update = regenerate_report(dir.path(), &files).unwrap();
        assert!(matches!(update, ArtifactUpdate::Skipped { .. }));

        let reports = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "md"))
            .count();
        assert_eq!(reports, 0);
    }
}
