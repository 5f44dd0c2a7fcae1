//! Makes the module under test importable from inside the mutation workspace.
//!
//! In an experiment directory the test file sits next to the module it imports.
//! Once staged into the workspace the module lives in a separate source directory,
//! so a short `sys.path` prelude is inserted right before the first import of it.

use std::path::{Component, Path};

/// First line of every inserted prelude.
const PRELUDE_MARKER: &str = "# mutation workspace path setup";

#[derive(Debug, Clone)]
pub struct ImportRewriter {
    module_name: String,
    /// Path segments from the staged file's directory to the module's directory.
    relative_segments: Vec<String>,
}

impl ImportRewriter {
    /// `staged_test_path` and `search_path` are both relative to the workspace root.
    pub fn new(module_name: &str, staged_test_path: &Path, search_path: &Path) -> Self {
        let depth = staged_test_path
            .parent()
            .map(|dir| {
                dir.components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .count()
            })
            .unwrap_or(0);

        let mut relative_segments = vec!["..".to_string(); depth];
        relative_segments.extend(search_path.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        }));

        Self {
            module_name: module_name.to_string(),
            relative_segments,
        }
    }

    /// Whether `line` imports the module under test.
    pub fn references_module(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("import ") {
            rest.split(',').any(|item| {
                let module = item.split_whitespace().next().unwrap_or("");
                self.is_module(module)
            })
        } else if let Some(rest) = trimmed.strip_prefix("from ") {
            let module = rest.split_whitespace().next().unwrap_or("");
            self.is_module(module)
        } else {
            false
        }
    }

    fn is_module(&self, dotted: &str) -> bool {
        dotted == self.module_name
            || dotted
                .strip_prefix(self.module_name.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Prelude lines, each indented with `indent`.
    pub fn prelude(&self, indent: &str, line_ending: &str) -> String {
        let joined = self
            .relative_segments
            .iter()
            .map(|segment| format!("{:?}", segment))
            .collect::<Vec<_>>()
            .join(", ");
        let path_expr = if joined.is_empty() {
            "_os.path.dirname(_os.path.abspath(__file__))".to_string()
        } else {
            format!(
                "_os.path.join(_os.path.dirname(_os.path.abspath(__file__)), {})",
                joined
            )
        };

        [
            PRELUDE_MARKER.to_string(),
            "import os as _os, sys as _sys".to_string(),
            format!("_sys.path.insert(0, _os.path.normpath({}))", path_expr),
        ]
        .iter()
        .map(|line| format!("{}{}{}", indent, line, line_ending))
        .collect()
    }

    /// Insert the prelude before the first import of the module under test.
    ///
    /// Sources without such an import, or already carrying the prelude, are
    /// returned unchanged.
    pub fn rewrite(&self, source: &str) -> String {
        if source.contains(PRELUDE_MARKER) {
            return source.to_string();
        }

        let mut offset = 0;
        for line in source.split_inclusive('\n') {
            let text = line.trim_end_matches(['\n', '\r']);
            if self.references_module(text) {
                let indent = &text[..text.len() - text.trim_start().len()];
                let line_ending = if line.ends_with("\r\n") { "\r\n" } else { "\n" };

                let mut rewritten = String::with_capacity(source.len() + 200);
                rewritten.push_str(&source[..offset]);
                rewritten.push_str(&self.prelude(indent, line_ending));
                rewritten.push_str(&source[offset..]);
                return rewritten;
            }
            offset += line.len();
        }

        source.to_string()
    }
}
