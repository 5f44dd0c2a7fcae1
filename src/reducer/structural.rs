//! Syntax tree based reduction.

use super::is_test_name;
use anyhow::{anyhow, bail, Result};
use std::collections::BTreeSet;
use tree_sitter::{Language, Node, Parser, Tree};

mod nodes {
    pub const CLASS_DEFINITION: &str = "class_definition";
    pub const FUNCTION_DEFINITION: &str = "function_definition";
    pub const DECORATED_DEFINITION: &str = "decorated_definition";
}

mod fields {
    pub const NAME: &str = "name";
    pub const BODY: &str = "body";
    pub const DEFINITION: &str = "definition";
}

fn python() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

fn parse(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&python())
        .map_err(|e| anyhow!("Failed to load Python grammar: {}", e))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| anyhow!("Parser produced no tree"))?;
    if tree.root_node().has_error() {
        bail!("Source contains syntax errors");
    }
    Ok(tree)
}

/// The class or function behind an optional decorator list.
fn unwrap_decorated(node: Node) -> Node {
    if node.kind() == nodes::DECORATED_DEFINITION {
        node.child_by_field_name(fields::DEFINITION).unwrap_or(node)
    } else {
        node
    }
}

fn definition_name<'a>(node: Node, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(fields::NAME)?
        .utf8_text(source.as_bytes())
        .ok()
}

/// Byte range of the full lines covered by `node`, including the trailing newline.
fn line_span(source: &str, node: Node) -> (usize, usize) {
    let start = source[..node.start_byte()]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = source[node.end_byte()..]
        .find('\n')
        .map(|i| node.end_byte() + i + 1)
        .unwrap_or(source.len());
    (start, end)
}

/// Test methods of a class body: (name, span of the possibly decorated definition).
fn test_methods<'a>(class: Node, source: &'a str) -> Vec<(&'a str, (usize, usize))> {
    let Some(body) = class.child_by_field_name(fields::BODY) else {
        return Vec::new();
    };

    let mut cursor = body.walk();
    body.named_children(&mut cursor)
        .filter_map(|member| {
            let definition = unwrap_decorated(member);
            if definition.kind() != nodes::FUNCTION_DEFINITION {
                return None;
            }
            let name = definition_name(definition, source)?;
            is_test_name(name).then(|| (name, line_span(source, member)))
        })
        .collect()
}

/// Line ranges to delete for the given failing set.
fn removals(tree: &Tree, source: &str, failing: &BTreeSet<String>) -> Vec<(usize, usize)> {
    let root = tree.root_node();
    let mut spans = Vec::new();
    let mut cursor = root.walk();

    for item in root.named_children(&mut cursor) {
        let definition = unwrap_decorated(item);
        match definition.kind() {
            nodes::CLASS_DEFINITION => {
                let tests = test_methods(definition, source);
                if tests.is_empty() {
                    // not a test class
                    continue;
                }
                let failed: Vec<_> = tests
                    .iter()
                    .filter(|(name, _)| failing.contains(*name))
                    .map(|(_, span)| *span)
                    .collect();
                if failed.len() == tests.len() {
                    spans.push(line_span(source, item));
                } else {
                    spans.extend(failed);
                }
            }
            nodes::FUNCTION_DEFINITION => {
                if let Some(name) = definition_name(definition, source) {
                    if is_test_name(name) && failing.contains(name) {
                        spans.push(line_span(source, item));
                    }
                }
            }
            _ => {}
        }
    }

    spans
}

/// Copy `source` without the given byte ranges.
fn splice(source: &str, mut spans: Vec<(usize, usize)>) -> String {
    spans.sort_unstable();
    let mut out = String::with_capacity(source.len());
    let mut pos = 0;
    for (start, end) in spans {
        if start > pos {
            out.push_str(&source[pos..start]);
        }
        pos = pos.max(end);
    }
    out.push_str(&source[pos..]);
    out
}

/// Parse, drop failing definitions, re-emit, and verify the result still parses.
pub(super) fn reduce(source: &str, failing: &BTreeSet<String>) -> Result<String> {
    let tree = parse(source)?;
    let spans = removals(&tree, source, failing);
    if spans.is_empty() {
        return Ok(source.to_string());
    }

    let reduced = splice(source, spans);
    parse(&reduced).map_err(|e| anyhow!("Reduced source does not parse: {}", e))?;
    Ok(reduced)
}

/// Test identifiers defined in `source`: `Class.test_x` for methods, `test_x` for
/// module-level functions. `None` when the source does not parse cleanly.
pub fn test_identifiers(source: &str) -> Option<BTreeSet<String>> {
    let tree = parse(source).ok()?;
    let root = tree.root_node();
    let mut identifiers = BTreeSet::new();
    let mut cursor = root.walk();

    for item in root.named_children(&mut cursor) {
        let definition = unwrap_decorated(item);
        match definition.kind() {
            nodes::CLASS_DEFINITION => {
                let Some(class_name) = definition_name(definition, source) else {
                    continue;
                };
                for (name, _) in test_methods(definition, source) {
                    identifiers.insert(format!("{}.{}", class_name, name));
                }
            }
            nodes::FUNCTION_DEFINITION => {
                if let Some(name) = definition_name(definition, source) {
                    if is_test_name(name) {
                        identifiers.insert(name.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    Some(identifiers)
}
