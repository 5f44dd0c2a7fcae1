//! Indentation driven line scanning, used when the source cannot be parsed.

use super::{indentation, is_blank};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn test_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:async\s+)?def\s+(test\w*)\s*\(").expect("valid regex")
    })
}

fn class_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*class\s+(\w+)\s*[(:]").expect("valid regex"))
}

fn content(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Net count of opening brackets on a line, ignoring strings and comments.
fn bracket_delta(text: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => break,
            '(' | '[' | '{' => delta += 1,
            ')' | ']' | '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// The run of decorators, continuation lines included, directly above the
/// current line.
#[derive(Debug, Default)]
struct DecoratorBlock {
    /// (index of the first decorator line, its indentation)
    start: Option<(usize, usize)>,
    /// Unclosed brackets of the decorator being read
    depth: i32,
}

impl DecoratorBlock {
    fn in_continuation(&self) -> bool {
        self.depth > 0
    }

    /// Where a header at `index` with `indent` begins once its decorators are included.
    fn start_for(&self, index: usize, indent: usize) -> usize {
        match self.start {
            Some((start, block_indent)) if block_indent == indent && !self.in_continuation() => {
                start
            }
            _ => index,
        }
    }

    /// Feed the line stored at `index`.
    fn observe(&mut self, index: usize, text: &str) {
        if self.in_continuation() {
            self.depth = (self.depth + bracket_delta(text)).max(0);
            return;
        }
        if is_blank(text) || is_comment(text) {
            return;
        }

        let indent = indentation(text);
        if text.trim_start().starts_with('@') {
            if !matches!(self.start, Some((_, block_indent)) if block_indent == indent) {
                self.start = Some((index, indent));
            }
            self.depth = bracket_delta(text).max(0);
        } else {
            self.start = None;
        }
    }
}

/// Lines kept after the first pass and the classes that lost a method.
struct Filtered<'a> {
    lines: Vec<&'a str>,
    touched_classes: BTreeSet<String>,
}

/// Skip every failing test method: its header, its decorators, and all following
/// lines indented deeper than the header. Blank lines inside the skipped block are
/// dropped with it.
fn drop_failing_methods<'a>(source: &'a str, failing: &BTreeSet<String>) -> Filtered<'a> {
    let mut lines: Vec<&str> = Vec::new();
    let mut touched_classes = BTreeSet::new();
    let mut skip_deeper_than: Option<usize> = None;
    let mut decorators = DecoratorBlock::default();
    // (indentation, name) of the classes enclosing the current line
    let mut enclosing: Vec<(usize, String)> = Vec::new();

    for line in source.split_inclusive('\n') {
        let text = content(line);
        let indent = indentation(text);

        if let Some(header_indent) = skip_deeper_than {
            if is_blank(text) || indent > header_indent {
                continue;
            }
            skip_deeper_than = None;
        }

        if !decorators.in_continuation() {
            if !is_blank(text) && !is_comment(text) {
                enclosing.retain(|(class_indent, _)| *class_indent < indent);
            }
            if let Some(caps) = class_header().captures(text) {
                enclosing.push((indent, caps[1].to_string()));
            }

            if let Some(caps) = test_header().captures(text) {
                if failing.contains(&caps[1]) {
                    lines.truncate(decorators.start_for(lines.len(), indent));
                    decorators = DecoratorBlock::default();
                    if let Some((_, class)) = enclosing.last() {
                        touched_classes.insert(class.clone());
                    }
                    skip_deeper_than = Some(indent);
                    continue;
                }
            }
        }

        decorators.observe(lines.len(), text);
        lines.push(line);
    }

    Filtered {
        lines,
        touched_classes,
    }
}

/// Drop classes that lost methods in the first pass and no longer hold any test.
fn drop_emptied_classes(filtered: Filtered<'_>) -> String {
    let Filtered {
        lines,
        touched_classes,
    } = filtered;

    // first line of each line's decorator block
    let mut decorators = DecoratorBlock::default();
    let block_starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let text = content(line);
            let start = decorators.start_for(i, indentation(text));
            decorators.observe(i, text);
            start
        })
        .collect();

    let mut keep = vec![true; lines.len()];
    let mut i = 0;

    while i < lines.len() {
        let text = content(lines[i]);
        let Some(caps) = class_header().captures(text) else {
            i += 1;
            continue;
        };
        if !touched_classes.contains(&caps[1]) {
            i += 1;
            continue;
        }

        let indent = indentation(text);
        let mut end = i + 1;
        let mut has_tests = false;
        while end < lines.len() {
            let body = content(lines[end]);
            if !is_blank(body) && indentation(body) <= indent {
                break;
            }
            has_tests |= test_header().is_match(body);
            end += 1;
        }

        if has_tests {
            i += 1;
            continue;
        }

        keep[block_starts[i]..end].iter_mut().for_each(|k| *k = false);
        i = end;
    }

    lines
        .iter()
        .zip(keep)
        .filter(|(_, keep)| *keep)
        .map(|(line, _)| *line)
        .collect()
}

pub(super) fn reduce(source: &str, failing: &BTreeSet<String>) -> String {
    drop_emptied_classes(drop_failing_methods(source, failing))
}
