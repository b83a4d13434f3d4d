use std::collections::BTreeSet;

use regex::Regex;
use tree_sitter::Node;

use crate::resolver::{
    Analyzer, ResolveError, inner_definition, is_compound_statement, is_simple_statement,
};

pub const DEFAULT_EXCLUDE_PATTERN: &str = r"(?i)#\s*pragma[:\s]?\s*no\s*cover";

#[derive(Debug, Clone)]
pub struct ExcludeRules {
    patterns: Vec<Regex>,
}

impl ExcludeRules {
    pub fn new(patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|raw| Regex::new(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, line: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(line))
    }
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self {
            patterns: vec![Regex::new(DEFAULT_EXCLUDE_PATTERN).expect("default exclusion pattern")],
        }
    }
}

impl Analyzer {
    pub fn executable_rows(
        &mut self,
        source: &str,
        label: &str,
        exclude: &ExcludeRules,
    ) -> Result<BTreeSet<usize>, ResolveError> {
        let tree = self.parse_module(source, label)?;
        let lines: Vec<&str> = source.split('\n').collect();
        let mut rows = BTreeSet::new();
        collect_block(tree.root_node(), &lines, exclude, &mut rows);
        Ok(rows)
    }
}

fn collect_block(
    node: Node<'_>,
    lines: &[&str],
    exclude: &ExcludeRules,
    rows: &mut BTreeSet<usize>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_statement(child, lines, exclude, rows);
    }
}

fn collect_statement(
    node: Node<'_>,
    lines: &[&str],
    exclude: &ExcludeRules,
    rows: &mut BTreeSet<usize>,
) {
    let row = node.start_position().row;
    if lines.get(row).is_some_and(|line| exclude.is_excluded(line)) {
        return;
    }
    let kind = node.kind();
    match kind {
        "decorated_definition" => {
            rows.insert(row);
            if let Some(definition) = inner_definition(node) {
                collect_nested(definition, lines, exclude, rows);
            }
        }
        "function_definition" | "class_definition" => {
            rows.insert(row);
            collect_nested(node, lines, exclude, rows);
        }
        "else_clause" | "finally_clause" => collect_nested(node, lines, exclude, rows),
        "elif_clause" | "except_clause" | "except_group_clause" | "case_clause" => {
            rows.insert(row);
            collect_nested(node, lines, exclude, rows);
        }
        _ if is_simple_statement(kind) => {
            if !is_docstring(node) {
                rows.insert(row);
            }
        }
        _ if is_compound_statement(kind) => {
            rows.insert(row);
            collect_nested(node, lines, exclude, rows);
        }
        _ => {}
    }
}

fn collect_nested(
    node: Node<'_>,
    lines: &[&str],
    exclude: &ExcludeRules,
    rows: &mut BTreeSet<usize>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "block" => collect_block(child, lines, exclude, rows),
            "elif_clause" | "else_clause" | "except_clause" | "except_group_clause"
            | "finally_clause" | "case_clause" => collect_statement(child, lines, exclude, rows),
            _ => {}
        }
    }
}

fn is_docstring(node: Node<'_>) -> bool {
    node.kind() == "expression_statement"
        && node.named_child_count() == 1
        && node
            .named_child(0)
            .is_some_and(|child| matches!(child.kind(), "string" | "concatenated_string"))
}
