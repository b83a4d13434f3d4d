use lacuna_core::{DeclId, DeclKind, DeclarationTree, ROOT};
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("python syntax error in {label} at line {}, column {}", .row + 1, .column + 1)]
    Syntax {
        label: String,
        row: usize,
        column: usize,
    },
    #[error("python grammar failed to load")]
    Grammar(#[from] tree_sitter::LanguageError),
    #[error("parser produced no syntax tree for {0}")]
    NoTree(String),
}

pub struct Analyzer {
    parser: Parser,
}

impl Analyzer {
    pub fn new() -> Result<Self, ResolveError> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    pub fn declaration_tree(
        &mut self,
        source: &str,
        label: &str,
    ) -> Result<DeclarationTree, ResolveError> {
        let tree = self.parse_module(source, label)?;
        let lines: Vec<&str> = source.split('\n').collect();
        let mut builder = TreeBuilder::new(lines);
        builder.walk_statements(tree.root_node(), ROOT, source.as_bytes());
        Ok(builder.finish())
    }

    pub(crate) fn parse_module(&mut self, source: &str, label: &str) -> Result<Tree, ResolveError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ResolveError::NoTree(label.to_owned()))?;
        let root = tree.root_node();
        if root.has_error() {
            let node = first_error_node(root).unwrap_or(root);
            let point = node.start_position();
            return Err(ResolveError::Syntax {
                label: label.to_owned(),
                row: point.row,
                column: point.column,
            });
        }
        Ok(tree)
    }
}

struct TreeBuilder<'a> {
    tree: DeclarationTree,
    pending: Vec<DeclId>,
    lines: Vec<&'a str>,
    content_rows: usize,
}

impl<'a> TreeBuilder<'a> {
    fn new(lines: Vec<&'a str>) -> Self {
        let content_rows = match lines.last() {
            Some(last) if last.is_empty() => lines.len() - 1,
            _ => lines.len(),
        };
        Self {
            tree: DeclarationTree::new(lines.len()),
            pending: Vec::new(),
            lines,
            content_rows,
        }
    }

    fn walk_statements(&mut self, node: Node<'_>, parent: DeclId, source: &[u8]) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, parent, source);
        }
    }

    fn visit(&mut self, node: Node<'_>, parent: DeclId, source: &[u8]) {
        let kind = node.kind();
        match kind {
            "function_definition" | "class_definition" => {
                self.enter_definition(node, node, parent, source);
            }
            "decorated_definition" => match inner_definition(node) {
                Some(definition) => self.enter_definition(node, definition, parent, source),
                None => self.close_pending(node.start_position().row),
            },
            "else_clause" | "finally_clause" => self.walk_nested_blocks(node, parent, source),
            _ if is_simple_statement(kind) => self.close_pending(node.start_position().row),
            _ if is_compound_statement(kind) || is_clause_header(kind) => {
                self.close_pending(node.start_position().row);
                self.walk_nested_blocks(node, parent, source);
            }
            _ => {}
        }
    }

    fn walk_nested_blocks(&mut self, node: Node<'_>, parent: DeclId, source: &[u8]) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "block" => self.walk_statements(child, parent, source),
                "elif_clause" | "else_clause" | "except_clause" | "except_group_clause"
                | "finally_clause" | "case_clause" => self.visit(child, parent, source),
                _ => {}
            }
        }
    }

    fn enter_definition(
        &mut self,
        statement: Node<'_>,
        definition: Node<'_>,
        parent: DeclId,
        source: &[u8],
    ) {
        self.close_pending(statement.start_position().row);
        let Some(name) = definition_name(definition, source) else {
            return;
        };
        let kind = if definition.kind() == "class_definition" {
            DeclKind::Class
        } else {
            DeclKind::Function
        };
        let id = self
            .tree
            .push_child(parent, name, kind, statement.start_position().row);
        if let Some(body) = definition.child_by_field_name("body") {
            self.walk_statements(body, id, source);
        }
        self.pending.push(id);
    }

    fn close_pending(&mut self, header_row: usize) {
        if self.pending.is_empty() {
            return;
        }
        let mut candidate = header_row.saturating_sub(1);
        while candidate > 0 && candidate < self.content_rows && is_blank(self.lines[candidate]) {
            candidate -= 1;
        }
        for id in self.pending.drain(..) {
            self.tree.raise_last_row(id, candidate);
        }
    }

    fn finish(mut self) -> DeclarationTree {
        self.close_pending(self.tree.row_count());
        self.tree
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn definition_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    let name = node.child_by_field_name("name")?;
    let text = node_text(name, source);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

pub(crate) fn inner_definition(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("definition").or_else(|| {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .find(|child| matches!(child.kind(), "function_definition" | "class_definition"))
    })
}

fn node_text(node: Node<'_>, source: &[u8]) -> String {
    source
        .get(node.byte_range())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

fn first_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error_node(child) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn is_simple_statement(kind: &str) -> bool {
    matches!(
        kind,
        "expression_statement"
            | "assert_statement"
            | "break_statement"
            | "continue_statement"
            | "delete_statement"
            | "exec_statement"
            | "future_import_statement"
            | "global_statement"
            | "import_from_statement"
            | "import_statement"
            | "nonlocal_statement"
            | "pass_statement"
            | "print_statement"
            | "raise_statement"
            | "return_statement"
            | "type_alias_statement"
    )
}

pub(crate) fn is_compound_statement(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "for_statement"
            | "while_statement"
            | "try_statement"
            | "with_statement"
            | "match_statement"
    )
}

fn is_clause_header(kind: &str) -> bool {
    matches!(
        kind,
        "elif_clause" | "except_clause" | "except_group_clause" | "case_clause"
    )
}
