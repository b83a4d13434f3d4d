use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Module,
    Class,
    Function,
}

impl DeclKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct DeclId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub first_row: usize,
    pub last_row: usize,
    pub parent: Option<DeclId>,
    pub children: Vec<DeclId>,
}

impl Declaration {
    pub fn contains_row(&self, row: usize) -> bool {
        self.first_row <= row && row <= self.last_row
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationTree {
    nodes: Vec<Declaration>,
    row_count: usize,
}

pub const ROOT: DeclId = DeclId(0);

impl DeclarationTree {
    pub fn new(row_count: usize) -> Self {
        let root = Declaration {
            name: String::new(),
            kind: DeclKind::Module,
            first_row: 0,
            last_row: row_count.saturating_sub(1),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            row_count,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn root(&self) -> &Declaration {
        &self.nodes[ROOT.0]
    }

    pub fn get(&self, id: DeclId) -> &Declaration {
        &self.nodes[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeclId, &Declaration)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, decl)| (DeclId(index), decl))
    }

    pub fn push_child(
        &mut self,
        parent: DeclId,
        name: impl Into<String>,
        kind: DeclKind,
        first_row: usize,
    ) -> DeclId {
        let id = DeclId(self.nodes.len());
        self.nodes.push(Declaration {
            name: name.into(),
            kind,
            first_row,
            last_row: first_row,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn raise_last_row(&mut self, id: DeclId, candidate: usize) {
        let decl = &mut self.nodes[id.0];
        if candidate > decl.last_row {
            decl.last_row = candidate;
        }
    }

    pub fn find_innermost(&self, row: usize) -> Option<DeclId> {
        if row >= self.row_count {
            return None;
        }
        self.innermost_among(&self.root().children, row)
    }

    fn innermost_among(&self, children: &[DeclId], row: usize) -> Option<DeclId> {
        for &child in children {
            let decl = self.get(child);
            if decl.contains_row(row) {
                return Some(self.innermost_among(&decl.children, row).unwrap_or(child));
            }
        }
        None
    }

    pub fn lineage(&self, id: DeclId) -> impl Iterator<Item = DeclId> + '_ {
        std::iter::successors(Some(id), move |&current| self.get(current).parent)
            .take_while(move |&current| self.get(current).kind != DeclKind::Module)
    }

    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let root = self.root();
        if root.kind != DeclKind::Module || root.parent.is_some() {
            violations.push("node 0 is not a parentless module root".to_owned());
        }
        if root.first_row != 0 || root.last_row + 1 != self.row_count {
            violations.push(format!(
                "root spans {}..={} over {} rows",
                root.first_row, root.last_row, self.row_count
            ));
        }
        let module_count = self
            .nodes
            .iter()
            .filter(|decl| decl.kind == DeclKind::Module)
            .count();
        if module_count != 1 {
            violations.push(format!("{module_count} module nodes"));
        }
        for (id, decl) in self.iter() {
            if decl.first_row > decl.last_row {
                violations.push(format!(
                    "{} ({}) spans {}..={}",
                    decl.name,
                    id.0,
                    decl.first_row,
                    decl.last_row
                ));
            }
            let mut previous_end: Option<usize> = None;
            for &child_id in &decl.children {
                let child = self.get(child_id);
                if child.parent != Some(id) {
                    violations.push(format!(
                        "{} ({}) is listed under {} but points at {:?}",
                        child.name, child_id.0, id.0, child.parent
                    ));
                }
                if child.first_row < decl.first_row || child.last_row > decl.last_row {
                    violations.push(format!(
                        "{} ({}..={}) escapes parent {} ({}..={})",
                        child.name,
                        child.first_row,
                        child.last_row,
                        decl.name,
                        decl.first_row,
                        decl.last_row
                    ));
                }
                if let Some(end) = previous_end
                    && child.first_row <= end
                {
                    violations.push(format!(
                        "{} starts at {} before its previous sibling ended at {}",
                        child.name, child.first_row, end
                    ));
                }
                previous_end = Some(child.last_row);
            }
        }
        violations
    }
}
