use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lacuna_config::{RunnerConfig, RunnerKind};
use lacuna_core::{DeclKind, DeclarationTree};
use serde::Serialize;

pub const TEST_FILE_VAR: &str = "TESTFILE";
pub const TEST_ATTR_VAR: &str = "TESTATTR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    File(PathBuf),
    Package(PathBuf),
    Distribution(PathBuf),
}

impl Scope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Package(_) => "package",
            Self::Distribution(_) => "distribution",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Package(path) | Self::Distribution(path) => path,
        }
    }

    pub fn working_dir(&self) -> PathBuf {
        match self {
            Self::File(path) => match path.parent() {
                Some(parent) if parent != Path::new("") => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
            Self::Package(dir) | Self::Distribution(dir) => dir.clone(),
        }
    }
}

pub fn discover_scope(source_path: &Path) -> Scope {
    let Some(dir) = source_path.parent() else {
        return Scope::File(source_path.to_path_buf());
    };
    if !dir.join("__init__.py").exists() {
        return Scope::File(source_path.to_path_buf());
    }
    if let Some(setup) = lacuna_config::find_upwards(dir, "setup.py") {
        if let Some(root) = setup.parent() {
            return Scope::Distribution(root.to_path_buf());
        }
    }
    Scope::Package(dir.to_path_buf())
}

pub fn locate_runner(source_path: &Path, program: &str) -> PathBuf {
    let mut dir = source_path.parent();
    while let Some(current) = dir {
        let candidate = current.join("bin").join(program);
        if is_executable(&candidate) {
            return candidate;
        }
        dir = current.parent();
    }
    PathBuf::from(program)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

pub fn test_selector(tree: &DeclarationTree, row: usize) -> Option<String> {
    let innermost = tree.find_innermost(row)?;
    let mut names = vec![tree.get(innermost).name.clone()];
    for ancestor in tree.lineage(innermost).skip(1) {
        let decl = tree.get(ancestor);
        if decl.kind != DeclKind::Class {
            break;
        }
        names.push(decl.name.clone());
    }
    names.reverse();
    Some(names.join("."))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl TestPlan {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.to_string_lossy().into_owned()];
        argv.extend(self.args.iter().cloned());
        argv
    }
}

pub fn build_plan(
    source_path: &Path,
    runner: &RunnerConfig,
    selector: Option<String>,
) -> TestPlan {
    let scope = discover_scope(source_path);
    let program = locate_runner(source_path, runner.program());
    let args = match runner.kind {
        RunnerKind::Nose => vec![
            "--with-coverage".to_owned(),
            scope.path().to_string_lossy().into_owned(),
        ],
        RunnerKind::Pytest => Vec::new(),
    };

    let mut env = BTreeMap::new();
    env.insert(
        TEST_FILE_VAR.to_owned(),
        source_path.to_string_lossy().into_owned(),
    );
    if let Some(selector) = &selector {
        env.insert(TEST_ATTR_VAR.to_owned(), selector.clone());
    }

    TestPlan {
        program,
        args,
        working_dir: scope.working_dir(),
        env,
        scope,
        selector,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use lacuna_core::ROOT;
    use tempfile::tempdir;

    use super::*;

    fn touch(path: &Path) {
        fs::write(path, "").expect("write file");
    }

    #[test]
    fn bare_files_run_alone() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("standalone.py");
        touch(&source);

        let scope = discover_scope(&source);
        assert_eq!(scope, Scope::File(source.clone()));
        assert_eq!(scope.working_dir(), temp.path());

        let plan = build_plan(&source, &RunnerConfig::default(), None);
        assert_eq!(plan.program, PathBuf::from("pytest"));
        assert!(plan.args.is_empty());
        assert_eq!(
            plan.env.get(TEST_FILE_VAR),
            Some(&source.to_string_lossy().into_owned())
        );
        assert!(!plan.env.contains_key(TEST_ATTR_VAR));
    }

    #[test]
    fn packages_widen_to_the_distribution_root() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("proj");
        let pkg = root.join("pkg");
        fs::create_dir_all(&pkg).expect("create pkg");
        touch(&root.join("setup.py"));
        touch(&pkg.join("__init__.py"));
        let source = pkg.join("mod.py");
        touch(&source);

        let scope = discover_scope(&source);
        assert_eq!(scope, Scope::Distribution(root.clone()));
        assert_eq!(scope.working_dir(), root);
    }

    #[test]
    fn packages_without_a_distribution_stay_local() {
        let temp = tempdir().expect("tempdir");
        let pkg = temp.path().join("pkg");
        fs::create_dir_all(&pkg).expect("create pkg");
        touch(&pkg.join("__init__.py"));
        let source = pkg.join("mod.py");
        touch(&source);

        assert_eq!(discover_scope(&source), Scope::Package(pkg));
    }

    #[test]
    fn nose_plans_carry_the_scope_path() {
        let temp = tempdir().expect("tempdir");
        let pkg = temp.path().join("pkg");
        fs::create_dir_all(&pkg).expect("create pkg");
        touch(&pkg.join("__init__.py"));
        let source = pkg.join("mod.py");
        touch(&source);

        let runner = RunnerConfig {
            kind: RunnerKind::Nose,
            program: None,
        };
        let plan = build_plan(&source, &runner, Some("Outer.method".to_owned()));

        assert_eq!(
            plan.args,
            vec![
                "--with-coverage".to_owned(),
                pkg.to_string_lossy().into_owned()
            ]
        );
        assert_eq!(plan.argv()[0], "nosetests");
        assert_eq!(plan.working_dir, pkg);
        assert_eq!(
            plan.env.get(TEST_ATTR_VAR),
            Some(&"Outer.method".to_owned())
        );
    }

    #[cfg(unix)]
    #[test]
    fn virtualenv_runners_are_preferred() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).expect("create bin");
        let runner = bin.join("pytest");
        touch(&runner);
        fs::set_permissions(&runner, fs::Permissions::from_mode(0o755))
            .expect("mark executable");
        let app = temp.path().join("app");
        fs::create_dir_all(&app).expect("create app");
        let source = app.join("mod.py");
        touch(&source);

        assert_eq!(locate_runner(&source, "pytest"), runner);
        assert_eq!(locate_runner(&source, "nosetests"), PathBuf::from("nosetests"));
    }

    #[test]
    fn selectors_collect_class_lineage() {
        let mut tree = DeclarationTree::new(30);
        let outer = tree.push_child(ROOT, "Outer", DeclKind::Class, 0);
        tree.raise_last_row(outer, 12);
        let method = tree.push_child(outer, "method", DeclKind::Function, 2);
        tree.raise_last_row(method, 8);
        let helper = tree.push_child(method, "helper", DeclKind::Function, 4);
        tree.raise_last_row(helper, 6);

        assert_eq!(test_selector(&tree, 2), Some("Outer.method".to_owned()));
        assert_eq!(test_selector(&tree, 5), Some("helper".to_owned()));
        assert_eq!(test_selector(&tree, 10), Some("Outer".to_owned()));
        assert_eq!(test_selector(&tree, 20), None);
    }
}
