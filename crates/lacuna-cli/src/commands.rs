use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use lacuna_config::load_config;
use lacuna_core::{DeclId, DeclarationTree, ROOT};
use lacuna_cov::{CoverageError, UncoveredReport, uncovered_report};
use lacuna_parse::Analyzer;
use lacuna_runner::{TestPlan, build_plan, test_selector};
use serde::Serialize;

use crate::cli::{OutputFormat, PlanArgs, ResolveArgs, TreeArgs, UncoveredArgs};

#[derive(Debug, Serialize)]
struct ResolveView {
    row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    lineage: Vec<DeclView>,
}

#[derive(Debug, Serialize)]
struct DeclView {
    name: String,
    kind: &'static str,
    first_row: usize,
    last_row: usize,
}

#[derive(Debug, Serialize)]
struct TreeView {
    name: String,
    kind: &'static str,
    first_row: usize,
    last_row: usize,
    children: Vec<TreeView>,
}

pub fn run_resolve(args: &ResolveArgs, out: &mut dyn Write) -> Result<()> {
    let source = read_source(&args.file)?;
    let tree = parse_tree(&args.file, &source)?;
    let view = resolve_view(&tree, args.row);
    write_resolution(&view, args.output, out).context("failed to write resolution")
}

pub fn run_tree(args: &TreeArgs, out: &mut dyn Write) -> Result<()> {
    let source = read_source(&args.file)?;
    let tree = parse_tree(&args.file, &source)?;
    let label = args.file.to_string_lossy();
    let view = tree_view(&tree, ROOT, &label);
    write_tree(&view, args.output, out).context("failed to write declaration tree")
}

pub fn run_uncovered(args: &UncoveredArgs, out: &mut dyn Write) -> Result<()> {
    let source = read_source(&args.file)?;
    let config = load_config(&args.file).context("failed to load configuration")?;
    let mut analyzer = Analyzer::new()?;
    let report = match uncovered_report(&mut analyzer, &args.file, &source, &config.coverage) {
        Ok(report) => report,
        Err(CoverageError::NoData(path)) => {
            eprintln!("note: no recorded coverage for {}", path.display());
            return Ok(());
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to compute uncovered rows for {}", args.file.display())
            });
        }
    };
    write_uncovered(&report, &source, args.output, out).context("failed to write report")
}

pub fn run_plan(args: &PlanArgs, out: &mut dyn Write) -> Result<()> {
    let config = load_config(&args.file).context("failed to load configuration")?;
    let selector = match args.row {
        Some(row) => selector_for_row(&args.file, row)?,
        None => None,
    };
    let plan = build_plan(&args.file, &config.runner, selector);
    write_plan(&plan, args.output, out).context("failed to write plan")
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn parse_tree(path: &Path, source: &str) -> Result<DeclarationTree> {
    let mut analyzer = Analyzer::new()?;
    let label = path.to_string_lossy();
    Ok(analyzer.declaration_tree(source, &label)?)
}

fn selector_for_row(path: &Path, row: usize) -> Result<Option<String>> {
    let source = read_source(path)?;
    let mut analyzer = Analyzer::new()?;
    let label = path.to_string_lossy();
    match analyzer.declaration_tree(&source, &label) {
        Ok(tree) => {
            let selector = test_selector(&tree, row);
            if selector.is_none() {
                eprintln!("note: row {row} is module level, planning an unscoped run");
            }
            Ok(selector)
        }
        Err(err) => {
            eprintln!("note: {err}, planning an unscoped run");
            Ok(None)
        }
    }
}

fn resolve_view(tree: &DeclarationTree, row: usize) -> ResolveView {
    let lineage = tree
        .find_innermost(row)
        .map(|id| {
            tree.lineage(id)
                .map(|ancestor| {
                    let decl = tree.get(ancestor);
                    DeclView {
                        name: decl.name.clone(),
                        kind: decl.kind.as_str(),
                        first_row: decl.first_row,
                        last_row: decl.last_row,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    ResolveView {
        row,
        selector: test_selector(tree, row),
        lineage,
    }
}

fn tree_view(tree: &DeclarationTree, id: DeclId, label: &str) -> TreeView {
    let decl = tree.get(id);
    let name = if id == ROOT {
        label.to_owned()
    } else {
        decl.name.clone()
    };
    TreeView {
        name,
        kind: decl.kind.as_str(),
        first_row: decl.first_row,
        last_row: decl.last_row,
        children: decl
            .children
            .iter()
            .map(|&child| tree_view(tree, child, label))
            .collect(),
    }
}

fn write_resolution(view: &ResolveView, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(view, out),
        OutputFormat::Text => {
            match &view.selector {
                Some(selector) => writeln!(out, "row {}: {selector}", view.row)?,
                None => writeln!(out, "row {}: module level", view.row)?,
            }
            for decl in &view.lineage {
                writeln!(
                    out,
                    "  {} {} [{}, {}]",
                    decl.kind, decl.name, decl.first_row, decl.last_row
                )?;
            }
            Ok(())
        }
    }
}

fn write_tree(view: &TreeView, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(view, out),
        OutputFormat::Text => write_tree_text(view, 0, out),
    }
}

fn write_tree_text(view: &TreeView, depth: usize, out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "{}{} {} [{}, {}]",
        "  ".repeat(depth),
        view.kind,
        view.name,
        view.first_row,
        view.last_row
    )?;
    for child in &view.children {
        write_tree_text(child, depth + 1, out)?;
    }
    Ok(())
}

fn write_uncovered(
    report: &UncoveredReport,
    source: &str,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(report, out),
        OutputFormat::Text => {
            if report.omitted {
                writeln!(
                    out,
                    "{} is omitted by coverage configuration",
                    report.source_path.display()
                )?;
                return Ok(());
            }
            writeln!(
                out,
                "{} uncovered rows in {} (data: {}{})",
                report.rows.len(),
                report.source_path.display(),
                report.data_file.display(),
                if report.noisy { ", noisy" } else { "" }
            )?;
            let lines: Vec<&str> = source.split('\n').collect();
            for &row in &report.rows {
                let text = lines.get(row).copied().unwrap_or("");
                writeln!(out, "{row:>5}  {text}")?;
            }
            Ok(())
        }
    }
}

fn write_plan(plan: &TestPlan, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(plan, out),
        OutputFormat::Text => {
            writeln!(out, "argv: {}", plan.argv().join(" "))?;
            writeln!(out, "cwd: {}", plan.working_dir.display())?;
            writeln!(
                out,
                "scope: {} {}",
                plan.scope.kind(),
                plan.scope.path().display()
            )?;
            for (key, value) in &plan.env {
                writeln!(out, "env: {key}={value}")?;
            }
            Ok(())
        }
    }
}

fn write_json<T: Serialize>(value: &T, out: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use lacuna_runner::{Scope, TEST_ATTR_VAR, TEST_FILE_VAR};
    use tempfile::tempdir;

    use super::*;

    const SOURCE: &str = concat!(
        "class Outer:\n",
        "    def method(self):\n",
        "        return 1\n",
        "\n",
        "def helper():\n",
        "    return 2\n",
    );

    fn render(out: Vec<u8>) -> String {
        String::from_utf8(out).expect("utf8 output")
    }

    #[test]
    fn resolve_emits_selector_and_lineage() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("mod.py");
        fs::write(&file, SOURCE).expect("write source");

        let args = ResolveArgs {
            file,
            row: 2,
            output: OutputFormat::Text,
        };
        let mut out = Vec::new();
        run_resolve(&args, &mut out).expect("resolve");

        let rendered = render(out);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "row 2: Outer.method");
        assert_eq!(lines[1], "  function method [1, 2]");
        assert_eq!(lines[2], "  class Outer [0, 2]");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn resolve_reports_module_level_rows() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("mod.py");
        fs::write(&file, SOURCE).expect("write source");

        let args = ResolveArgs {
            file: file.clone(),
            row: 3,
            output: OutputFormat::Text,
        };
        let mut out = Vec::new();
        run_resolve(&args, &mut out).expect("resolve");
        assert_eq!(render(out).trim(), "row 3: module level");

        let args = ResolveArgs {
            file,
            row: 3,
            output: OutputFormat::Json,
        };
        let mut out = Vec::new();
        run_resolve(&args, &mut out).expect("resolve json");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("parse json");
        assert_eq!(value["row"], 3);
        assert!(value.get("selector").is_none());
        assert_eq!(value["lineage"], serde_json::json!([]));
    }

    #[test]
    fn tree_renders_nested_declarations() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("mod.py");
        fs::write(&file, SOURCE).expect("write source");

        let args = TreeArgs {
            file: file.clone(),
            output: OutputFormat::Text,
        };
        let mut out = Vec::new();
        run_tree(&args, &mut out).expect("tree");

        let rendered = render(out);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], format!("module {} [0, 6]", file.display()));
        assert_eq!(lines[1], "  class Outer [0, 2]");
        assert_eq!(lines[2], "    function method [1, 2]");
        assert_eq!(lines[3], "  function helper [4, 6]");
    }

    #[test]
    fn uncovered_text_lists_rows_with_source() {
        let report = UncoveredReport {
            source_path: PathBuf::from("mod.py"),
            data_file: PathBuf::from("/data/.coverage"),
            rows: vec![4, 5],
            omitted: false,
            noisy: false,
        };

        let mut out = Vec::new();
        write_uncovered(&report, SOURCE, OutputFormat::Text, &mut out).expect("write");

        let rendered = render(out);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "2 uncovered rows in mod.py (data: /data/.coverage)");
        assert_eq!(lines[1], "    4  def helper():");
        assert_eq!(lines[2], "    5      return 2");
    }

    #[test]
    fn omitted_files_render_a_notice() {
        let report = UncoveredReport {
            source_path: PathBuf::from("vendor/dep.py"),
            data_file: PathBuf::from("/data/.coverage"),
            rows: Vec::new(),
            omitted: true,
            noisy: true,
        };

        let mut out = Vec::new();
        write_uncovered(&report, "", OutputFormat::Text, &mut out).expect("write");
        assert_eq!(
            render(out).trim(),
            "vendor/dep.py is omitted by coverage configuration"
        );
    }

    #[test]
    fn plan_text_shows_argv_env_and_scope() {
        let mut env = BTreeMap::new();
        env.insert(TEST_FILE_VAR.to_owned(), "/proj/pkg/mod.py".to_owned());
        env.insert(TEST_ATTR_VAR.to_owned(), "Outer.method".to_owned());
        let plan = TestPlan {
            program: PathBuf::from("/venv/bin/nosetests"),
            args: vec!["--with-coverage".to_owned(), "/proj/pkg".to_owned()],
            working_dir: PathBuf::from("/proj/pkg"),
            env,
            scope: Scope::Package(PathBuf::from("/proj/pkg")),
            selector: Some("Outer.method".to_owned()),
        };

        let mut out = Vec::new();
        write_plan(&plan, OutputFormat::Text, &mut out).expect("write");

        let rendered = render(out);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "argv: /venv/bin/nosetests --with-coverage /proj/pkg");
        assert_eq!(lines[1], "cwd: /proj/pkg");
        assert_eq!(lines[2], "scope: package /proj/pkg");
        assert_eq!(lines[3], "env: TESTATTR=Outer.method");
        assert_eq!(lines[4], "env: TESTFILE=/proj/pkg/mod.py");
    }

    #[test]
    fn plan_degrades_on_syntax_errors() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("broken.py");
        fs::write(&file, "def broken(:\n").expect("write source");

        let args = PlanArgs {
            file,
            row: Some(0),
            output: OutputFormat::Json,
        };
        let mut out = Vec::new();
        run_plan(&args, &mut out).expect("plan still emitted");

        let value: serde_json::Value = serde_json::from_slice(&out).expect("parse json");
        assert!(value.get("selector").is_none());
        assert!(value["env"][TEST_ATTR_VAR].is_null());
        assert!(
            value["env"][TEST_FILE_VAR]
                .as_str()
                .is_some_and(|path| path.ends_with("broken.py"))
        );
    }
}
