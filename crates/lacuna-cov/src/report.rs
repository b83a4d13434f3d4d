use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use lacuna_config::CoverageConfig;
use lacuna_parse::{Analyzer, DEFAULT_EXCLUDE_PATTERN, ExcludeRules};
use serde::Serialize;

use crate::coveragerc::{self, CoverageRc};
use crate::data::CoverageData;
use crate::{COVERAGERC_NAME, CoverageError, NOISY_MARKER_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UncoveredReport {
    pub source_path: PathBuf,
    pub data_file: PathBuf,
    pub rows: Vec<usize>,
    pub omitted: bool,
    pub noisy: bool,
}

pub fn uncovered_report(
    analyzer: &mut Analyzer,
    source_path: &Path,
    source: &str,
    coverage: &CoverageConfig,
) -> Result<UncoveredReport, CoverageError> {
    let data_file = lacuna_config::find_upwards(source_path, &coverage.data_file)
        .ok_or_else(|| CoverageError::DataFileNotFound {
            name: coverage.data_file.clone(),
            start: source_path.to_path_buf(),
        })?;
    let noisy = lacuna_config::find_upwards(source_path, NOISY_MARKER_NAME).is_some();

    let rc_path = data_file.parent().map(|dir| dir.join(COVERAGERC_NAME));
    let rc = match rc_path {
        Some(path) if path.exists() => coveragerc::load_coveragerc(&path)?,
        _ => CoverageRc::default(),
    };

    let mut omit = rc.omit;
    omit.extend(coverage.omit.iter().cloned());
    if let Some(matcher) = omit_matcher(&omit)?
        && matcher.is_match(source_path)
    {
        return Ok(UncoveredReport {
            source_path: source_path.to_path_buf(),
            data_file,
            rows: Vec::new(),
            omitted: true,
            noisy,
        });
    }

    let mut exclude_patterns = if rc.exclude_lines.is_empty() {
        vec![DEFAULT_EXCLUDE_PATTERN.to_owned()]
    } else {
        rc.exclude_lines
    };
    exclude_patterns.extend(coverage.exclude_lines.iter().cloned());
    let rules = ExcludeRules::new(&exclude_patterns)?;

    let label = source_path.to_string_lossy();
    let executable = analyzer.executable_rows(source, &label, &rules)?;
    let executed = CoverageData::open(&data_file)?.executed_rows(source_path)?;

    Ok(UncoveredReport {
        source_path: source_path.to_path_buf(),
        data_file,
        rows: executable.difference(&executed).copied().collect(),
        omitted: false,
        noisy,
    })
}

fn omit_matcher(patterns: &[String]) -> Result<Option<GlobSet>, CoverageError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}
