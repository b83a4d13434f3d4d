use std::fs;
use std::path::Path;

use crate::CoverageError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverageRc {
    pub omit: Vec<String>,
    pub exclude_lines: Vec<String>,
}

pub fn load_coveragerc(path: &Path) -> Result<CoverageRc, CoverageError> {
    let raw = fs::read_to_string(path)?;
    Ok(parse_coveragerc(&raw))
}

pub fn parse_coveragerc(raw: &str) -> CoverageRc {
    let mut rc = CoverageRc::default();
    let mut section = String::new();
    let mut current_key: Option<String> = None;

    for line in raw.lines() {
        let content = line.trim();
        if content.is_empty() || content.starts_with('#') || content.starts_with(';') {
            continue;
        }
        if content.starts_with('[') && content.ends_with(']') {
            section = content[1..content.len() - 1].trim().to_ascii_lowercase();
            current_key = None;
            continue;
        }
        if line.starts_with([' ', '\t']) {
            match &current_key {
                Some(key) => push_value(&mut rc, &section, key, content),
                None => {
                    tracing::warn!(
                        line = %content,
                        "skipping stray continuation line in .coveragerc"
                    );
                }
            }
            continue;
        }
        let Some((key, value)) = content.split_once('=').or_else(|| content.split_once(':'))
        else {
            tracing::warn!(line = %content, "skipping unrecognized line in .coveragerc");
            current_key = None;
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if !value.is_empty() {
            push_value(&mut rc, &section, &key, value);
        }
        current_key = Some(key);
    }

    rc
}

fn push_value(rc: &mut CoverageRc, section: &str, key: &str, value: &str) {
    match (section, key) {
        ("run", "omit") => rc.omit.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_owned),
        ),
        ("report", "exclude_lines") => rc.exclude_lines.push(value.to_owned()),
        _ => {}
    }
}
