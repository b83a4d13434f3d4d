mod coveragerc;
mod data;
mod report;

pub use coveragerc::{CoverageRc, load_coveragerc, parse_coveragerc};
pub use data::CoverageData;
pub use report::{UncoveredReport, uncovered_report};

use std::path::PathBuf;

use thiserror::Error;

pub const COVERAGERC_NAME: &str = ".coveragerc";
pub const NOISY_MARKER_NAME: &str = ".coverage-noisy";

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{} is not a readable coverage 5+ data file: {reason}", .path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },
    #[error("no {name} data file found above {}", .start.display())]
    DataFileNotFound { name: String, start: PathBuf },
    #[error("no recorded coverage for {}", .0.display())]
    NoData(PathBuf),
    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid omit pattern: {0}")]
    OmitPattern(#[from] globset::Error),
    #[error("resolver error: {0}")]
    Resolve(#[from] lacuna_parse::ResolveError),
}
