mod resolver;
mod rows;

pub use resolver::{Analyzer, ResolveError};
pub use rows::{DEFAULT_EXCLUDE_PATTERN, ExcludeRules};
