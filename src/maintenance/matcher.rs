//! Paths the maintenance gate never looks at

use regex::{RegexSet, escape};

use crate::{Error, Result};

/// Declarative exclusion set, compiled once at startup.
///
/// Built from the configured patterns plus the maintenance page path itself
/// and anything below it, which keeps the gate from ever rewriting onto
/// itself. Sibling paths sharing a name prefix (`/maintenance-schedule`) stay
/// gated.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    excluded: RegexSet,
    patterns: Vec<String>,
}

impl RouteFilter {
    /// Compile `patterns` and add the maintenance page path
    pub fn new<S: AsRef<str>>(patterns: &[S], maintenance_path: &str) -> Result<Self> {
        let mut all: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        all.push(format!("^{}(?:/|$)", escape(maintenance_path)));

        let excluded = RegexSet::new(&all)
            .map_err(|e| Error::Config(format!("invalid exclusion pattern: {e}")))?;

        Ok(Self {
            excluded,
            patterns: all,
        })
    }

    /// Whether the gate should skip `path`
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.is_match(path)
    }

    /// Effective patterns, for startup logging
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
