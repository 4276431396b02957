use exn::ResultExt;
use quarry_registry::Registries;
use quarry_storage::error::{ErrorKind, Result};
use regex::RegexSet;
use std::sync::Arc;

/// Path filters; a path matching any pattern anywhere is skipped, together
/// with everything beneath it.
#[derive(Debug, Clone, Default)]
pub struct Excludes {
    set: Option<RegexSet>,
}

impl Excludes {
    pub fn new<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Result<Self> {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let set = RegexSet::new(&patterns).or_raise(|| ErrorKind::InvalidPattern(patterns.join(", ")))?;
        Ok(Self { set: Some(set) })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.set.as_ref().is_some_and(|set| set.is_match(path))
    }
}

/// What every source needs to build its catalog.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub registries: Arc<Registries>,
    pub excludes: Excludes,
    /// Log every indexed path at `info` instead of `trace`.
    pub verbose: bool,
}

impl SourceContext {
    pub fn new(registries: Arc<Registries>) -> Self {
        Self { registries, excludes: Excludes::default(), verbose: false }
    }

    #[must_use]
    pub fn with_excludes(mut self, excludes: Excludes) -> Self {
        self.excludes = excludes;
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
