use glob::Pattern;

use crate::error::{PluginError, PluginResult};

/// Selects manifest keys matching any of a list of glob patterns
#[derive(Debug, Clone)]
pub struct PatternSelector {
    patterns: Vec<Pattern>,
}

impl PatternSelector {
    /// Compile the given glob patterns
    pub fn new(patterns: &[String]) -> PluginResult<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| PluginError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect::<PluginResult<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// True if at least one pattern matches `key`
    pub fn is_match(&self, key: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(key))
    }

    /// Keys matched by at least one pattern, in input order
    pub fn select<I, S>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.patterns.is_empty() {
            return Vec::new();
        }

        keys.into_iter()
            .map(Into::into)
            .filter(|key| self.is_match(key))
            .collect()
    }
}
