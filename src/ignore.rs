//! Ignore rules
//!
//! Loads `.vaultsyncignore` and answers "should this path be excluded from
//! sync?". Patterns use gitignore semantics via the `ignore` crate; `#` lines
//! and blank lines are skipped.

use std::fs;
use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{SyncError, SyncResult};

/// Ignore file name, relative to the working directory
pub const IGNORE_FILE: &str = ".vaultsyncignore";

/// Patterns loaded from a `.vaultsyncignore` file
#[derive(Debug)]
pub struct IgnoreRules {
    matcher: Gitignore,
    pattern_count: usize,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::empty()
    }
}

impl IgnoreRules {
    /// An empty rule set that matches nothing
    pub fn empty() -> Self {
        let matcher = GitignoreBuilder::new("")
            .build()
            .unwrap_or_else(|_| Gitignore::empty());
        Self {
            matcher,
            pattern_count: 0,
        }
    }

    /// Load rules from `dir`; a missing ignore file yields an empty set.
    pub fn load(dir: &Path) -> SyncResult<Self> {
        let ignore_path = dir.join(IGNORE_FILE);
        if !ignore_path.exists() {
            return Ok(Self::empty());
        }
        let content = fs::read_to_string(&ignore_path)?;
        Self::from_content(dir, &content)
    }

    /// Parse rules from string content
    pub fn from_content(root: &Path, content: &str) -> SyncResult<Self> {
        let mut builder = GitignoreBuilder::new(root);
        let mut pattern_count = 0;

        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            pattern_count += 1;
            builder.add_line(None, line).map_err(|e| {
                SyncError::Config(format!(
                    "invalid ignore pattern at {}:{}: {}",
                    IGNORE_FILE,
                    line_num + 1,
                    e
                ))
            })?;
        }

        let matcher = builder
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build ignore matcher: {}", e)))?;

        Ok(Self {
            matcher,
            pattern_count,
        })
    }

    /// Check a canonical relative path against the rules.
    ///
    /// A path is ignored when it or any of its parent directories matches.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.matcher
            .matched_path_or_any_parents(Path::new(rel_path), false)
            .is_ignore()
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    pub fn is_empty(&self) -> bool {
        self.pattern_count == 0
    }
}
