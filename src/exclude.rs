//! Exclude pattern matching for sync sessions.
//!
//! Compiles project-local rules plus built-in defaults into a predicate
//! over wire-form relative paths. Directories are queried with a trailing
//! slash so reconciliation can skip whole subtrees.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Patterns every session excludes regardless of project rules.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    // Version control
    ".git",
    ".git/**",
    ".svn",
    ".svn/**",
    ".hg",
    ".hg/**",
    // Dependencies
    "node_modules",
    "node_modules/**",
    "vendor",
    "vendor/**",
    ".venv",
    ".venv/**",
    // Build output
    "target",
    "target/**",
    "dist",
    "dist/**",
    "build",
    "build/**",
    "out",
    "out/**",
    // Caches
    "__pycache__",
    "__pycache__/**",
    ".cache",
    ".cache/**",
    ".next",
    ".next/**",
    // Logs and OS noise
    "*.log",
    ".DS_Store",
    "Thumbs.db",
];

/// Pattern matching for path exclusion. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExcludePatterns {
    /// Compiled glob set for matching.
    glob_set: GlobSet,
    /// Raw pattern strings (for display and diagnostics).
    patterns: Vec<String>,
}

impl Default for ExcludePatterns {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ExcludePatterns {
    /// An empty set that excludes nothing.
    pub fn none() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// The built-in default set.
    pub fn with_defaults() -> Self {
        Self::build(DEFAULT_EXCLUDES.iter().copied())
    }

    /// Built-in defaults plus project-local rules, one pattern per line
    /// (gitignore-style: blank lines, `#` comments, and `!` negations are
    /// skipped).
    pub fn with_project_rules(rules: &str) -> Self {
        let extra = rules.lines().map(str::trim).filter(|line| {
            !line.is_empty() && !line.starts_with('#') && !line.starts_with('!')
        });
        Self::build(DEFAULT_EXCLUDES.iter().copied().chain(extra))
    }

    /// An explicit pattern list without the defaults.
    pub fn from_patterns(patterns: &[&str]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_list = Vec::new();

        for pattern in patterns {
            let glob = Glob::new(pattern)?;
            builder.add(glob);
            pattern_list.push(pattern.to_string());
        }

        Ok(Self {
            glob_set: builder.build()?,
            patterns: pattern_list,
        })
    }

    fn build<'a>(patterns: impl Iterator<Item = &'a str>) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_list = Vec::new();

        for pattern in patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
                pattern_list.push(pattern.to_string());
            }
        }

        Self {
            glob_set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
            patterns: pattern_list,
        }
    }

    /// Check whether a relative path should be excluded. Directory paths
    /// may carry a trailing slash.
    pub fn is_excluded(&self, path: &str) -> bool {
        let path = path.strip_suffix('/').unwrap_or(path);
        if path.is_empty() {
            return false;
        }

        if self.glob_set.is_match(path) {
            return true;
        }

        // Check just the filename for patterns like ".DS_Store" or "*.log"
        if let Some(filename) = std::path::Path::new(path).file_name() {
            if self.glob_set.is_match(filename.to_string_lossy().as_ref()) {
                return true;
            }
        }

        // Check each path component for directory patterns
        for component in std::path::Path::new(path).components() {
            if let std::path::Component::Normal(name) = component {
                if self.glob_set.is_match(name.to_string_lossy().as_ref()) {
                    return true;
                }
            }
        }

        false
    }

    /// Get the list of patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_excludes() {
        let excludes = ExcludePatterns::with_defaults();

        assert!(excludes.is_excluded(".git"));
        assert!(excludes.is_excluded(".git/config"));
        assert!(excludes.is_excluded("node_modules"));
        assert!(excludes.is_excluded("node_modules/package/index.js"));
        assert!(excludes.is_excluded("target/debug/deps"));
        assert!(excludes.is_excluded("server.log"));
        assert!(excludes.is_excluded(".DS_Store"));

        assert!(!excludes.is_excluded("src/main.rs"));
        assert!(!excludes.is_excluded("README.md"));
    }

    #[test]
    fn test_directory_form() {
        let excludes = ExcludePatterns::with_defaults();

        assert!(excludes.is_excluded("node_modules/"));
        assert!(excludes.is_excluded(".git/"));
        assert!(!excludes.is_excluded("src/"));
        assert!(!excludes.is_excluded(""));
    }

    #[test]
    fn test_project_rules() {
        let rules = r#"
# generated assets
*.min.js
coverage

!keep.min.js
"#;
        let excludes = ExcludePatterns::with_project_rules(rules);

        assert!(excludes.is_excluded("app.min.js"));
        assert!(excludes.is_excluded("coverage/lcov.info"));
        // Defaults still apply alongside the project rules
        assert!(excludes.is_excluded("node_modules/left-pad/index.js"));

        assert!(!excludes.is_excluded("app.js"));
    }

    #[test]
    fn test_custom_patterns() {
        let excludes = ExcludePatterns::from_patterns(&["*.tmp", "scratch/**"]).unwrap();

        assert!(excludes.is_excluded("notes.tmp"));
        assert!(excludes.is_excluded("scratch/file.txt"));

        assert!(!excludes.is_excluded("main.rs"));
        // No defaults in an explicit list
        assert!(!excludes.is_excluded(".git/config"));
    }

    #[test]
    fn test_none_excludes_nothing() {
        let excludes = ExcludePatterns::none();

        assert!(!excludes.is_excluded(".git"));
        assert!(!excludes.is_excluded("server.log"));
    }
}
