//! Shared path exclusion rules.
//!
//! The artifact scanner, the class-output scanner and the change watcher all
//! skip the same kind of directories (dependency caches, version control, build
//! outputs). Each of them gets a [`PathFilter`] preset instead of carrying its
//! own list.

use std::collections::BTreeSet;
use std::path::{Component, Path};

/// Excludes paths by segment name, optionally skipping hidden segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    excluded: BTreeSet<String>,
    skip_hidden: bool,
}

impl PathFilter {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: segments.into_iter().map(Into::into).collect(),
            skip_hidden: true,
        }
    }

    /// Toggle whether segments starting with `.` are excluded.
    pub fn with_hidden(mut self, skip_hidden: bool) -> Self {
        self.skip_hidden = skip_hidden;
        self
    }

    /// Directories never worth descending into when looking for a `.war`.
    pub fn artifact_scan() -> Self {
        Self::new([
            "node_modules",
            ".git",
            ".svn",
            ".gradle",
            ".idea",
            ".m2",
            ".xavva",
            "webapps",
        ])
    }

    /// Directories skipped while looking for compiled class roots.
    pub fn class_output_scan() -> Self {
        Self::new(["node_modules", "out", "bin", "src", "webapps", ".xavva"])
    }

    /// Directories whose changes never trigger a rebuild or a sync.
    pub fn watch_events() -> Self {
        Self::new(["target", "build", "out", "bin", "node_modules"])
    }

    /// Whether a single path segment is excluded.
    pub fn is_excluded_name(&self, name: &str) -> bool {
        if self.skip_hidden && name.starts_with('.') && name != "." && name != ".." {
            return true;
        }
        self.excluded.contains(name)
    }

    /// Whether any normal segment of `path` is excluded.
    ///
    /// Callers pass paths relative to the project root; an absolute path is
    /// judged on every segment, including the ones above the project.
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.components().any(|component| match component {
            Component::Normal(segment) => self.is_excluded_name(&segment.to_string_lossy()),
            _ => false,
        })
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn hidden_segments_are_excluded_by_default() {
        let filter = PathFilter::default();
        assert!(filter.is_excluded(Path::new("src/.cache/Foo.java")));
        assert!(!filter.is_excluded(Path::new("src/main/java/Foo.java")));
    }

    #[test]
    fn hidden_segments_can_be_allowed() {
        let filter = PathFilter::default().with_hidden(false);
        assert!(!filter.is_excluded(Path::new(".github/workflows/ci.yml")));
    }

    #[test]
    fn dot_components_are_not_hidden() {
        let filter = PathFilter::default();
        assert!(!filter.is_excluded(Path::new("./src/Foo.java")));
        assert!(!filter.is_excluded(Path::new("../project/src/Foo.java")));
    }

    #[test]
    fn watch_preset_ignores_build_outputs() {
        let filter = PathFilter::watch_events();
        assert!(filter.is_excluded(Path::new("target/classes/Foo.class")));
        assert!(filter.is_excluded(Path::new("module/build/tmp/x.txt")));
        assert!(filter.is_excluded(Path::new("web/node_modules/lib.js")));
        assert!(!filter.is_excluded(Path::new("src/main/webapp/index.jsp")));
    }

    #[test]
    fn watch_preset_matches_whole_segments_only() {
        let filter = PathFilter::watch_events();
        assert!(!filter.is_excluded(Path::new("src/main/java/com/acme/BuildInfo.java")));
        assert!(!filter.is_excluded(Path::new("src/main/java/targeting/Ad.java")));
    }

    #[test]
    fn artifact_preset_skips_dependency_caches_and_webapps() {
        let filter = PathFilter::artifact_scan();
        assert!(filter.is_excluded_name("node_modules"));
        assert!(filter.is_excluded_name(".gradle"));
        assert!(filter.is_excluded_name("webapps"));
        assert!(!filter.is_excluded_name("target"));
    }

    #[test]
    fn class_output_preset_keeps_target_and_build() {
        let filter = PathFilter::class_output_scan();
        assert!(!filter.is_excluded(&PathBuf::from("target/classes")));
        assert!(!filter.is_excluded(&PathBuf::from("build/classes/java/main")));
        assert!(filter.is_excluded(&PathBuf::from("src/main/java")));
    }
}
