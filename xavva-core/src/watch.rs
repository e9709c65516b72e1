//! Change classification and debounce state for watch mode.
//!
//! Time is passed in explicitly so the state machine can be driven by a real
//! clock or a paused test clock alike.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::path_filter::PathFilter;

/// Repeated events for one path inside this window are dropped.
pub const COOLING_WINDOW: Duration = Duration::from_millis(500);

/// Quiet period after the last compile trigger before a cycle runs.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(1000);

const SOURCE_EXTENSIONS: &[&str] = &["java"];
const BUILD_DESCRIPTORS: &[&str] = &["pom.xml", "build.gradle", "build.gradle.kts"];
const RESOURCE_EXTENSIONS: &[&str] = &["jsp", "html", "css", "js", "xml", "properties"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Needs an incremental build.
    Compile,
    /// Can be copied straight into the exploded app.
    Resource,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    filter: PathFilter,
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self {
            filter: PathFilter::watch_events(),
        }
    }
}

impl ChangeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a path relative to the project root.
    pub fn classify(&self, relative: &Path) -> ChangeKind {
        if self.filter.is_excluded(relative) {
            return ChangeKind::Ignored;
        }

        let is_root = relative.components().count() == 1;
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if is_root && BUILD_DESCRIPTORS.contains(&name.as_ref()) {
            return ChangeKind::Compile;
        }

        let ext = relative
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if SOURCE_EXTENSIONS.contains(&ext.as_str()) {
            ChangeKind::Compile
        } else if RESOURCE_EXTENSIONS.contains(&ext.as_str()) {
            ChangeKind::Resource
        } else {
            ChangeKind::Ignored
        }
    }
}

/// Recently seen paths, each with its own expiry.
#[derive(Debug)]
pub struct CoolingSet {
    window: Duration,
    entries: HashMap<PathBuf, Instant>,
}

impl CoolingSet {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Returns false when `path` was admitted less than one window ago.
    pub fn admit(&mut self, path: &Path, now: Instant) -> bool {
        self.entries.retain(|_, expiry| *expiry > now);
        if self.entries.contains_key(path) {
            return false;
        }
        self.entries.insert(path.to_path_buf(), now + self.window);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single resettable timer.
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Push the deadline out to `now + delay`.
    pub fn trigger(&mut self, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the pending deadline if it has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// Duplicate, excluded or uninteresting.
    Ignore,
    /// A compile cycle is now due at the given instant.
    Scheduled(Instant),
    /// Copy this one file right away.
    SyncResource,
}

/// Cooling set, classifier and debounce timer combined.
#[derive(Debug)]
pub struct WatchDebounce {
    cooling: CoolingSet,
    classifier: ChangeClassifier,
    debounce: Debounce,
}

impl Default for WatchDebounce {
    fn default() -> Self {
        Self::new(COOLING_WINDOW, DEBOUNCE_DELAY)
    }
}

impl WatchDebounce {
    pub fn new(cooling: Duration, delay: Duration) -> Self {
        Self {
            cooling: CoolingSet::new(cooling),
            classifier: ChangeClassifier::new(),
            debounce: Debounce::new(delay),
        }
    }

    /// Feed one raw event for a path relative to the project root.
    pub fn on_event(&mut self, relative: &Path, now: Instant) -> WatchAction {
        if !self.cooling.admit(relative, now) {
            return WatchAction::Ignore;
        }
        match self.classifier.classify(relative) {
            ChangeKind::Compile => WatchAction::Scheduled(self.debounce.trigger(now)),
            ChangeKind::Resource => WatchAction::SyncResource,
            ChangeKind::Ignored => WatchAction::Ignore,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        self.debounce.fire_if_due(now)
    }
}
