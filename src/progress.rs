//! Live progress for an analysis batch
//!
//! Every file has its own status entry, so concurrent requests never overwrite
//! each other. The single "current file" cursor is kept for status lines but
//! is last-write-wins and purely advisory.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const STEP_ANALYZING: &str = "Analyzing code...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Analyzing,
    Done { score: u8 },
    Failed { error: String },
}

impl FileStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, FileStatus::Done { .. } | FileStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub is_analyzing: bool,
    pub current_file: String,
    pub current_step: String,
    pub files: BTreeMap<String, FileStatus>,
}

impl ProgressSnapshot {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn completed(&self) -> usize {
        self.files.values().filter(|s| s.is_settled()).count()
    }

    pub fn in_flight(&self) -> usize {
        self.files
            .values()
            .filter(|s| matches!(s, FileStatus::Analyzing))
            .count()
    }

    pub fn fraction(&self) -> f64 {
        if self.files.is_empty() {
            return 0.0;
        }
        self.completed() as f64 / self.total() as f64
    }
}

/// Shared progress handle; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset for a new batch and register every file as pending.
    ///
    /// Returns one status key per input path, in input order. Repeated paths
    /// get `#2`, `#3`, ... suffixes so each file keeps its own entry.
    pub fn begin<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let keys = disambiguate(paths);
        let mut state = self.lock();
        *state = ProgressSnapshot {
            is_analyzing: !keys.is_empty(),
            files: keys
                .iter()
                .map(|k| (k.clone(), FileStatus::Pending))
                .collect(),
            ..ProgressSnapshot::default()
        };
        keys
    }

    pub fn mark_analyzing(&self, key: &str, path: &str) {
        let mut state = self.lock();
        state.files.insert(key.to_string(), FileStatus::Analyzing);
        state.current_file = path.to_string();
        state.current_step = STEP_ANALYZING.to_string();
    }

    pub fn mark_done(&self, key: &str, score: u8) {
        self.lock()
            .files
            .insert(key.to_string(), FileStatus::Done { score });
    }

    pub fn mark_failed(&self, key: &str, error: impl Into<String>) {
        self.lock().files.insert(
            key.to_string(),
            FileStatus::Failed {
                error: error.into(),
            },
        );
    }

    /// Batch settled: clear the cursor, keep per-file statuses readable
    pub fn finish(&self) {
        let mut state = self.lock();
        state.is_analyzing = false;
        state.current_file.clear();
        state.current_step.clear();
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }
}

fn disambiguate<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let paths: Vec<&str> = paths.into_iter().collect();
    // Real paths are reserved up front so a generated suffix never shadows one.
    let mut used: HashSet<String> = HashSet::new();
    let mut keys = Vec::with_capacity(paths.len());
    for path in &paths {
        if used.insert(path.to_string()) {
            keys.push(Some(path.to_string()));
        } else {
            keys.push(None);
        }
    }

    let mut next_suffix: HashMap<&str, usize> = HashMap::new();
    paths
        .iter()
        .zip(keys)
        .map(|(path, key)| {
            key.unwrap_or_else(|| {
                let suffix = next_suffix.entry(path).or_insert(2);
                loop {
                    let candidate = format!("{}#{}", path, suffix);
                    *suffix += 1;
                    if used.insert(candidate.clone()) {
                        break candidate;
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_paths_get_distinct_keys() {
        let tracker = ProgressTracker::new();
        let keys = tracker.begin(["a.rs", "b.rs", "a.rs", "a.rs"]);
        assert_eq!(keys, vec!["a.rs", "b.rs", "a.rs#2", "a.rs#3"]);
        assert_eq!(tracker.snapshot().total(), 4);
    }

    #[test]
    fn test_generated_keys_skip_real_paths() {
        let tracker = ProgressTracker::new();
        let keys = tracker.begin(["a.rs", "a.rs#2", "a.rs", "a.rs"]);
        assert_eq!(keys, vec!["a.rs", "a.rs#2", "a.rs#3", "a.rs#4"]);
        assert_eq!(tracker.snapshot().total(), 4);
    }

    #[test]
    fn test_lifecycle() {
        let tracker = ProgressTracker::new();
        let keys = tracker.begin(["a.rs", "b.rs"]);
        assert!(tracker.snapshot().is_analyzing);

        tracker.mark_analyzing(&keys[0], "a.rs");
        tracker.mark_analyzing(&keys[1], "b.rs");
        let snap = tracker.snapshot();
        assert_eq!(snap.current_file, "b.rs");
        assert_eq!(snap.current_step, STEP_ANALYZING);
        assert_eq!(snap.in_flight(), 2);

        tracker.mark_done(&keys[1], 80);
        tracker.mark_failed(&keys[0], "timeout");
        assert_eq!(tracker.snapshot().completed(), 2);
        assert_eq!(tracker.snapshot().fraction(), 1.0);

        tracker.finish();
        let snap = tracker.snapshot();
        assert!(!snap.is_analyzing);
        assert!(snap.current_file.is_empty());
        assert!(snap.current_step.is_empty());
        assert_eq!(snap.files["b.rs"], FileStatus::Done { score: 80 });
    }

    #[test]
    fn test_begin_resets_previous_batch() {
        let tracker = ProgressTracker::new();
        tracker.begin(["old.rs"]);
        tracker.begin(["new.rs"]);
        let snap = tracker.snapshot();
        assert!(snap.files.contains_key("new.rs"));
        assert!(!snap.files.contains_key("old.rs"));
    }

    #[test]
    fn test_empty_batch_is_not_analyzing() {
        let tracker = ProgressTracker::new();
        assert!(tracker.begin(std::iter::empty()).is_empty());
        assert!(!tracker.snapshot().is_analyzing);
        assert_eq!(tracker.snapshot().fraction(), 0.0);
    }
}
