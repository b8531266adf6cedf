//! Debouncing of filesystem change events.
//!
//! Editors and build tools save files several times in quick succession.
//! The debouncer holds a changed path until it has been quiet for the
//! configured duration, so each burst triggers one re-validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Debounces change events by path.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending changes: path -> last event timestamp.
    pending: HashMap<PathBuf, Instant>,
    /// How long a path must stay quiet before it is released.
    quiet_period: Duration,
}

impl Debouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            quiet_period: Duration::from_millis(debounce_ms),
        }
    }

    /// Record a change event, resetting the quiet timer for this path.
    pub fn touch(&mut self, path: PathBuf) {
        self.pending.insert(path, Instant::now());
    }

    /// Drop a pending path without releasing it.
    pub fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Take every path that has been quiet for the full period.
    pub fn drain_ready(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|path, last_event| {
            if now.duration_since(*last_event) >= self.quiet_period {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });

        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
