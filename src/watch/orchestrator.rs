//! Orchestration of per-component asset watching.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::WatchResult;
use super::paths::{ListenerId, PathWatcher};

/// Caller-supplied notification function, invoked with the names of the
/// components whose asset root saw a change. Failures are logged at this
/// boundary and never propagate into the observer thread.
pub type ChangeNotifier = Arc<dyn Fn(Vec<String>) -> anyhow::Result<()> + Send + Sync>;

/// Directory segments whose changes are never developer asset edits.
pub const DENYLISTED_SEGMENTS: [&str; 9] = [
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".cache",
    ".idea",
    ".vscode",
    ".DS_Store",
];

#[derive(Default)]
struct OrchestratorState {
    /// Deduplicated watch directory -> names of the components rooted there.
    dir_components: HashMap<PathBuf, Vec<String>>,
    /// Subscriptions owned by the current watch session, in creation order.
    subscriptions: Vec<(PathBuf, ListenerId)>,
    /// Snapshot of the component -> root map this session was started with.
    roots: HashMap<String, PathBuf>,
    active: bool,
}

/// Maps component names to watched asset roots and manages the lifecycle of
/// the underlying [`PathWatcher`] subscriptions.
///
/// `start` commits all-or-nothing: if any directory subscription fails, the
/// ones already created are rolled back in reverse order and the error
/// propagates, leaving the previous state untouched.
pub struct AssetWatchOrchestrator {
    watcher: Option<Arc<PathWatcher>>,
    state: Arc<Mutex<OrchestratorState>>,
}

impl AssetWatchOrchestrator {
    /// `watcher: None` puts the orchestrator in no-op mode: `start` logs a
    /// diagnostic and succeeds without watching anything.
    pub fn new(watcher: Option<Arc<PathWatcher>>) -> Self {
        Self {
            watcher,
            state: Arc::new(Mutex::new(OrchestratorState::default())),
        }
    }

    /// Begin watching the asset roots of the given components.
    ///
    /// Always stops a previous session first, so a restart with new roots is
    /// a single call. Components sharing a root (after canonicalization)
    /// share one subscription.
    pub fn start(
        &self,
        asset_roots: &HashMap<String, PathBuf>,
        notify_fn: ChangeNotifier,
    ) -> WatchResult<()> {
        self.stop();

        let Some(watcher) = &self.watcher else {
            crate::log_event!(
                "orchestrator",
                "disabled",
                "filesystem notification unavailable, asset watching is a no-op"
            );
            return Ok(());
        };

        let mut dir_components: HashMap<PathBuf, Vec<String>> = HashMap::new();
        for (name, root) in asset_roots {
            match root.canonicalize() {
                Ok(dir) => dir_components.entry(dir).or_default().push(name.clone()),
                Err(e) => {
                    tracing::warn!(
                        "[orchestrator] skipping '{name}': asset root {} is not usable: {e}",
                        root.display()
                    );
                }
            }
        }
        for names in dir_components.values_mut() {
            names.sort();
        }

        // Deterministic subscription order makes rollback order meaningful.
        let mut dirs: Vec<PathBuf> = dir_components.keys().cloned().collect();
        dirs.sort();

        let mut created: Vec<(PathBuf, ListenerId)> = Vec::new();
        for dir in dirs {
            let listener = self.make_listener(dir.clone(), notify_fn.clone());
            match watcher.watch_path(&dir, listener, Some("**/*".to_string()), false) {
                Ok(id) => created.push((dir, id)),
                Err(e) => {
                    // Unwind everything this call created, newest first.
                    for (dir, id) in created.iter().rev() {
                        watcher.unwatch_path(dir, *id);
                    }
                    return Err(e);
                }
            }
        }

        let mut state = self.state.lock();
        crate::log_event!(
            "orchestrator",
            "watching",
            "{} components in {} directories",
            asset_roots.len(),
            created.len()
        );
        state.dir_components = dir_components;
        state.subscriptions = created;
        state.roots = asset_roots.clone();
        state.active = true;
        Ok(())
    }

    /// Tear down every subscription of the current session. Safe to call
    /// when not active.
    pub fn stop(&self) {
        let subscriptions = {
            let mut state = self.state.lock();
            if !state.active && state.subscriptions.is_empty() {
                return;
            }
            state.dir_components.clear();
            state.roots.clear();
            state.active = false;
            std::mem::take(&mut state.subscriptions)
        };

        if let Some(watcher) = &self.watcher {
            for (dir, id) in subscriptions {
                watcher.unwatch_path(&dir, id);
            }
        }
        crate::debug_event!("orchestrator", "stopped");
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// The component -> root snapshot of the current session.
    pub fn watched_roots(&self) -> HashMap<String, PathBuf> {
        self.state.lock().roots.clone()
    }

    /// Build the listener for one watched directory. It runs on the
    /// observer thread: resolve the component names associated with the
    /// directory, filter noise paths, and hand the survivors to the
    /// caller's notification function.
    fn make_listener(
        &self,
        dir: PathBuf,
        notify_fn: ChangeNotifier,
    ) -> Arc<dyn Fn(&Path) + Send + Sync> {
        let state = Arc::clone(&self.state);
        Arc::new(move |changed: &Path| {
            if is_denylisted(changed) {
                crate::debug_event!("orchestrator", "ignored", "{}", changed.display());
                return;
            }

            let names = {
                let state = state.lock();
                if !state.active {
                    return;
                }
                state.dir_components.get(&dir).cloned()
            };

            let Some(names) = names else {
                return;
            };

            if let Err(e) = notify_fn(names.clone()) {
                tracing::warn!(
                    "[orchestrator] change notification failed for {names:?}: {e}"
                );
            }
        })
    }
}

/// True when any component of the path is a denylisted directory segment.
fn is_denylisted(path: &Path) -> bool {
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|segment| DENYLISTED_SEGMENTS.contains(&segment))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_matches_whole_segments_only() {
        assert!(is_denylisted(Path::new("/srv/app/node_modules/d3/d3.js")));
        assert!(is_denylisted(Path::new("/srv/app/.git/index")));
        assert!(is_denylisted(Path::new("/srv/app/__pycache__/mod.pyc")));

        assert!(!is_denylisted(Path::new("/srv/app/assets/widget.js")));
        // Similar names are not segments
        assert!(!is_denylisted(Path::new("/srv/app/node_modules_backup/x.js")));
        assert!(!is_denylisted(Path::new("/srv/app/gitlog/x.js")));
    }

    #[test]
    fn start_without_watcher_is_a_noop() {
        let orchestrator = AssetWatchOrchestrator::new(None);
        let roots = HashMap::from([("gauge".to_string(), PathBuf::from("/srv/gauge"))]);

        orchestrator
            .start(&roots, Arc::new(|_names| Ok(())))
            .unwrap();
        assert!(!orchestrator.is_active());

        orchestrator.stop();
    }
}
