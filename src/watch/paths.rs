//! Low-level path watching service.
//!
//! One `notify::RecommendedWatcher` observes folders; its callback forwards
//! raw events into a channel drained by a dedicated observer thread. The
//! observer debounces events, re-fingerprints the affected subscription and
//! fires listeners only when content actually changed, so consumers never
//! see editor noise or duplicate notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::debouncer::Debouncer;
use super::error::{WatchError, WatchResult};
use super::fingerprint::{Fingerprint, fingerprint_path};

/// Subscription token returned by [`PathWatcher::watch_path`], used to
/// detach the listener again.
pub type ListenerId = u64;

/// Callback fired with the subscribed path when its content changed.
pub type PathListener = Arc<dyn Fn(&Path) + Send + Sync>;

/// How often the observer thread checks for debounced changes.
const OBSERVER_TICK_MS: u64 = 100;

/// How long `close()` waits for the observer thread to acknowledge shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// One path under observation: fingerprint state plus its listener set.
struct WatchedPath {
    fingerprint: Option<Fingerprint>,
    modified: Option<SystemTime>,
    /// Glob used when fingerprinting a directory subscription.
    pattern: Option<String>,
    /// Directory subscriptions match events for any descendant path.
    is_dir: bool,
    listeners: HashMap<ListenerId, PathListener>,
}

/// One physical folder registered with notify: the watched paths under it.
struct FolderWatchState {
    paths: HashMap<PathBuf, WatchedPath>,
    /// False when the folder did not exist at subscription time and the
    /// OS watch registration was skipped.
    os_watched: bool,
}

struct Inner {
    folders: HashMap<PathBuf, FolderWatchState>,
    watcher: notify::RecommendedWatcher,
    next_listener_id: ListenerId,
    closed: bool,
}

/// Filesystem watcher service for component assets.
///
/// Built once by the process composition root and shared by reference;
/// everything observable happens through explicit subscriptions, never
/// ambient global state.
pub struct PathWatcher {
    inner: Arc<Mutex<Inner>>,
    shutdown_tx: Sender<()>,
    ack_rx: Receiver<()>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl PathWatcher {
    /// Create the watcher and start its observer thread.
    ///
    /// Fails when the OS notification facility is unavailable; callers
    /// degrade to a no-watch mode in that case.
    pub fn new(debounce_ms: u64) -> WatchResult<Self> {
        let (event_tx, event_rx) = unbounded();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;

        let inner = Arc::new(Mutex::new(Inner {
            folders: HashMap::new(),
            watcher,
            next_listener_id: 1,
            closed: false,
        }));

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (ack_tx, ack_rx) = bounded(1);

        let observer_inner = Arc::clone(&inner);
        let observer = std::thread::Builder::new()
            .name("panelkit-watch".to_string())
            .spawn(move || observe(observer_inner, event_rx, shutdown_rx, ack_tx, debounce_ms))
            .map_err(|e| WatchError::InitFailed {
                reason: format!("failed to spawn observer thread: {e}"),
            })?;

        Ok(Self {
            inner,
            shutdown_tx,
            ack_rx,
            observer: Mutex::new(Some(observer)),
        })
    }

    /// Subscribe to content changes of `path`.
    ///
    /// The folder actually registered with the OS is `path` itself for a
    /// directory, its parent otherwise; the first subscription under a
    /// folder creates the OS watch lazily. The initial fingerprint is
    /// computed now — unless the path and its folder both do not exist yet
    /// and `allow_missing` is set, in which case the subscription is
    /// recorded without state and without an OS watch.
    ///
    /// For directory subscriptions, `pattern` selects which files
    /// participate in the fingerprint (default `**/*`). The pattern of the
    /// first subscription for a path wins.
    pub fn watch_path(
        &self,
        path: &Path,
        listener: PathListener,
        pattern: Option<String>,
        allow_missing: bool,
    ) -> WatchResult<ListenerId> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WatchError::Closed);
        }

        let path = normalize(path);
        let is_dir = path.is_dir();
        let folder = if is_dir {
            path.clone()
        } else {
            owning_parent(&path)
        };

        let folder_exists = folder.exists();
        if !folder_exists && !(allow_missing && !path.exists()) {
            return Err(WatchError::PathWatchFailed {
                path,
                reason: "containing folder does not exist".to_string(),
            });
        }

        // Lazily create the folder-level OS watch on first touch.
        let needs_os_watch = folder_exists
            && !inner
                .folders
                .get(&folder)
                .is_some_and(|state| state.os_watched);
        if needs_os_watch
            && let Err(e) = inner.watcher.watch(&folder, RecursiveMode::Recursive)
        {
            return Err(WatchError::PathWatchFailed {
                path: folder,
                reason: e.to_string(),
            });
        }

        let id = inner.next_listener_id;
        inner.next_listener_id += 1;

        let state = inner
            .folders
            .entry(folder.clone())
            .or_insert_with(|| FolderWatchState {
                paths: HashMap::new(),
                os_watched: false,
            });
        state.os_watched |= needs_os_watch;

        let watched = state.paths.entry(path.clone()).or_insert_with(|| {
            let (fingerprint, modified) = if !folder_exists {
                crate::debug_event!(
                    "watch",
                    "deferred",
                    "{} does not exist yet, skipping initial fingerprint",
                    path.display()
                );
                (None, None)
            } else {
                let fingerprint = fingerprint_path(&path, pattern.as_deref())
                    .unwrap_or_else(|e| {
                        tracing::warn!(
                            "[watch] failed to fingerprint {}: {e}",
                            path.display()
                        );
                        None
                    });
                (fingerprint, modified_time(&path))
            };
            WatchedPath {
                fingerprint,
                modified,
                pattern: pattern.clone(),
                is_dir,
                listeners: HashMap::new(),
            }
        });
        watched.listeners.insert(id, listener);

        crate::debug_event!("watch", "subscribed", "{} (id {id})", path.display());
        Ok(id)
    }

    /// Detach a listener from `path`.
    ///
    /// The watched-path state is dropped with its last listener; the OS
    /// watch of a folder is cancelled when no watched paths remain under it.
    pub fn unwatch_path(&self, path: &Path, id: ListenerId) {
        let mut inner = self.inner.lock();
        let key = normalize(path);

        let folder = if inner
            .folders
            .get(&key)
            .is_some_and(|state| state.paths.contains_key(&key))
        {
            key.clone()
        } else {
            owning_parent(&key)
        };

        let mut drop_folder = false;
        if let Some(state) = inner.folders.get_mut(&folder) {
            if let Some(watched) = state.paths.get_mut(&key) {
                watched.listeners.remove(&id);
                if watched.listeners.is_empty() {
                    state.paths.remove(&key);
                    crate::debug_event!("watch", "unsubscribed", "{}", key.display());
                }
            }
            drop_folder = state.paths.is_empty();
        }

        if drop_folder
            && let Some(state) = inner.folders.remove(&folder)
            && state.os_watched
            && let Err(e) = inner.watcher.unwatch(&folder)
        {
            crate::debug_event!("watch", "unwatch failed", "{}: {e}", folder.display());
        }
    }

    /// Stop all OS watches, clear state, and stop the observer thread.
    ///
    /// The join is bounded: if the observer does not acknowledge within the
    /// timeout, in-memory state is still cleared and the call returns.
    /// Safe to call repeatedly.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if !inner.closed {
                inner.closed = true;
                let folders: Vec<(PathBuf, bool)> = inner
                    .folders
                    .iter()
                    .map(|(folder, state)| (folder.clone(), state.os_watched))
                    .collect();
                inner.folders.clear();
                for (folder, os_watched) in folders {
                    if os_watched {
                        let _ = inner.watcher.unwatch(&folder);
                    }
                }
            }
        }

        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.observer.lock().take() {
            match self.ack_rx.recv_timeout(CLOSE_TIMEOUT) {
                Ok(()) => {
                    let _ = handle.join();
                    crate::debug_event!("watch", "observer stopped");
                }
                Err(_) => {
                    tracing::warn!("[watch] observer thread did not stop within timeout");
                }
            }
        }
    }

    /// Number of distinct paths under observation.
    pub fn watched_path_count(&self) -> usize {
        self.inner
            .lock()
            .folders
            .values()
            .map(|state| state.paths.len())
            .sum()
    }

    /// Number of folders registered with the OS facility.
    pub fn folder_count(&self) -> usize {
        self.inner.lock().folders.len()
    }
}

impl Drop for PathWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Stable key form: canonical when the path exists, as-supplied otherwise.
fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn owning_parent(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|meta| meta.modified().ok())
}

/// Backup files editors leave behind, never content changes.
fn is_backup(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with('~'))
}

/// Observer thread: drain raw events, debounce, re-fingerprint, dispatch.
fn observe(
    inner: Arc<Mutex<Inner>>,
    event_rx: Receiver<notify::Result<Event>>,
    shutdown_rx: Receiver<()>,
    ack_tx: Sender<()>,
    debounce_ms: u64,
) {
    let mut debouncer = Debouncer::new(debounce_ms);
    // Raw paths that triggered each pending subscription, reported to
    // listeners once the subscription's content change is confirmed.
    let mut triggers: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();

    loop {
        crossbeam_channel::select! {
            recv(event_rx) -> msg => match msg {
                Ok(Ok(event)) => record_event(&inner, &mut debouncer, &mut triggers, event),
                Ok(Err(e)) => tracing::error!("[watch] filesystem event error: {e}"),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
            default(Duration::from_millis(OBSERVER_TICK_MS)) => {}
        }

        // All listeners for one ready subscription fire before the next
        // event is taken from the queue.
        for key in debouncer.drain_ready() {
            let paths = triggers.remove(&key).unwrap_or_else(|| vec![key.clone()]);
            process_change(&inner, &key, &paths);
        }
    }

    let _ = ack_tx.send(());
}

/// Route a raw OS event to the subscriptions it affects.
fn record_event(
    inner: &Mutex<Inner>,
    debouncer: &mut Debouncer,
    triggers: &mut HashMap<PathBuf, Vec<PathBuf>>,
    event: Event,
) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }

    for path in &event.paths {
        if is_backup(path) {
            continue;
        }

        let matched = matching_subscriptions(inner, path);
        if matched.is_empty() {
            crate::debug_event!("watch", "unmatched", "{:?} {}", event.kind, path.display());
            continue;
        }
        for key in matched {
            let paths = triggers.entry(key.clone()).or_default();
            if !paths.contains(path) {
                paths.push(path.clone());
            }
            debouncer.touch(key);
        }
    }
}

/// Subscription keys affected by a change to `changed`: the exact watched
/// path, or any directory subscription that is a component-wise ancestor.
fn matching_subscriptions(inner: &Mutex<Inner>, changed: &Path) -> Vec<PathBuf> {
    let inner = inner.lock();
    let mut matched = Vec::new();

    for state in inner.folders.values() {
        for (watched, subscription) in &state.paths {
            let hit = watched == changed
                || (subscription.is_dir && changed.starts_with(watched));
            if hit {
                matched.push(watched.clone());
            }
        }
    }

    matched
}

/// Re-fingerprint one subscription and fire its listeners on real change.
///
/// Listeners receive the raw changed paths that triggered the event, not
/// the subscription key; a directory subscription learns exactly which file
/// under it was edited.
fn process_change(inner: &Mutex<Inner>, key: &Path, changed: &[PathBuf]) {
    let (listeners, key) = {
        let mut guard = inner.lock();
        if guard.closed {
            return;
        }

        let folder = if guard
            .folders
            .get(key)
            .is_some_and(|state| state.paths.contains_key(key))
        {
            key.to_path_buf()
        } else {
            owning_parent(key)
        };

        let Some(watched) = guard
            .folders
            .get_mut(&folder)
            .and_then(|state| state.paths.get_mut(key))
        else {
            return;
        };

        // Cheap short-circuit for plain files: an unchanged mtime means a
        // spurious event. Directory timestamps do not reflect nested edits,
        // so directory subscriptions always re-fingerprint.
        let modified = modified_time(key);
        if !watched.is_dir && modified.is_some() && modified == watched.modified {
            crate::debug_event!("watch", "mtime unchanged", "{}", key.display());
            return;
        }

        let fresh = match fingerprint_path(key, watched.pattern.as_deref()) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!("[watch] failed to fingerprint {}: {e}", key.display());
                return;
            }
        };

        if fresh == watched.fingerprint {
            watched.modified = modified;
            crate::debug_event!("watch", "content unchanged", "{}", key.display());
            return;
        }

        watched.fingerprint = fresh;
        watched.modified = modified;

        let listeners: Vec<PathListener> = watched.listeners.values().cloned().collect();
        (listeners, key.to_path_buf())
    };

    crate::log_event!("watch", "changed", "{}", key.display());
    for path in changed {
        for listener in &listeners {
            listener(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn fires_once_per_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("widget.js");
        fs::write(&file, "var a = 1;").unwrap();

        let watcher = PathWatcher::new(50).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let listener_hits = Arc::clone(&hits);
        watcher
            .watch_path(
                &file,
                Arc::new(move |_path: &Path| {
                    listener_hits.fetch_add(1, Ordering::SeqCst);
                }),
                None,
                false,
            )
            .unwrap();

        fs::write(&file, "var a = 2;").unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 1));

        watcher.close();
    }

    #[test]
    fn rewriting_identical_bytes_does_not_fire() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("widget.js");
        fs::write(&file, "var a = 1;").unwrap();

        let watcher = PathWatcher::new(50).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let listener_hits = Arc::clone(&hits);
        watcher
            .watch_path(
                &file,
                Arc::new(move |_path: &Path| {
                    listener_hits.fetch_add(1, Ordering::SeqCst);
                }),
                None,
                false,
            )
            .unwrap();

        // Rewrite with the same bytes: mtime changes, fingerprint does not.
        fs::write(&file, "var a = 1;").unwrap();
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        watcher.close();
    }

    #[test]
    fn directory_subscription_sees_nested_changes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("assets");
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("build/app.js"), "a").unwrap();

        let watcher = PathWatcher::new(50).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let listener_hits = Arc::clone(&hits);
        watcher
            .watch_path(
                &root,
                Arc::new(move |_path: &Path| {
                    listener_hits.fetch_add(1, Ordering::SeqCst);
                }),
                Some("**/*".to_string()),
                false,
            )
            .unwrap();

        fs::write(root.join("build/app.js"), "b").unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 1));

        watcher.close();
    }

    #[test]
    fn unwatching_last_listener_drops_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("widget.js");
        fs::write(&file, "var a = 1;").unwrap();

        let watcher = PathWatcher::new(50).unwrap();
        let first = watcher
            .watch_path(&file, Arc::new(|_: &Path| {}), None, false)
            .unwrap();
        let second = watcher
            .watch_path(&file, Arc::new(|_: &Path| {}), None, false)
            .unwrap();
        assert_eq!(watcher.watched_path_count(), 1);
        assert_eq!(watcher.folder_count(), 1);

        watcher.unwatch_path(&file, first);
        assert_eq!(watcher.watched_path_count(), 1);

        watcher.unwatch_path(&file, second);
        assert_eq!(watcher.watched_path_count(), 0);
        assert_eq!(watcher.folder_count(), 0);

        watcher.close();
    }

    #[test]
    fn allow_missing_defers_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let future = dir.path().join("not-yet/widget.js");

        let watcher = PathWatcher::new(50).unwrap();
        watcher
            .watch_path(&future, Arc::new(|_: &Path| {}), None, true)
            .unwrap();
        assert_eq!(watcher.watched_path_count(), 1);

        // Without allow_missing the same subscription is refused.
        let err = watcher
            .watch_path(
                &dir.path().join("also-missing/x.js"),
                Arc::new(|_: &Path| {}),
                None,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, WatchError::PathWatchFailed { .. }));

        watcher.close();
    }

    #[test]
    fn close_is_idempotent_and_rejects_new_subscriptions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("widget.js");
        fs::write(&file, "var a = 1;").unwrap();

        let watcher = PathWatcher::new(50).unwrap();
        watcher
            .watch_path(&file, Arc::new(|_: &Path| {}), None, false)
            .unwrap();

        watcher.close();
        watcher.close();

        let err = watcher
            .watch_path(&file, Arc::new(|_: &Path| {}), None, false)
            .unwrap_err();
        assert!(matches!(err, WatchError::Closed));
        assert_eq!(watcher.watched_path_count(), 0);
    }
}
