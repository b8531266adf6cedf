//! Component lifecycle facade.
//!
//! Composes discovery, resolution, the registry and the watch layer.
//! A component moves through: discovered (placeholder) -> defined and
//! validated -> registered -> watched -> re-resolved on each confirmed
//! asset change -> unregistered.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::Settings;
use crate::discovery::{self, DiscoveredComponent};
use crate::registry::{ComponentDefinition, ComponentRegistry, RegistryError};
use crate::resolve::{self, ResolveError};
use crate::watch::{AssetWatchOrchestrator, ChangeNotifier, PathWatcher, WatchError};

/// Errors surfaced to registration callers.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// The raw, unresolved style/script inputs exactly as the caller supplied
/// them. Kept so a filesystem change can be re-resolved without the caller
/// re-invoking registration.
#[derive(Debug, Clone, Default)]
struct RecordedInputs {
    css: Option<String>,
    js: Option<String>,
}

struct WatchSession {
    batch_tx: Sender<Vec<String>>,
    worker: JoinHandle<()>,
}

/// Opaque mounting handle returned by [`ComponentManager::component`].
#[derive(Debug, Clone)]
pub struct ComponentHandle {
    name: Arc<str>,
    mount: String,
}

impl ComponentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL prefix under which this component's file-backed assets are
    /// served, e.g. `/components/gauge/`.
    pub fn mount(&self) -> &str {
        &self.mount
    }
}

/// Top-level facade over the component registry and the watch layer.
pub struct ComponentManager {
    settings: Settings,
    registry: Arc<ComponentRegistry>,
    watcher: Option<Arc<PathWatcher>>,
    orchestrator: AssetWatchOrchestrator,
    recorded: Arc<Mutex<HashMap<String, RecordedInputs>>>,
    roots: Arc<Mutex<HashMap<String, PathBuf>>>,
    session: Mutex<Option<WatchSession>>,
}

impl ComponentManager {
    /// Build the manager, its registry and its watch service.
    ///
    /// When the OS notification facility is unavailable (or watching is
    /// disabled in settings) the manager still works; asset watching
    /// degrades to a logged no-op.
    pub fn new(settings: Settings) -> Self {
        let watcher = if settings.file_watch.enabled {
            match PathWatcher::new(settings.file_watch.debounce_ms) {
                Ok(watcher) => Some(Arc::new(watcher)),
                Err(e) => {
                    tracing::warn!("[manager] filesystem watching unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            registry: Arc::new(ComponentRegistry::new()),
            orchestrator: AssetWatchOrchestrator::new(watcher.clone()),
            watcher,
            recorded: Arc::new(Mutex::new(HashMap::new())),
            roots: Arc::new(Mutex::new(HashMap::new())),
            session: Mutex::new(None),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }

    /// Scan the configured component directories for installed packages and
    /// register a placeholder for each previously unseen component.
    ///
    /// An already registered name keeps its definition; only its recorded
    /// asset root is refreshed. Returns the number of new placeholders.
    pub fn discover(&self) -> usize {
        let discovered = discovery::discover_components(&self.settings.component_dirs);
        let mut new_placeholders = 0;

        for DiscoveredComponent { name, root } in discovered {
            self.roots.lock().insert(name.clone(), root.clone());
            if self.registry.get(&name).is_none() {
                self.registry
                    .register(ComponentDefinition::placeholder(name, root));
                new_placeholders += 1;
            }
        }

        if new_placeholders > 0 {
            crate::log_event!("manager", "discovered", "{new_placeholders} components");
        }
        new_placeholders
    }

    /// Registration API: validate and register a component, returning its
    /// mounting handle.
    pub fn component(
        &self,
        name: &str,
        html: Option<&str>,
        css: Option<&str>,
        js: Option<&str>,
    ) -> Result<ComponentHandle, ManagerError> {
        self.define_and_register(name, html, css, js)?;
        Ok(ComponentHandle {
            name: name.into(),
            mount: format!("/{}/{name}/", self.settings.namespace),
        })
    }

    /// Resolve caller inputs, record them for later re-resolution, and
    /// register the result.
    ///
    /// On validation failure nothing is recorded or registered; a previous
    /// definition (including a discovery placeholder) stays in place.
    pub fn define_and_register(
        &self,
        name: &str,
        html: Option<&str>,
        css: Option<&str>,
        js: Option<&str>,
    ) -> Result<(), ManagerError> {
        let root = self.roots.lock().get(name).cloned();
        let definition = resolve::resolve(name, root.as_deref(), html, css, js)?;

        self.recorded.lock().insert(
            name.to_string(),
            RecordedInputs {
                css: css.map(str::to_string),
                js: js.map(str::to_string),
            },
        );
        self.registry.register(definition);
        crate::log_event!("manager", "registered", "{name}");
        Ok(())
    }

    /// Begin watching the asset roots of all known components.
    ///
    /// Asset changes are re-resolved on a dedicated reaction worker; the
    /// observer thread only enqueues component names. Calling this while
    /// already watching logs a warning and changes nothing.
    pub fn start_watching(&self) -> Result<(), ManagerError> {
        let mut session = self.session.lock();
        if session.is_some() {
            tracing::warn!("[manager] asset watching already started, ignoring");
            return Ok(());
        }

        let asset_roots = self.roots.lock().clone();
        let (batch_tx, batch_rx) = unbounded::<Vec<String>>();

        let registry = Arc::clone(&self.registry);
        let recorded = Arc::clone(&self.recorded);
        let worker = std::thread::Builder::new()
            .name("panelkit-react".to_string())
            .spawn(move || {
                for batch in batch_rx {
                    for name in batch {
                        react(&registry, &recorded, &name);
                    }
                }
            })
            .map_err(|e| WatchError::InitFailed {
                reason: format!("failed to spawn reaction worker: {e}"),
            })?;

        let notify_tx = batch_tx.clone();
        let notify_fn: ChangeNotifier = Arc::new(move |names| {
            notify_tx
                .send(names)
                .map_err(|_| anyhow::anyhow!("change reaction worker is gone"))
        });

        if let Err(e) = self.orchestrator.start(&asset_roots, notify_fn) {
            drop(batch_tx);
            let _ = worker.join();
            return Err(e.into());
        }

        *session = Some(WatchSession { batch_tx, worker });
        Ok(())
    }

    /// Stop watching and join the reaction worker. Safe when not watching.
    pub fn stop_watching(&self) {
        let session = self.session.lock().take();
        self.orchestrator.stop();

        if let Some(WatchSession { batch_tx, worker }) = session {
            drop(batch_tx);
            let _ = worker.join();
            crate::debug_event!("manager", "reaction worker stopped");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Remove a component entirely: definition, recorded inputs and root.
    ///
    /// A watch notification arriving after this point is dropped by the
    /// strict `update` contract instead of resurrecting the component.
    pub fn unregister(&self, name: &str) {
        self.registry.unregister(name);
        self.recorded.lock().remove(name);
        self.roots.lock().remove(name);
        crate::log_event!("manager", "unregistered", "{name}");
    }

    /// The declared asset root for a component, used by the serving layer.
    pub fn asset_root(&self, name: &str) -> Option<PathBuf> {
        if let Some(definition) = self.registry.get(name)
            && let Some(root) = definition.root()
        {
            return Some(root.to_path_buf());
        }
        self.roots.lock().get(name).cloned()
    }

    /// Stop watching and shut down the watch service.
    pub fn shutdown(&self) {
        self.stop_watching();
        if let Some(watcher) = &self.watcher {
            watcher.close();
        }
    }
}

impl Drop for ComponentManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Re-resolve one component from its recorded inputs after an asset change.
///
/// Runs on the reaction worker. Inline markup of the current definition is
/// preserved; a failure keeps the last-good definition and never blocks the
/// rest of the batch.
fn react(
    registry: &ComponentRegistry,
    recorded: &Mutex<HashMap<String, RecordedInputs>>,
    name: &str,
) {
    let Some(inputs) = recorded.lock().get(name).cloned() else {
        // Registered without going through the manager; nothing to redo.
        crate::debug_event!("manager", "no recorded inputs", "{name}");
        return;
    };

    let Some(current) = registry.get(name) else {
        crate::debug_event!("manager", "not registered, skipping reload", "{name}");
        return;
    };

    let root = current.root().map(Path::to_path_buf);
    match resolve::resolve(
        name,
        root.as_deref(),
        current.html(),
        inputs.css.as_deref(),
        inputs.js.as_deref(),
    ) {
        Ok(definition) => match registry.update(definition) {
            Ok(()) => crate::log_event!("manager", "reloaded", "{name}"),
            Err(e) => tracing::warn!("[manager] reload dropped: {e}"),
        },
        Err(e) => {
            tracing::warn!(
                "[manager] re-resolution failed for '{name}', keeping last-good definition: {e}"
            );
        }
    }
}
