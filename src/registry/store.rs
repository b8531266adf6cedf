//! Thread-safe component registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::definition::ComponentDefinition;
use super::error::{RegistryError, RegistryResult};

/// Thread-safe mapping from component name to its current definition.
///
/// A single mutex guards the map. Every mutation replaces the whole
/// `Arc<ComponentDefinition>` for a name, so readers holding a previous
/// `Arc` keep a consistent snapshot and there is no torn-read hazard.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: Mutex<HashMap<String, Arc<ComponentDefinition>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a definition.
    ///
    /// Overwriting an existing non-placeholder definition with a different
    /// one logs a diagnostic; the last writer wins. Replacing a placeholder
    /// is the normal discovery-then-define flow and stays silent.
    pub fn register(&self, definition: ComponentDefinition) {
        let name = definition.name().to_string();
        let definition = Arc::new(definition);

        let mut components = self.components.lock();
        if let Some(existing) = components.get(&name)
            && !existing.is_placeholder()
            && **existing != *definition
        {
            tracing::warn!(
                "[registry] component '{name}' was already registered with different content, replacing"
            );
        }
        components.insert(name, definition);
    }

    /// Replace the definition of an already registered component.
    ///
    /// Unlike [`register`](Self::register) this fails if the name is absent,
    /// so a background re-resolution can never resurrect a component the
    /// caller removed.
    pub fn update(&self, definition: ComponentDefinition) -> RegistryResult<()> {
        let name = definition.name().to_string();

        let mut components = self.components.lock();
        if !components.contains_key(&name) {
            return Err(RegistryError::UnknownComponent { name });
        }
        components.insert(name, Arc::new(definition));
        Ok(())
    }

    /// Current definition for a component, if registered.
    pub fn get(&self, name: &str) -> Option<Arc<ComponentDefinition>> {
        self.components.lock().get(name).cloned()
    }

    /// Remove a component. Returns the removed definition, if any.
    pub fn unregister(&self, name: &str) -> Option<Arc<ComponentDefinition>> {
        self.components.lock().remove(name)
    }

    /// Names of all registered components.
    pub fn names(&self) -> Vec<String> {
        self.components.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.components.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.lock().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.components.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AssetSource;
    use std::path::PathBuf;

    fn inline_def(name: &str, css: &str) -> ComponentDefinition {
        ComponentDefinition::new(
            name,
            None,
            None,
            Some(AssetSource::Inline(css.to_string())),
            None,
        )
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = ComponentRegistry::new();
        registry.register(inline_def("table", ".t { color: red }"));

        let def = registry.get("table").unwrap();
        assert_eq!(def.name(), "table");
        assert!(!def.is_placeholder());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn register_twice_last_writer_wins() {
        let registry = ComponentRegistry::new();
        registry.register(inline_def("table", ".t { color: red }"));
        registry.register(inline_def("table", ".t { color: blue }"));

        let def = registry.get("table").unwrap();
        assert_eq!(
            def.css(),
            Some(&AssetSource::Inline(".t { color: blue }".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_requires_existing_registration() {
        let registry = ComponentRegistry::new();

        let err = registry.update(inline_def("table", ".t {}")).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownComponent { ref name } if name == "table"));

        registry.register(inline_def("table", ".t {}"));
        registry.update(inline_def("table", ".t { margin: 0 }")).unwrap();
    }

    #[test]
    fn update_after_unregister_fails() {
        let registry = ComponentRegistry::new();
        registry.register(inline_def("table", ".t {}"));
        registry.unregister("table");

        assert!(registry.update(inline_def("table", ".t {}")).is_err());
        assert!(registry.get("table").is_none());
    }

    #[test]
    fn placeholder_is_replaced_by_real_definition() {
        let registry = ComponentRegistry::new();
        registry.register(ComponentDefinition::placeholder(
            "table",
            PathBuf::from("/srv/table"),
        ));
        assert!(registry.get("table").unwrap().is_placeholder());

        registry.register(inline_def("table", ".t {}"));
        assert!(!registry.get("table").unwrap().is_placeholder());
    }

    #[test]
    fn clear_empties_the_registry() {
        let registry = ComponentRegistry::new();
        registry.register(inline_def("a", ".a {}"));
        registry.register(inline_def("b", ".b {}"));
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
    }
}
