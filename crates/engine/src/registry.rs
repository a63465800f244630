//! Component registry: type identifier → factory.
//!
//! The registry is the only place that knows concrete component types. It
//! is internally synchronized, so plugins can be registered (or replaced)
//! while other threads are creating components.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::component::{
    Encoder, EncoderRef, Filter, FilterRef, Output, OutputRef, Source, SourceRef,
};

/// The four pluggable component families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Source,
    Encoder,
    Output,
    Filter,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Source,
        ComponentKind::Encoder,
        ComponentKind::Output,
        ComponentKind::Filter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Encoder => "encoder",
            Self::Output => "output",
            Self::Filter => "filter",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Factory<T> = Arc<dyn Fn(&str) -> ObsResult<Arc<T>> + Send + Sync>;

struct FactoryTable<T: ?Sized> {
    kind: ComponentKind,
    factories: RwLock<HashMap<String, Factory<T>>>,
}

impl<T: ?Sized> FactoryTable<T> {
    fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            factories: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, type_id: &str, factory: Factory<T>) -> bool {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let replaced = factories.insert(type_id.to_string(), factory).is_some();
        if replaced {
            tracing::debug!(kind = %self.kind, type_id, "Replaced registered factory");
        } else {
            tracing::debug!(kind = %self.kind, type_id, "Registered factory");
        }
        replaced
    }

    fn create(&self, type_id: &str, name: &str) -> ObsResult<Arc<T>> {
        // Clone the factory out so it runs without holding the table lock.
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(type_id)
            .cloned();

        let Some(factory) = factory else {
            tracing::warn!(kind = %self.kind, type_id, name, "No factory registered");
            return Err(ObsError::ComponentNotFound {
                kind: self.kind.to_string(),
                type_id: type_id.to_string(),
            });
        };

        factory(name).map_err(|e| {
            tracing::warn!(kind = %self.kind, type_id, name, error = %e, "Factory failed");
            match e {
                ObsError::Factory { .. } => e,
                other => ObsError::factory(type_id, other.to_string()),
            }
        })
    }

    fn contains(&self, type_id: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(type_id)
    }

    fn unregister(&self, type_id: &str) -> bool {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(type_id)
            .is_some()
    }

    fn type_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn len(&self) -> usize {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Maps `(kind, type id)` to a constructor.
///
/// Registering an existing key replaces the previous factory. Names passed
/// to `create_*` are not checked for uniqueness.
pub struct ComponentRegistry {
    sources: FactoryTable<dyn Source>,
    encoders: FactoryTable<dyn Encoder>,
    outputs: FactoryTable<dyn Output>,
    filters: FactoryTable<dyn Filter>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            sources: FactoryTable::new(ComponentKind::Source),
            encoders: FactoryTable::new(ComponentKind::Encoder),
            outputs: FactoryTable::new(ComponentKind::Output),
            filters: FactoryTable::new(ComponentKind::Filter),
        }
    }

    /// Register a source factory. Returns true if it replaced another one.
    pub fn register_source<S, F>(&self, type_id: &str, factory: F) -> bool
    where
        S: Source + 'static,
        F: Fn(&str) -> ObsResult<S> + Send + Sync + 'static,
    {
        self.sources.register(
            type_id,
            Arc::new(move |name: &str| factory(name).map(|s| Arc::new(s) as SourceRef)),
        )
    }

    /// Register an encoder factory. Returns true if it replaced another one.
    pub fn register_encoder<E, F>(&self, type_id: &str, factory: F) -> bool
    where
        E: Encoder + 'static,
        F: Fn(&str) -> ObsResult<E> + Send + Sync + 'static,
    {
        self.encoders.register(
            type_id,
            Arc::new(move |name: &str| factory(name).map(|e| Arc::new(e) as EncoderRef)),
        )
    }

    /// Register an output factory. Returns true if it replaced another one.
    pub fn register_output<O, F>(&self, type_id: &str, factory: F) -> bool
    where
        O: Output + 'static,
        F: Fn(&str) -> ObsResult<O> + Send + Sync + 'static,
    {
        self.outputs.register(
            type_id,
            Arc::new(move |name: &str| factory(name).map(|o| Arc::new(o) as OutputRef)),
        )
    }

    /// Register a filter factory. Returns true if it replaced another one.
    pub fn register_filter<T, F>(&self, type_id: &str, factory: F) -> bool
    where
        T: Filter + 'static,
        F: Fn(&str) -> ObsResult<T> + Send + Sync + 'static,
    {
        self.filters.register(
            type_id,
            Arc::new(move |name: &str| factory(name).map(|f| Arc::new(f) as FilterRef)),
        )
    }

    pub fn create_source(&self, type_id: &str, name: &str) -> ObsResult<SourceRef> {
        self.sources.create(type_id, name)
    }

    pub fn create_encoder(&self, type_id: &str, name: &str) -> ObsResult<EncoderRef> {
        self.encoders.create(type_id, name)
    }

    pub fn create_output(&self, type_id: &str, name: &str) -> ObsResult<OutputRef> {
        self.outputs.create(type_id, name)
    }

    pub fn create_filter(&self, type_id: &str, name: &str) -> ObsResult<FilterRef> {
        self.filters.create(type_id, name)
    }

    pub fn contains(&self, kind: ComponentKind, type_id: &str) -> bool {
        match kind {
            ComponentKind::Source => self.sources.contains(type_id),
            ComponentKind::Encoder => self.encoders.contains(type_id),
            ComponentKind::Output => self.outputs.contains(type_id),
            ComponentKind::Filter => self.filters.contains(type_id),
        }
    }

    /// Remove a factory. Returns false if none was registered.
    pub fn unregister(&self, kind: ComponentKind, type_id: &str) -> bool {
        match kind {
            ComponentKind::Source => self.sources.unregister(type_id),
            ComponentKind::Encoder => self.encoders.unregister(type_id),
            ComponentKind::Output => self.outputs.unregister(type_id),
            ComponentKind::Filter => self.filters.unregister(type_id),
        }
    }

    /// Registered type identifiers of one kind, sorted.
    pub fn type_ids(&self, kind: ComponentKind) -> Vec<String> {
        match kind {
            ComponentKind::Source => self.sources.type_ids(),
            ComponentKind::Encoder => self.encoders.type_ids(),
            ComponentKind::Output => self.outputs.type_ids(),
            ComponentKind::Filter => self.filters.type_ids(),
        }
    }

    /// Total number of registered factories.
    pub fn len(&self) -> usize {
        self.sources.len() + self.encoders.len() + self.outputs.len() + self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("sources", &self.sources.type_ids())
            .field("encoders", &self.encoders.type_ids())
            .field("outputs", &self.outputs.type_ids())
            .field("filters", &self.filters.type_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simpleobs_media::component::{Component, ComponentId};
    use simpleobs_media::frame::{AudioFrame, VideoFrame};

    struct Named {
        id: ComponentId,
        name: String,
        flavor: &'static str,
    }

    impl Component for Named {
        fn id(&self) -> ComponentId {
            self.id
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn component_type(&self) -> &str {
            self.flavor
        }
    }

    impl Source for Named {
        fn video_frame(&self, _frame: &mut VideoFrame) -> ObsResult<()> {
            Err(ObsError::source("no video"))
        }

        fn audio_frame(&self, _frame: &mut AudioFrame) -> ObsResult<()> {
            Err(ObsError::source("no audio"))
        }

        fn start(&self) {}

        fn stop(&self) {}

        fn is_active(&self) -> bool {
            false
        }
    }

    impl Filter for Named {
        fn process_video(&self, _frame: &mut VideoFrame) -> ObsResult<()> {
            Ok(())
        }

        fn process_audio(&self, _frame: &mut AudioFrame) -> ObsResult<()> {
            Ok(())
        }
    }

    fn named(flavor: &'static str) -> impl Fn(&str) -> ObsResult<Named> + Send + Sync {
        move |name: &str| {
            Ok(Named {
                id: ComponentId::next(),
                name: name.to_string(),
                flavor,
            })
        }
    }

    #[test]
    fn test_unknown_type_is_not_found() {
        let registry = ComponentRegistry::new();
        let result = registry.create_source("unknown_type", "x");
        assert!(matches!(
            result,
            Err(ObsError::ComponentNotFound { ref kind, ref type_id })
                if kind == "source" && type_id == "unknown_type"
        ));
    }

    #[test]
    fn test_create_passes_name_to_factory() {
        let registry = ComponentRegistry::new();
        assert!(!registry.register_source("color", named("v1")));
        let source = registry.create_source("color", "Background").unwrap();
        assert_eq!(source.name(), "Background");
        assert_eq!(source.component_type(), "v1");
    }

    #[test]
    fn test_reregister_is_last_writer_wins() {
        let registry = ComponentRegistry::new();
        registry.register_source("color", named("v1"));
        assert!(registry.register_source("color", named("v2")));
        let source = registry.create_source("color", "a").unwrap();
        assert_eq!(source.component_type(), "v2");
        assert_eq!(registry.type_ids(ComponentKind::Source), vec!["color"]);
    }

    #[test]
    fn test_kinds_are_separate_namespaces() {
        let registry = ComponentRegistry::new();
        registry.register_filter("shared_id", named("filter"));
        assert!(registry.contains(ComponentKind::Filter, "shared_id"));
        assert!(!registry.contains(ComponentKind::Source, "shared_id"));
        assert!(registry.create_source("shared_id", "x").is_err());
        assert!(registry.create_filter("shared_id", "x").is_ok());
    }

    #[test]
    fn test_factory_failure_records_reason() {
        let registry = ComponentRegistry::new();
        registry.register_source("camera", |_name: &str| -> ObsResult<Named> {
            Err(ObsError::source("device busy"))
        });
        match registry.create_source("camera", "cam") {
            Err(ObsError::Factory { type_id, reason }) => {
                assert_eq!(type_id, "camera");
                assert!(reason.contains("device busy"));
            }
            other => panic!("expected factory error, got {:?}", other.map(|s| s.name().to_string())),
        }
    }

    #[test]
    fn test_unregister_and_listing() {
        let registry = ComponentRegistry::new();
        registry.register_source("b", named("b"));
        registry.register_source("a", named("a"));
        registry.register_filter("f", named("f"));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.type_ids(ComponentKind::Source), vec!["a", "b"]);

        assert!(registry.unregister(ComponentKind::Source, "a"));
        assert!(!registry.unregister(ComponentKind::Source, "a"));
        assert_eq!(registry.len(), 2);
        assert!(registry.type_ids(ComponentKind::Encoder).is_empty());
    }

    #[test]
    fn test_concurrent_registration_and_creation() {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register_source("color", named("v0"));

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    registry.register_source("color", named("v1"));
                }
            })
        };
        for i in 0..100 {
            let source = registry.create_source("color", &format!("s{i}")).unwrap();
            assert!(source.component_type() == "v0" || source.component_type() == "v1");
        }
        writer.join().unwrap();
    }
}
