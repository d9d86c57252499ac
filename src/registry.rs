/// Component registry: maps type tags from the graph to factories.
///
/// The graph only names component types; the registry turns a
/// [`ComponentDesc`] into a live [`Component`]. Every type tag used by a
/// graph (subcomponents included) must be registered before the
/// simulation is built, otherwise setup fails with
/// [`ConfigError::UnknownComponentType`].

use std::collections::BTreeMap;

use crate::component::builtin::{Clock, Echo, Sink};
use crate::component::Component;
use crate::error::ConfigError;
use crate::graph::{ComponentDesc, ConfigGraph};

/// Builds a component from its descriptor.
pub type Factory = Box<dyn Fn(&ComponentDesc) -> Result<Box<dyn Component>, ConfigError> + Send + Sync>;

#[derive(Default)]
pub struct ComponentRegistry {
    factories: BTreeMap<String, Factory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        ComponentRegistry::default()
    }

    /// A registry holding the built-in `clock`, `echo` and `sink` types.
    pub fn with_builtins() -> Self {
        ComponentRegistry::new()
            .with("clock", |desc| Ok(Box::new(Clock::from_desc(desc)?)))
            .with("echo", |desc| Ok(Box::new(Echo::from_desc(desc)?)))
            .with("sink", |_| Ok(Box::new(Sink::new())))
    }

    /// Register `factory` under `type_tag`, replacing any previous one.
    pub fn register<F>(&mut self, type_tag: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentDesc) -> Result<Box<dyn Component>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(type_tag.into(), Box::new(factory));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, type_tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ComponentDesc) -> Result<Box<dyn Component>, ConfigError> + Send + Sync + 'static,
    {
        self.register(type_tag, factory);
        self
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    pub fn type_tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Check every type tag of `graph`, in [`ComponentKey`] order.
    ///
    /// [`ComponentKey`]: crate::id::ComponentKey
    pub fn check(&self, graph: &ConfigGraph) -> Result<(), ConfigError> {
        for key in graph.keys() {
            if let Some(tag) = graph.type_of(&key) {
                if !self.contains(tag) {
                    return Err(ConfigError::UnknownComponentType {
                        component: key.base(),
                        type_tag: tag.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Instantiate the component described by `desc`.
    pub fn create(&self, desc: &ComponentDesc) -> Result<Box<dyn Component>, ConfigError> {
        let factory = self
            .factories
            .get(&desc.type_tag)
            .ok_or_else(|| ConfigError::UnknownComponentType {
                component: desc.id,
                type_tag: desc.type_tag.clone(),
            })?;
        factory(desc)
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
