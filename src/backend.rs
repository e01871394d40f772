//! Enhancer backends and the proxy contract used to drive them.
//!
//! A backend creates one proxy per build unit. The proxy collects metadata
//! files and class artifacts and rewrites them in a single `enhance` call.
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{EnhancerConfig, PersistenceApi};
use crate::error::UnitError;
use crate::project::BuildUnit;

/// One enhancer invocation scoped to a single build unit.
pub trait EnhancerProxy {
    fn set_add_default_constructor(&mut self, enabled: bool);
    fn set_enforce_property_restrictions(&mut self, enabled: bool);
    fn add_metadata_files(&mut self, paths: &[PathBuf]);
    fn add_classes(&mut self, paths: &[PathBuf]);
    /// Rewrite every registered artifact; returns how many were changed.
    fn enhance(&mut self) -> Result<usize, UnitError>;
}

/// Inputs a backend receives when creating a proxy.
#[derive(Debug, Clone, Copy)]
pub struct ProxyRequest<'a> {
    pub api: PersistenceApi,
    pub unit: &'a BuildUnit,
    /// Output directory the build resolved for the unit.
    pub output_dir: &'a Path,
    pub extra: Option<&'a str>,
}

/// A registered enhancer implementation.
pub trait EnhancerBackend: Send + Sync {
    /// Stable identifier stored in the configuration.
    fn id(&self) -> &str;
    /// Display name used to prefix build messages.
    fn name(&self) -> &str;
    /// Create a proxy, failing with `BackendUnavailable` or `Binding`.
    fn new_proxy(&self, request: ProxyRequest<'_>) -> Result<Box<dyn EnhancerProxy>, UnitError>;
}

/// Append-only registry of enhancer backends keyed by id.
pub struct BackendRegistry {
    backends: RwLock<IndexMap<String, Arc<dyn EnhancerBackend>>>,
    default_id: String,
}

impl BackendRegistry {
    /// Create a registry whose default is `default_backend`.
    pub fn new(default_backend: Arc<dyn EnhancerBackend>) -> Self {
        let default_id = default_backend.id().to_string();
        let mut backends: IndexMap<String, Arc<dyn EnhancerBackend>> = IndexMap::new();
        backends.insert(default_id.clone(), default_backend);
        Self {
            backends: RwLock::new(backends),
            default_id,
        }
    }

    /// Register a backend. Returns false when the id is already taken; the
    /// first registration wins.
    pub fn register(&self, backend: Arc<dyn EnhancerBackend>) -> bool {
        let mut backends = self.backends.write();
        if backends.contains_key(backend.id()) {
            tracing::debug!(id = backend.id(), "backend already registered");
            return false;
        }
        backends.insert(backend.id().to_string(), backend);
        true
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.backends.read().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn EnhancerBackend>> {
        self.backends.read().get(id).cloned()
    }

    pub fn default_backend(&self) -> Arc<dyn EnhancerBackend> {
        // the default is inserted at construction and never removed
        self.backends.read()[self.default_id.as_str()].clone()
    }

    /// All backends in registration order.
    pub fn all(&self) -> Vec<Arc<dyn EnhancerBackend>> {
        self.backends.read().values().cloned().collect()
    }

    /// Resolve the configured backend, falling back to the default for blank
    /// or unknown ids.
    pub fn resolve(&self, config: &EnhancerConfig) -> Arc<dyn EnhancerBackend> {
        let id = config.backend.trim();
        if id.is_empty() {
            return self.default_backend();
        }
        match self.get(id) {
            Some(backend) => backend,
            None => {
                tracing::warn!(id, "unknown enhancer backend, using default");
                self.default_backend()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fakes shared by orchestrator and task tests.
    use super::*;
    use parking_lot::Mutex;

    /// What one proxy saw, captured when `enhance` runs.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Invocation {
        pub unit: String,
        pub metadata_files: Vec<PathBuf>,
        pub classes: Vec<PathBuf>,
        pub add_default_constructor: bool,
        pub enforce_property_restrictions: bool,
        pub environment: Vec<PathBuf>,
    }

    #[derive(Debug, Clone)]
    pub enum Behavior {
        Count(usize),
        Unavailable,
        Binding,
        Fail(&'static str),
        Panic,
    }

    pub struct FakeBackend {
        pub id: &'static str,
        pub name: &'static str,
        behaviors: Mutex<IndexMap<String, Behavior>>,
        pub invocations: Arc<Mutex<Vec<Invocation>>>,
    }

    impl FakeBackend {
        pub fn new(id: &'static str, name: &'static str) -> Self {
            Self {
                id,
                name,
                behaviors: Mutex::new(IndexMap::new()),
                invocations: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn on_unit(self, unit: &str, behavior: Behavior) -> Self {
            self.behaviors.lock().insert(unit.to_string(), behavior);
            self
        }

        pub fn invocations(&self) -> Vec<Invocation> {
            self.invocations.lock().clone()
        }
    }

    struct FakeProxy {
        invocation: Invocation,
        behavior: Behavior,
        sink: Arc<Mutex<Vec<Invocation>>>,
    }

    impl EnhancerProxy for FakeProxy {
        fn set_add_default_constructor(&mut self, enabled: bool) {
            self.invocation.add_default_constructor = enabled;
        }

        fn set_enforce_property_restrictions(&mut self, enabled: bool) {
            self.invocation.enforce_property_restrictions = enabled;
        }

        fn add_metadata_files(&mut self, paths: &[PathBuf]) {
            self.invocation.metadata_files.extend_from_slice(paths);
        }

        fn add_classes(&mut self, paths: &[PathBuf]) {
            self.invocation.classes.extend_from_slice(paths);
        }

        fn enhance(&mut self) -> Result<usize, UnitError> {
            self.invocation.environment = crate::environment::current()
                .map(|env| env.entries().to_vec())
                .unwrap_or_default();
            self.sink.lock().push(self.invocation.clone());
            match &self.behavior {
                Behavior::Count(count) => Ok(*count),
                Behavior::Fail(message) => Err(UnitError::Unexpected(anyhow::anyhow!(*message))),
                Behavior::Panic => panic!("enhancer crashed"),
                Behavior::Unavailable | Behavior::Binding => Ok(0),
            }
        }
    }

    impl EnhancerBackend for FakeBackend {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            self.name
        }

        fn new_proxy(
            &self,
            request: ProxyRequest<'_>,
        ) -> Result<Box<dyn EnhancerProxy>, UnitError> {
            let behavior = self
                .behaviors
                .lock()
                .get(&request.unit.name)
                .cloned()
                .unwrap_or(Behavior::Count(0));
            match behavior {
                Behavior::Unavailable => Err(UnitError::BackendUnavailable(format!(
                    "{} not found for {}",
                    self.name, request.unit.name
                ))),
                Behavior::Binding => Err(UnitError::Binding(format!(
                    "no enhance entry point for {}",
                    request.api
                ))),
                behavior => Ok(Box::new(FakeProxy {
                    invocation: Invocation {
                        unit: request.unit.name.clone(),
                        ..Invocation::default()
                    },
                    behavior,
                    sink: Arc::clone(&self.invocations),
                })),
            }
        }
    }
}
