//! Provider name → factory lookup table.

use lbx_core::{LockboxError, LockboxResult};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::OpendalProvider;
use crate::provider::CloudProvider;

/// Built-in OpenDAL-backed provider names.
pub const BUILTIN_PROVIDERS: &[&str] = &["s3", "azblob", "fs", "memory"];

type Factory = Arc<dyn Fn() -> Box<dyn CloudProvider> + Send + Sync>;

/// Creates a fresh, unauthenticated provider for a sidecar's `provider` name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Factory>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for &name in BUILTIN_PROVIDERS {
            registry.register(name, move || Box::new(OpendalProvider::new(name)));
        }
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn CloudProvider> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn create(&self, name: &str) -> LockboxResult<Box<dyn CloudProvider>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| LockboxError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
