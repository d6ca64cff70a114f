//! Shared storage for job input, result and log payloads.
//!
//! A [`StorageDescriptor`] names the medium by tag plus per-operation
//! parameters; the [`StorageRegistry`] resolves the tag to an
//! implementation. Two variants ship by default (`file_system`,
//! `object_store`); more can be registered by tag without touching callers.
//!
//! Implementations are synchronous: they are only ever invoked from
//! blocking worker threads or spawned worker processes.

mod file;
mod object;

use std::collections::HashMap;
use std::sync::Arc;

pub use file::FileStorage;
pub use object::ObjectStorage;

use crate::error::{DaaError, Result};
use crate::job::StorageDescriptor;

/// Read/write a string payload from/to one backing medium.
pub trait SharedStorage: Send + Sync + std::fmt::Debug {
    fn get(&self, descriptor: &StorageDescriptor) -> Result<String>;
    fn put(&self, descriptor: &StorageDescriptor, data: &str) -> Result<()>;
}

/// Storage implementations keyed by descriptor tag. Read-only after service
/// construction.
#[derive(Clone)]
pub struct StorageRegistry {
    options: HashMap<String, Arc<dyn SharedStorage>>,
}

impl StorageRegistry {
    /// Registry with the two built-in variants.
    pub fn with_defaults() -> Self {
        let mut registry = StorageRegistry {
            options: HashMap::new(),
        };
        registry.register("file_system", Arc::new(FileStorage));
        registry.register("object_store", Arc::new(ObjectStorage::new()));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, storage: Arc<dyn SharedStorage>) {
        self.options.insert(kind.into(), storage);
    }

    /// Resolve a descriptor tag; unknown tags are a validation error.
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn SharedStorage>> {
        self.options.get(kind).cloned().ok_or_else(|| {
            DaaError::invalid_input(
                format!("Unsupported storage option: type={kind}"),
                kind.to_string(),
            )
        })
    }

    pub fn get(&self, descriptor: &StorageDescriptor) -> Result<String> {
        self.resolve(&descriptor.kind)?.get(descriptor)
    }

    pub fn put(&self, descriptor: &StorageDescriptor, data: &str) -> Result<()> {
        self.resolve(&descriptor.kind)?.put(descriptor, data)
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .finish()
    }
}
