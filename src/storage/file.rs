use std::fs;

use crate::error::{DaaError, Result};
use crate::job::StorageDescriptor;
use crate::storage::SharedStorage;

/// Local-filesystem storage: payloads addressed by a `path` parameter.
#[derive(Debug)]
pub struct FileStorage;

impl FileStorage {
    fn path<'a>(&self, descriptor: &'a StorageDescriptor) -> Result<&'a str> {
        descriptor.param_str("path").ok_or_else(|| {
            DaaError::invalid_input(
                "file_system storage requires a path",
                descriptor.kind.clone(),
            )
        })
    }
}

impl SharedStorage for FileStorage {
    fn get(&self, descriptor: &StorageDescriptor) -> Result<String> {
        Ok(fs::read_to_string(self.path(descriptor)?)?)
    }

    fn put(&self, descriptor: &StorageDescriptor, data: &str) -> Result<()> {
        Ok(fs::write(self.path(descriptor)?, data)?)
    }
}
