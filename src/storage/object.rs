use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{DaaError, Result};
use crate::job::StorageDescriptor;
use crate::storage::SharedStorage;

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Presigned-URL object storage: GET the input from, or PUT the payload to,
/// the `presigned_url` parameter. Anything other than a success status is a
/// transfer failure.
#[derive(Debug)]
pub struct ObjectStorage {
    // Built lazily on first use: blocking clients must not be constructed
    // inside an async runtime, and get/put only run on worker threads.
    client: OnceLock<reqwest::blocking::Client>,
}

impl ObjectStorage {
    pub fn new() -> Self {
        ObjectStorage {
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(TRANSFER_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new())
        })
    }

    fn url<'a>(&self, descriptor: &'a StorageDescriptor) -> Result<&'a str> {
        descriptor.param_str("presigned_url").ok_or_else(|| {
            DaaError::invalid_input(
                "object_store storage requires a presigned_url",
                descriptor.kind.clone(),
            )
        })
    }
}

impl Default for ObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStorage for ObjectStorage {
    fn get(&self, descriptor: &StorageDescriptor) -> Result<String> {
        let url = self.url(descriptor)?;
        let response = self.client().get(url).send()?;
        if !response.status().is_success() {
            return Err(DaaError::StorageTransfer(format!(
                "GET returned {}",
                response.status()
            )));
        }
        Ok(response.text()?)
    }

    fn put(&self, descriptor: &StorageDescriptor, data: &str) -> Result<()> {
        let url = self.url(descriptor)?;
        let response = self.client().put(url).body(data.to_string()).send()?;
        if !response.status().is_success() {
            return Err(DaaError::StorageTransfer(format!(
                "PUT returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
