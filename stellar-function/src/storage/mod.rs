//! Object storage for relaying payloads between hops.
//!
//! With `StorageTransfer` set, hops do not pass the payload inline. The producing hop writes it to
//! a bucket under a fresh key and forwards bucket and key, the consuming hop reads it back.

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::StatusCode;
use stellar_api::signing::{RequestSigner, SigningError};

use crate::config::Storage;

mod in_memory;
mod s3_compatible;

pub use in_memory::InMemoryStore;
pub use s3_compatible::S3CompatibleStore;

/// AWS service name of S3 for request signing.
const S3: &str = "s3";

/// Errors returned by object stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object URL could not be built from endpoint, bucket and key.
    #[error("invalid object url {0:?}")]
    InvalidUrl(String),

    /// The request could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The request did not complete.
    #[error("storage request failed")]
    Http(#[from] reqwest::Error),

    /// The store answered with an unexpected status.
    #[error("storage responded with status {0}")]
    Status(StatusCode),
}

/// A store of payload objects addressed by bucket and key.
#[async_trait::async_trait]
pub trait ObjectStore: Debug + Send + Sync + 'static {
    /// Writes `payload` under `bucket`/`key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, payload: Bytes) -> Result<(), StoreError>;

    /// Reads the object at `bucket`/`key`, returning `None` if it does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, StoreError>;
}

/// Creates the configured object store.
pub fn from_config(config: &Storage) -> Arc<dyn ObjectStore> {
    match config {
        Storage::S3Compatible {
            endpoint,
            region,
            path_style,
            credentials,
        } => {
            let signer = credentials.resolve().map(|credentials| {
                RequestSigner::new(credentials, region.clone(), S3).with_payload_checksum()
            });
            if signer.is_none() {
                tracing::warn!(%endpoint, "No storage credentials found, sending unsigned requests");
            }
            Arc::new(S3CompatibleStore::new(endpoint, *path_style, signer))
        }
        Storage::Memory => Arc::new(InMemoryStore::new()),
    }
}
