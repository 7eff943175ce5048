use std::fmt;

use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, Url};
use stellar_api::signing::RequestSigner;

use super::{ObjectStore, StoreError};

/// An S3-compatible object store, accessed with plain `PUT` and `GET` requests.
pub struct S3CompatibleStore {
    client: Client,
    endpoint: String,
    path_style: bool,
    signer: Option<RequestSigner>,
}

impl S3CompatibleStore {
    /// Creates a store for the given endpoint.
    ///
    /// Requests are SigV4-signed when a `signer` is given.
    pub fn new(endpoint: &str, path_style: bool, signer: Option<RequestSigner>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            path_style,
            signer,
        }
    }

    /// Returns the URL of an object.
    ///
    /// Path-style URLs put the bucket in the first path segment, virtual-hosted URLs in the
    /// subdomain.
    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StoreError> {
        let raw = if self.path_style {
            format!("{}/{bucket}/{key}", self.endpoint)
        } else {
            format!("{}/{key}", self.endpoint)
        };
        let mut url = Url::parse(&raw).map_err(|_| StoreError::InvalidUrl(raw.clone()))?;

        if !self.path_style {
            let host = url.host_str().unwrap_or_default();
            let virtual_host = format!("{bucket}.{host}");
            url.set_host(Some(&virtual_host))
                .map_err(|_| StoreError::InvalidUrl(raw))?;
        }

        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Bytes,
    ) -> Result<reqwest::Response, StoreError> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(signer) = &self.signer {
            for (name, value) in signer.sign(method.as_str(), url.as_str(), &[], &body)? {
                request = request.header(name, value);
            }
        }

        Ok(request.body(body).send().await?)
    }
}

impl fmt::Debug for S3CompatibleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleStore")
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3CompatibleStore {
    #[tracing::instrument(level = "trace", skip(self, payload))]
    async fn put(&self, bucket: &str, key: &str, payload: Bytes) -> Result<(), StoreError> {
        tracing::debug!(len = payload.len(), "Writing to s3-compatible store");

        let url = self.object_url(bucket, key)?;
        let response = self.send(Method::PUT, url, payload).await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status()));
        }

        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        tracing::debug!("Reading from s3-compatible store");

        let url = self.object_url(bucket, key)?;
        let response = self.send(Method::GET, url, Bytes::new()).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!("Object not found");
                Ok(None)
            }
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            status => Err(StoreError::Status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_style_url() {
        let store = S3CompatibleStore::new("http://localhost:9000/", true, None);
        let url = store.object_url("bucket", "transfer-payload-1bytes-x").unwrap();

        assert_eq!(
            url.as_str(),
            "http://localhost:9000/bucket/transfer-payload-1bytes-x"
        );
    }

    #[test]
    fn virtual_hosted_url() {
        let store = S3CompatibleStore::new("https://s3.us-west-1.amazonaws.com", false, None);
        let url = store.object_url("bucket", "key").unwrap();

        assert_eq!(url.as_str(), "https://bucket.s3.us-west-1.amazonaws.com/key");
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let store = S3CompatibleStore::new("not a url", true, None);
        assert!(matches!(
            store.object_url("bucket", "key"),
            Err(StoreError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_store_fails() {
        let store = S3CompatibleStore::new("http://127.0.0.1:1", true, None);
        assert!(matches!(
            store.get("bucket", "key").await,
            Err(StoreError::Http(_))
        ));
    }
}
