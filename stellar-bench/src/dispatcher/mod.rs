//! Execution of single benchmark requests against deployed functions.
//!
//! A [`Dispatch`] implementation builds one provider-specific request, executes it and reports the
//! client-side timing. HTTP providers are served by [`HttpDispatcher`], vHive by
//! [`GrpcDispatcher`]. Use [`from_config`] to construct the dispatcher for the configured
//! provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stellar_api::signing::SigningError;

use crate::config::Config;
use crate::experiment::EndpointInfo;

mod grpc;
mod http;

pub use grpc::GrpcDispatcher;
pub use http::{HttpDispatcher, endpoint_url};

/// Request ID recorded for protocols that do not report one.
pub const UNKNOWN_REQUEST_ID: &str = "N/A";

/// Errors that mark a single request as failed.
///
/// Failed requests count against the error budget and produce no records. They are never retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint does not form a valid URL.
    #[error("invalid endpoint URL {0:?}")]
    InvalidUrl(String),

    /// The request could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The HTTP request failed or timed out.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The function answered with a status other than `200 OK`.
    #[error("function responded with status {0}")]
    Status(reqwest::StatusCode),

    /// Connecting to the gRPC endpoint failed.
    #[error("gRPC connection failed: {0}")]
    Connect(#[from] tonic::transport::Error),

    /// The gRPC call failed or exceeded its deadline.
    #[error("gRPC call failed: {0}")]
    Grpc(#[from] tonic::Status),
}

/// Everything needed to issue one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationParams {
    /// The function to invoke, with its downstream hops.
    pub endpoint: EndpointInfo,
    /// URL path for providers addressed by bare host names.
    pub route: Option<String>,
    /// Busy-spin increments each hop simulates.
    pub increment_limit: u64,
    /// Size of the payload generated by the first hop.
    pub payload_length_bytes: usize,
    /// Relay the payload through object storage instead of inline.
    pub storage_transfer: bool,
}

/// The outcome of a successful request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Invocation ID reported by the function, or [`UNKNOWN_REQUEST_ID`].
    pub request_id: String,
    /// Host the request was sent to.
    pub host: String,
    /// Time immediately before the request was sent.
    pub sent_at: DateTime<Utc>,
    /// Time the response head arrived.
    pub received_at: DateTime<Utc>,
    /// Epoch-millisecond completion time of every hop.
    pub timestamp_chain: Vec<String>,
}

/// Executes single requests against deployed functions.
#[async_trait]
pub trait Dispatch: fmt::Debug + Send + Sync {
    /// Sends one request and waits for the response.
    async fn invoke(&self, params: &InvocationParams) -> Result<Invocation, TransportError>;
}

/// Creates the dispatcher for the configured provider.
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn Dispatch>> {
    if config.provider.uses_grpc() {
        return Ok(Arc::new(GrpcDispatcher::new(
            config.grpc_timeout,
            config.grpc_bucket.clone(),
        )));
    }

    Ok(Arc::new(HttpDispatcher::from_config(config)?))
}
