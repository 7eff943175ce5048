//! Invokers for the next hop of a chain.
//!
//! The transport matches the one the hop was invoked with: gRPC hops call the next hop over gRPC,
//! HTTP hops either over plain HTTP or with a signed Lambda `Invoke`, depending on the configured
//! relay.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, redirect};
use stellar_api::proto::producer_consumer_client::ProducerConsumerClient;
use stellar_api::response::{InvokePayload, InvokeReply};
use stellar_api::signing::{RequestSigner, SigningError};
use stellar_api::wire::WireError;
use stellar_api::{ProducerConsumerResponse, TimestampChain};
use tonic::transport::Endpoint;

use crate::chain::ChainRequest;
use crate::config::Lambda;

/// AWS service name of Lambda for request signing.
const LAMBDA: &str = "lambda";

/// Errors returned when invoking the next hop.
#[derive(Debug, thiserror::Error)]
pub enum HopError {
    /// The target could not be turned into a URL.
    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    /// The request could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The HTTP request did not complete.
    #[error("request failed")]
    Http(#[from] reqwest::Error),

    /// The next hop answered with a status other than `200 OK`.
    #[error("next hop responded with status {0}")]
    Status(StatusCode),

    /// The response body is not a valid function response.
    #[error("invalid response body")]
    Body(#[from] serde_json::Error),

    /// The response carries an invalid timestamp chain.
    #[error("invalid timestamp chain in response")]
    Chain(#[from] WireError),

    /// The gRPC channel could not be established.
    #[error("failed to connect")]
    Connect(#[from] tonic::transport::Error),

    /// The gRPC call failed.
    #[error("call failed: {0}")]
    Grpc(#[from] tonic::Status),
}

/// Invokes the next hop of a chain.
#[async_trait]
pub trait NextHop: Debug + Send + Sync {
    /// Invokes `target` with `request` and returns the timestamp chain it responds with.
    async fn invoke(
        &self,
        target: &str,
        request: &ChainRequest,
    ) -> Result<TimestampChain, HopError>;
}

/// Calls the next hop with a `GET` request carrying the chain as query parameters.
///
/// Targets without a scheme are called over HTTPS.
#[derive(Debug)]
pub struct HttpHop {
    client: Client,
}

impl HttpHop {
    /// Creates an invoker with the given request deadline.
    pub fn new(timeout: Duration) -> Result<Self, HopError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

/// Builds a client that reports redirects as responses instead of following them.
fn http_client(timeout: Duration) -> Result<Client, HopError> {
    let client = Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .build()?;
    Ok(client)
}

fn target_url(target: &str) -> Result<Url, HopError> {
    let raw = if target.contains("://") {
        target.to_owned()
    } else {
        format!("https://{target}")
    };
    Url::parse(&raw).map_err(|_| HopError::InvalidTarget(raw))
}

fn parse_response(body: &[u8]) -> Result<TimestampChain, HopError> {
    let response: ProducerConsumerResponse = serde_json::from_slice(body)?;
    Ok(TimestampChain::from_strings(&response.timestamp_chain)?)
}

#[async_trait]
impl NextHop for HttpHop {
    async fn invoke(
        &self,
        target: &str,
        request: &ChainRequest,
    ) -> Result<TimestampChain, HopError> {
        let mut url = target_url(target)?;
        url.query_pairs_mut().extend_pairs(request.to_query());

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(HopError::Status(response.status()));
        }

        parse_response(&response.bytes().await?)
    }
}

/// Calls the next hop with a signed Lambda `Invoke`, wrapping the query parameters like an API
/// gateway event.
#[derive(Debug)]
pub struct LambdaHop {
    client: Client,
    signer: RequestSigner,
    endpoint: String,
    function_prefix: String,
}

impl LambdaHop {
    /// Creates an invoker for the given endpoint.
    pub fn new(
        signer: RequestSigner,
        endpoint: impl Into<String>,
        function_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HopError> {
        Ok(Self {
            client: http_client(timeout)?,
            signer,
            endpoint: endpoint.into(),
            function_prefix: function_prefix.into(),
        })
    }

    /// Creates an invoker from the Lambda configuration.
    ///
    /// Fails if no credentials are configured or found in the environment.
    pub fn from_config(config: &Lambda, timeout: Duration) -> anyhow::Result<Self> {
        let credentials = config.credentials.resolve().ok_or_else(|| {
            anyhow::anyhow!("AWS credentials are required to invoke Lambda functions")
        })?;
        let signer = RequestSigner::new(credentials, config.region.clone(), LAMBDA);
        Ok(Self::new(
            signer,
            config.endpoint(),
            config.function_prefix.clone(),
            timeout,
        )?)
    }

    fn invoke_url(&self, target: &str) -> Result<Url, HopError> {
        let raw = format!(
            "{}/2015-03-31/functions/{}{target}/invocations",
            self.endpoint, self.function_prefix
        );
        Url::parse(&raw).map_err(|_| HopError::InvalidTarget(raw))
    }
}

#[async_trait]
impl NextHop for LambdaHop {
    async fn invoke(
        &self,
        target: &str,
        request: &ChainRequest,
    ) -> Result<TimestampChain, HopError> {
        let url = self.invoke_url(target)?;
        let payload = InvokePayload {
            query_string_parameters: request
                .to_query()
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect::<BTreeMap<_, _>>(),
        };
        let body = serde_json::to_vec(&payload)?;

        let mut builder = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        let headers = [("content-type", "application/json")];
        for (name, value) in self.signer.sign("POST", url.as_str(), &headers, &body)? {
            builder = builder.header(name, value);
        }

        let response = builder.body(body).send().await?;
        if response.status() != StatusCode::OK {
            return Err(HopError::Status(response.status()));
        }

        let reply: InvokeReply = serde_json::from_slice(&response.bytes().await?)?;
        if reply.status_code != StatusCode::OK.as_u16() {
            let status = StatusCode::from_u16(reply.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Err(HopError::Status(status));
        }

        parse_response(reply.body.as_bytes())
    }
}

/// Calls the next hop's `ProducerConsumer` gRPC service.
#[derive(Debug)]
pub struct GrpcHop {
    timeout: Duration,
}

impl GrpcHop {
    /// Creates an invoker with the given deadline for connecting and for the call.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl NextHop for GrpcHop {
    async fn invoke(
        &self,
        target: &str,
        request: &ChainRequest,
    ) -> Result<TimestampChain, HopError> {
        let target = if target.contains("://") {
            target.to_owned()
        } else {
            format!("http://{target}")
        };

        let channel = Endpoint::from_shared(target)?
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .connect()
            .await?;
        let reply = ProducerConsumerClient::new(channel)
            .invoke_next(request.to_proto())
            .await?;

        Ok(TimestampChain::decode(&reply.into_inner().timestamp_chain)?)
    }
}
