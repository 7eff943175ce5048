use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use stellar_api::TimestampChain;
use stellar_api::proto::InvokeChainRequest;
use stellar_api::proto::producer_consumer_client::ProducerConsumerClient;
use stellar_api::wire;
use tonic::transport::Endpoint;

use super::{Dispatch, Invocation, InvocationParams, TransportError, UNKNOWN_REQUEST_ID};

/// Invokes vHive functions through the `ProducerConsumer` gRPC service.
#[derive(Debug)]
pub struct GrpcDispatcher {
    timeout: Duration,
    bucket: String,
}

impl GrpcDispatcher {
    /// Creates a dispatcher with the given per-call deadline.
    ///
    /// `bucket` is forwarded to the function when storage transfer is enabled.
    pub fn new(timeout: Duration, bucket: impl Into<String>) -> Self {
        Self {
            timeout,
            bucket: bucket.into(),
        }
    }

    fn request(&self, params: &InvocationParams) -> InvokeChainRequest {
        let mut request = InvokeChainRequest {
            increment_limit: params.increment_limit.to_string(),
            data_transfer_chain_ids: wire::encode_list(&params.endpoint.data_transfer_chain_ids),
            payload_length_bytes: params.payload_length_bytes.to_string(),
            ..Default::default()
        };

        if params.storage_transfer {
            request.bucket = self.bucket.clone();
            request.storage_transfer = true;
        }

        request
    }
}

#[async_trait]
impl Dispatch for GrpcDispatcher {
    async fn invoke(&self, params: &InvocationParams) -> Result<Invocation, TransportError> {
        let target = if params.endpoint.id.contains("://") {
            params.endpoint.id.clone()
        } else {
            format!("http://{}", params.endpoint.id)
        };

        let channel = Endpoint::from_shared(target)?
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .connect()
            .await?;
        let mut client = ProducerConsumerClient::new(channel);

        let sent_at = Utc::now();
        let reply = client.invoke_next(self.request(params)).await?;
        let received_at = Utc::now();

        let encoded = reply.into_inner().timestamp_chain;
        let timestamp_chain = match TimestampChain::decode(&encoded) {
            Ok(chain) => chain.to_strings(),
            Err(error) => {
                tracing::error!(
                    host = %params.endpoint.id,
                    error = &error as &dyn std::error::Error,
                    "Could not parse timestamp chain"
                );
                Vec::new()
            }
        };

        Ok(Invocation {
            request_id: UNKNOWN_REQUEST_ID.to_owned(),
            host: params.endpoint.id.clone(),
            sent_at,
            received_at,
            timestamp_chain,
        })
    }
}
