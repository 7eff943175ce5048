//! The gRPC front end of the function.

use anyhow::Result;
use stellar_api::proto::producer_consumer_server::{ProducerConsumer, ProducerConsumerServer};
use stellar_api::proto::{InvokeChainReply, InvokeChainRequest};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

use crate::chain::ChainRequest;
use crate::state::FunctionState;

/// Serves the `ProducerConsumer` service. Next hops are invoked over gRPC.
#[derive(Debug)]
pub struct ProducerConsumerService {
    state: FunctionState,
}

impl ProducerConsumerService {
    /// Creates the service for the given state.
    pub fn new(state: FunctionState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl ProducerConsumer for ProducerConsumerService {
    async fn invoke_next(
        &self,
        request: Request<InvokeChainRequest>,
    ) -> Result<Response<InvokeChainReply>, Status> {
        let request = ChainRequest::from_proto(request.into_inner())?;
        let chain = self
            .state
            .protocol
            .handle(request, self.state.grpc_hop.as_ref())
            .await?;

        tracing::debug!(%chain, "Hop completed");
        Ok(Response::new(InvokeChainReply {
            timestamp_chain: chain.encode(),
        }))
    }
}

/// Runs the gRPC server on `listener`.
///
/// With `graceful_shutdown`, the server stops once shutdown is triggered through
/// `elegant_departure`, otherwise it runs until the future is dropped.
pub async fn serve(state: FunctionState, listener: TcpListener, graceful_shutdown: bool) -> Result<()> {
    let router = tonic::transport::Server::builder()
        .add_service(ProducerConsumerServer::new(ProducerConsumerService::new(state)));
    let incoming = TcpListenerStream::new(listener);

    if graceful_shutdown {
        let guard = elegant_departure::get_shutdown_guard();
        router
            .serve_with_incoming_shutdown(incoming, guard.wait_owned())
            .await?;
    } else {
        router.serve_with_incoming(incoming).await?;
    }

    Ok(())
}
