use std::sync::Arc;

use anyhow::Result;

use crate::chain::ChainProtocol;
use crate::config::{Config, Relay};
use crate::hop::{GrpcHop, HttpHop, LambdaHop, NextHop};
use crate::payload::PayloadGenerator;
use crate::{storage, workload};

/// Shared reference to the [function state](State).
pub type FunctionState = Arc<State>;

/// The protocol and next-hop invokers shared by the HTTP and gRPC front ends.
///
/// In request handlers, use `axum::extract::State<FunctionState>` to retrieve a shared reference
/// to this structure.
#[derive(Debug)]
pub struct State {
    /// Executes hops.
    pub protocol: ChainProtocol,
    /// Invokes the next hop of HTTP invocations.
    pub http_hop: Arc<dyn NextHop>,
    /// Invokes the next hop of gRPC invocations.
    pub grpc_hop: Arc<dyn NextHop>,
}

impl State {
    /// Builds the state from the configuration.
    ///
    /// Generates the payload buffer and fails if the Lambda relay lacks credentials.
    pub fn new(config: &Config) -> Result<FunctionState> {
        let payloads = PayloadGenerator::new(config.payload_buffer_bytes, &mut rand::rng());
        let protocol = ChainProtocol::new(
            payloads,
            storage::from_config(&config.storage),
            workload::from_config(&config.workload),
            config.max_chain_length,
        );

        let http_hop: Arc<dyn NextHop> = match config.relay {
            Relay::Http => Arc::new(HttpHop::new(config.next_hop_timeout)?),
            Relay::Lambda => Arc::new(LambdaHop::from_config(
                &config.lambda,
                config.next_hop_timeout,
            )?),
        };
        let grpc_hop = Arc::new(GrpcHop::new(config.next_hop_timeout));

        Ok(Arc::new(Self {
            protocol,
            http_hop,
            grpc_hop,
        }))
    }

    /// Creates the state from explicit parts.
    pub fn from_parts(
        protocol: ChainProtocol,
        http_hop: Arc<dyn NextHop>,
        grpc_hop: Arc<dyn NextHop>,
    ) -> FunctionState {
        Arc::new(Self {
            protocol,
            http_hop,
            grpc_hop,
        })
    }
}
