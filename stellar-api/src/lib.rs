//! Shared wire contracts between the benchmarking harness and the deployed functions.
//!
//! This crate abstracts the automated `protobuf` codegen for the producer-consumer gRPC service and
//! contains everything both sides of a chained invocation have to agree on:
//!
//! - the bracketed, space-separated list encoding used for chain IDs and timestamp chains
//!   ([`wire`]),
//! - the [`TimestampChain`] threaded through every hop ([`chain`]),
//! - the HTTP query parameter names and the JSON response body ([`params`], [`response`]),
//! - SigV4 request signing and the credentials configuration shared by both binaries
//!   ([`signing`]).
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod chain;
pub mod params;
pub mod response;
pub mod signing;
pub mod wire;

pub use chain::TimestampChain;
pub use response::ProducerConsumerResponse;

/// Generated protobuf messages and gRPC client/server stubs.
#[allow(missing_docs)]
#[allow(missing_debug_implementations)]
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/prodcon.rs"));
}
