//! The producer-consumer protocol executed by every hop.
//!
//! A hop without an inbound timestamp chain is the first hop. It generates the payload and seeds
//! the chain with the current time. Every later hop relays: it appends the current time to the
//! inbound chain and passes the payload on. Both then simulate work and, while chain IDs remain,
//! invoke the next hop. The chain returned by the next hop replaces the local one, so the first hop
//! answers with one timestamp per hop.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use stellar_api::proto::InvokeChainRequest;
use stellar_api::{TimestampChain, params, wire};

use crate::error::{ChainError, ChainResult};
use crate::hop::NextHop;
use crate::payload::{self, PayloadGenerator};
use crate::storage::ObjectStore;
use crate::workload::Workload;

/// The inputs of one hop, as received over HTTP or gRPC.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainRequest {
    /// Number of increments the simulated work spins for.
    pub increment_limit: u64,
    /// The hops still to be invoked, the next one first.
    pub chain_ids: Vec<String>,
    /// Payload size. Required on the first hop only.
    pub payload_length_bytes: Option<usize>,
    /// Timestamps of the previous hops. `None` on the first hop.
    pub timestamp_chain: Option<TimestampChain>,
    /// The payload when relayed inline.
    pub transfer_payload: String,
    /// Bucket of the relayed payload.
    pub bucket: String,
    /// Object key of the relayed payload.
    pub key: String,
    /// Relay the payload via object storage instead of inline.
    pub storage_transfer: bool,
}

impl ChainRequest {
    /// Parses the query parameters of an HTTP invocation.
    ///
    /// `IncrementLimit` is required. A missing `DataTransferChainIDs` ends the chain at this hop,
    /// an empty or missing `TimestampChain` marks the first hop. An invalid `StorageTransfer` is
    /// logged and treated as `false`.
    pub fn from_query(query: &HashMap<String, String>) -> ChainResult<Self> {
        let get = |name: &'static str| query.get(name).map(String::as_str);

        let increment_limit = parse(
            params::INCREMENT_LIMIT,
            get(params::INCREMENT_LIMIT).ok_or(ChainError::MissingParameter(params::INCREMENT_LIMIT))?,
        )?;

        let payload_length_bytes = get(params::PAYLOAD_LENGTH_BYTES)
            .map(|value| parse(params::PAYLOAD_LENGTH_BYTES, value))
            .transpose()?;

        let storage_transfer = match get(params::STORAGE_TRANSFER) {
            None | Some("") => false,
            Some(value) => parse_bool(value).unwrap_or_else(|| {
                tracing::warn!(value, "Invalid StorageTransfer value, relaying inline");
                false
            }),
        };

        Ok(Self {
            increment_limit,
            chain_ids: parse_chain_ids(get(params::DATA_TRANSFER_CHAIN_IDS).unwrap_or_default())?,
            payload_length_bytes,
            timestamp_chain: parse_timestamp_chain(get(params::TIMESTAMP_CHAIN).unwrap_or_default())?,
            transfer_payload: get(params::TRANSFER_PAYLOAD).unwrap_or_default().to_owned(),
            bucket: get(params::BUCKET).unwrap_or_default().to_owned(),
            key: get(params::KEY).unwrap_or_default().to_owned(),
            storage_transfer,
        })
    }

    /// Converts a gRPC request. Numeric fields travel as strings and are parsed like query
    /// parameters.
    pub fn from_proto(request: InvokeChainRequest) -> ChainResult<Self> {
        let payload_length_bytes = match request.payload_length_bytes.as_str() {
            "" => None,
            value => Some(parse(params::PAYLOAD_LENGTH_BYTES, value)?),
        };

        Ok(Self {
            increment_limit: parse(params::INCREMENT_LIMIT, &request.increment_limit)?,
            chain_ids: parse_chain_ids(&request.data_transfer_chain_ids)?,
            payload_length_bytes,
            timestamp_chain: parse_timestamp_chain(&request.timestamp_chain)?,
            transfer_payload: request.transfer_payload,
            bucket: request.bucket,
            key: request.key,
            storage_transfer: request.storage_transfer,
        })
    }

    /// Returns the query parameters to invoke a hop over HTTP with.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            (params::INCREMENT_LIMIT, self.increment_limit.to_string()),
            (params::DATA_TRANSFER_CHAIN_IDS, wire::encode_list(&self.chain_ids)),
        ];

        if let Some(len) = self.payload_length_bytes {
            query.push((params::PAYLOAD_LENGTH_BYTES, len.to_string()));
        }
        if let Some(chain) = &self.timestamp_chain {
            query.push((params::TIMESTAMP_CHAIN, chain.encode()));
        }
        if self.storage_transfer {
            query.push((params::BUCKET, self.bucket.clone()));
            query.push((params::KEY, self.key.clone()));
            query.push((params::STORAGE_TRANSFER, "true".to_owned()));
        } else {
            query.push((params::TRANSFER_PAYLOAD, self.transfer_payload.clone()));
        }

        query
    }

    /// Returns the message to invoke a hop over gRPC with.
    pub fn to_proto(&self) -> InvokeChainRequest {
        InvokeChainRequest {
            increment_limit: self.increment_limit.to_string(),
            data_transfer_chain_ids: wire::encode_list(&self.chain_ids),
            payload_length_bytes: self
                .payload_length_bytes
                .map(|len| len.to_string())
                .unwrap_or_default(),
            transfer_payload: self.transfer_payload.clone(),
            timestamp_chain: self
                .timestamp_chain
                .as_ref()
                .map(TimestampChain::encode)
                .unwrap_or_default(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            storage_transfer: self.storage_transfer,
        }
    }

    /// Returns `true` if this is the first hop of the chain.
    pub fn is_first_hop(&self) -> bool {
        self.timestamp_chain.is_none()
    }

    /// Returns the number of hops of the whole chain, including the previous ones and this one.
    pub fn total_hops(&self) -> usize {
        self.timestamp_chain.as_ref().map_or(0, TimestampChain::len) + 1 + self.chain_ids.len()
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> ChainResult<T> {
    value.trim().parse().map_err(|_| ChainError::InvalidParameter {
        name,
        value: value.to_owned(),
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_chain_ids(value: &str) -> ChainResult<Vec<String>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    wire::parse_ids(value).map_err(|_| ChainError::InvalidParameter {
        name: params::DATA_TRANSFER_CHAIN_IDS,
        value: value.to_owned(),
    })
}

fn parse_timestamp_chain(value: &str) -> ChainResult<Option<TimestampChain>> {
    if value.is_empty() {
        return Ok(None);
    }
    TimestampChain::decode(value)
        .map(Some)
        .map_err(|_| ChainError::InvalidParameter {
            name: params::TIMESTAMP_CHAIN,
            value: value.to_owned(),
        })
}

/// Executes hops of a producer-consumer chain.
#[derive(Debug)]
pub struct ChainProtocol {
    payloads: PayloadGenerator,
    store: Arc<dyn ObjectStore>,
    workload: Arc<dyn Workload>,
    max_chain_length: usize,
}

impl ChainProtocol {
    /// Creates the protocol with its collaborators.
    pub fn new(
        payloads: PayloadGenerator,
        store: Arc<dyn ObjectStore>,
        workload: Arc<dyn Workload>,
        max_chain_length: usize,
    ) -> Self {
        Self {
            payloads,
            store,
            workload,
            max_chain_length,
        }
    }

    /// Executes one hop and returns the timestamp chain of this and all following hops.
    ///
    /// `next_hop` invokes the following hop, if chain IDs remain. Its chain is returned unchanged.
    #[tracing::instrument(level = "debug", skip_all, fields(first_hop = request.is_first_hop()))]
    pub async fn handle(
        &self,
        mut request: ChainRequest,
        next_hop: &dyn NextHop,
    ) -> ChainResult<TimestampChain> {
        let hops = request.total_hops();
        if hops > self.max_chain_length {
            return Err(ChainError::ChainTooLong {
                hops,
                max: self.max_chain_length,
            });
        }
        if request.storage_transfer && request.bucket.is_empty() {
            return Err(ChainError::MissingParameter(params::BUCKET));
        }

        let chain = match request.timestamp_chain.take() {
            None => self.produce(&mut request).await?,
            Some(chain) => self.relay(&mut request, chain).await?,
        };

        self.workload.simulate(request.increment_limit).await;

        let Some((next, remaining)) = request.chain_ids.split_first() else {
            tracing::debug!(hops = chain.len(), "Reached end of chain");
            return Ok(chain);
        };

        let forward = ChainRequest {
            chain_ids: remaining.to_vec(),
            payload_length_bytes: None,
            timestamp_chain: Some(chain),
            ..request.clone()
        };

        tracing::debug!(%next, remaining = remaining.len(), "Invoking next hop");
        next_hop
            .invoke(next, &forward)
            .await
            .map_err(|source| ChainError::NextHop {
                target: next.clone(),
                source,
            })
    }

    /// Generates the payload of the first hop and seeds the chain.
    async fn produce(&self, request: &mut ChainRequest) -> ChainResult<TimestampChain> {
        let len = request
            .payload_length_bytes
            .ok_or(ChainError::MissingParameter(params::PAYLOAD_LENGTH_BYTES))?;
        let payload = self.payloads.generate(len);
        let chain = TimestampChain::seeded();

        if request.storage_transfer && len > 0 {
            request.key = payload::storage_key(len);
            self.store
                .put(&request.bucket, &request.key, Bytes::from(payload))
                .await?;
            request.transfer_payload.clear();
            tracing::debug!(bucket = %request.bucket, key = %request.key, "Stored payload");
        } else {
            request.transfer_payload = payload;
        }

        Ok(chain)
    }

    /// Appends to the inbound chain and passes the relayed payload on.
    async fn relay(
        &self,
        request: &mut ChainRequest,
        mut chain: TimestampChain,
    ) -> ChainResult<TimestampChain> {
        chain.append_now();

        if !request.storage_transfer || request.key.is_empty() {
            return Ok(chain);
        }

        let payload = match self.store.get(&request.bucket, &request.key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::warn!(key = %request.key, "Relayed payload not found, continuing without");
                Bytes::new()
            }
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    key = %request.key,
                    "Could not load relayed payload, continuing without"
                );
                Bytes::new()
            }
        };

        if !request.chain_ids.is_empty() {
            request.key = payload::storage_key(payload.len());
            self.store.put(&request.bucket, &request.key, payload).await?;
        }

        Ok(chain)
    }
}
