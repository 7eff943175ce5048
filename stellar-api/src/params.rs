//! Query parameter names of the producer-consumer HTTP interface.
//!
//! Names are case-sensitive and shared with functions deployed by earlier tooling.

/// Number of no-op iterations a hop spins for to emulate service time.
pub const INCREMENT_LIMIT: &str = "IncrementLimit";
/// Size of the payload generated by the first hop.
pub const PAYLOAD_LENGTH_BYTES: &str = "PayloadLengthBytes";
/// Downstream hop identifiers, encoded as a bracketed list.
pub const DATA_TRANSFER_CHAIN_IDS: &str = "DataTransferChainIDs";
/// Timestamps collected so far. Absent on the first hop.
pub const TIMESTAMP_CHAIN: &str = "TimestampChain";
/// Inline payload, used when not relaying via object storage.
pub const TRANSFER_PAYLOAD: &str = "TransferPayload";
/// Bucket of the relayed payload.
pub const BUCKET: &str = "Bucket";
/// Object key of the relayed payload.
pub const KEY: &str = "Key";
/// Whether the payload is relayed via object storage.
pub const STORAGE_TRANSFER: &str = "StorageTransfer";
/// Azure function authorization code.
pub const AZURE_CODE: &str = "code";
