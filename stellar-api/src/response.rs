//! JSON bodies exchanged with producer-consumer functions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The response body of a producer-consumer function.
///
/// ```json
/// {"RequestID": "c0ffee", "TimestampChain": ["1622812345678", "1622812345999"]}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProducerConsumerResponse {
    /// The platform invocation ID of the first hop.
    #[serde(rename = "RequestID", default)]
    pub request_id: String,
    /// Epoch-millisecond timestamps, one per hop.
    #[serde(rename = "TimestampChain", default)]
    pub timestamp_chain: Vec<String>,
}

/// Payload of a platform-native (Lambda) invocation, mimicking an API gateway proxy event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InvokePayload {
    /// The query parameters a gateway invocation would carry.
    #[serde(rename = "queryStringParameters", default)]
    pub query_string_parameters: BTreeMap<String, String>,
}

/// Reply of a platform-native (Lambda) invocation, mimicking an API gateway proxy response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct InvokeReply {
    /// HTTP status code the function would have answered with.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// The serialized [`ProducerConsumerResponse`].
    pub body: String,
}
