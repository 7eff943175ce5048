//! HTTP endpoint handlers.
//!
//! - `GET /health` answers `OK`.
//! - `GET /` and `GET /<any path>` execute a hop with the chain in the query string and answer
//!   with the JSON function response.
//! - `POST /invoke` executes a hop from a Lambda-style envelope, as sent by the Lambda relay of the
//!   previous hop.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use stellar_api::ProducerConsumerResponse;
use stellar_api::response::{InvokePayload, InvokeReply};

use crate::chain::ChainRequest;
use crate::error::ChainResult;
use crate::state::FunctionState;

/// Headers platforms put their invocation ID in, checked in order.
const REQUEST_ID_HEADERS: [&str; 2] = ["x-amzn-requestid", "x-request-id"];

/// Creates a router with all endpoints.
pub fn routes() -> axum::Router<FunctionState> {
    Router::new()
        .route("/health", routing::get(health))
        .route("/invoke", routing::post(invoke_envelope))
        .route("/", routing::get(invoke))
        .route("/{*path}", routing::get(invoke))
}

async fn health() -> impl IntoResponse {
    "OK"
}

/// Returns the platform invocation ID, or a fresh one when running outside a platform.
fn request_id(headers: &HeaderMap) -> String {
    REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| headers.get(*name)?.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn execute(
    state: &FunctionState,
    request_id: String,
    query: &HashMap<String, String>,
) -> ChainResult<ProducerConsumerResponse> {
    let request = ChainRequest::from_query(query)?;
    let chain = state
        .protocol
        .handle(request, state.http_hop.as_ref())
        .await?;

    tracing::debug!(%request_id, %chain, "Hop completed");
    Ok(ProducerConsumerResponse {
        request_id,
        timestamp_chain: chain.to_strings(),
    })
}

async fn invoke(
    State(state): State<FunctionState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> ChainResult<Json<ProducerConsumerResponse>> {
    let response = execute(&state, request_id(&headers), &query).await?;
    Ok(Json(response))
}

/// Executes a hop from a Lambda invocation envelope.
///
/// Failures are reported in the envelope's status code, the HTTP status is always `200 OK`.
async fn invoke_envelope(
    State(state): State<FunctionState>,
    headers: HeaderMap,
    Json(payload): Json<InvokePayload>,
) -> Json<InvokeReply> {
    let query: HashMap<_, _> = payload.query_string_parameters.into_iter().collect();

    let reply = match execute(&state, request_id(&headers), &query).await {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(body) => InvokeReply {
                status_code: StatusCode::OK.as_u16(),
                body,
            },
            Err(error) => InvokeReply {
                status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                body: error.to_string(),
            },
        },
        Err(error) => {
            error.log();
            InvokeReply {
                status_code: error.status().as_u16(),
                body: error.to_string(),
            }
        }
    };

    Json(reply)
}
