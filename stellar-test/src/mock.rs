//! A scriptable HTTP endpoint standing in for a deployed function.
//!
//! The endpoint answers every `GET` with a function response carrying a one-element timestamp
//! chain, unless a status was scripted for that request.
//!
//! ```
//! use axum::http::{StatusCode, header};
//! use stellar_test::mock::MockEndpoint;
//!
//! #[tokio::main]
//! async fn main() {
//!    // The second request fails, all others succeed.
//!    let endpoint = MockEndpoint::with_statuses(vec![StatusCode::OK, StatusCode::BAD_GATEWAY]).await;
//!    let url = endpoint.url();
//!    // point the harness at the URL...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use stellar_api::{ProducerConsumerResponse, TimestampChain};

#[derive(Debug, Default)]
struct Script {
    statuses: Vec<StatusCode>,
    queries: Vec<HashMap<String, String>>,
}

type SharedScript = Arc<Mutex<Script>>;

/// An in-process HTTP endpoint with scripted responses.
#[derive(Debug)]
pub struct MockEndpoint {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    script: SharedScript,
}

impl MockEndpoint {
    /// Starts an endpoint that answers every request successfully.
    pub async fn new() -> Self {
        Self::with_statuses(Vec::new()).await
    }

    /// Starts an endpoint that answers the n-th request with `statuses[n]`.
    ///
    /// Redirect statuses point back at the endpoint itself. Requests beyond the script succeed.
    pub async fn with_statuses(statuses: Vec<StatusCode>) -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let script = Arc::new(Mutex::new(Script {
            statuses,
            queries: Vec::new(),
        }));

        let router = Router::new()
            .route("/", routing::get(respond))
            .route("/{*path}", routing::get(respond))
            .with_state(script.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            script,
        }
    }

    /// Returns the URL of the endpoint, usable as endpoint ID.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.socket.port())
    }

    /// Returns the number of requests received so far.
    pub fn requests(&self) -> usize {
        self.script.lock().unwrap().queries.len()
    }

    /// Returns the query parameters of all requests received so far.
    pub fn queries(&self) -> Vec<HashMap<String, String>> {
        self.script.lock().unwrap().queries.clone()
    }
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    State(script): State<SharedScript>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let (index, status) = {
        let mut script = script.lock().unwrap();
        let index = script.queries.len();
        script.queries.push(query);
        let status = script.statuses.get(index).copied().unwrap_or(StatusCode::OK);
        (index, status)
    };

    if status.is_redirection() {
        return (status, [(header::LOCATION, "/")]).into_response();
    }
    if status != StatusCode::OK {
        return (status, "scripted failure").into_response();
    }

    Json(ProducerConsumerResponse {
        request_id: format!("mock-{index}"),
        timestamp_chain: TimestampChain::seeded().to_strings(),
    })
    .into_response()
}
