//! Exposes an in-process function for use in integration tests.
//!
//! ```
//! use stellar_test::function::TestFunction;
//!
//! #[tokio::main]
//! async fn main() {
//!    let function = TestFunction::new().await;
//!    let url = function.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use stellar_function::chain::ChainProtocol;
use stellar_function::hop::{GrpcHop, HttpHop};
use stellar_function::payload::PayloadGenerator;
use stellar_function::state::State;
use stellar_function::storage::InMemoryStore;
use stellar_function::web::App;
use stellar_function::workload::BusySpin;

/// Deadline for invoking the next hop from a test function.
const NEXT_HOP_TIMEOUT: Duration = Duration::from_secs(10);

/// An in-process function serving HTTP and gRPC for use in integration tests.
///
/// The function relays HTTP invocations over plain HTTP and stores payloads in memory. Both front
/// ends listen on random available ports on localhost and stop when the function is dropped.
#[derive(Debug)]
pub struct TestFunction {
    handles: Vec<tokio::task::JoinHandle<()>>,
    http: SocketAddr,
    grpc: SocketAddr,
    store: InMemoryStore,
}

impl TestFunction {
    /// Starts a function with its own object store.
    pub async fn new() -> Self {
        Self::with_store(InMemoryStore::new()).await
    }

    /// Starts a function on a shared object store.
    ///
    /// Use this to relay payloads through storage between several test functions.
    pub async fn with_store(store: InMemoryStore) -> Self {
        let (http_listener, http) = bind();
        let (grpc_listener, grpc) = bind();

        let protocol = ChainProtocol::new(
            PayloadGenerator::new(1024, &mut rand::rng()),
            Arc::new(store.clone()),
            Arc::new(BusySpin),
            32,
        );
        let state = State::from_parts(
            protocol,
            Arc::new(HttpHop::new(NEXT_HOP_TIMEOUT).unwrap()),
            Arc::new(GrpcHop::new(NEXT_HOP_TIMEOUT)),
        );

        let app = App::new(state.clone());
        let http_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(http_listener).unwrap();
            app.serve(listener).await.unwrap();
        });

        let grpc_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(grpc_listener).unwrap();
            stellar_function::grpc::serve(state, listener, false)
                .await
                .unwrap();
        });

        Self {
            handles: vec![http_handle, grpc_handle],
            http,
            grpc,
            store,
        }
    }

    /// Returns a full URL pointing to the given path of the HTTP front end.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://127.0.0.1:{}/{}", self.http.port(), path)
    }

    /// Returns the chain ID that addresses this function over HTTP.
    pub fn http_id(&self) -> String {
        self.url("/")
    }

    /// Returns the chain ID that addresses this function over gRPC.
    pub fn grpc_id(&self) -> String {
        format!("127.0.0.1:{}", self.grpc.port())
    }

    /// Returns a handle to the function's object store.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }
}

impl Drop for TestFunction {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}
