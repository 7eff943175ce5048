use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::grpc;
use crate::state::State;
use crate::web::App;

/// The maximum backlog for TCP listen sockets before refusing connections.
const TCP_LISTEN_BACKLOG: u32 = 1024;

/// Runs the HTTP and gRPC front ends of the function.
///
/// Binds both configured addresses and runs until termination is requested, then waits for both
/// servers to drain.
pub async fn server(config: Config) -> Result<()> {
    tracing::info!("Starting function");

    let http_listener = listen(config.http_addr).context("failed to start HTTP listener")?;
    let grpc_listener = listen(config.grpc_addr).context("failed to start gRPC listener")?;
    let state = State::new(&config)?;

    let http_state = state.clone();
    let http_handle = tokio::spawn(async move {
        App::new(http_state)
            .graceful_shutdown(true)
            .serve(http_listener)
            .await
    });
    let grpc_handle = tokio::spawn(grpc::serve(state, grpc_listener, true));

    tokio::spawn(async move {
        elegant_departure::get_shutdown_guard().wait().await;
        tracing::info!("Shutting down ...");
    });

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let http_result = http_handle.await.map_err(From::from).flatten();
    let grpc_result = grpc_handle.await.map_err(From::from).flatten();
    tracing::info!("Shutdown complete");

    http_result.context("HTTP server failed")?;
    grpc_result.context("gRPC server failed")
}

fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;

    let listener = socket.listen(TCP_LISTEN_BACKLOG)?;
    tracing::info!("Listening on {addr}");

    Ok(listener)
}
