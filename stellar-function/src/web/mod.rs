//! The HTTP front end of the function.
//!
//! [`App`] sets up routing and middleware. It is a tower service that can be run using any
//! compatible server framework. The function binary serves it next to the gRPC front end, see
//! [`server`](crate::server::server).
//!
//! # Testing
//!
//! For end-to-end tests, see the `stellar-test` crate, which starts the function in-process on
//! ephemeral ports.

mod app;
mod middleware;

pub use app::App;
