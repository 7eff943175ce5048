//! Test utilities for the benchmarking harness and the function runtime.
//!
//! This crate provides in-process servers for integration tests. See the modules for all available
//! utilities.

pub mod function;
pub mod mock;
pub mod tracing;
