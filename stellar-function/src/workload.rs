//! Simulated service time of a hop.
//!
//! Workloads are CPU-bound: they keep one core busy for their whole duration and never sleep.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config;

/// The work a hop performs before calling the next one.
#[async_trait::async_trait]
pub trait Workload: Debug + Send + Sync + 'static {
    /// Performs work proportional to `increments`.
    async fn simulate(&self, increments: u64);
}

/// Creates the configured workload.
pub fn from_config(config: &config::Workload) -> Arc<dyn Workload> {
    match *config {
        config::Workload::BusySpin => Arc::new(BusySpin),
        config::Workload::Timed { per_increment } => Arc::new(TimedSpin { per_increment }),
    }
}

/// Spins a no-op loop for the given number of iterations.
///
/// Returns the number of iterations, which keeps the loop from being optimized away.
pub fn busy_spin(limit: u64) -> u64 {
    let mut counter = 0u64;
    while counter < limit {
        counter = std::hint::black_box(counter + 1);
    }
    counter
}

/// Increments a counter `increments` times on a blocking thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct BusySpin;

#[async_trait::async_trait]
impl Workload for BusySpin {
    async fn simulate(&self, increments: u64) {
        if increments == 0 {
            return;
        }

        let start = Instant::now();
        if let Err(error) = tokio::task::spawn_blocking(move || busy_spin(increments)).await {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "Busy spin task failed"
            );
        }
        tracing::debug!(increments, elapsed = ?start.elapsed(), "Finished busy spin");
    }
}

/// Spins for a fixed duration per increment on a blocking thread.
#[derive(Clone, Copy, Debug)]
pub struct TimedSpin {
    /// Spin time per increment.
    pub per_increment: Duration,
}

impl TimedSpin {
    fn duration(&self, increments: u64) -> Duration {
        let increments = u32::try_from(increments).unwrap_or(u32::MAX);
        self.per_increment.saturating_mul(increments)
    }
}

#[async_trait::async_trait]
impl Workload for TimedSpin {
    async fn simulate(&self, increments: u64) {
        let duration = self.duration(increments);
        if duration.is_zero() {
            return;
        }

        let spin = tokio::task::spawn_blocking(move || {
            let deadline = Instant::now() + duration;
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        });

        if let Err(error) = spin.await {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "Timed spin task failed"
            );
        }
        tracing::debug!(increments, ?duration, "Finished timed spin");
    }
}
