use std::env;

use secrecy::ExposeSecret;
use sentry::integrations::tracing as sentry_tracing;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

/// Initializes Sentry if a DSN is configured.
///
/// Must be called before the async runtime is created. Events are tagged with the HTTP address
/// so that hops of one chain can be told apart.
pub fn init_sentry(config: &Config) -> Option<sentry::ClientInitGuard> {
    let http_addr = config.http_addr;
    let config = &config.sentry;
    let dsn = config.dsn.as_ref()?;

    let guard = sentry::init(sentry::ClientOptions {
        dsn: dsn.expose_secret().as_str().parse().ok(),
        environment: config.environment.clone(),
        sample_rate: config.sample_rate,
        traces_sample_rate: config.traces_sample_rate,
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("http_addr", http_addr);
        for (key, value) in &config.tags {
            scope.set_tag(key, value);
        }
    });

    Some(guard)
}

/// Installs the global tracing subscriber, logging to stderr.
pub fn init_tracing(config: &Config) {
    // Warnings and errors become Sentry events, everything else is dropped.
    let sentry_layer = config.sentry.is_enabled().then(|| {
        sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
            Level::ERROR | Level::WARN => sentry_tracing::EventFilter::Event,
            _ => sentry_tracing::EventFilter::Ignore,
        })
    });

    let format = match (config.logging.format, console_is_terminal()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .boxed(),
        (LogFormat::Json, _) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true)
            .boxed(),
    };

    let env_filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        // Dependencies log at INFO at most, request spans follow the configured level.
        Err(_) => EnvFilter::new(format!(
            "{},stellar_function={level},stellar_api={level},tower_http={level}",
            config.logging.level.min(LevelFilter::INFO),
            level = config.logging.level,
        )),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(env_filter))
        .with(sentry_layer)
        .init();
}

fn console_is_terminal() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}
