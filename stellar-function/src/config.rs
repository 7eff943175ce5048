//! Configuration for the function runtime.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `STELLAR_FN__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Nested structures are separated with double underscores, for example
//! `STELLAR_FN__STORAGE__TYPE=memory` or `STELLAR_FN__WORKLOAD__PER_INCREMENT=1ms`.
//!
//! # Example
//!
//! ```yaml
//! http_addr: 0.0.0.0:8080
//! relay: lambda
//! lambda:
//!   region: us-west-1
//!   function_prefix: stellar-
//! storage:
//!   type: s3compatible
//!   endpoint: http://localhost:9000
//!   region: us-east-1
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::SecretBox;
use serde::{Deserialize, Serialize};
use stellar_api::signing::{ConfigSecret, CredentialsConfig};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "STELLAR_FN__";

/// How HTTP invocations reach the next hop of a chain.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relay {
    /// Plain HTTP `GET` with query parameters against the next hop's URL.
    #[default]
    Http,
    /// Signed Lambda `Invoke` of the next hop's function name.
    Lambda,
}

/// Lambda settings for [`Relay::Lambda`].
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Lambda {
    /// Region the functions are deployed in.
    ///
    /// # Default
    ///
    /// `us-west-1`
    pub region: String,

    /// Prefix prepended to chain IDs to form function names.
    pub function_prefix: String,

    /// Overrides the Lambda API endpoint, e.g. for local emulators.
    ///
    /// Defaults to `https://lambda.<region>.amazonaws.com`.
    pub endpoint: Option<String>,

    /// Credentials used to sign invocations.
    #[serde(flatten)]
    pub credentials: CredentialsConfig,
}

impl Default for Lambda {
    fn default() -> Self {
        Self {
            region: "us-west-1".into(),
            function_prefix: String::new(),
            endpoint: None,
            credentials: CredentialsConfig::default(),
        }
    }
}

impl Lambda {
    /// Returns the configured endpoint or the public endpoint of the region.
    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_owned(),
            None => format!("https://lambda.{}.amazonaws.com", self.region),
        }
    }
}

/// Object storage used to relay payloads between hops.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// An S3-compatible object store (type `"s3compatible"`).
    ///
    /// Requests are signed when credentials are available and sent unsigned otherwise.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: s3compatible
    ///   endpoint: http://localhost:9000
    ///   region: us-east-1
    ///   path_style: true
    /// ```
    S3Compatible {
        /// Base URL of the store.
        endpoint: String,
        /// Region requests are signed for.
        region: String,
        /// Address buckets as the first path segment instead of a subdomain.
        #[serde(default = "default_path_style")]
        path_style: bool,
        /// Credentials used to sign requests.
        #[serde(flatten)]
        credentials: CredentialsConfig,
    },

    /// Process-local storage (type `"memory"`).
    ///
    /// Only useful when all hops of a chain run in the same process.
    Memory,
}

fn default_path_style() -> bool {
    true
}

impl Default for Storage {
    fn default() -> Self {
        Storage::S3Compatible {
            endpoint: "https://s3.us-west-1.amazonaws.com".into(),
            region: "us-west-1".into(),
            path_style: true,
            credentials: CredentialsConfig::default(),
        }
    }
}

/// The work simulated by every hop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Workload {
    /// Spins a no-op loop for `IncrementLimit` iterations (type `"busyspin"`).
    #[default]
    BusySpin,
    /// Spins for `IncrementLimit` times a fixed duration (type `"timed"`).
    Timed {
        /// Spin time per increment.
        #[serde(with = "humantime_serde")]
        per_increment: Duration,
    },
}

/// Sentry error reporting.
///
/// Reporting is enabled only when a DSN is configured.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// The DSN to send events to.
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name attached to all events.
    pub environment: Option<Cow<'static, str>>,

    /// Error event sample rate.
    ///
    /// # Default
    ///
    /// `1.0`
    pub sample_rate: f32,

    /// Transaction sample rate.
    ///
    /// # Default
    ///
    /// `0.0`
    pub traces_sample_rate: f32,

    /// Additional tags attached to all events.
    pub tags: BTreeMap<String, String>,
}

impl Sentry {
    /// Returns whether Sentry reporting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.0,
            tags: BTreeMap::new(),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty printing when attached to a terminal, otherwise simplified.
    Auto,
    /// Multi-line human readable output.
    Pretty,
    /// Compact single-line output.
    Simplified,
    /// Newline-delimited JSON.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level. `RUST_LOG` takes precedence when set.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Output format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Function runtime configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address of the HTTP front end.
    ///
    /// # Default
    ///
    /// `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Address of the gRPC front end.
    ///
    /// # Default
    ///
    /// `0.0.0.0:50051`
    pub grpc_addr: SocketAddr,

    /// How HTTP invocations call the next hop.
    ///
    /// gRPC invocations always call the next hop over gRPC.
    pub relay: Relay,

    /// Lambda settings, used with [`Relay::Lambda`].
    pub lambda: Lambda,

    /// Object storage for payload relaying.
    pub storage: Storage,

    /// Size of the pre-generated buffer payloads are cut from.
    ///
    /// # Default
    ///
    /// 1 MiB
    pub payload_buffer_bytes: usize,

    /// The work simulated by every hop.
    pub workload: Workload,

    /// Upper bound for the number of hops in a chain, including the first.
    ///
    /// # Default
    ///
    /// `32`
    pub max_chain_length: usize,

    /// Deadline for invoking the next hop.
    ///
    /// # Default
    ///
    /// `1m`
    #[serde(with = "humantime_serde")]
    pub next_hop_timeout: Duration,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry error reporting.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            grpc_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            relay: Relay::default(),
            lambda: Lambda::default(),
            storage: Storage::default(),
            payload_buffer_bytes: 1024 * 1024,
            workload: Workload::default(),
            max_chain_length: 32,
            next_hop_timeout: Duration::from_secs(60),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
