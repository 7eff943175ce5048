//! Configuration for the benchmarking harness.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `STELLAR__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested structures, for example
//! `STELLAR__AWS__REGION=eu-central-1` or `STELLAR__LOGGING__FORMAT=json`.
//!
//! Sub-experiments are usually written in the YAML file. Since JSON is valid YAML, experiment
//! files written with the PascalCase field names of earlier harness versions load unchanged:
//!
//! ```yaml
//! provider: aws
//! output_dir: latency-samples
//! sub_experiments:
//!   - title: warm
//!     bursts: 100
//!     burst_sizes: [1]
//!     iat_seconds: 10
//!     iat_type: deterministic
//!     endpoints:
//!       - id: abc123
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::SecretBox;
use serde::{Deserialize, Serialize};
use stellar_api::signing::{ConfigSecret, CredentialsConfig};
use tracing::level_filters::LevelFilter;

use crate::experiment::{Provider, SubExperiment};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "STELLAR__";

/// AWS settings used to sign API Gateway requests.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Aws {
    /// Region the API gateways are deployed in.
    ///
    /// # Default
    ///
    /// `us-west-1`
    pub region: String,

    /// Credentials used to sign gateway requests.
    #[serde(flatten)]
    pub credentials: CredentialsConfig,
}

impl Default for Aws {
    fn default() -> Self {
        Self {
            region: "us-west-1".into(),
            credentials: CredentialsConfig::default(),
        }
    }
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
    ///
    /// # Default
    ///
    /// `info`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Output format.
    ///
    /// # Default
    ///
    /// `auto`
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

/// Harness configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The provider all endpoints are deployed on, or an external host to benchmark directly.
    ///
    /// # Default
    ///
    /// `aws`
    pub provider: Provider,

    /// Run sub-experiments one after another instead of concurrently.
    ///
    /// # Default
    ///
    /// `true`
    pub sequential: bool,

    /// Directory in which one result directory per sub-experiment is created.
    ///
    /// # Default
    ///
    /// `latency-samples`
    pub output_dir: PathBuf,

    /// AWS region and credentials for signed gateway requests.
    pub aws: Aws,

    /// Bucket forwarded to HTTP functions when storage transfer is enabled.
    pub storage_bucket: String,

    /// Bucket forwarded to gRPC functions when storage transfer is enabled.
    ///
    /// # Default
    ///
    /// `mybucket`
    pub grpc_bucket: String,

    /// Deadline for a single HTTP request.
    ///
    /// # Default
    ///
    /// `15m`
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    /// Deadline for a single gRPC call.
    ///
    /// # Default
    ///
    /// `3m`
    #[serde(with = "humantime_serde")]
    pub grpc_timeout: Duration,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry error reporting.
    pub sentry: Sentry,

    /// The sub-experiments to run.
    pub sub_experiments: Vec<SubExperiment>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Aws,
            sequential: true,
            output_dir: PathBuf::from("latency-samples"),
            aws: Aws::default(),
            storage_bucket: String::new(),
            grpc_bucket: "mybucket".into(),
            http_timeout: Duration::from_secs(15 * 60),
            grpc_timeout: Duration::from_secs(3 * 60),
            logging: Logging::default(),
            sentry: Sentry::default(),
            sub_experiments: Vec::new(),
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
