//! The data model of a benchmarking run.
//!
//! A [`SubExperiment`] describes one run against a set of already-deployed [`EndpointInfo`]s: how
//! many bursts to send, how large they are, how long to wait between them, and what work the
//! functions should simulate. It is built once from the configuration and only mutated to assign
//! an ID and to [prepare](SubExperiment::prepare) it before the run starts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::iat::{IatError, IatSpec};

/// Errors detected while preparing a sub-experiment, before any traffic is sent.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// The sub-experiment schedules no bursts.
    #[error("sub-experiment {0} has no bursts")]
    NoBursts(usize),

    /// The list of burst sizes is empty.
    #[error("sub-experiment {0} has no burst sizes")]
    NoBurstSizes(usize),

    /// The chain length is zero.
    #[error("sub-experiment {0} has a data transfer chain length of zero")]
    ZeroChainLength(usize),

    /// No endpoints were assigned and the provider is not an external host.
    #[error("sub-experiment {0} has no endpoints assigned for provider {1}")]
    NoEndpoints(usize, Provider),

    /// The IAT parameters cannot produce a valid schedule.
    #[error("sub-experiment {0}: {1}")]
    Iat(usize, #[source] IatError),
}

/// The FaaS provider the endpoints are deployed on.
///
/// Anything that is not a known provider name is treated as an external host that is benchmarked
/// directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    /// AWS Lambda behind API Gateway, requests are SigV4-signed.
    #[default]
    Aws,
    /// Azure Functions, authorized with a code in the URL.
    Azure,
    /// Google Cloud Functions.
    Google,
    /// Google Cloud Run.
    Gcr,
    /// Cloudflare Workers.
    Cloudflare,
    /// Alibaba Function Compute.
    Aliyun,
    /// vHive, invoked over gRPC.
    Vhive,
    /// An external host that is benchmarked as-is.
    External(String),
}

impl Provider {
    /// Returns `true` if requests to this provider use gRPC instead of HTTP.
    pub fn uses_grpc(&self) -> bool {
        matches!(self, Provider::Vhive)
    }

    /// Returns the canonical name of the provider.
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Google => "google",
            Provider::Gcr => "gcr",
            Provider::Cloudflare => "cloudflare",
            Provider::Aliyun => "aliyun",
            Provider::Vhive => "vhive",
            Provider::External(host) => host,
        }
    }
}

impl From<String> for Provider {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "aws" => Provider::Aws,
            "azure" => Provider::Azure,
            "google" => Provider::Google,
            "gcr" => Provider::Gcr,
            "cloudflare" => Provider::Cloudflare,
            "aliyun" => Provider::Aliyun,
            "vhive" => Provider::Vhive,
            _ => Provider::External(name),
        }
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_owned()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the delays between scheduling ticks are generated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum IatType {
    /// A shifted exponential distribution with a minimum of `iat_seconds`.
    #[default]
    Stochastic,
    /// Every delay equals `iat_seconds`.
    Deterministic,
    /// A ramp increasing by one second per tick that plateaus at `iat_seconds`.
    Step,
    /// An unrecognized type. Treated as [`IatType::Stochastic`].
    Unknown(String),
}

impl From<String> for IatType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "" | "stochastic" => IatType::Stochastic,
            "deterministic" => IatType::Deterministic,
            "step" => IatType::Step,
            _ => IatType::Unknown(name),
        }
    }
}

impl From<IatType> for String {
    fn from(iat_type: IatType) -> Self {
        match iat_type {
            IatType::Stochastic => "stochastic".to_owned(),
            IatType::Deterministic => "deterministic".to_owned(),
            IatType::Step => "step".to_owned(),
            IatType::Unknown(name) => name,
        }
    }
}

/// A deployed function plus the downstream functions it chains to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointInfo {
    /// Host, gateway ID or function URL, depending on the provider.
    #[serde(alias = "ID")]
    pub id: String,
    /// Identifiers of the downstream hops, in invocation order.
    #[serde(alias = "DataTransferChainIDs", default)]
    pub data_transfer_chain_ids: Vec<String>,
}

impl EndpointInfo {
    /// Creates an endpoint without downstream hops.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_transfer_chain_ids: Vec::new(),
        }
    }
}

/// One configured benchmarking run.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SubExperiment {
    /// Index of the sub-experiment in the configuration, assigned before the run.
    #[serde(skip)]
    pub id: usize,
    /// Human-readable title, also used for the output directory name.
    #[serde(alias = "Title", default)]
    pub title: String,
    /// Total number of bursts to send across all endpoints.
    #[serde(alias = "Bursts")]
    pub bursts: usize,
    /// Requests per burst, indexed by tick. The last entry repeats once exhausted.
    #[serde(alias = "BurstSizes")]
    pub burst_sizes: Vec<usize>,
    /// Size of the payload generated by the first hop.
    #[serde(alias = "PayloadLengthBytes", default)]
    pub payload_length_bytes: usize,
    /// Nominal delay between ticks.
    #[serde(alias = "IATSeconds")]
    pub iat_seconds: f64,
    /// How delays between ticks are generated.
    #[serde(alias = "IATType", default)]
    pub iat_type: IatType,
    /// First delay of a step ramp. Defaults to `iat_seconds`.
    #[serde(alias = "IATStepStartSeconds", default)]
    pub iat_step_start_seconds: Option<f64>,
    /// Busy-spin increments per tick. The last entry repeats once exhausted.
    #[serde(alias = "BusySpinIncrements", default)]
    pub busy_spin_increments: Vec<u64>,
    /// Number of hops per invocation, including the first one.
    #[serde(alias = "DataTransferChainLength", default = "default_chain_length")]
    pub data_transfer_chain_length: usize,
    /// Whether hops relay the payload via object storage instead of inline.
    #[serde(alias = "StorageTransfer", default)]
    pub storage_transfer: bool,
    /// Deployed endpoints. Bursts are spread across them round-robin.
    #[serde(alias = "Endpoints", default)]
    pub endpoints: Vec<EndpointInfo>,
    /// URL paths per endpoint for providers addressed by bare host names.
    #[serde(alias = "Routes", default)]
    pub routes: Vec<String>,
}

fn default_chain_length() -> usize {
    1
}

impl SubExperiment {
    /// Validates the sub-experiment and fills in derived values.
    ///
    /// In external-host mode, a sub-experiment without endpoints is assigned a single endpoint
    /// whose ID is the host itself. An empty list of busy-spin increments is replaced by `[0]`.
    pub fn prepare(&mut self, provider: &Provider) -> Result<(), ConfigError> {
        if self.bursts == 0 {
            return Err(ConfigError::NoBursts(self.id));
        }
        if self.burst_sizes.is_empty() {
            return Err(ConfigError::NoBurstSizes(self.id));
        }
        if self.data_transfer_chain_length == 0 {
            return Err(ConfigError::ZeroChainLength(self.id));
        }

        self.iat_spec()
            .validate()
            .map_err(|err| ConfigError::Iat(self.id, err))?;

        if self.endpoints.is_empty() {
            match provider {
                Provider::External(host) => self.endpoints.push(EndpointInfo::new(host.clone())),
                _ => return Err(ConfigError::NoEndpoints(self.id, provider.clone())),
            }
        }

        for index in self.chain_length_mismatches() {
            let endpoint = &self.endpoints[index];
            tracing::warn!(
                sub_experiment = self.id,
                endpoint = %endpoint.id,
                hops = endpoint.data_transfer_chain_ids.len() + 1,
                data_transfer_chain_length = self.data_transfer_chain_length,
                "Endpoint chain does not match the data transfer chain length, \
                 data transfer rows will not match the header"
            );
        }

        if self.busy_spin_increments.is_empty() {
            tracing::warn!(
                sub_experiment = self.id,
                "No busy-spin increments configured, functions will not simulate work"
            );
            self.busy_spin_increments.push(0);
        }

        Ok(())
    }

    /// Returns the indexes of endpoints whose hop count differs from `data_transfer_chain_length`.
    pub fn chain_length_mismatches(&self) -> Vec<usize> {
        self.endpoints
            .iter()
            .enumerate()
            .filter(|(_, endpoint)| {
                endpoint.data_transfer_chain_ids.len() + 1 != self.data_transfer_chain_length
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Returns the parameters of the IAT schedule.
    pub fn iat_spec(&self) -> IatSpec {
        IatSpec {
            iat_seconds: self.iat_seconds,
            iat_type: self.iat_type.clone(),
            step_start_seconds: self.iat_step_start_seconds,
        }
    }

    /// Returns the burst size for the given tick, repeating the last entry once exhausted.
    pub fn burst_size(&self, tick: usize) -> usize {
        clamped(&self.burst_sizes, tick)
    }

    /// Returns the busy-spin increment for the given tick, repeating the last entry once exhausted.
    pub fn busy_spin_increment(&self, tick: usize) -> u64 {
        clamped(&self.busy_spin_increments, tick)
    }

    /// Returns the route configured for the endpoint at `index`, if any.
    pub fn route(&self, index: usize) -> Option<&str> {
        self.routes.get(index).map(String::as_str)
    }
}

fn clamped<T: Copy + Default>(values: &[T], index: usize) -> T {
    match values.len() {
        0 => T::default(),
        len => values[index.min(len - 1)],
    }
}
