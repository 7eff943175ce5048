//! AWS Signature Version 4 signing for gateway, Lambda and S3 requests.
//!
//! Credentials are configured through [`CredentialsConfig`], which both binaries embed in their
//! configuration. Secrets are kept in [`ConfigSecret`]s so they never show up in logs.

use std::fmt;
use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    PayloadChecksumKind, SignableBody, SignableRequest, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};

/// Errors that can occur while signing a request.
#[derive(Debug, thiserror::Error)]
#[error("failed to sign request: {0}")]
pub struct SigningError(String);

/// Static AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    /// The access key ID.
    pub access_key_id: String,
    /// The secret access key.
    pub secret_access_key: String,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Newtype around `String` that protects against accidental logging of secrets in the
/// configuration. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl std::ops::Deref for ConfigSecret {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Configured AWS credentials, falling back to the standard AWS environment variables.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Access key ID. Falls back to `AWS_ACCESS_KEY_ID`.
    pub access_key_id: Option<String>,

    /// Secret access key. Falls back to `AWS_SECRET_ACCESS_KEY`.
    pub secret_access_key: Option<SecretBox<ConfigSecret>>,

    /// Session token for temporary credentials. Falls back to `AWS_SESSION_TOKEN`.
    pub session_token: Option<SecretBox<ConfigSecret>>,
}

impl CredentialsConfig {
    /// Resolves the credentials, returning `None` if no access key is available from either the
    /// configuration or the environment.
    pub fn resolve(&self) -> Option<AwsCredentials> {
        let access_key_id = self
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())?;
        let secret_access_key = match &self.secret_access_key {
            Some(secret) => secret.expose_secret().as_str().to_owned(),
            None => std::env::var("AWS_SECRET_ACCESS_KEY").ok()?,
        };
        let session_token = match &self.session_token {
            Some(token) => Some(token.expose_secret().as_str().to_owned()),
            None => std::env::var("AWS_SESSION_TOKEN").ok(),
        };

        Some(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Signs requests for one AWS service in one region.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: AwsCredentials,
    region: String,
    service: &'static str,
    payload_checksum: bool,
}

impl RequestSigner {
    /// Creates a signer for the given service, e.g. `execute-api` or `lambda`.
    pub fn new(credentials: AwsCredentials, region: impl Into<String>, service: &'static str) -> Self {
        Self {
            credentials,
            region: region.into(),
            service,
            payload_checksum: false,
        }
    }

    /// Adds the `x-amz-content-sha256` header to signed requests, as required by S3.
    pub fn with_payload_checksum(mut self) -> Self {
        self.payload_checksum = true;
        self
    }

    /// Computes the headers that need to be added to the request.
    ///
    /// `headers` are the headers that are already part of the request and should be covered by
    /// the signature. The returned list contains `authorization`, `x-amz-date` and, for temporary
    /// credentials, `x-amz-security-token`. Signers created with
    /// [`with_payload_checksum`](Self::with_payload_checksum) also return `x-amz-content-sha256`.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, SigningError> {
        let identity: Identity = Credentials::new(
            self.credentials.access_key_id.clone(),
            self.credentials.secret_access_key.clone(),
            self.credentials.session_token.clone(),
            None,
            "stellar",
        )
        .into();

        let mut settings = SigningSettings::default();
        if self.payload_checksum {
            settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        }

        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(self.service)
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|err| SigningError(err.to_string()))?
            .into();

        let request = SignableRequest::new(
            method,
            url,
            headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(|err| SigningError(err.to_string()))?;

        let (instructions, _signature) = sign(request, &params)
            .map_err(|err| SigningError(err.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect())
    }
}
