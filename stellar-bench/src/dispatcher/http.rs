use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url, redirect};
use stellar_api::signing::RequestSigner;
use stellar_api::{ProducerConsumerResponse, params, wire};

use super::{Dispatch, Invocation, InvocationParams, TransportError};
use crate::config::Config;
use crate::experiment::Provider;

/// AWS service name of API Gateway for request signing.
const EXECUTE_API: &str = "execute-api";

/// Invokes functions over HTTP, following the URL conventions of each provider.
#[derive(Debug)]
pub struct HttpDispatcher {
    client: Client,
    provider: Provider,
    region: String,
    signer: Option<RequestSigner>,
    storage_bucket: String,
}

impl HttpDispatcher {
    /// Creates a dispatcher for the given provider.
    ///
    /// Requests are signed when a `signer` is given.
    pub fn new(
        provider: Provider,
        region: impl Into<String>,
        signer: Option<RequestSigner>,
        storage_bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        // A redirect is a non-200 answer and fails the request.
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            provider,
            region: region.into(),
            signer,
            storage_bucket: storage_bucket.into(),
        })
    }

    /// Creates the dispatcher for the configured provider.
    ///
    /// AWS requires credentials, either configured explicitly or from the environment.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let signer = match config.provider {
            Provider::Aws => {
                let credentials = config.aws.credentials.resolve().ok_or_else(|| {
                    anyhow::anyhow!("AWS credentials are required to sign gateway requests")
                })?;
                Some(RequestSigner::new(
                    credentials,
                    config.aws.region.clone(),
                    EXECUTE_API,
                ))
            }
            _ => None,
        };

        let dispatcher = Self::new(
            config.provider.clone(),
            config.aws.region.clone(),
            signer,
            config.storage_bucket.clone(),
            config.http_timeout,
        )?;

        Ok(dispatcher)
    }

    fn request_url(&self, params: &InvocationParams) -> Result<Url, TransportError> {
        let mut url = endpoint_url(
            &self.provider,
            &self.region,
            &params.endpoint.id,
            params.route.as_deref(),
        )?;

        // Azure authorizes with a code in the query, which goes after the common parameters.
        let code = match self.provider {
            Provider::Azure => url
                .query_pairs()
                .find(|(name, _)| name == params::AZURE_CODE)
                .map(|(_, value)| value.into_owned()),
            _ => None,
        };
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(params::INCREMENT_LIMIT, &params.increment_limit.to_string())
                .append_pair(
                    params::PAYLOAD_LENGTH_BYTES,
                    &params.payload_length_bytes.to_string(),
                )
                .append_pair(
                    params::DATA_TRANSFER_CHAIN_IDS,
                    &wire::encode_list(&params.endpoint.data_transfer_chain_ids),
                );

            if let Some(code) = &code {
                query.append_pair(params::AZURE_CODE, code);
            }

            if params.storage_transfer {
                query
                    .append_pair(params::BUCKET, &self.storage_bucket)
                    .append_pair(params::STORAGE_TRANSFER, "true");
            }
        }

        Ok(url)
    }
}

/// Builds the base URL of an endpoint, without query parameters.
///
/// - aws: `https://<id>.execute-api.<region>.amazonaws.com/prod/benchmarking`
/// - azure, google: `https://<id>`
/// - all others: `https://<id><route>`, where the route defaults to `/`
///
/// IDs that already carry a scheme are used verbatim.
pub fn endpoint_url(
    provider: &Provider,
    region: &str,
    id: &str,
    route: Option<&str>,
) -> Result<Url, TransportError> {
    let raw = if id.contains("://") {
        id.to_owned()
    } else {
        match provider {
            Provider::Aws => {
                format!("https://{id}.execute-api.{region}.amazonaws.com/prod/benchmarking")
            }
            Provider::Azure | Provider::Google => format!("https://{id}"),
            _ => {
                let route = route.filter(|route| !route.is_empty()).unwrap_or("/");
                let separator = if route.starts_with('/') { "" } else { "/" };
                format!("https://{id}{separator}{route}")
            }
        }
    };

    Url::parse(&raw).map_err(|_| TransportError::InvalidUrl(raw))
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn invoke(&self, params: &InvocationParams) -> Result<Invocation, TransportError> {
        let url = self.request_url(params)?;
        let host = url.host_str().unwrap_or_default().to_owned();

        let mut request = self.client.get(url.clone());
        if let Some(signer) = &self.signer {
            for (name, value) in signer.sign("GET", url.as_str(), &[], &[])? {
                request = request.header(name, value);
            }
        }

        tracing::debug!(%url, "Sending request");

        let sent_at = Utc::now();
        let response = request.send().await?;
        // `send` resolves once the response head is in, before the body is read.
        let received_at = Utc::now();

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%host, %status, %body, "Function responded with an error");
            return Err(TransportError::Status(status));
        }

        let body = response.bytes().await?;
        let response = match serde_json::from_slice::<ProducerConsumerResponse>(&body) {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    %host,
                    error = &error as &dyn std::error::Error,
                    "Could not parse function response"
                );
                ProducerConsumerResponse::default()
            }
        };

        Ok(Invocation {
            request_id: response.request_id,
            host,
            sent_at,
            received_at,
            timestamp_chain: response.timestamp_chain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::EndpointInfo;

    fn params(id: &str) -> InvocationParams {
        InvocationParams {
            endpoint: EndpointInfo {
                id: id.into(),
                data_transfer_chain_ids: vec!["hop-1".into(), "hop-2".into()],
            },
            route: None,
            increment_limit: 500,
            payload_length_bytes: 1024,
            storage_transfer: false,
        }
    }

    fn dispatcher(provider: Provider) -> HttpDispatcher {
        HttpDispatcher::new(provider, "us-west-1", None, "bucket", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn aws_gateway_url() {
        let url = dispatcher(Provider::Aws).request_url(&params("abc123")).unwrap();

        assert_eq!(
            url.as_str(),
            "https://abc123.execute-api.us-west-1.amazonaws.com/prod/benchmarking\
             ?IncrementLimit=500&PayloadLengthBytes=1024&DataTransferChainIDs=%5Bhop-1+hop-2%5D"
        );
    }

    #[test]
    fn azure_code_goes_last() {
        let url = dispatcher(Provider::Azure)
            .request_url(&params("bench.azurewebsites.net/api/hop?code=a%2Fb%3D%3D"))
            .unwrap();

        assert_eq!(url.host_str(), Some("bench.azurewebsites.net"));
        assert_eq!(url.path(), "/api/hop");

        let names: Vec<_> = url.query_pairs().map(|(name, _)| name.into_owned()).collect();
        assert_eq!(
            names,
            [
                "IncrementLimit",
                "PayloadLengthBytes",
                "DataTransferChainIDs",
                "code"
            ]
        );

        let code = url.query_pairs().find(|(name, _)| name == "code").unwrap().1;
        assert_eq!(code, "a/b==");
    }

    #[test]
    fn google_keeps_path() {
        let url = dispatcher(Provider::Google)
            .request_url(&params("us-west2-project.cloudfunctions.net/hop-1"))
            .unwrap();

        assert_eq!(url.host_str(), Some("us-west2-project.cloudfunctions.net"));
        assert_eq!(url.path(), "/hop-1");
    }

    #[test]
    fn routes_apply_to_bare_hosts() {
        let mut with_route = params("hop.example.run.app");
        with_route.route = Some("producer".into());

        let url = dispatcher(Provider::Gcr).request_url(&with_route).unwrap();
        assert_eq!(url.path(), "/producer");

        let url = dispatcher(Provider::Cloudflare)
            .request_url(&params("worker.example.dev"))
            .unwrap();
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn scheme_bearing_ids_are_verbatim() {
        let url = dispatcher(Provider::External("localhost".into()))
            .request_url(&params("http://127.0.0.1:8080/bench"))
            .unwrap();

        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), "/bench");
    }

    #[test]
    fn storage_transfer_adds_bucket() {
        let mut storage = params("abc");
        storage.storage_transfer = true;

        let url = dispatcher(Provider::Aws).request_url(&storage).unwrap();
        assert!(
            url.query()
                .unwrap()
                .ends_with("&Bucket=bucket&StorageTransfer=true")
        );
    }

    #[test]
    fn rejects_invalid_ids() {
        assert!(matches!(
            endpoint_url(&Provider::Google, "us-west-1", "bad host", None),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn aws_requires_credentials() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();

            let config = Config::default();
            assert!(HttpDispatcher::from_config(&config).is_err());

            let mut config = Config::default();
            config.aws.credentials.access_key_id = Some("AKID".into());
            config.aws.credentials.secret_access_key =
                Some(secrecy::SecretBox::new(Box::new("secret".into())));
            assert!(HttpDispatcher::from_config(&config).is_ok());

            Ok(())
        });
    }
}
