use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_apigatewayv2::Client;
use aws_sdk_apigatewayv2::config::{Builder as ApiGatewayConfigBuilder, Credentials, Region};
use aws_sdk_apigatewayv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_apigatewayv2::types::{Cors, DeploymentStatus, ProtocolType};
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{GatewayApi, TARGET_TAG};
use crate::{DeploymentState, ErrorKind, Gateway, Result, Target, types::default_endpoint};

/// Name reported by the static credentials provider
const CREDENTIALS_PROVIDER: &str = "ip-rotator";

/// Page size when listing APIs. The API takes it as a string.
const PAGE_SIZE: &str = "100";

/// Error codes returned when the credentials are rejected
const AUTHENTICATION_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "AccessDeniedException",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "MissingAuthenticationTokenException",
];

const THROTTLING_CODE: &str = "TooManyRequestsException";
const NOT_FOUND_CODE: &str = "NotFoundException";

/// An access key pair, optionally with a session token.
#[derive(Clone, Debug)]
pub struct StaticCredentials {
    /// AWS access key id
    pub access_key_id: String,
    /// AWS secret access key
    pub secret_access_key: SecretString,
    /// Session token for temporary credentials
    pub session_token: Option<SecretString>,
}

impl From<StaticCredentials> for Credentials {
    fn from(value: StaticCredentials) -> Self {
        Credentials::new(
            value.access_key_id,
            value.secret_access_key.expose_secret(),
            value
                .session_token
                .as_ref()
                .map(|token| token.expose_secret().to_string()),
            None,
            CREDENTIALS_PROVIDER,
        )
    }
}

/// [`GatewayApi`] backed by AWS API Gateway (HTTP APIs).
///
/// Every gateway is a quick-created HTTP API whose `$default` route proxies
/// to the target and whose `$default` stage deploys automatically and is
/// served at the root of the invoke URL.
#[derive(Debug)]
pub struct AwsGatewayApi {
    config: SdkConfig,
    clients: Mutex<HashMap<String, Client>>,
}

impl AwsGatewayApi {
    /// Load the AWS configuration.
    ///
    /// With `credentials`, those are used for every call. Without, the
    /// default credential chain applies (environment, profile, instance
    /// metadata).
    pub async fn new(credentials: Option<StaticCredentials>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(credentials) = credentials {
            loader = loader.credentials_provider(Credentials::from(credentials));
        }
        Self::from_config(loader.load().await)
    }

    /// Use an already loaded AWS configuration. The region of `config` is
    /// ignored; every call names its region explicitly.
    #[must_use]
    pub fn from_config(config: SdkConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self, region: &str) -> Client {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(region.to_string())
            .or_insert_with(|| {
                let config = ApiGatewayConfigBuilder::from(&self.config)
                    .region(Region::new(region.to_string()))
                    .build();
                Client::from_conf(config)
            })
            .clone()
    }
}

/// How a failed SDK call should be treated
enum Failure {
    Authentication(String),
    Throttled,
    NotFound,
    Other(String),
}

fn classify<E, R>(err: &SdkError<E, R>) -> Failure
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let reason = || {
        err.message()
            .map_or_else(|| DisplayErrorContext(err).to_string(), ToString::to_string)
    };
    match err.code() {
        Some(code) if AUTHENTICATION_CODES.contains(&code) => Failure::Authentication(reason()),
        Some(THROTTLING_CODE) => Failure::Throttled,
        Some(NOT_FOUND_CODE) => Failure::NotFound,
        _ => Failure::Other(reason()),
    }
}

/// Map failures that are not specific to the call onto [`ErrorKind`]
fn common_error(
    region: &str,
    failure: Failure,
    other: impl FnOnce(String) -> ErrorKind,
) -> ErrorKind {
    match failure {
        Failure::Authentication(reason) => ErrorKind::Authentication {
            region: region.to_string(),
            reason,
        },
        Failure::Throttled => ErrorKind::Throttled {
            region: region.to_string(),
        },
        Failure::NotFound => other("not found".to_string()),
        Failure::Other(reason) => other(reason),
    }
}

fn parse_endpoint(region: &str, id: &str, raw: Option<&str>) -> Result<Url> {
    match raw {
        Some(raw) => Url::parse(raw).map_err(|e| ErrorKind::InvalidUrl(raw.to_string(), e)),
        None => default_endpoint(region, id),
    }
}

#[async_trait]
impl GatewayApi for AwsGatewayApi {
    async fn create(&self, region: &str, name: &str, target: &Target) -> Result<Gateway> {
        let create_error = |reason| ErrorKind::CreateGateway {
            region: region.to_string(),
            reason,
        };

        let output = self
            .client(region)
            .create_api()
            .name(name)
            .protocol_type(ProtocolType::Http)
            .target(target.origin())
            .cors_configuration(
                Cors::builder()
                    .allow_origins("*")
                    .allow_methods("*")
                    .allow_headers("*")
                    .build(),
            )
            .tags(TARGET_TAG, target.origin())
            .send()
            .await
            .map_err(|e| common_error(region, classify(&e), create_error))?;

        let id = output
            .api_id()
            .ok_or_else(|| create_error("response is missing the API id".to_string()))?;
        let endpoint = parse_endpoint(region, id, output.api_endpoint())?;
        debug!("Created API `{id}` in `{region}` at {endpoint}");
        Ok(Gateway::new(region, id, endpoint))
    }

    async fn deployment_state(&self, gateway: &Gateway) -> Result<DeploymentState> {
        let output = self
            .client(&gateway.region)
            .get_deployments()
            .api_id(&gateway.id)
            .send()
            .await
            .map_err(|e| {
                common_error(&gateway.region, classify(&e), |reason| {
                    ErrorKind::Deployment {
                        region: gateway.region.clone(),
                        id: gateway.id.clone(),
                        reason,
                    }
                })
            })?;

        let mut state = DeploymentState::Pending;
        for deployment in output.items() {
            match deployment.deployment_status() {
                Some(DeploymentStatus::Deployed) => return Ok(DeploymentState::Deployed),
                Some(DeploymentStatus::Failed) => {
                    state = DeploymentState::Failed(
                        deployment
                            .deployment_status_message()
                            .unwrap_or("deployment failed")
                            .to_string(),
                    );
                }
                _ => {}
            }
        }
        Ok(state)
    }

    async fn list(&self, region: &str, name: &str) -> Result<Vec<Gateway>> {
        let client = self.client(region);
        let mut gateways = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = client
                .get_apis()
                .max_results(PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    common_error(region, classify(&e), |reason| ErrorKind::ListGateways {
                        region: region.to_string(),
                        reason,
                    })
                })?;

            for api in output.items() {
                if api.name() != Some(name) {
                    continue;
                }
                let Some(id) = api.api_id() else {
                    continue;
                };
                let endpoint = parse_endpoint(region, id, api.api_endpoint())?;
                gateways.push(Gateway::new(region, id, endpoint));
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(gateways)
    }

    async fn delete(&self, gateway: &Gateway) -> Result<()> {
        let result = self
            .client(&gateway.region)
            .delete_api()
            .api_id(&gateway.id)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(match classify(&e) {
                Failure::NotFound => ErrorKind::GatewayNotFound {
                    region: gateway.region.clone(),
                    id: gateway.id.clone(),
                },
                failure => common_error(&gateway.region, failure, |reason| {
                    ErrorKind::DeleteGateway {
                        region: gateway.region.clone(),
                        id: gateway.id.clone(),
                        reason,
                    }
                }),
            }),
        }
    }
}
