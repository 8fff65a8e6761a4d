use std::{future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::{FutureExt, future::join_all};
use http::header::{self, HeaderMap, HeaderValue};
use log::{debug, info, warn};
use reqwest::redirect;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};
use tokio::time::sleep;
use typed_builder::TypedBuilder;

use crate::{
    DEFAULT_REGIONS, Deployment, DeploymentState, ErrorKind, Gateway, Result, Selection,
    Session, Target,
    cloud::{AwsGatewayApi, GatewayApi, StaticCredentials, gateway_name},
    deployment::Cleanup,
    normalize_regions,
};

/// Default wait between two deployment checks, 1 second.
pub const DEFAULT_DEPLOY_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default number of deployment checks before a gateway is given up on, 30.
pub const DEFAULT_DEPLOY_POLL_ATTEMPTS: u32 = 30;
/// Default wait after the cloud API throttled a deletion, 5 seconds.
pub const DEFAULT_THROTTLE_WAIT: Duration = Duration::from_secs(5);
/// Default number of attempts to delete a gateway while throttled, 10.
pub const DEFAULT_THROTTLE_ATTEMPTS: u32 = 10;
/// Default number of redirects to other origins before a request fails, 10.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
/// Default user agent, `ip-rotator/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("ip-rotator/", env!("CARGO_PKG_VERSION"));

/// What to do when some regions cannot be provisioned.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionPolicy {
    /// Remove the gateways that were created and fail
    #[default]
    AllOrNothing,
    /// Continue with the regions that worked, fail only if none did
    BestEffort,
}

/// Retry settings for deletions the cloud API throttled
#[derive(Clone, Copy, Debug)]
pub(crate) struct ThrottleRetry {
    pub(crate) wait: Duration,
    pub(crate) attempts: u32,
}

/// Builder for [`Rotator`].
///
/// Only the target is required:
///
/// ```no_run
/// use ip_rotator_lib::{RotatorBuilder, Result, Target};
///
/// # async fn run() -> Result<()> {
/// let rotator = RotatorBuilder::builder()
///     .target(Target::try_from("https://ipinfo.io")?)
///     .regions(vec!["eu-west-1".to_string(), "us-east-1".to_string()])
///     .build()
///     .rotator()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `RotatorBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `RotatorBuilder`.
"))]
pub struct RotatorBuilder {
    /// Origin the gateways forward to.
    target: Target,
    /// Regions to deploy a gateway to, one gateway per region.
    ///
    /// Duplicates are ignored. An empty list means [`DEFAULT_REGIONS`].
    #[builder(default_code = "DEFAULT_REGIONS.iter().map(ToString::to_string).collect()")]
    regions: Vec<String>,
    /// Credentials for the cloud API.
    ///
    /// Without, the SDK's default credential chain is used.
    #[builder(default)]
    credentials: Option<StaticCredentials>,
    /// How to deal with regions that fail to provision.
    #[builder(default)]
    policy: ProvisionPolicy,
    /// How requests are spread over the gateways.
    #[builder(default)]
    selection: Selection,
    /// Wait between two checks whether a new gateway is deployed.
    #[builder(default = DEFAULT_DEPLOY_POLL_INTERVAL)]
    deploy_poll_interval: Duration,
    /// Number of checks before a pending deployment counts as failed.
    #[builder(default = DEFAULT_DEPLOY_POLL_ATTEMPTS)]
    deploy_poll_attempts: u32,
    /// Wait after a throttled deletion.
    #[builder(default = DEFAULT_THROTTLE_WAIT)]
    throttle_wait: Duration,
    /// Attempts to delete a gateway while the API throttles.
    #[builder(default = DEFAULT_THROTTLE_ATTEMPTS)]
    throttle_attempts: u32,
    /// Cloud backend to use instead of AWS, e.g. an
    /// [`InMemoryGatewayApi`](crate::InMemoryGatewayApi).
    #[builder(default)]
    api: Option<Arc<dyn GatewayApi>>,
    /// Client sending the requests; built from `user_agent` and `timeout`
    /// if not given.
    #[builder(default)]
    http_client: Option<reqwest::Client>,
    /// User agent of the built client.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,
    /// Response timeout per request of the built client.
    #[builder(default)]
    timeout: Option<Duration>,
}

impl RotatorBuilder {
    /// Instantiates a [`Rotator`].
    ///
    /// Nothing is created in the cloud yet; see [`Rotator::start`] and
    /// [`Rotator::scope`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user agent is not a valid header value.
    /// - The request client cannot be created.
    pub async fn rotator(self) -> Result<Rotator> {
        let Self {
            target,
            regions,
            credentials,
            user_agent,
            timeout,
            ..
        } = self;

        let client = match self.http_client {
            Some(client) => client,
            None => {
                let mut headers = HeaderMap::new();
                headers.insert(header::USER_AGENT, HeaderValue::from_str(&user_agent)?);
                let builder = reqwest::ClientBuilder::new()
                    .gzip(true)
                    .default_headers(headers)
                    .redirect(redirect_policy(target.clone()));
                (match timeout {
                    Some(t) => builder.timeout(t),
                    None => builder,
                })
                .build()
                .map_err(ErrorKind::BuildRequestClient)?
            }
        };

        let api: Arc<dyn GatewayApi> = match self.api {
            Some(api) => api,
            None => Arc::new(AwsGatewayApi::new(credentials).await),
        };

        Ok(Rotator {
            name: gateway_name(&target),
            target,
            regions: normalize_regions(&regions),
            api,
            client,
            policy: self.policy,
            selection: self.selection,
            deploy_poll_interval: self.deploy_poll_interval,
            deploy_poll_attempts: self.deploy_poll_attempts.max(1),
            retry: ThrottleRetry {
                wait: self.throttle_wait,
                attempts: self.throttle_attempts.max(1),
            },
        })
    }
}

/// Follow redirects, except onto the target.
///
/// The middleware only sees the first hop of a request. Following a
/// redirect to the target would contact it directly, so the redirect
/// response is returned instead and can be re-sent through the session.
fn redirect_policy(target: Target) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if target.matches(attempt.url()) {
            debug!("Not following redirect to {} outside the gateways", attempt.url());
            attempt.stop()
        } else if attempt.previous().len() > DEFAULT_MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

/// Creates and removes the gateways of one target.
///
/// Gateways only exist between [`Rotator::start`] and
/// [`Deployment::shutdown`], or for the duration of [`Rotator::scope`].
#[derive(Debug, Clone)]
pub struct Rotator {
    target: Target,
    name: String,
    regions: Vec<String>,
    api: Arc<dyn GatewayApi>,
    client: reqwest::Client,
    policy: ProvisionPolicy,
    selection: Selection,
    deploy_poll_interval: Duration,
    deploy_poll_attempts: u32,
    retry: ThrottleRetry,
}

impl Rotator {
    /// The origin the gateways forward to
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Regions a gateway is deployed to
    #[must_use]
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Name shared by all gateways of the target
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deploy one gateway per region and return a session using them.
    ///
    /// The returned [`Deployment`] must be shut down to remove the gateways
    /// again. Prefer [`Rotator::scope`], which does that on every exit path.
    ///
    /// # Errors
    ///
    /// Fails according to the [`ProvisionPolicy`]. Rejected credentials
    /// always fail, whatever the policy.
    pub async fn start(&self) -> Result<Deployment> {
        let gateways = self.provision().await?;
        info!(
            "Deployed {} gateway(s) for {}",
            gateways.len(),
            self.target
        );
        let session = Session::new(
            self.client.clone(),
            self.target.clone(),
            gateways,
            self.selection,
        );
        Ok(Deployment::new(
            session,
            Cleanup {
                api: Arc::clone(&self.api),
                retry: self.retry,
            },
        ))
    }

    /// Deploy the gateways, run `f` with a session using them and remove
    /// the gateways again.
    ///
    /// The gateways are removed whether `f` returns successfully, returns
    /// an error or panics; a panic is resumed after the teardown.
    ///
    /// # Errors
    ///
    /// Returns the error of `f` if it failed. Otherwise fails if the
    /// gateways could not be deployed or removed.
    pub async fn scope<F, Fut, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ErrorKind>,
    {
        let deployment = self.start().await?;
        let session = deployment.session().clone();
        let outcome = AssertUnwindSafe(async move { f(session).await })
            .catch_unwind()
            .await;
        let teardown = deployment.shutdown().await;

        match outcome {
            Err(panic) => {
                if let Err(e) = teardown {
                    warn!("Failed to remove gateways after panic: {e}");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(e)) => {
                if let Err(teardown) = teardown {
                    warn!("Failed to remove gateways: {teardown}");
                }
                Err(e)
            }
            Ok(Ok(value)) => {
                teardown?;
                Ok(value)
            }
        }
    }

    /// Remove gateways of the target left behind by earlier runs.
    ///
    /// Regions are swept one after the other to stay clear of throttling.
    /// Returns the number of gateways removed.
    ///
    /// # Errors
    ///
    /// Fails on the first region that cannot be listed or gateway that
    /// cannot be deleted.
    pub async fn clear_existing(&self) -> Result<usize> {
        let mut removed = 0;
        for region in &self.regions {
            let gateways = self.api.list(region, &self.name).await?;
            if gateways.is_empty() {
                debug!("No leftover gateways in `{region}`");
                continue;
            }
            info!("Removing {} leftover gateway(s) in `{region}`", gateways.len());
            for gateway in &gateways {
                delete_gateway(self.api.as_ref(), gateway, self.retry).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// All existing gateways of the target in the configured regions.
    ///
    /// # Errors
    ///
    /// Fails on the first region that cannot be listed.
    pub async fn list_existing(&self) -> Result<Vec<Gateway>> {
        let mut gateways = Vec::new();
        for region in &self.regions {
            gateways.extend(self.api.list(region, &self.name).await?);
        }
        Ok(gateways)
    }

    async fn provision(&self) -> Result<Vec<Gateway>> {
        let results = join_all(
            self.regions
                .iter()
                .map(|region| self.provision_region(region)),
        )
        .await;

        let mut gateways = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(gateway) => gateways.push(gateway),
                Err(e) => errors.push(e),
            }
        }

        let fatal = errors.iter().position(ErrorKind::is_fatal);
        let abort = fatal.is_some()
            || gateways.is_empty()
            || (self.policy == ProvisionPolicy::AllOrNothing && !errors.is_empty());

        if !abort {
            for e in &errors {
                warn!("Skipping region: {e}");
            }
            return Ok(gateways);
        }

        let error = match fatal {
            Some(index) => errors.swap_remove(index),
            None if errors.is_empty() => ErrorKind::NoGateways,
            None => errors.swap_remove(0),
        };
        if !gateways.is_empty() {
            warn!(
                "Removing {} gateway(s) after failed provisioning: {error}",
                gateways.len()
            );
            if let Err(e) = delete_all(self.api.as_ref(), &gateways, self.retry).await {
                warn!("Rollback incomplete, sweep the target to clean up: {e}");
            }
        }
        Err(error)
    }

    async fn provision_region(&self, region: &str) -> Result<Gateway> {
        info!("Creating gateway for {} in `{region}`", self.target);
        let gateway = self.api.create(region, &self.name, &self.target).await?;

        if let Err(e) = self.await_deployment(&gateway).await {
            if let Err(delete) = delete_gateway(self.api.as_ref(), &gateway, self.retry).await {
                warn!("Cannot remove undeployed gateway {gateway}: {delete}");
            }
            return Err(e);
        }
        debug!("Gateway {gateway} is deployed");
        Ok(gateway)
    }

    async fn await_deployment(&self, gateway: &Gateway) -> Result<()> {
        for attempt in 1..=self.deploy_poll_attempts {
            match self.api.deployment_state(gateway).await? {
                DeploymentState::Deployed => return Ok(()),
                DeploymentState::Failed(reason) => {
                    return Err(ErrorKind::Deployment {
                        region: gateway.region.clone(),
                        id: gateway.id.clone(),
                        reason,
                    });
                }
                DeploymentState::Pending if attempt < self.deploy_poll_attempts => {
                    sleep(self.deploy_poll_interval).await;
                }
                DeploymentState::Pending => {}
            }
        }
        Err(ErrorKind::Deployment {
            region: gateway.region.clone(),
            id: gateway.id.clone(),
            reason: format!(
                "still pending after {} checks",
                self.deploy_poll_attempts
            ),
        })
    }
}

/// Delete `gateway`, waiting out throttling.
///
/// A gateway that no longer exists counts as deleted.
pub(crate) async fn delete_gateway(
    api: &dyn GatewayApi,
    gateway: &Gateway,
    retry: ThrottleRetry,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match api.delete(gateway).await {
            Ok(()) => {
                info!("Deleted gateway {gateway}");
                return Ok(());
            }
            Err(ErrorKind::GatewayNotFound { .. }) => {
                debug!("Gateway {gateway} is already gone");
                return Ok(());
            }
            Err(ErrorKind::Throttled { .. }) if attempt < retry.attempts => {
                debug!(
                    "Deleting {gateway} was throttled, retrying in {:?} ({attempt}/{})",
                    retry.wait, retry.attempts
                );
                sleep(retry.wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delete all `gateways` concurrently.
///
/// Every deletion is attempted; the first failure is returned afterwards.
pub(crate) async fn delete_all(
    api: &dyn GatewayApi,
    gateways: &[Gateway],
    retry: ThrottleRetry,
) -> Result<()> {
    let results = join_all(
        gateways
            .iter()
            .map(|gateway| delete_gateway(api, gateway, retry)),
    )
    .await;

    let mut first = None;
    for result in results {
        if let Err(e) = result {
            warn!("{e}");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use test_utils::mock_gateway;

    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    use super::*;
    use crate::{InMemoryGatewayApi, rewrite::OVERRIDE_HEADER};

    type BoxError = Box<dyn std::error::Error + Send + Sync>;

    const REGIONS: &[&str] = &["eu-west-1", "us-east-1", "ap-south-1"];

    fn target() -> Target {
        Target::try_from("https://ipinfo.io").unwrap()
    }

    async fn rotator(api: &Arc<InMemoryGatewayApi>, policy: ProvisionPolicy) -> Rotator {
        let api: Arc<dyn GatewayApi> = Arc::clone(api) as Arc<dyn GatewayApi>;
        RotatorBuilder::builder()
            .target(target())
            .regions(REGIONS.iter().map(ToString::to_string).collect::<Vec<_>>())
            .policy(policy)
            .api(Some(api))
            .deploy_poll_interval(Duration::from_millis(1))
            .deploy_poll_attempts(5u32)
            .throttle_wait(Duration::from_millis(1))
            .build()
            .rotator()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_gateway_per_region() {
        let api = Arc::new(InMemoryGatewayApi::new());
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;

        let deployment = rotator.start().await.unwrap();
        let regions: HashSet<&str> = deployment
            .gateways()
            .iter()
            .map(|gateway| gateway.region.as_str())
            .collect();
        assert_eq!(deployment.gateways().len(), REGIONS.len());
        assert_eq!(regions, REGIONS.iter().copied().collect());

        deployment.shutdown().await.unwrap();
        assert!(rotator.list_existing().await.unwrap().is_empty());
        assert_eq!(api.deleted(), REGIONS.len());
    }

    #[tokio::test]
    async fn test_clear_existing_is_idempotent() {
        let api = Arc::new(InMemoryGatewayApi::new());
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;
        api.insert("eu-west-1", rotator.name()).unwrap();
        api.insert("us-east-1", rotator.name()).unwrap();
        api.insert("us-east-1", "some-other-api").unwrap();
        // Not one of the configured regions
        api.insert("sa-east-1", rotator.name()).unwrap();

        assert_eq!(rotator.list_existing().await.unwrap().len(), 2);
        assert_eq!(rotator.clear_existing().await.unwrap(), 2);
        assert_eq!(rotator.clear_existing().await.unwrap(), 0);
        assert_eq!(api.gateways().len(), 2);
    }

    #[tokio::test]
    async fn test_all_or_nothing_rolls_back() {
        let api = Arc::new(InMemoryGatewayApi::new());
        api.fail_region("us-east-1");
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;

        let err = rotator.start().await.unwrap_err();
        assert_eq!(err.region(), Some("us-east-1"));
        assert!(matches!(err, ErrorKind::CreateGateway { .. }));
        assert!(api.gateways().is_empty());
        assert_eq!(api.created(), REGIONS.len() - 1);
    }

    #[tokio::test]
    async fn test_best_effort_skips_failed_region() {
        let api = Arc::new(InMemoryGatewayApi::new());
        api.fail_region("us-east-1");
        let rotator = rotator(&api, ProvisionPolicy::BestEffort).await;

        let deployment = rotator.start().await.unwrap();
        assert_eq!(deployment.gateways().len(), REGIONS.len() - 1);
        assert!(
            deployment
                .gateways()
                .iter()
                .all(|gateway| gateway.region != "us-east-1")
        );
        deployment.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_best_effort_fails_without_any_gateway() {
        let api = Arc::new(InMemoryGatewayApi::new());
        for region in REGIONS {
            api.fail_region(*region);
        }
        let rotator = rotator(&api, ProvisionPolicy::BestEffort).await;
        assert!(matches!(
            rotator.start().await,
            Err(ErrorKind::CreateGateway { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_deployment_is_removed() {
        let api = Arc::new(InMemoryGatewayApi::new());
        api.fail_deployments("ap-south-1");
        let rotator = rotator(&api, ProvisionPolicy::BestEffort).await;

        let deployment = rotator.start().await.unwrap();
        assert_eq!(deployment.gateways().len(), REGIONS.len() - 1);
        // The undeployed gateway is gone right away
        assert_eq!(api.gateways().len(), REGIONS.len() - 1);
        deployment.shutdown().await.unwrap();
        assert!(api.gateways().is_empty());
    }

    #[tokio::test]
    async fn test_pending_deployment() {
        let api = Arc::new(InMemoryGatewayApi::new());
        api.pending_polls(3);
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;
        let deployment = rotator.start().await.unwrap();
        assert_eq!(deployment.gateways().len(), REGIONS.len());
        deployment.shutdown().await.unwrap();

        // More pending answers than checks
        api.pending_polls(10);
        let err = rotator.start().await.unwrap_err();
        assert!(matches!(err, ErrorKind::Deployment { .. }));
        assert!(api.gateways().is_empty());
    }

    #[tokio::test]
    async fn test_throttled_deletes_are_retried() {
        let api = Arc::new(InMemoryGatewayApi::new());
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;
        let deployment = rotator.start().await.unwrap();

        api.throttle_deletes(3);
        deployment.shutdown().await.unwrap();
        assert!(api.gateways().is_empty());
    }

    #[tokio::test]
    async fn test_throttling_gives_up() {
        let api = Arc::new(InMemoryGatewayApi::new());
        api.insert("eu-west-1", "leftover").unwrap();
        api.throttle_deletes(100);
        let retry = ThrottleRetry {
            wait: Duration::from_millis(1),
            attempts: 3,
        };

        let gateways = api.gateways();
        let err = delete_all(&*api, &gateways, retry).await.unwrap_err();
        assert_eq!(
            err,
            ErrorKind::Throttled {
                region: "eu-west-1".to_string()
            }
        );
        assert_eq!(api.gateways().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_gateway_counts_as_deleted() {
        let api = InMemoryGatewayApi::new();
        let retry = ThrottleRetry {
            wait: Duration::from_millis(1),
            attempts: 1,
        };
        let gone = Gateway::from_id("eu-west-1", "gone").unwrap();
        assert_eq!(delete_gateway(&api, &gone, retry).await, Ok(()));
    }

    #[tokio::test]
    async fn test_scope_routes_and_tears_down() {
        let server = mock_gateway!("ipinfo.io", REGIONS.len() as u64);
        let api = Arc::new(InMemoryGatewayApi::with_endpoint(
            url::Url::parse(&server.uri()).unwrap(),
        ));
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;

        let statuses = rotator
            .scope(|session| async move {
                let mut statuses = Vec::new();
                for _ in 0..session.gateways().len() {
                    let response = session.get("https://ipinfo.io/json").send().await?;
                    statuses.push(response.status().as_u16());
                }
                Ok::<_, BoxError>(statuses)
            })
            .await
            .unwrap();

        assert_eq!(statuses, vec![200; REGIONS.len()]);
        assert!(api.gateways().is_empty());
    }

    #[tokio::test]
    async fn test_scope_tears_down_on_error() {
        let api = Arc::new(InMemoryGatewayApi::new());
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;

        let result: std::result::Result<(), ErrorKind> = rotator
            .scope(|session| async move {
                assert_eq!(session.gateways().len(), REGIONS.len());
                Err(ErrorKind::NoGateways)
            })
            .await;

        assert_eq!(result, Err(ErrorKind::NoGateways));
        assert!(api.gateways().is_empty());
    }

    #[tokio::test]
    async fn test_scope_tears_down_on_panic() {
        let api = Arc::new(InMemoryGatewayApi::new());
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;

        let backend = Arc::clone(&api);
        let result = AssertUnwindSafe(rotator.scope(|_session| async move {
            if backend.created() > 0 {
                panic!("request handler failed");
            }
            Ok::<(), ErrorKind>(())
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert!(api.gateways().is_empty());
        assert_eq!(api.deleted(), REGIONS.len());
    }

    #[tokio::test]
    async fn test_redirects_onto_target_are_not_followed() {
        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&origin)
            .await;
        let target = Target::try_from(origin.uri()).unwrap();

        let gateway = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .and(header(OVERRIDE_HEADER, target.host_header().as_str()))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("{}/b", origin.uri())),
            )
            .expect(1)
            .mount(&gateway)
            .await;

        let api = Arc::new(InMemoryGatewayApi::with_endpoint(
            url::Url::parse(&gateway.uri()).unwrap(),
        ));
        let rotator = RotatorBuilder::builder()
            .target(target)
            .regions(vec!["eu-west-1".to_string()])
            .api(Some(Arc::clone(&api) as Arc<dyn GatewayApi>))
            .build()
            .rotator()
            .await
            .unwrap();

        let location = format!("{}/b", origin.uri());
        let response = rotator
            .scope(|session| async move {
                let url = format!("{}/a", session.target());
                Ok::<_, BoxError>(session.get(url).send().await?)
            })
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 302);
        assert_eq!(response.headers()["location"], location.as_str());
        assert!(response.url().as_str().starts_with(&gateway.uri()));
    }

    #[tokio::test]
    async fn test_redirects_to_other_origins_are_followed() {
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&elsewhere)
            .await;

        let gateway = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", elsewhere.uri().as_str()),
            )
            .mount(&gateway)
            .await;

        let api = Arc::new(InMemoryGatewayApi::with_endpoint(
            url::Url::parse(&gateway.uri()).unwrap(),
        ));
        let rotator = rotator(&api, ProvisionPolicy::AllOrNothing).await;
        let status = rotator
            .scope(|session| async move {
                let response = session.get("https://ipinfo.io/json").send().await?;
                Ok::<_, BoxError>(response.status().as_u16())
            })
            .await
            .unwrap();
        assert_eq!(status, 200);
    }
}
