//! The boundary to the cloud provider.
//!
//! [`GatewayApi`] is the small set of calls the rotator needs: create a
//! gateway, ask whether it is deployed, list gateways by name and delete
//! them. [`AwsGatewayApi`] talks to AWS API Gateway, [`InMemoryGatewayApi`]
//! keeps everything in process and is used for dry runs and tests.

use async_trait::async_trait;

use crate::{DeploymentState, Gateway, Result, Target};

mod aws;
mod memory;

pub use aws::{AwsGatewayApi, StaticCredentials};
pub use memory::InMemoryGatewayApi;

/// Prefix of every gateway name created by this crate
pub const NAME_PREFIX: &str = "ip-rotator";

/// Tag key carrying the target origin of a gateway
pub const TARGET_TAG: &str = "ip-rotator-target";

/// Name of the gateways forwarding to `target`.
///
/// The name only depends on the target, so gateways left behind by an
/// earlier run can be found again.
///
/// ```
/// use ip_rotator_lib::{gateway_name, Target};
///
/// let target = Target::try_from("https://ipinfo.io/json").unwrap();
/// assert_eq!(gateway_name(&target), "ip-rotator:https://ipinfo.io");
/// ```
#[must_use]
pub fn gateway_name(target: &Target) -> String {
    format!("{NAME_PREFIX}:{}", target.origin())
}

/// Operations on the gateways of a single cloud account.
///
/// Implementations map provider errors onto [`crate::ErrorKind`]. In
/// particular, deleting a gateway that does not exist must return
/// [`crate::ErrorKind::GatewayNotFound`] and throttled calls must return
/// [`crate::ErrorKind::Throttled`]; the caller decides what to do with them.
#[async_trait]
pub trait GatewayApi: Send + Sync + std::fmt::Debug {
    /// Create a gateway named `name` in `region`, forwarding to `target`.
    async fn create(&self, region: &str, name: &str, target: &Target) -> Result<Gateway>;

    /// Report whether `gateway` serves requests yet.
    async fn deployment_state(&self, gateway: &Gateway) -> Result<DeploymentState>;

    /// All gateways in `region` whose name is exactly `name`.
    async fn list(&self, region: &str, name: &str) -> Result<Vec<Gateway>>;

    /// Delete `gateway`.
    async fn delete(&self, gateway: &Gateway) -> Result<()>;
}
