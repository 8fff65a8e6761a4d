use std::fmt::Display;

use serde::Serialize;
use url::Url;

use crate::{ErrorKind, Result};

/// A gateway deployed in one region, forwarding to the rotator's target.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Gateway {
    /// Region the gateway lives in, e.g. `eu-central-1`
    pub region: String,
    /// Resource id assigned by the cloud provider
    pub id: String,
    /// Base URL requests are sent to
    pub endpoint: Url,
}

impl Gateway {
    /// Create a gateway record with an explicit endpoint
    #[must_use]
    pub fn new(region: impl Into<String>, id: impl Into<String>, endpoint: Url) -> Self {
        Self {
            region: region.into(),
            id: id.into(),
            endpoint,
        }
    }

    /// Create a gateway record, deriving the endpoint from id and region
    /// the way API Gateway names its invoke URLs.
    ///
    /// # Errors
    ///
    /// Fails if id or region contain characters not allowed in a host name.
    pub fn from_id(region: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let (region, id) = (region.into(), id.into());
        let endpoint = default_endpoint(&region, &id)?;
        Ok(Self {
            region,
            id,
            endpoint,
        })
    }

    /// Host name of the endpoint
    #[must_use]
    pub fn host(&self) -> &str {
        self.endpoint.host_str().unwrap_or_default()
    }
}

/// Invoke URL of an HTTP API in a region
pub(crate) fn default_endpoint(region: &str, id: &str) -> Result<Url> {
    let raw = format!("https://{id}.execute-api.{region}.amazonaws.com");
    Url::parse(&raw).map_err(|e| ErrorKind::InvalidUrl(raw, e))
}

impl Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}", self.region, self.id, self.endpoint)
    }
}

/// Where a gateway's deployment currently stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentState {
    /// No deployment has finished yet
    Pending,
    /// The gateway serves requests
    Deployed,
    /// The deployment failed, with the reason reported by the provider
    Failed(String),
}
