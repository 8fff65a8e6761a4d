use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::debug;
use url::Url;

use super::GatewayApi;
use crate::{DeploymentState, ErrorKind, Gateway, Result, Target, types::default_endpoint};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    /// Existing gateways with their names, in creation order
    gateways: Vec<(String, Gateway)>,
    failing_regions: HashSet<String>,
    /// Remaining `Pending` answers per gateway id before it reports `Deployed`
    pending: HashMap<String, u32>,
    pending_polls: u32,
    failed_deployments: HashSet<String>,
    throttled_deletes: u32,
    created: usize,
    deleted: usize,
}

/// [`GatewayApi`] which keeps its gateways in memory.
///
/// Gateways get ids like `mem00001` and the usual invoke URL for their
/// region, unless an endpoint is set with [`InMemoryGatewayApi::with_endpoint`],
/// in which case every gateway points there. Failures can be injected per
/// region to exercise the error paths of a rotator.
#[derive(Debug, Default)]
pub struct InMemoryGatewayApi {
    state: Mutex<State>,
    endpoint: Option<Url>,
}

impl InMemoryGatewayApi {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty backend whose gateways all point at `endpoint`
    #[must_use]
    pub fn with_endpoint(endpoint: Url) -> Self {
        Self {
            state: Mutex::default(),
            endpoint: Some(endpoint),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every gateway creation in `region` fail
    pub fn fail_region(&self, region: impl Into<String>) {
        self.state().failing_regions.insert(region.into());
    }

    /// Make the deployment of every gateway in `region` fail
    pub fn fail_deployments(&self, region: impl Into<String>) {
        self.state().failed_deployments.insert(region.into());
    }

    /// Report newly created gateways as pending for `polls` checks
    pub fn pending_polls(&self, polls: u32) {
        self.state().pending_polls = polls;
    }

    /// Answer the next `count` deletions with [`ErrorKind::Throttled`]
    pub fn throttle_deletes(&self, count: u32) {
        self.state().throttled_deletes = count;
    }

    /// Add a gateway without going through [`GatewayApi::create`], e.g. to
    /// stand in for one left behind by an earlier run.
    ///
    /// # Errors
    ///
    /// Fails if `region` is not usable in a host name.
    pub fn insert(&self, region: &str, name: &str) -> Result<Gateway> {
        let mut state = self.state();
        let gateway = self.new_gateway(&mut state, region)?;
        state.gateways.push((name.to_string(), gateway.clone()));
        Ok(gateway)
    }

    /// All gateways which currently exist
    #[must_use]
    pub fn gateways(&self) -> Vec<Gateway> {
        self.state()
            .gateways
            .iter()
            .map(|(_, gateway)| gateway.clone())
            .collect()
    }

    /// Number of gateways created through [`GatewayApi::create`]
    #[must_use]
    pub fn created(&self) -> usize {
        self.state().created
    }

    /// Number of gateways deleted through [`GatewayApi::delete`]
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.state().deleted
    }

    fn new_gateway(&self, state: &mut State, region: &str) -> Result<Gateway> {
        state.next_id += 1;
        let id = format!("mem{:05}", state.next_id);
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => default_endpoint(region, &id)?,
        };
        Ok(Gateway::new(region, id, endpoint))
    }
}

#[async_trait]
impl GatewayApi for InMemoryGatewayApi {
    async fn create(&self, region: &str, name: &str, target: &Target) -> Result<Gateway> {
        let mut state = self.state();
        if state.failing_regions.contains(region) {
            return Err(ErrorKind::CreateGateway {
                region: region.to_string(),
                reason: "region is unavailable".to_string(),
            });
        }

        let gateway = self.new_gateway(&mut state, region)?;
        let polls = state.pending_polls;
        state.pending.insert(gateway.id.clone(), polls);
        state.gateways.push((name.to_string(), gateway.clone()));
        state.created += 1;
        debug!("Created in-memory gateway {gateway} for {target}");
        Ok(gateway)
    }

    async fn deployment_state(&self, gateway: &Gateway) -> Result<DeploymentState> {
        let mut state = self.state();
        if state.failed_deployments.contains(&gateway.region) {
            return Ok(DeploymentState::Failed("deployment failed".to_string()));
        }
        match state.pending.get_mut(&gateway.id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(DeploymentState::Pending)
            }
            _ => Ok(DeploymentState::Deployed),
        }
    }

    async fn list(&self, region: &str, name: &str) -> Result<Vec<Gateway>> {
        Ok(self
            .state()
            .gateways
            .iter()
            .filter(|(n, gateway)| n == name && gateway.region == region)
            .map(|(_, gateway)| gateway.clone())
            .collect())
    }

    async fn delete(&self, gateway: &Gateway) -> Result<()> {
        let mut state = self.state();
        if state.throttled_deletes > 0 {
            state.throttled_deletes -= 1;
            return Err(ErrorKind::Throttled {
                region: gateway.region.clone(),
            });
        }

        let before = state.gateways.len();
        state
            .gateways
            .retain(|(_, g)| !(g.id == gateway.id && g.region == gateway.region));
        if state.gateways.len() == before {
            return Err(ErrorKind::GatewayNotFound {
                region: gateway.region.clone(),
                id: gateway.id.clone(),
            });
        }
        state.pending.remove(&gateway.id);
        state.deleted += 1;
        Ok(())
    }
}
