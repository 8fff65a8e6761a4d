pub(crate) mod fetch;
pub(crate) mod list;
pub(crate) mod regions;
pub(crate) mod sweep;

pub(crate) use fetch::fetch;
pub(crate) use list::list;
pub(crate) use regions::regions;
pub(crate) use sweep::sweep;

use std::sync::Arc;

use anyhow::Result;
use ip_rotator_lib::{GatewayApi, InMemoryGatewayApi, Rotator, RotatorBuilder, Target};
use log::info;

use crate::options::Config;

/// Build the rotator for `target` from the merged configuration
pub(crate) async fn rotator(cfg: &Config, target: &Target) -> Result<Rotator> {
    let api: Option<Arc<dyn GatewayApi>> = if cfg.dry_run {
        info!("Dry run: gateways are simulated and requests go to {target} directly");
        Some(Arc::new(InMemoryGatewayApi::with_endpoint(
            target.as_url().clone(),
        )))
    } else {
        None
    };

    let rotator = RotatorBuilder::builder()
        .target(target.clone())
        .regions(cfg.regions())
        .credentials(cfg.credentials()?)
        .policy(cfg.policy)
        .selection(cfg.selection)
        .api(api)
        .user_agent(cfg.user_agent.clone())
        .timeout(Some(cfg.timeout()))
        .build()
        .rotator()
        .await?;
    Ok(rotator)
}
