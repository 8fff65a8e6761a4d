use std::sync::Arc;

use log::warn;
use tokio::runtime::Handle;

use crate::{
    Gateway, Result, Session,
    cloud::GatewayApi,
    rotator::{ThrottleRetry, delete_all},
};

/// What is needed to remove the gateways again
#[derive(Debug)]
pub(crate) struct Cleanup {
    pub(crate) api: Arc<dyn GatewayApi>,
    pub(crate) retry: ThrottleRetry,
}

/// Gateways deployed by [`Rotator::start`](crate::Rotator::start).
///
/// Call [`Deployment::shutdown`] when done. A deployment dropped without
/// being shut down removes its gateways in the background if a Tokio
/// runtime is available; otherwise they stay until the next sweep.
#[derive(Debug)]
pub struct Deployment {
    session: Session,
    cleanup: Option<Cleanup>,
}

impl Deployment {
    pub(crate) fn new(session: Session, cleanup: Cleanup) -> Self {
        Self {
            session,
            cleanup: Some(cleanup),
        }
    }

    /// Session sending requests through the deployed gateways
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The deployed gateways
    #[must_use]
    pub fn gateways(&self) -> &[Gateway] {
        self.session.gateways()
    }

    /// Remove all gateways of this deployment.
    ///
    /// Sessions cloned from this deployment keep working, but their
    /// requests fail once the gateways are gone.
    ///
    /// # Errors
    ///
    /// Every gateway is attempted; the first deletion that failed is
    /// returned.
    pub async fn shutdown(mut self) -> Result<()> {
        match self.cleanup.take() {
            Some(cleanup) => {
                delete_all(cleanup.api.as_ref(), self.session.gateways(), cleanup.retry).await
            }
            None => Ok(()),
        }
    }
}

impl Drop for Deployment {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };
        let gateways = self.session.gateways().to_vec();
        if gateways.is_empty() {
            return;
        }

        warn!(
            "Deployment of {} gateway(s) for {} dropped without shutdown",
            gateways.len(),
            self.session.target()
        );
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let removed = delete_all(cleanup.api.as_ref(), &gateways, cleanup.retry).await;
                    if let Err(e) = removed {
                        warn!("Failed to remove gateways of dropped deployment: {e}");
                    }
                });
            }
            Err(_) => warn!("No async runtime to remove them; sweep the target to clean up"),
        }
    }
}
