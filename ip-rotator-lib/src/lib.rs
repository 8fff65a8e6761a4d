//! `ip_rotator_lib` sends HTTP requests through AWS API Gateway endpoints,
//! so that the target sees them coming from a rotating set of addresses.
//!
//! One gateway is deployed per region. A [`Session`] then moves every
//! request for the target onto one of the gateways and tells the gateway
//! which host the request was meant for:
//!
//! ```no_run
//! use ip_rotator_lib::{RotatorBuilder, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let rotator = RotatorBuilder::builder()
//!         .target(Target::try_from("https://ipinfo.io")?)
//!         .build()
//!         .rotator()
//!         .await?;
//!
//!     // Gateways are removed again when the closure returns, fails or panics
//!     rotator
//!         .scope(|session| async move {
//!             for _ in 0..3 {
//!                 let body = session.get("https://ipinfo.io/json").send().await?.text().await?;
//!                 println!("{body}");
//!             }
//!             Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
//!         })
//!         .await
//! }
//! ```
//!
//! Gateways are named after the target. If a run is killed before it
//! could clean up, [`Rotator::clear_existing`] finds and removes them.
#![warn(missing_docs)]

mod deployment;
mod rotator;
mod session;
mod types;

pub mod cloud;
pub mod rewrite;

pub use cloud::{
    AwsGatewayApi, GatewayApi, InMemoryGatewayApi, StaticCredentials, gateway_name,
};
pub use deployment::Deployment;
pub use rotator::{
    DEFAULT_DEPLOY_POLL_ATTEMPTS, DEFAULT_DEPLOY_POLL_INTERVAL, DEFAULT_THROTTLE_ATTEMPTS,
    DEFAULT_MAX_REDIRECTS, DEFAULT_THROTTLE_WAIT, DEFAULT_USER_AGENT, ProvisionPolicy, Rotator,
    RotatorBuilder,
};
pub use session::{Selection, Session};
pub use types::*;
