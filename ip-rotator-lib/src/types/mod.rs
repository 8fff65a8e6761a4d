#![allow(unreachable_pub)]

mod error;
mod gateway;
mod region;
mod target;

pub use error::ErrorKind;
pub use gateway::{DeploymentState, Gateway};
pub(crate) use gateway::default_endpoint;
pub use region::{ALL_REGIONS, DEFAULT_REGIONS, EXTRA_REGIONS, RegionPreset, normalize_regions};
pub use target::Target;

/// The ip-rotator `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
