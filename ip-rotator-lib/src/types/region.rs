use serde::Deserialize;
use strum::{Display, EnumIter, EnumString, VariantNames};

/// Regions in the EU and the US
pub const DEFAULT_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "ca-central-1",
];

/// [`DEFAULT_REGIONS`] plus Asia and South America
pub const EXTRA_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "ca-central-1",
    "ap-south-1",
    "ap-northeast-3",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
];

/// [`EXTRA_REGIONS`] plus the regions which need a manual opt-in in AWS
pub const ALL_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "ca-central-1",
    "ap-south-1",
    "ap-northeast-3",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
    "ap-east-1",
    "af-south-1",
    "eu-south-1",
    "me-south-1",
    "eu-north-1",
];

/// Named sets of regions to deploy gateways to.
#[derive(
    Debug,
    Deserialize,
    Default,
    Clone,
    Copy,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
    PartialEq,
    Eq,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum RegionPreset {
    /// See [`DEFAULT_REGIONS`]
    #[default]
    Default,
    /// See [`EXTRA_REGIONS`]
    Extra,
    /// See [`ALL_REGIONS`]
    All,
}

impl RegionPreset {
    /// The regions of this preset
    #[must_use]
    pub const fn regions(self) -> &'static [&'static str] {
        match self {
            Self::Default => DEFAULT_REGIONS,
            Self::Extra => EXTRA_REGIONS,
            Self::All => ALL_REGIONS,
        }
    }
}

/// Deduplicate `regions`, keeping the first occurrence of each.
///
/// An empty list falls back to the default preset.
#[must_use]
pub fn normalize_regions<S: AsRef<str>>(regions: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(regions.len());
    for region in regions {
        let region = region.as_ref().trim();
        if !region.is_empty() && !out.iter().any(|r| r == region) {
            out.push(region.to_string());
        }
    }
    if out.is_empty() {
        return RegionPreset::Default
            .regions()
            .iter()
            .map(ToString::to_string)
            .collect();
    }
    out
}
