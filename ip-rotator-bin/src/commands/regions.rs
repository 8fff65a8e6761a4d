use std::io::Write;

use anyhow::Result;
use ip_rotator_lib::RegionPreset;

use crate::ExitCode;

/// Print the regions of `preset`, one per line
pub(crate) fn regions<W: Write>(preset: RegionPreset, out: &mut W) -> Result<ExitCode> {
    for region in preset.regions() {
        writeln!(out, "{region}")?;
    }
    Ok(ExitCode::Success)
}
