use std::io::Write;

use anyhow::{Context, Result};
use ip_rotator_lib::Rotator;

use crate::ExitCode;

/// Remove leftover gateways of the target and report how many there were
pub(crate) async fn sweep<W: Write>(rotator: &Rotator, out: &mut W) -> Result<ExitCode> {
    let removed = rotator
        .clear_existing()
        .await
        .with_context(|| format!("Cannot remove gateways for {}", rotator.target()))?;
    writeln!(out, "Removed {removed} gateway(s) for {}", rotator.target())?;
    Ok(ExitCode::Success)
}
