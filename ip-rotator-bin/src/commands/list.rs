use std::io::Write;

use anyhow::{Context, Result};
use ip_rotator_lib::Rotator;

use crate::ExitCode;

/// Print the existing gateways of the target, one per line
pub(crate) async fn list<W: Write>(rotator: &Rotator, out: &mut W) -> Result<ExitCode> {
    let gateways = rotator
        .list_existing()
        .await
        .with_context(|| format!("Cannot list gateways for {}", rotator.target()))?;

    if gateways.is_empty() {
        writeln!(out, "No gateways for {}", rotator.target())?;
    }
    for gateway in gateways {
        writeln!(out, "{gateway}")?;
    }
    Ok(ExitCode::Success)
}
