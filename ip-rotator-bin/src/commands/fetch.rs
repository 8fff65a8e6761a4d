use std::io::Write;

use anyhow::{Context, Result};
use futures::{StreamExt, stream};
use ip_rotator_lib::Rotator;
use log::info;
use url::Url;

use crate::{
    ExitCode,
    formatters::response::{format_error, format_response},
    options::{FetchArgs, OutputMode},
};

/// Fetch the URLs of `args` through freshly deployed gateways.
///
/// One line per request is written to `out`. Requests go out concurrently,
/// at most one per gateway at a time, but are reported in order.
pub(crate) async fn fetch<W: Write>(
    rotator: &Rotator,
    args: &FetchArgs,
    mode: &OutputMode,
    out: &mut W,
) -> Result<ExitCode> {
    let requests: Vec<Url> = args
        .urls()?
        .into_iter()
        .flat_map(|url| std::iter::repeat(url).take(args.repeat))
        .collect();
    let total = requests.len();
    let print_body = args.body;

    let failures = rotator
        .scope(move |session| async move {
            let concurrency = session.gateways().len().max(1);
            let session = &session;
            let mut responses = stream::iter(requests)
                .map(|url| async move {
                    let response = session.get(url.clone()).send().await;
                    (url, response)
                })
                .buffered(concurrency);

            let mut failures = 0;
            while let Some((url, response)) = responses.next().await {
                let response = match response {
                    Ok(response) => response,
                    Err(e) => {
                        failures += 1;
                        writeln!(out, "{}", format_error(mode, &url, &e))?;
                        continue;
                    }
                };

                let status = response.status();
                if !status.is_success() {
                    failures += 1;
                }
                let via = response.url().host_str().unwrap_or_default();
                writeln!(out, "{}", format_response(mode, status, &url, via))?;

                if print_body {
                    let body = response
                        .text()
                        .await
                        .with_context(|| format!("Cannot read response body of {url}"))?;
                    writeln!(out, "{body}")?;
                }
            }
            Ok::<_, anyhow::Error>(failures)
        })
        .await?;

    info!("Fetched {total} URL(s), {failures} failed");
    if failures > 0 {
        Ok(ExitCode::RequestFailure)
    } else {
        Ok(ExitCode::Success)
    }
}
