//! Moving a request onto a gateway.
//!
//! The gateway only differs from the target in its authority, so a request
//! keeps its method, path, query, headers and body. Its scheme, host and port
//! are replaced by the gateway endpoint's, and the override header tells the
//! gateway (and the origin behind it) which host the request was meant for.

use http::header::{self, HeaderName, HeaderValue};
use reqwest::Request;
use url::Url;

use crate::{ErrorKind, Gateway, Result, Target};

/// Header carrying the host the request was originally addressed to.
pub const OVERRIDE_HEADER: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Returns `true` for requests asking to upgrade to a websocket.
///
/// Those are never routed through a gateway: HTTP APIs cannot proxy them.
#[must_use]
pub fn is_websocket_upgrade(request: &Request) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Build the URL of `url` on the gateway `endpoint`.
///
/// A base path of the endpoint (e.g. a named stage) is kept in front of the
/// request path. Fragments are dropped, they never reach a server anyway.
///
/// # Errors
///
/// Fails if `endpoint` cannot be a base URL, e.g. `data:` URLs.
pub fn gateway_url(url: &Url, endpoint: &Url) -> Result<Url> {
    if endpoint.cannot_be_a_base() {
        return Err(ErrorKind::InvalidRewrite(
            url.to_string(),
            endpoint.to_string(),
        ));
    }

    let base = endpoint.path().trim_end_matches('/');
    let mut out = endpoint.clone();
    out.set_path(&format!("{base}{}", url.path()));
    out.set_query(url.query());
    out.set_fragment(None);
    Ok(out)
}

/// Rewrite `request`, addressed to `target`, to go through `gateway`.
///
/// # Errors
///
/// Fails if the gateway endpoint cannot take a path or the target host is
/// not a valid header value.
pub fn rewrite(mut request: Request, target: &Target, gateway: &Gateway) -> Result<Request> {
    let url = gateway_url(request.url(), &gateway.endpoint)?;
    let host = HeaderValue::from_str(&target.host_header())?;

    *request.url_mut() = url;
    let headers = request.headers_mut();
    // An explicit `Host` would still name the target; let the client derive
    // it from the new URL instead.
    headers.remove(header::HOST);
    headers.insert(OVERRIDE_HEADER, host);
    Ok(request)
}
