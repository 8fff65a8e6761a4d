use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use http::Extensions;
use log::{debug, warn};
use rand::Rng;
use reqwest::{IntoUrl, Method, Request, Response};
use reqwest_middleware::{ClientWithMiddleware, Middleware, Next, RequestBuilder};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

use crate::{ErrorKind, Gateway, Result, Target, rewrite};

/// How a session picks the gateway for the next request.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    /// Cycle through the gateways; every gateway is used once per cycle
    #[default]
    RoundRobin,
    /// Pick a gateway uniformly at random
    Random,
}

#[derive(Debug)]
struct Selector {
    gateways: Arc<[Gateway]>,
    selection: Selection,
    cursor: AtomicUsize,
}

impl Selector {
    fn next(&self) -> Result<&Gateway> {
        let len = self.gateways.len();
        if len == 0 {
            return Err(ErrorKind::NoGateways);
        }
        let index = match self.selection {
            Selection::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % len,
            Selection::Random => rand::thread_rng().gen_range(0..len),
        };
        Ok(&self.gateways[index])
    }
}

/// Shared between a [`Session`] and its middleware
#[derive(Debug)]
struct Router {
    target: Target,
    selector: Selector,
}

impl Router {
    fn route(&self, request: Request) -> Result<Request> {
        if rewrite::is_websocket_upgrade(&request) {
            debug!("Not routing websocket upgrade for {}", request.url());
            return Ok(request);
        }
        if !self.target.matches(request.url()) {
            warn!(
                "Refusing {}: gateways only forward to {}",
                request.url(),
                self.target
            );
            return Err(ErrorKind::ForeignOrigin(request.url().clone()));
        }

        let gateway = self.selector.next()?;
        debug!("Routing {} through {gateway}", request.url());
        rewrite::rewrite(request, &self.target, gateway)
    }
}

/// Middleware moving every request for the target onto a gateway.
#[derive(Debug, Clone)]
struct GatewayMiddleware {
    router: Arc<Router>,
}

#[async_trait]
impl Middleware for GatewayMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let req = self
            .router
            .route(req)
            .map_err(reqwest_middleware::Error::middleware)?;
        next.run(req, extensions).await
    }
}

/// An HTTP client sending requests for the target through the gateways.
///
/// Requests are built like with [`reqwest::Client`]. Responses and transport
/// errors are handed back untouched; the session never retries.
///
/// Websocket upgrades bypass the gateways. Requests for any other origin
/// than the target, including the target host on another scheme or port,
/// fail with [`ErrorKind::ForeignOrigin`].
#[derive(Debug, Clone)]
pub struct Session {
    client: ClientWithMiddleware,
    router: Arc<Router>,
    gateways: Arc<[Gateway]>,
}

impl Session {
    /// Wrap `client` so that requests for `target` go through `gateways`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        target: Target,
        gateways: impl Into<Arc<[Gateway]>>,
        selection: Selection,
    ) -> Self {
        let gateways = gateways.into();
        let router = Arc::new(Router {
            target,
            selector: Selector {
                gateways: Arc::clone(&gateways),
                selection,
                cursor: AtomicUsize::new(0),
            },
        });
        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(GatewayMiddleware {
                router: Arc::clone(&router),
            })
            .build();

        Self {
            client,
            router,
            gateways,
        }
    }

    /// The gateways this session spreads requests over
    #[must_use]
    pub fn gateways(&self) -> &[Gateway] {
        &self.gateways
    }

    /// The origin the gateways forward to
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.router.target
    }

    /// Pick the gateway for the next request.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoGateways`] if the session has no gateway.
    pub fn next_gateway(&self) -> Result<&Gateway> {
        self.router.selector.next()
    }

    /// Apply the same routing as [`Session::execute`] without sending.
    ///
    /// # Errors
    ///
    /// Fails if the request is not for the target, if there is no gateway,
    /// or if it cannot be moved onto the chosen gateway.
    pub fn rewrite(&self, request: Request) -> Result<Request> {
        self.router.route(request)
    }

    /// Start building a `GET` request
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.get(url)
    }

    /// Start building a `POST` request
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.post(url)
    }

    /// Start building a `PUT` request
    pub fn put<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.put(url)
    }

    /// Start building a `DELETE` request
    pub fn delete<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.delete(url)
    }

    /// Start building a `HEAD` request
    pub fn head<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.head(url)
    }

    /// Start building a request with an arbitrary method
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a prepared request.
    ///
    /// # Errors
    ///
    /// Fails with a middleware error if the request could not be routed and
    /// with the client's own error if sending it fails.
    pub async fn execute(&self, request: Request) -> reqwest_middleware::Result<Response> {
        self.client.execute(request).await
    }

    /// The underlying client, with the gateway middleware attached
    #[must_use]
    pub const fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use test_utils::{mock_gateway, url};
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::rewrite::OVERRIDE_HEADER;

    fn target() -> Target {
        Target::try_from("https://ipinfo.io").unwrap()
    }

    fn gateway(index: usize, server: &MockServer) -> Gateway {
        Gateway::new(format!("region-{index}"), format!("gw{index}"), url!(&server.uri()))
    }

    fn offline_gateways(count: usize) -> Vec<Gateway> {
        (0..count)
            .map(|i| {
                Gateway::new(
                    format!("region-{i}"),
                    format!("gw{i}"),
                    url!(&format!("https://gw{i}.example.com")),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_robin_uses_every_gateway_once() {
        let servers = [
            mock_gateway!("ipinfo.io", 1),
            mock_gateway!("ipinfo.io", 1),
            mock_gateway!("ipinfo.io", 1),
        ];
        let gateways: Vec<Gateway> = servers
            .iter()
            .enumerate()
            .map(|(i, server)| gateway(i, server))
            .collect();
        let session = Session::new(
            reqwest::Client::new(),
            target(),
            gateways,
            Selection::RoundRobin,
        );

        for _ in 0..servers.len() {
            let response = session.get("https://ipinfo.io/json").send().await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_random_selection_reaches_all_gateways() {
        let servers = [
            mock_gateway!("ipinfo.io", 1..),
            mock_gateway!("ipinfo.io", 1..),
            mock_gateway!("ipinfo.io", 1..),
        ];
        let gateways: Vec<Gateway> = servers
            .iter()
            .enumerate()
            .map(|(i, server)| gateway(i, server))
            .collect();
        let session = Session::new(reqwest::Client::new(), target(), gateways, Selection::Random);

        for _ in 0..150 {
            session.get("https://ipinfo.io/").send().await.unwrap();
        }
    }

    #[test]
    fn test_random_selection_distribution() {
        let session = Session::new(
            reqwest::Client::new(),
            target(),
            offline_gateways(5),
            Selection::Random,
        );
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..1000 {
            let gateway = session.next_gateway().unwrap();
            *counts.entry(gateway.id.clone()).or_default() += 1;
        }
        assert_eq!(counts.len(), 5);
    }

    #[test]
    fn test_round_robin_order() {
        let session = Session::new(
            reqwest::Client::new(),
            target(),
            offline_gateways(3),
            Selection::RoundRobin,
        );
        let ids: Vec<String> = (0..6)
            .map(|_| session.next_gateway().unwrap().id.clone())
            .collect();
        assert_eq!(ids, vec!["gw0", "gw1", "gw2", "gw0", "gw1", "gw2"]);
    }

    #[test]
    fn test_rewrite_through_session() {
        let session = Session::new(
            reqwest::Client::new(),
            target(),
            vec![Gateway::new(
                "eu-central-1",
                "abc123",
                url!("https://abc123.execute-api.eu-central-1.amazonaws.com"),
            )],
            Selection::RoundRobin,
        );
        let request = session.get("https://ipinfo.io/json").build().unwrap();
        let rewritten = session.rewrite(request).unwrap();
        assert_eq!(
            rewritten.url().as_str(),
            "https://abc123.execute-api.eu-central-1.amazonaws.com/json"
        );
        assert_eq!(rewritten.headers().get(OVERRIDE_HEADER).unwrap(), "ipinfo.io");
    }

    #[rstest]
    #[case("https://example.com/a")]
    #[case("http://ipinfo.io/json")]
    #[case("https://ipinfo.io:8443/json")]
    fn test_other_origins_are_refused(#[case] raw: &str) {
        let session = Session::new(
            reqwest::Client::new(),
            target(),
            offline_gateways(2),
            Selection::RoundRobin,
        );
        let request = session.get(raw).build().unwrap();
        assert_eq!(
            session.rewrite(request).unwrap_err(),
            ErrorKind::ForeignOrigin(url!(raw))
        );
    }

    #[tokio::test]
    async fn test_other_origins_are_not_sent() {
        let gateway_server = mock_gateway!("ipinfo.io", 0);
        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&origin)
            .await;

        let session = Session::new(
            reqwest::Client::new(),
            target(),
            vec![gateway(0, &gateway_server)],
            Selection::RoundRobin,
        );
        let err = session.get(origin.uri()).send().await.unwrap_err();
        assert!(matches!(err, reqwest_middleware::Error::Middleware(_)));
    }

    #[tokio::test]
    async fn test_no_gateways() {
        let session = Session::new(
            reqwest::Client::new(),
            target(),
            Vec::new(),
            Selection::RoundRobin,
        );
        assert_eq!(session.next_gateway(), Err(ErrorKind::NoGateways));

        let err = session.get("https://ipinfo.io/json").send().await.unwrap_err();
        assert!(matches!(err, reqwest_middleware::Error::Middleware(_)));
    }

    #[test]
    fn test_selection_from_str() {
        assert_eq!("round-robin".parse(), Ok(Selection::RoundRobin));
        assert_eq!("Random".parse(), Ok(Selection::Random));
        assert!("weighted".parse::<Selection>().is_err());
        assert_eq!(Selection::RoundRobin.to_string(), "round-robin");
    }
}
