//! `test-utils` is used for testing in both `ip-rotator-lib` and `ip-rotator`.
//! This crate does not depend on `ip-rotator-lib` or `ip-rotator`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Create a mock server standing in for a deployed gateway.
///
/// It answers `200 OK` to any `GET` carrying the override header with the
/// given target host, and expects to be hit exactly `$hits` times. The
/// expectation is verified when the server is dropped.
#[macro_export]
macro_rules! mock_gateway {
    ($target_host:expr, $hits:expr $(,)?) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::header("x-forwarded-host", $target_host))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect($hits)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Parse a string into a `url::Url`
///
/// # Panic
///
/// This panics on error, so it should only be used for testing
#[macro_export]
macro_rules! url {
    ($url:expr) => {{
        url::Url::parse($url).expect("Expected valid URL")
    }};
}
