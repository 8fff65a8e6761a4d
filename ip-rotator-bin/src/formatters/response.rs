//! One line per fetched URL.

use std::fmt::Display;

use reqwest::StatusCode;
use url::Url;

use crate::{formatters::color::{PINK, color_for_status}, options::OutputMode};

/// `[200] https://ipinfo.io/json via abc123.execute-api.eu-west-1.amazonaws.com`
pub(crate) fn format_response(mode: &OutputMode, status: StatusCode, url: &Url, via: &str) -> String {
    let code = format!("[{}]", status.as_u16());
    let code = if mode.is_plain() {
        code
    } else {
        color_for_status(status.as_u16()).apply_to(code).to_string()
    };
    format!("{code} {url} via {via}")
}

/// `[ERR] https://ipinfo.io/json: <reason>`
pub(crate) fn format_error(mode: &OutputMode, url: &Url, error: &dyn Display) -> String {
    let tag = if mode.is_plain() {
        "[ERR]".to_string()
    } else {
        PINK.apply_to("[ERR]").to_string()
    };
    format!("{tag} {url}: {error}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_plain_lines() {
        let url = Url::parse("https://ipinfo.io/json").unwrap();
        assert_eq!(
            format_response(&OutputMode::Plain, StatusCode::OK, &url, "abc.example.com"),
            "[200] https://ipinfo.io/json via abc.example.com"
        );
        assert_eq!(
            format_error(&OutputMode::Plain, &url, &"connection refused"),
            "[ERR] https://ipinfo.io/json: connection refused"
        );
    }
}
