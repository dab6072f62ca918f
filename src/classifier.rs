// File: classifier.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BrokenLink,
    AccessDenied,
    ServerError,
    NetworkTimeout,
    Unknown,
}

impl ErrorKind {
    /// Permanent failures describe the resource itself, so a second attempt
    /// cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ErrorKind::BrokenLink | ErrorKind::AccessDenied)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::BrokenLink => write!(f, "BROKEN_LINK"),
            ErrorKind::AccessDenied => write!(f, "ACCESS_DENIED"),
            ErrorKind::ServerError => write!(f, "SERVER_ERROR"),
            ErrorKind::NetworkTimeout => write!(f, "NETWORK_TIMEOUT"),
            ErrorKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// Checked in order; the first match wins.
static MESSAGE_PATTERNS: Lazy<Vec<(Regex, ErrorKind)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\b404\b|not found").unwrap(),
            ErrorKind::BrokenLink,
        ),
        (
            Regex::new(r"\b40[13]\b|forbidden|access denied|unauthorized").unwrap(),
            ErrorKind::AccessDenied,
        ),
        (
            Regex::new(r"timed out|timeout|deadline has elapsed").unwrap(),
            ErrorKind::NetworkTimeout,
        ),
        (
            Regex::new(r"\b50[0-4]\b|server error|bad gateway|service unavailable").unwrap(),
            ErrorKind::ServerError,
        ),
    ]
});

pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        404 | 410 => ErrorKind::BrokenLink,
        401 | 403 => ErrorKind::AccessDenied,
        500..=599 => ErrorKind::ServerError,
        408 => ErrorKind::NetworkTimeout,
        _ => ErrorKind::Unknown,
    }
}

/// Approximate classification for transports that only surface a message.
pub fn classify_message(message: &str) -> ErrorKind {
    let normalized = message.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&normalized))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

pub fn classify(failure: &FetchError) -> ErrorKind {
    if let Some(status) = failure.status() {
        return classify_status(status);
    }
    if failure.is_timeout() {
        return ErrorKind::NetworkTimeout;
    }
    failure
        .transport_message()
        .map(|message| classify_message(&message))
        .unwrap_or(ErrorKind::Unknown)
}

pub fn should_retry(kind: ErrorKind) -> bool {
    !kind.is_permanent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(404, ErrorKind::BrokenLink)]
    #[case(410, ErrorKind::BrokenLink)]
    #[case(403, ErrorKind::AccessDenied)]
    #[case(401, ErrorKind::AccessDenied)]
    #[case(500, ErrorKind::ServerError)]
    #[case(503, ErrorKind::ServerError)]
    #[case(408, ErrorKind::NetworkTimeout)]
    #[case(429, ErrorKind::Unknown)]
    fn test_classify_status(#[case] status: u16, #[case] expected: ErrorKind) {
        assert_eq!(classify_status(status), expected);
    }

    #[rstest]
    #[case("Client error '404 Not Found' for url", ErrorKind::BrokenLink)]
    #[case("Page not found", ErrorKind::BrokenLink)]
    #[case("HTTP 403 FORBIDDEN", ErrorKind::AccessDenied)]
    #[case("Access Denied by edge", ErrorKind::AccessDenied)]
    #[case("operation timed out", ErrorKind::NetworkTimeout)]
    #[case("Server error '502 Bad Gateway'", ErrorKind::ServerError)]
    #[case("connection reset by peer", ErrorKind::Unknown)]
    #[case("", ErrorKind::Unknown)]
    fn test_classify_message(#[case] message: &str, #[case] expected: ErrorKind) {
        assert_eq!(classify_message(message), expected);
    }

    #[test]
    fn test_status_takes_precedence_over_message() {
        let failure = FetchError::Status {
            status: 503,
            url: "https://example.com/not-found-page".to_string(),
        };
        assert_eq!(classify(&failure), ErrorKind::ServerError);
    }

    #[test]
    fn test_timeout_variant_is_network_timeout() {
        let failure = FetchError::Timeout(Duration::from_secs(30));
        assert_eq!(classify(&failure), ErrorKind::NetworkTimeout);
    }

    #[test]
    fn test_browser_message_falls_back_to_substring() {
        let failure = FetchError::Browser("net::ERR_CONNECTION_REFUSED".to_string());
        assert_eq!(classify(&failure), ErrorKind::Unknown);
    }

    #[rstest]
    #[case(FetchError::NoResponse("https://help.example.com/articles/404/appeals".to_string()))]
    #[case(FetchError::NoResponse("https://example.com/timeout-policy".to_string()))]
    #[case(FetchError::InvalidUrl("htp://example.com/403-forbidden: relative URL".to_string()))]
    fn test_url_text_never_decides_kind(#[case] failure: FetchError) {
        assert_eq!(classify(&failure), ErrorKind::Unknown);
        assert!(should_retry(classify(&failure)));
    }

    #[tokio::test]
    async fn test_transport_error_ignores_url_path() {
        // Nothing listens on port 9, so the connect fails without a status.
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/articles/404/not-found")
            .send()
            .await
            .unwrap_err();
        let failure = FetchError::Http(err);
        assert!(failure.to_string().contains("404"));
        assert_ne!(classify(&failure), ErrorKind::BrokenLink);
    }

    #[test]
    fn test_retry_policy() {
        assert!(!should_retry(ErrorKind::BrokenLink));
        assert!(!should_retry(ErrorKind::AccessDenied));
        assert!(should_retry(ErrorKind::ServerError));
        assert!(should_retry(ErrorKind::NetworkTimeout));
        assert!(should_retry(ErrorKind::Unknown));
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::BrokenLink.to_string(), "BROKEN_LINK");
        assert_eq!(ErrorKind::NetworkTimeout.to_string(), "NETWORK_TIMEOUT");
    }
}
