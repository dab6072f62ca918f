// File: errors.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use crate::classifier::ErrorKind;

/// Failure of a single fetch attempt, before classification.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("No navigation response received for {0}")]
    NoResponse(String),
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Error text from the transport alone, without the request URL.
    pub fn transport_message(&self) -> Option<String> {
        match self {
            Self::Http(e) => {
                let mut parts = Vec::new();
                let mut source = e.source();
                while let Some(cause) = source {
                    parts.push(cause.to_string());
                    source = cause.source();
                }
                (!parts.is_empty()).then(|| parts.join(": "))
            }
            Self::Browser(message) => Some(message.clone()),
            Self::Status { .. } | Self::Timeout(_) | Self::NoResponse(_) | Self::InvalidUrl(_) => {
                None
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Fetch failed ({kind}, retryable: {retryable}): {message}")]
    Fetch {
        kind: ErrorKind,
        retryable: bool,
        message: String,
    },
    #[error("Normalization failed: {0}")]
    Normalization(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl WatchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<std::io::Error> for WatchError {
    fn from(error: std::io::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(error: serde_json::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

pub type WatchResult<T> = Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_exposes_code() {
        let err = FetchError::Status {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_error() {
        let err = FetchError::Timeout(Duration::from_secs(60));
        assert!(err.is_timeout());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(WatchError::Configuration("missing".into()).is_fatal());
        assert!(!WatchError::Persistence("disk full".into()).is_fatal());
        assert!(!WatchError::Normalization("bad markup".into()).is_fatal());
    }
}
