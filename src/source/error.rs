//! Error types for the HTTP client and the site adapters.

use crate::source::Site;
use thiserror::Error;

/// One HTTP request failed. `is_transient` decides whether a retry is worth it.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching: {url}")]
    Status { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    /// Timeouts, connection failures, HTTP 5xx and HTTP 429 are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Network { source, .. } => source.is_timeout() || source.is_connect(),
            HttpError::Status { status, .. } => *status >= 500 || *status == 429,
            HttpError::BodyRead { source, .. } => source.is_timeout(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Adapter error. `NotFound` (the site says the series/chapter does not exist) is kept distinct from
/// `SourceUnavailable` (the page did not have the structure the adapter expects).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unsupported source '{name}'. Use mangakakalot, manganelo, or mangareader.")]
    UnsupportedSource { name: String },

    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Could not detect site from URL host '{host}'. Use --site mangakakalot, manganelo, or mangareader.")]
    UnrecognizedHost { host: String },

    #[error("{site}: nothing found for {what}")]
    NotFound { site: Site, what: String },

    #[error("{site} returned an unexpected page at {url}: {reason}")]
    SourceUnavailable {
        site: Site,
        url: String,
        reason: String,
    },

    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error(transparent)]
    Http(#[from] HttpError),
}
