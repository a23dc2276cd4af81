//! Error types shared across the collection pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the appliance management API.
///
/// All of these are soft at the pipeline level: callers log them and
/// continue with "no data" semantics unless the failing call is one of
/// the run-fatal ones (see [`CollectError`]).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid appliance URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("appliance rejected {path}: {code} {message}")]
    Rejected {
        path: String,
        code: String,
        message: String,
    },
}

/// Run-fatal collection failures. Anything not listed here is isolated
/// to a single site.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("connectivity check failed: {0}")]
    Connectivity(#[source] ApiError),

    #[error("failed to list sites: {0}")]
    SiteListing(#[source] ApiError),

    #[error("appliance returned no sites")]
    NoSites,
}

/// Delivery failures reported by a [`crate::sink::Sink`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("refusing to deliver an empty batch")]
    EmptyBatch,

    #[error("sender executable not found: {0}")]
    NotFound(String),

    #[error("sender I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sender exited with {status}: {stderr}")]
    Failed {
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// Errors writing the persisted poll state. Reads never fail; an
/// unreadable state is a cold start.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode poll state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of a failed end-to-end run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error("delivery failed: {0}")]
    Deliver(#[from] SinkError),
}
