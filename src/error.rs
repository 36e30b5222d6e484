//! Error types for loading the map inputs.
//!
//! Join misses are not errors: a county without a record simply renders
//! without fill. Everything here is a failure to obtain a usable model.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Network error fetching {source_name}: {error}")]
    Network {
        source_name: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("Request for {source_name} timed out after {timeout:?}")]
    Timeout { source_name: String, timeout: Duration },

    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("Failed to read {path}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("Malformed JSON in {source_name}: {error}")]
    Json {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("Malformed topology: {0}")]
    Topology(#[from] TopologyError),
}

impl LoadError {
    /// Network hiccups and server-side failures are worth another attempt;
    /// bad payloads and missing files are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("missing object collection `{0}`")]
    MissingObject(String),

    #[error("arc index {index} out of range ({len} arcs)")]
    ArcOutOfRange { index: i64, len: usize },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}
