//! Error types for the tap.
//!
//! `ConfigError` is raised while loading configuration, before any request is
//! made. Everything after that surfaces as a `TapError`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config is missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("config key `{key}` is invalid: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum TapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout, 429 or 5xx that survived every retry.
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    /// The API refused a report request with a non-retryable client error.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("schema error in stream `{stream}`: {message}")]
    Schema { stream: String, message: String },

    #[error("failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid {what}: {source}")]
    InvalidDocument {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TapError {
    pub fn schema(stream: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            stream: stream.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = TapError> = std::result::Result<T, E>;
