//! Deployment error types

use thiserror::Error;

/// Errors reported by a remote API collaborator
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The addressed resource does not exist; selects create over update
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// An optimistic-concurrency token was stale
    #[error("Revision conflict: {0}")]
    Conflict(String),

    #[error("Service error ({status} {code}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }
}

/// Errors producing a unit's archive
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to prepare {runtime} build environment: {reason}")]
    Environment { runtime: String, reason: String },

    #[error("Build of {unit} failed (exit status {status:?})\n{output}")]
    Command {
        unit: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Container runtime error: {0}")]
    Container(String),

    #[error("Build of {unit} produced no archive at {path}")]
    MissingArtifact { unit: String, path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deployment errors
///
/// Everything except `Config` is scoped to one unit and never aborts the run.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(#[from] skybridge_config::ConfigError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Merge error: {0}")]
    Merge(#[from] skybridge_merge::MergeError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid function payload: {0}")]
    Validation(String),

    #[error("Function {function} did not settle: {status}")]
    Unsettled { function: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for remote API calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Result type for build operations
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;
