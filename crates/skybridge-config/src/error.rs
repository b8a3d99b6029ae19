//! Configuration error types

use thiserror::Error;

/// Configuration errors
///
/// All of these are fatal: they surface while the snapshot is built at
/// startup, before any unit is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A reference expression without a usable `kind:path` pair
    #[error("Malformed reference expression: {0}")]
    MalformedReference(String),

    /// A reference expression naming a resolution strategy that does not exist
    #[error("Unknown reference kind '{kind}' in {expression}")]
    UnknownReferenceKind { kind: String, expression: String },

    /// A chain of references that leads back to itself
    #[error("Reference cycle detected while resolving {0}")]
    ReferenceCycle(String),

    /// Loading the raw configuration sources failed
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Parsing an inline document failed
    #[error("Failed to parse configuration document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Semantically invalid configuration
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
