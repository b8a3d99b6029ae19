//! Merge error types

use thiserror::Error;

/// Error returned by a binding translator
pub type TranslatorError = Box<dyn std::error::Error + Send + Sync>;

/// Merge errors
#[derive(Debug, Error)]
pub enum MergeError {
    /// A binding translator failed; fields written before it are kept
    #[error("Translating {from} into {to} failed: {reason}")]
    Translator {
        from: String,
        to: String,
        reason: String,
    },
}

/// Result type for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;
