//! CLI error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] skybridge_config::ConfigError),

    #[error("Cloud client error: {0}")]
    Aws(#[from] skybridge_aws::AwsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{failed} of {total} functions failed to deploy")]
    DeployFailed { failed: usize, total: usize },
}

pub type CliResult<T> = std::result::Result<T, CliError>;
