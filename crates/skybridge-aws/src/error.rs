//! Client error types and the SDK error mapping

use aws_smithy_types::error::display::DisplayErrorContext;
// The service crates all re-export these from the same smithy runtime.
use aws_sdk_lambda::error::{ProvideErrorMetadata, SdkError};
use skybridge_deploy::ApiError;
use thiserror::Error;

/// Errors setting up a client
#[derive(Debug, Error)]
pub enum AwsError {
    #[error("Failed to resolve credentials: {0}")]
    Credentials(String),

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl From<AwsError> for ApiError {
    fn from(err: AwsError) -> Self {
        ApiError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Map an SDK failure onto the collaborator error vocabulary
///
/// Service responses keep their status and code; everything else (timeouts,
/// connection failures, unparseable responses) is a transport error.
pub fn api_error<E>(err: SdkError<E>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let err = context.into_err();
            let code = err.code().unwrap_or("Unknown").to_string();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            classify(status, code, message)
        }
        SdkError::ResponseError(context) => ApiError::Decode(format!(
            "unreadable response with status {}",
            context.raw().status().as_u16()
        )),
        other => ApiError::Transport(DisplayErrorContext(&other).to_string()),
    }
}

/// Sort a service error by status and error code
pub fn classify(status: u16, code: String, message: String) -> ApiError {
    if status == 404 || code.ends_with("NotFoundException") {
        ApiError::NotFound(message)
    } else if status == 412 || code == "PreconditionFailedException" {
        ApiError::Conflict(message)
    } else {
        ApiError::Service {
            status,
            code,
            message,
        }
    }
}
