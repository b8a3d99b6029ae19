//! Invoke-permission upsert

use crate::api::FunctionApi;
use crate::error::ApiResult;
use crate::model::AddPermissionInput;
use sha2::{Digest, Sha256};
use tracing::debug;

pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";
pub const GATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";
pub const IDENTITY_PRINCIPAL: &str = "cognito-idp.amazonaws.com";

/// Statement id derived from the source ARN, so re-runs address the same statement
pub fn statement_id(source_arn: &str) -> String {
    hex::encode(Sha256::digest(source_arn.as_bytes()))
}

/// Grant `principal` permission to invoke `function_name` from `source_arn`
///
/// Any existing statement with the same id is removed first; a missing
/// statement is not an error.
pub async fn upsert_invoke_permission(
    api: &dyn FunctionApi,
    function_name: &str,
    principal: &str,
    source_arn: &str,
) -> ApiResult<()> {
    let statement_id = statement_id(source_arn);

    match api.remove_permission(function_name, &statement_id).await {
        Ok(()) => debug!(function = %function_name, statement = %statement_id, "Removed previous permission"),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }

    api.add_permission(&AddPermissionInput {
        function_name: function_name.to_string(),
        statement_id,
        action: INVOKE_ACTION.to_string(),
        principal: principal.to_string(),
        source_arn: Some(source_arn.to_string()),
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_id_is_stable_hex() {
        let arn = "arn:aws:execute-api:ap-southeast-1:123456789012:abc/dev/GET/hello";
        let id = statement_id(arn);
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, statement_id(arn));
        assert_ne!(id, statement_id("arn:aws:execute-api:ap-southeast-1:123456789012:abc/dev/POST/hello"));
    }
}
