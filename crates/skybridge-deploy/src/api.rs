//! Remote collaborator interfaces
//!
//! The engine talks to the cloud only through these traits. `skybridge-aws`
//! implements them over the cloud SDKs; [`crate::memory`] provides in-memory
//! implementations for tests and local runs.

use crate::error::ApiResult;
use crate::model::*;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Function service
#[async_trait]
pub trait FunctionApi: Send + Sync {
    /// Current configuration and tags; `ApiError::NotFound` when absent
    async fn get_function(&self, function_name: &str) -> ApiResult<GetFunctionOutput>;

    async fn create_function(&self, input: &CreateFunctionInput) -> ApiResult<FunctionConfiguration>;

    /// Replace the code, guarded by `input.revision_id`
    async fn update_function_code(
        &self,
        input: &UpdateFunctionCodeInput,
    ) -> ApiResult<FunctionConfiguration>;

    /// Replace the configuration, guarded by `input.revision_id`
    async fn update_function_configuration(
        &self,
        input: &UpdateFunctionConfigurationInput,
    ) -> ApiResult<FunctionConfiguration>;

    async fn tag_resource(&self, resource_arn: &str, tags: &BTreeMap<String, String>) -> ApiResult<()>;

    /// Publish an immutable version; the returned configuration carries it
    async fn publish_version(&self, input: &PublishVersionInput) -> ApiResult<FunctionConfiguration>;

    async fn get_alias(&self, function_name: &str, alias: &str) -> ApiResult<AliasConfiguration>;

    async fn create_alias(&self, input: &CreateAliasInput) -> ApiResult<AliasConfiguration>;

    /// Repoint an alias, guarded by `input.revision_id`
    async fn update_alias(&self, input: &UpdateAliasInput) -> ApiResult<AliasConfiguration>;

    async fn add_permission(&self, input: &AddPermissionInput) -> ApiResult<()>;

    async fn remove_permission(&self, function_name: &str, statement_id: &str) -> ApiResult<()>;
}

/// API gateway, REST (v1) and WebSocket (v2)
#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn get_rest_api(&self, rest_api_id: &str) -> ApiResult<RestApi>;

    /// Every resource of the API, across all pages
    async fn get_resources(&self, rest_api_id: &str) -> ApiResult<Vec<RestResource>>;

    async fn update_integration(
        &self,
        rest_api_id: &str,
        resource_id: &str,
        http_method: &str,
        patch: &[PatchOperation],
    ) -> ApiResult<()>;

    async fn update_authorizer(
        &self,
        rest_api_id: &str,
        authorizer_id: &str,
        patch: &[PatchOperation],
    ) -> ApiResult<()>;

    async fn create_deployment(&self, rest_api_id: &str, stage: &str) -> ApiResult<()>;

    async fn get_ws_api(&self, api_id: &str) -> ApiResult<WsApi>;

    async fn get_routes(&self, api_id: &str) -> ApiResult<Vec<WsRoute>>;

    async fn get_ws_integration(&self, api_id: &str, integration_id: &str) -> ApiResult<WsIntegration>;

    async fn update_ws_integration(&self, api_id: &str, integration: &WsIntegration) -> ApiResult<()>;

    async fn get_ws_authorizer(&self, api_id: &str, authorizer_id: &str) -> ApiResult<WsAuthorizer>;

    async fn update_ws_authorizer(&self, api_id: &str, authorizer: &WsAuthorizer) -> ApiResult<()>;

    async fn create_ws_deployment(&self, api_id: &str, stage: &str) -> ApiResult<()>;
}

/// Identity provider user pools
#[async_trait]
pub trait IdentityPoolApi: Send + Sync {
    async fn describe_user_pool(&self, pool_id: &str) -> ApiResult<UserPool>;

    async fn update_lambda_config(&self, pool_id: &str, config: &LambdaConfig) -> ApiResult<()>;
}

/// Observed remote state of one function
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteState {
    Missing,
    Present(Box<GetFunctionOutput>),
}

impl RemoteState {
    pub fn exists(&self) -> bool {
        matches!(self, RemoteState::Present(_))
    }

    /// Optimistic-concurrency token of the observed state
    pub fn revision_id(&self) -> Option<&str> {
        match self {
            RemoteState::Missing => None,
            RemoteState::Present(output) => output.configuration.revision_id.as_deref(),
        }
    }
}

/// Fetch a function's remote state, folding not-found into [`RemoteState::Missing`]
pub async fn fetch_remote(api: &dyn FunctionApi, function_name: &str) -> ApiResult<RemoteState> {
    match api.get_function(function_name).await {
        Ok(output) => Ok(RemoteState::Present(Box::new(output))),
        Err(err) if err.is_not_found() => Ok(RemoteState::Missing),
        Err(err) => Err(err),
    }
}
