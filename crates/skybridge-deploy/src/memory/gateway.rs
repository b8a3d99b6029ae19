use crate::api::GatewayApi;
use crate::error::{ApiError, ApiResult};
use crate::model::*;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct GatewayStore {
    rest_api: Option<RestApi>,
    resources: Vec<RestResource>,
    /// (resource id, method) -> integration URI
    integrations: BTreeMap<(String, String), String>,
    /// authorizer id -> authorizer URI
    authorizers: BTreeMap<String, String>,
    ws_api: Option<WsApi>,
    routes: Vec<WsRoute>,
    ws_integrations: BTreeMap<String, WsIntegration>,
    ws_authorizers: BTreeMap<String, WsAuthorizer>,
    /// (api id, stage)
    deployments: Vec<(String, String)>,
    calls: Vec<String>,
    failing: Vec<&'static str>,
}

impl GatewayStore {
    fn record(&mut self, operation: &'static str) -> ApiResult<()> {
        self.calls.push(operation.to_string());
        if self.failing.contains(&operation) {
            return Err(ApiError::Service {
                status: 500,
                code: "InternalFailure".to_string(),
                message: format!("{operation} failed"),
            });
        }
        Ok(())
    }

    fn rest_api(&self, rest_api_id: &str) -> ApiResult<&RestApi> {
        self.rest_api
            .as_ref()
            .filter(|api| api.id == rest_api_id)
            .ok_or_else(|| ApiError::NotFound(format!("Invalid API identifier specified: {rest_api_id}")))
    }

    fn ws_api(&self, api_id: &str) -> ApiResult<&WsApi> {
        self.ws_api
            .as_ref()
            .filter(|api| api.api_id == api_id)
            .ok_or_else(|| ApiError::NotFound(format!("Invalid API identifier specified: {api_id}")))
    }
}

/// In-memory REST and WebSocket gateway
pub struct InMemoryGatewayApi {
    state: RwLock<GatewayStore>,
}

impl Default for InMemoryGatewayApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGatewayApi {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GatewayStore::default()),
        }
    }

    /// A REST API exposing `paths`; resource ids read `res-<index>`
    pub fn with_rest_api(mut self, rest_api_id: &str, paths: &[&str]) -> Self {
        let store = self.state.get_mut();
        store.rest_api = Some(RestApi {
            id: rest_api_id.to_string(),
            name: format!("{rest_api_id}-api"),
        });
        store.resources = paths
            .iter()
            .enumerate()
            .map(|(index, path)| RestResource {
                id: format!("res-{index}"),
                path: path.to_string(),
                parent_id: None,
                path_part: path.rsplit('/').next().map(str::to_string),
            })
            .collect();
        self
    }

    pub fn with_authorizer(mut self, authorizer_id: &str) -> Self {
        self.state
            .get_mut()
            .authorizers
            .insert(authorizer_id.to_string(), String::new());
        self
    }

    /// A WebSocket API whose routes target `integrations/<integration id>`
    pub fn with_ws_api(mut self, api_id: &str, routes: &[(&str, &str)]) -> Self {
        let store = self.state.get_mut();
        store.ws_api = Some(WsApi {
            api_id: api_id.to_string(),
            name: format!("{api_id}-ws"),
            protocol_type: Some("WEBSOCKET".to_string()),
        });
        store.routes = routes
            .iter()
            .enumerate()
            .map(|(index, (route_key, integration_id))| WsRoute {
                route_id: format!("route-{index}"),
                route_key: route_key.to_string(),
                target: Some(format!("integrations/{integration_id}")),
            })
            .collect();
        self
    }

    pub fn with_ws_integration(mut self, integration: WsIntegration) -> Self {
        self.state
            .get_mut()
            .ws_integrations
            .insert(integration.integration_id.clone(), integration);
        self
    }

    pub fn with_ws_authorizer(mut self, authorizer: WsAuthorizer) -> Self {
        self.state
            .get_mut()
            .ws_authorizers
            .insert(authorizer.authorizer_id.clone(), authorizer);
        self
    }

    /// Fail every call of `operation`
    pub fn fail(mut self, operation: &'static str) -> Self {
        self.state.get_mut().failing.push(operation);
        self
    }

    /// Operation names in call order
    pub async fn calls(&self) -> Vec<String> {
        self.state.read().await.calls.clone()
    }

    /// Integration URI currently set on `method` of the resource at `path`
    pub async fn integration_uri(&self, path: &str, method: &str) -> Option<String> {
        let store = self.state.read().await;
        let resource = store.resources.iter().find(|resource| resource.path == path)?;
        store
            .integrations
            .get(&(resource.id.clone(), method.to_string()))
            .cloned()
    }

    pub async fn authorizer_uri(&self, authorizer_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .authorizers
            .get(authorizer_id)
            .filter(|uri| !uri.is_empty())
            .cloned()
    }

    pub async fn ws_integration(&self, integration_id: &str) -> Option<WsIntegration> {
        self.state.read().await.ws_integrations.get(integration_id).cloned()
    }

    pub async fn ws_authorizer(&self, authorizer_id: &str) -> Option<WsAuthorizer> {
        self.state.read().await.ws_authorizers.get(authorizer_id).cloned()
    }

    pub async fn deployments(&self) -> Vec<(String, String)> {
        self.state.read().await.deployments.clone()
    }
}

#[async_trait]
impl GatewayApi for InMemoryGatewayApi {
    async fn get_rest_api(&self, rest_api_id: &str) -> ApiResult<RestApi> {
        let mut store = self.state.write().await;
        store.record("get_rest_api")?;
        store.rest_api(rest_api_id).cloned()
    }

    async fn get_resources(&self, rest_api_id: &str) -> ApiResult<Vec<RestResource>> {
        let mut store = self.state.write().await;
        store.record("get_resources")?;
        store.rest_api(rest_api_id)?;
        Ok(store.resources.clone())
    }

    async fn update_integration(
        &self,
        rest_api_id: &str,
        resource_id: &str,
        http_method: &str,
        patch: &[PatchOperation],
    ) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record("update_integration")?;
        store.rest_api(rest_api_id)?;
        if !store.resources.iter().any(|resource| resource.id == resource_id) {
            return Err(ApiError::NotFound(format!("Invalid Resource identifier specified: {resource_id}")));
        }
        if let Some(operation) = patch.iter().find(|op| op.path == "/uri") {
            store.integrations.insert(
                (resource_id.to_string(), http_method.to_string()),
                operation.value.clone(),
            );
        }
        Ok(())
    }

    async fn update_authorizer(
        &self,
        rest_api_id: &str,
        authorizer_id: &str,
        patch: &[PatchOperation],
    ) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record("update_authorizer")?;
        store.rest_api(rest_api_id)?;
        let uri = store
            .authorizers
            .get_mut(authorizer_id)
            .ok_or_else(|| ApiError::NotFound(format!("Invalid authorizer ID specified: {authorizer_id}")))?;
        if let Some(operation) = patch.iter().find(|op| op.path == "/authorizerUri") {
            *uri = operation.value.clone();
        }
        Ok(())
    }

    async fn create_deployment(&self, rest_api_id: &str, stage: &str) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record("create_deployment")?;
        store.rest_api(rest_api_id)?;
        store.deployments.push((rest_api_id.to_string(), stage.to_string()));
        Ok(())
    }

    async fn get_ws_api(&self, api_id: &str) -> ApiResult<WsApi> {
        let mut store = self.state.write().await;
        store.record("get_ws_api")?;
        store.ws_api(api_id).cloned()
    }

    async fn get_routes(&self, api_id: &str) -> ApiResult<Vec<WsRoute>> {
        let mut store = self.state.write().await;
        store.record("get_routes")?;
        store.ws_api(api_id)?;
        Ok(store.routes.clone())
    }

    async fn get_ws_integration(&self, api_id: &str, integration_id: &str) -> ApiResult<WsIntegration> {
        let mut store = self.state.write().await;
        store.record("get_ws_integration")?;
        store.ws_api(api_id)?;
        store
            .ws_integrations
            .get(integration_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("Invalid Integration identifier specified: {integration_id}")))
    }

    async fn update_ws_integration(&self, api_id: &str, integration: &WsIntegration) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record("update_ws_integration")?;
        store.ws_api(api_id)?;
        store
            .ws_integrations
            .insert(integration.integration_id.clone(), integration.clone());
        Ok(())
    }

    async fn get_ws_authorizer(&self, api_id: &str, authorizer_id: &str) -> ApiResult<WsAuthorizer> {
        let mut store = self.state.write().await;
        store.record("get_ws_authorizer")?;
        store.ws_api(api_id)?;
        store
            .ws_authorizers
            .get(authorizer_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("Invalid Authorizer identifier specified: {authorizer_id}")))
    }

    async fn update_ws_authorizer(&self, api_id: &str, authorizer: &WsAuthorizer) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record("update_ws_authorizer")?;
        store.ws_api(api_id)?;
        store
            .ws_authorizers
            .insert(authorizer.authorizer_id.clone(), authorizer.clone());
        Ok(())
    }

    async fn create_ws_deployment(&self, api_id: &str, stage: &str) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record("create_ws_deployment")?;
        store.ws_api(api_id)?;
        store.deployments.push((api_id.to_string(), stage.to_string()));
        Ok(())
    }
}
