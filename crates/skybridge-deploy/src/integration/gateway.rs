//! REST and WebSocket gateway wiring

use super::WiringSummary;
use crate::api::{FunctionApi, GatewayApi};
use crate::arn;
use crate::error::{ApiError, ApiResult};
use crate::model::{PatchOperation, RestResource, WsAuthorizer, WsIntegration, WsRoute};
use crate::paths;
use crate::permission::{upsert_invoke_permission, GATEWAY_PRINCIPAL};
use crate::unit::DeploymentUnit;
use skybridge_config::{ConfigTree, ResolvedConfig};
use skybridge_merge::field_map;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Stage variable naming the alias a gateway stage invokes
pub const STAGE_ALIAS_VARIABLE: &str = "${stageVariables.lambdaAlias}";

const AUTHORIZER_TYPE_REQUEST: &str = "REQUEST";

/// `apiGateway.*` settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub rest_api_id: String,
    pub ws_api_id: Option<String>,
    /// Prefix joined in front of relative resource paths
    pub resource_prefix: String,
    pub region: String,
    /// Stage deployed after wiring
    pub stage: String,
}

impl GatewaySettings {
    /// `None` when no REST API is configured, which disables gateway wiring
    pub fn from_snapshot(snapshot: &ResolvedConfig) -> Option<Self> {
        let tree = snapshot.tree();
        let rest_api_id = tree.get_string("apigateway.restapiid");
        if rest_api_id.is_empty() {
            return None;
        }
        let ws_api_id = tree.get_string("apigateway.wsapiid");
        Some(Self {
            rest_api_id,
            ws_api_id: (!ws_api_id.is_empty()).then_some(ws_api_id),
            resource_prefix: tree.get_string("apigateway.resourceprefix"),
            region: snapshot.region(),
            stage: snapshot.stage(),
        })
    }

    /// Absolute gateway path for a configured resource path
    pub fn resource_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            paths::clean(path)
        } else {
            paths::join(&["/", &self.resource_prefix, path])
        }
    }
}

/// Gateway state fetched once per run
#[derive(Debug, Default)]
struct GatewayIndex {
    resources: Vec<RestResource>,
    routes: Vec<WsRoute>,
}

impl GatewayIndex {
    fn resource(&self, path: &str) -> Option<&RestResource> {
        self.resources.iter().find(|resource| resource.path == path)
    }

    fn route(&self, route_key: &str) -> Option<&WsRoute> {
        self.routes.iter().find(|route| route.route_key == route_key)
    }
}

/// The parts of a bound unit the wiring needs
struct BoundUnit<'a> {
    function_name: &'a str,
    config: &'a ConfigTree,
    stage: String,
    alias_arn: &'a str,
    account_id: String,
    /// Invocation URI through the stage alias variable
    invocation_uri: String,
}

/// Points gateway routes and authorizers at deployed aliases
pub struct GatewayWiring {
    gateway: Arc<dyn GatewayApi>,
    functions: Arc<dyn FunctionApi>,
    settings: GatewaySettings,
    dry_run: bool,
}

impl GatewayWiring {
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        functions: Arc<dyn FunctionApi>,
        settings: GatewaySettings,
        dry_run: bool,
    ) -> Self {
        Self {
            gateway,
            functions,
            settings,
            dry_run,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Wire every bound unit
    ///
    /// Fails only when the configured APIs or their resources cannot be
    /// read; individual route failures are counted in the summary.
    #[instrument(skip(self, units), fields(rest_api = %self.settings.rest_api_id))]
    pub async fn wire(&self, units: &[DeploymentUnit]) -> ApiResult<WiringSummary> {
        info!("Querying API gateway");
        let index = self.index().await?;
        let mut summary = WiringSummary::default();

        for unit in units.iter().filter(|unit| unit.is_bound()) {
            let Some(bound) = self.bind(unit) else {
                continue;
            };
            info!(function = %bound.function_name, "Activating function on API gateway");
            summary += self.wire_rest(&bound, &index).await;
            if let Some(ws_api_id) = &self.settings.ws_api_id {
                summary += self.wire_ws(ws_api_id, &bound, &index).await;
            }
            summary += self.wire_authorizers(&bound).await;
        }
        Ok(summary)
    }

    /// Create a deployment of the stage on the REST API and, when
    /// configured, the WebSocket API
    ///
    /// A WebSocket deployment failure is logged; the REST outcome is returned.
    pub async fn deploy_stage(&self) -> ApiResult<()> {
        let stage = &self.settings.stage;
        info!(stage = %stage, "Deploying stage");
        if self.dry_run {
            warn!(stage = %stage, "Dry run, skipping stage deployment");
            return Ok(());
        }

        let rest = self
            .gateway
            .create_deployment(&self.settings.rest_api_id, stage)
            .await;
        if let Some(ws_api_id) = &self.settings.ws_api_id {
            if let Err(e) = self.gateway.create_ws_deployment(ws_api_id, stage).await {
                error!(api = %ws_api_id, error = %e, "Failed to deploy WebSocket stage");
            }
        }
        rest
    }

    async fn index(&self) -> ApiResult<GatewayIndex> {
        self.gateway.get_rest_api(&self.settings.rest_api_id).await?;
        let resources = self.gateway.get_resources(&self.settings.rest_api_id).await?;

        let routes = match &self.settings.ws_api_id {
            Some(ws_api_id) => {
                self.gateway.get_ws_api(ws_api_id).await?;
                self.gateway.get_routes(ws_api_id).await?
            }
            None => Vec::new(),
        };
        debug!(resources = resources.len(), routes = routes.len(), "Gateway indexed");
        Ok(GatewayIndex { resources, routes })
    }

    fn bind<'a>(&self, unit: &'a DeploymentUnit) -> Option<BoundUnit<'a>> {
        let identifiers = unit.identifiers.as_ref()?;
        let Some(account_id) = arn::account_id(&identifiers.function_arn) else {
            error!(
                function = %unit.function_name,
                arn = %identifiers.function_arn,
                "Cannot derive account from function ARN"
            );
            return None;
        };
        let target = format!("{}:{}", identifiers.function_arn, STAGE_ALIAS_VARIABLE);
        Some(BoundUnit {
            function_name: &unit.function_name,
            config: &unit.config,
            stage: unit.stage(),
            alias_arn: &identifiers.alias_arn,
            account_id,
            invocation_uri: arn::lambda_invocation_uri(&self.settings.region, &target).to_string(),
        })
    }

    async fn wire_rest(&self, unit: &BoundUnit<'_>, index: &GatewayIndex) -> WiringSummary {
        let mut summary = WiringSummary::default();

        for entry in listed(unit.config, "api.resources", "api.resource") {
            let Some((method, path)) = entry.split_once(':') else {
                error!(function = %unit.function_name, resource = %entry, "Resource must read method:path");
                summary.failed += 1;
                continue;
            };
            let method = method.to_uppercase();
            let full_path = self.settings.resource_path(path);

            let Some(resource) = index.resource(&full_path) else {
                error!(function = %unit.function_name, path = %full_path, "Gateway resource not found");
                summary.failed += 1;
                continue;
            };

            info!(method = %method, path = %full_path, "Updating integration");
            if self.dry_run {
                warn!(method = %method, path = %full_path, "Dry run, skipping integration update");
                summary.planned += 1;
                continue;
            }

            let patch = [PatchOperation::replace("/uri", &unit.invocation_uri)];
            if let Err(e) = self
                .gateway
                .update_integration(&self.settings.rest_api_id, &resource.id, &method, &patch)
                .await
            {
                error!(method = %method, path = %full_path, error = %e, "Failed to update integration");
                summary.failed += 1;
                continue;
            }

            let source_arn = arn::invoke_api_arn(
                &self.settings.region,
                &unit.account_id,
                &self.settings.rest_api_id,
                &unit.stage,
                &method,
                &full_path,
            );
            self.grant(unit, &source_arn.to_string(), &mut summary).await;
        }
        summary
    }

    async fn wire_ws(&self, ws_api_id: &str, unit: &BoundUnit<'_>, index: &GatewayIndex) -> WiringSummary {
        let mut summary = WiringSummary::default();

        for route_key in listed(unit.config, "api.wsresources", "api.wsresource") {
            let Some(route) = index.route(&route_key) else {
                error!(function = %unit.function_name, route = %route_key, "WebSocket route not found");
                summary.failed += 1;
                continue;
            };
            let Some(integration_id) = route.integration_id() else {
                error!(route = %route_key, "WebSocket route has no integration target");
                summary.failed += 1;
                continue;
            };

            info!(route = %route_key, "Updating integration");
            if self.dry_run {
                warn!(route = %route_key, "Dry run, skipping integration update");
                summary.planned += 1;
                continue;
            }

            let integration = match self.ws_integration(ws_api_id, integration_id, &unit.invocation_uri).await {
                Ok(integration) => integration,
                Err(e) => {
                    error!(route = %route_key, error = %e, "Failed to read integration");
                    summary.failed += 1;
                    continue;
                }
            };
            if let Err(e) = self.gateway.update_ws_integration(ws_api_id, &integration).await {
                error!(route = %route_key, error = %e, "Failed to update integration");
                summary.failed += 1;
                continue;
            }

            let source_arn = arn::invoke_ws_api_arn(
                &self.settings.region,
                &unit.account_id,
                ws_api_id,
                &route.route_key,
            );
            self.grant(unit, &source_arn.to_string(), &mut summary).await;
        }
        summary
    }

    /// Lambda proxy integration keeping the existing integration's
    /// connection, credentials, request mapping and description
    async fn ws_integration(
        &self,
        ws_api_id: &str,
        integration_id: &str,
        invocation_uri: &str,
    ) -> ApiResult<WsIntegration> {
        let mut integration = WsIntegration::lambda_proxy(integration_id, invocation_uri);
        match self.gateway.get_ws_integration(ws_api_id, integration_id).await {
            Ok(existing) => {
                let preserved = field_map!(WsIntegration => WsIntegration {
                    connection_id,
                    credentials_arn,
                    request_parameters,
                    request_templates,
                    template_selection_expression,
                    description,
                });
                preserved
                    .merge(&existing, &mut integration, Vec::new())
                    .map_err(|e| ApiError::Decode(e.to_string()))?;
                Ok(integration)
            }
            Err(ApiError::NotFound(_)) => Ok(integration),
            Err(e) => Err(e),
        }
    }

    async fn wire_authorizers(&self, unit: &BoundUnit<'_>) -> WiringSummary {
        let mut summary = WiringSummary::default();

        let authorizer_id = unit.config.get_string("api.authorizerid");
        if !authorizer_id.is_empty() {
            info!(authorizer = %authorizer_id, "Updating authorizer");
            if self.dry_run {
                warn!(authorizer = %authorizer_id, "Dry run, skipping authorizer update");
                summary.planned += 1;
            } else {
                let patch = [PatchOperation::replace("/authorizerUri", &unit.invocation_uri)];
                match self
                    .gateway
                    .update_authorizer(&self.settings.rest_api_id, &authorizer_id, &patch)
                    .await
                {
                    Ok(()) => {
                        let source_arn = arn::authorizer_arn(
                            &self.settings.region,
                            &unit.account_id,
                            &self.settings.rest_api_id,
                            &authorizer_id,
                        );
                        self.grant(unit, &source_arn.to_string(), &mut summary).await;
                    }
                    Err(e) => {
                        error!(authorizer = %authorizer_id, error = %e, "Failed to update authorizer");
                        summary.failed += 1;
                    }
                }
            }
        }

        let ws_authorizer_id = unit.config.get_string("api.wsauthorizerid");
        if let (Some(ws_api_id), false) = (&self.settings.ws_api_id, ws_authorizer_id.is_empty()) {
            info!(authorizer = %ws_authorizer_id, "Updating authorizer");
            if self.dry_run {
                warn!(authorizer = %ws_authorizer_id, "Dry run, skipping authorizer update");
                summary.planned += 1;
                return summary;
            }
            match self.ws_authorizer(ws_api_id, &ws_authorizer_id, &unit.invocation_uri).await {
                Ok(authorizer) => {
                    if let Err(e) = self.gateway.update_ws_authorizer(ws_api_id, &authorizer).await {
                        error!(authorizer = %ws_authorizer_id, error = %e, "Failed to update authorizer");
                        summary.failed += 1;
                        return summary;
                    }
                    let source_arn = arn::authorizer_arn(
                        &self.settings.region,
                        &unit.account_id,
                        ws_api_id,
                        &ws_authorizer_id,
                    );
                    self.grant(unit, &source_arn.to_string(), &mut summary).await;
                }
                Err(e) => {
                    error!(authorizer = %ws_authorizer_id, error = %e, "Failed to read authorizer");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// The existing authorizer re-pointed at `invocation_uri`
    async fn ws_authorizer(
        &self,
        ws_api_id: &str,
        authorizer_id: &str,
        invocation_uri: &str,
    ) -> ApiResult<WsAuthorizer> {
        let existing = self.gateway.get_ws_authorizer(ws_api_id, authorizer_id).await?;
        let mut authorizer = WsAuthorizer {
            authorizer_id: authorizer_id.to_string(),
            ..WsAuthorizer::default()
        };
        let preserved = field_map!(WsAuthorizer => WsAuthorizer {
            name,
            authorizer_result_ttl_in_seconds,
            authorizer_credentials_arn,
            authorizer_type,
            identity_source,
            identity_validation_expression,
        });
        preserved
            .merge(&existing, &mut authorizer, Vec::new())
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        if authorizer.authorizer_type.is_none() {
            authorizer.authorizer_type = Some(AUTHORIZER_TYPE_REQUEST.to_string());
        }
        authorizer.authorizer_uri = Some(invocation_uri.to_string());
        Ok(authorizer)
    }

    async fn grant(&self, unit: &BoundUnit<'_>, source_arn: &str, summary: &mut WiringSummary) {
        match upsert_invoke_permission(self.functions.as_ref(), unit.alias_arn, GATEWAY_PRINCIPAL, source_arn).await {
            Ok(()) => {
                debug!(function = %unit.function_name, source = %source_arn, "Granted gateway invoke permission");
                summary.applied += 1;
            }
            Err(e) => {
                error!(function = %unit.function_name, source = %source_arn, error = %e, "Failed to grant invoke permission");
                summary.failed += 1;
            }
        }
    }
}

/// List-valued key plus an optional single-valued companion key
fn listed(config: &ConfigTree, many: &str, one: &str) -> Vec<String> {
    let mut entries = config.get_string_vec(many);
    let single = config.get_string(one);
    if !single.is_empty() {
        entries.push(single);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybridge_config::RunSettings;

    #[test]
    fn test_settings_from_snapshot() {
        let doc = r#"
apiGateway: { restApiId: abc, wsApiId: ws1, resourcePrefix: /v1 }
serverless: { functions: {} }
"#;
        let snapshot = ResolvedConfig::from_yaml(doc, &RunSettings::default()).unwrap();
        let settings = GatewaySettings::from_snapshot(&snapshot).unwrap();
        assert_eq!(settings.rest_api_id, "abc");
        assert_eq!(settings.ws_api_id.as_deref(), Some("ws1"));
        assert_eq!(settings.stage, "dev");
        assert_eq!(settings.resource_path("hello"), "/v1/hello");
        assert_eq!(settings.resource_path("/health/"), "/health");

        let bare = ResolvedConfig::from_yaml("serverless: { functions: {} }", &RunSettings::default()).unwrap();
        assert!(GatewaySettings::from_snapshot(&bare).is_none());
    }

    #[test]
    fn test_listed_appends_single_entry() {
        let config = ConfigTree::from_yaml(
            "api: { resources: ['get:/a', 'post:/a'], resource: 'delete:/a' }",
        )
        .unwrap();
        assert_eq!(
            listed(&config, "api.resources", "api.resource"),
            vec!["get:/a", "post:/a", "delete:/a"]
        );
        assert!(listed(&config, "api.wsresources", "api.wsresource").is_empty());
    }
}
