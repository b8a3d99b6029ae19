//! API gateway client: REST APIs through the v1 SDK, WebSocket APIs
//! through the v2 SDK

use crate::error::{api_error, Result};
use crate::sdk::{endpoint_override, hashed, int, narrow, owned, sorted, text, timeouts};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_apigateway::types::Op;
use aws_sdk_apigatewayv2::types::{
    AuthorizerType, ConnectionType, ContentHandlingStrategy, IntegrationType, PassthroughBehavior,
};
use skybridge_deploy::model::{
    PatchOperation, RestApi, RestResource, WsApi, WsAuthorizer, WsIntegration, WsRoute,
};
use skybridge_deploy::{ApiResult, GatewayApi};
use tracing::{debug, instrument};

const PAGE_LIMIT: i32 = 500;

/// [`GatewayApi`] over both gateway management SDKs
#[derive(Debug, Clone)]
pub struct GatewayClient {
    rest: aws_sdk_apigateway::Client,
    ws: aws_sdk_apigatewayv2::Client,
}

impl GatewayClient {
    /// Clients inheriting `config`; `endpoint` points both at an emulator
    pub fn new(config: &SdkConfig, endpoint: Option<&str>) -> Result<Self> {
        let mut rest = aws_sdk_apigateway::config::Builder::from(config).timeout_config(timeouts());
        let mut ws = aws_sdk_apigatewayv2::config::Builder::from(config).timeout_config(timeouts());
        if let Some(endpoint) = endpoint_override(endpoint)? {
            rest = rest.endpoint_url(&endpoint);
            ws = ws.endpoint_url(endpoint);
        }
        Ok(Self::from_clients(
            aws_sdk_apigateway::Client::from_conf(rest.build()),
            aws_sdk_apigatewayv2::Client::from_conf(ws.build()),
        ))
    }

    pub fn from_clients(rest: aws_sdk_apigateway::Client, ws: aws_sdk_apigatewayv2::Client) -> Self {
        Self { rest, ws }
    }
}

fn patch_operations(patch: &[PatchOperation]) -> Vec<aws_sdk_apigateway::types::PatchOperation> {
    patch
        .iter()
        .map(|operation| {
            aws_sdk_apigateway::types::PatchOperation::builder()
                .op(Op::from(operation.op.as_str()))
                .path(&operation.path)
                .value(&operation.value)
                .build()
        })
        .collect()
}

#[async_trait]
impl GatewayApi for GatewayClient {
    #[instrument(skip(self))]
    async fn get_rest_api(&self, rest_api_id: &str) -> ApiResult<RestApi> {
        let output = self
            .rest
            .get_rest_api()
            .rest_api_id(rest_api_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(RestApi {
            id: text(output.id()),
            name: text(output.name()),
        })
    }

    #[instrument(skip(self))]
    async fn get_resources(&self, rest_api_id: &str) -> ApiResult<Vec<RestResource>> {
        let mut resources = Vec::new();
        let mut position: Option<String> = None;
        loop {
            let page = self
                .rest
                .get_resources()
                .rest_api_id(rest_api_id)
                .limit(PAGE_LIMIT)
                .set_position(position.take())
                .send()
                .await
                .map_err(api_error)?;
            resources.extend(page.items().iter().map(|resource| RestResource {
                id: text(resource.id()),
                path: text(resource.path()),
                parent_id: owned(resource.parent_id()),
                path_part: owned(resource.path_part()),
            }));
            match page.position().filter(|p| !p.is_empty()) {
                Some(next) => position = Some(next.to_string()),
                None => break,
            }
        }
        debug!(count = resources.len(), "Fetched REST resources");
        Ok(resources)
    }

    #[instrument(skip(self, patch))]
    async fn update_integration(
        &self,
        rest_api_id: &str,
        resource_id: &str,
        http_method: &str,
        patch: &[PatchOperation],
    ) -> ApiResult<()> {
        self.rest
            .update_integration()
            .rest_api_id(rest_api_id)
            .resource_id(resource_id)
            .http_method(http_method)
            .set_patch_operations(Some(patch_operations(patch)))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip(self, patch))]
    async fn update_authorizer(
        &self,
        rest_api_id: &str,
        authorizer_id: &str,
        patch: &[PatchOperation],
    ) -> ApiResult<()> {
        self.rest
            .update_authorizer()
            .rest_api_id(rest_api_id)
            .authorizer_id(authorizer_id)
            .set_patch_operations(Some(patch_operations(patch)))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_deployment(&self, rest_api_id: &str, stage: &str) -> ApiResult<()> {
        self.rest
            .create_deployment()
            .rest_api_id(rest_api_id)
            .stage_name(stage)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_ws_api(&self, api_id: &str) -> ApiResult<WsApi> {
        let output = self
            .ws
            .get_api()
            .api_id(api_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(WsApi {
            api_id: text(output.api_id()),
            name: text(output.name()),
            protocol_type: output.protocol_type().map(|p| p.as_str().to_string()),
        })
    }

    #[instrument(skip(self))]
    async fn get_routes(&self, api_id: &str) -> ApiResult<Vec<WsRoute>> {
        let mut routes = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .ws
                .get_routes()
                .api_id(api_id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(api_error)?;
            routes.extend(page.items().iter().map(|route| WsRoute {
                route_id: text(route.route_id()),
                route_key: text(route.route_key()),
                target: owned(route.target()),
            }));
            match page.next_token().filter(|t| !t.is_empty()) {
                Some(next) => next_token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(routes)
    }

    #[instrument(skip(self))]
    async fn get_ws_integration(&self, api_id: &str, integration_id: &str) -> ApiResult<WsIntegration> {
        let output = self
            .ws
            .get_integration()
            .api_id(api_id)
            .integration_id(integration_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(WsIntegration {
            integration_id: text(output.integration_id()),
            connection_id: owned(output.connection_id()),
            connection_type: output.connection_type().map(|v| v.as_str().to_string()),
            content_handling_strategy: output
                .content_handling_strategy()
                .map(|v| v.as_str().to_string()),
            credentials_arn: owned(output.credentials_arn()),
            description: owned(output.description()),
            integration_method: owned(output.integration_method()),
            integration_type: output.integration_type().map(|v| v.as_str().to_string()),
            integration_uri: owned(output.integration_uri()),
            passthrough_behavior: output.passthrough_behavior().map(|v| v.as_str().to_string()),
            request_parameters: sorted(output.request_parameters()),
            request_templates: sorted(output.request_templates()),
            template_selection_expression: owned(output.template_selection_expression()),
            timeout_in_millis: int(output.timeout_in_millis()),
        })
    }

    #[instrument(skip_all, fields(api = %api_id, integration = %integration.integration_id))]
    async fn update_ws_integration(&self, api_id: &str, integration: &WsIntegration) -> ApiResult<()> {
        self.ws
            .update_integration()
            .api_id(api_id)
            .integration_id(&integration.integration_id)
            .set_connection_id(integration.connection_id.clone())
            .set_connection_type(integration.connection_type.as_deref().map(ConnectionType::from))
            .set_content_handling_strategy(
                integration
                    .content_handling_strategy
                    .as_deref()
                    .map(ContentHandlingStrategy::from),
            )
            .set_credentials_arn(integration.credentials_arn.clone())
            .set_description(integration.description.clone())
            .set_integration_method(integration.integration_method.clone())
            .set_integration_type(integration.integration_type.as_deref().map(IntegrationType::from))
            .set_integration_uri(integration.integration_uri.clone())
            .set_passthrough_behavior(
                integration
                    .passthrough_behavior
                    .as_deref()
                    .map(PassthroughBehavior::from),
            )
            .set_request_parameters(integration.request_parameters.as_ref().map(hashed))
            .set_request_templates(integration.request_templates.as_ref().map(hashed))
            .set_template_selection_expression(integration.template_selection_expression.clone())
            .set_timeout_in_millis(narrow(integration.timeout_in_millis))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_ws_authorizer(&self, api_id: &str, authorizer_id: &str) -> ApiResult<WsAuthorizer> {
        let output = self
            .ws
            .get_authorizer()
            .api_id(api_id)
            .authorizer_id(authorizer_id)
            .send()
            .await
            .map_err(api_error)?;
        let identity_source = output.identity_source();
        Ok(WsAuthorizer {
            authorizer_id: text(output.authorizer_id()),
            authorizer_credentials_arn: owned(output.authorizer_credentials_arn()),
            authorizer_result_ttl_in_seconds: int(output.authorizer_result_ttl_in_seconds()),
            authorizer_type: output.authorizer_type().map(|v| v.as_str().to_string()),
            authorizer_uri: owned(output.authorizer_uri()),
            identity_source: (!identity_source.is_empty()).then(|| identity_source.to_vec()),
            identity_validation_expression: owned(output.identity_validation_expression()),
            name: owned(output.name()),
        })
    }

    #[instrument(skip_all, fields(api = %api_id, authorizer = %authorizer.authorizer_id))]
    async fn update_ws_authorizer(&self, api_id: &str, authorizer: &WsAuthorizer) -> ApiResult<()> {
        self.ws
            .update_authorizer()
            .api_id(api_id)
            .authorizer_id(&authorizer.authorizer_id)
            .set_authorizer_credentials_arn(authorizer.authorizer_credentials_arn.clone())
            .set_authorizer_result_ttl_in_seconds(narrow(authorizer.authorizer_result_ttl_in_seconds))
            .set_authorizer_type(authorizer.authorizer_type.as_deref().map(AuthorizerType::from))
            .set_authorizer_uri(authorizer.authorizer_uri.clone())
            .set_identity_source(authorizer.identity_source.clone())
            .set_identity_validation_expression(authorizer.identity_validation_expression.clone())
            .set_name(authorizer.name.clone())
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_ws_deployment(&self, api_id: &str, stage: &str) -> ApiResult<()> {
        self.ws
            .create_deployment()
            .api_id(api_id)
            .stage_name(stage)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}
