//! Gateway and identity-pool wiring of bound aliases

use skybridge_config::{ConfigTree, ResolvedConfig, RunSettings};
use skybridge_deploy::integration::{GatewaySettings, GatewayWiring};
use skybridge_deploy::memory::{InMemoryFunctionApi, InMemoryGatewayApi, InMemoryIdentityPoolApi, PrebuiltBuilder};
use skybridge_deploy::model::{FunctionConfiguration, WsAuthorizer, WsIntegration};
use skybridge_deploy::permission::{GATEWAY_PRINCIPAL, IDENTITY_PRINCIPAL};
use skybridge_deploy::{
    statement_id, upsert_invoke_permission, ApiError, Collaborators, ConvergenceState, DeploymentUnit, Pipeline,
    RunReport, UnitIdentifiers,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const FUNCTION_ARN: &str = "arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello";
const ALIAS_ARN: &str = "arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello:dev";

fn invocation_uri() -> String {
    format!(
        "arn:aws:apigateway:ap-southeast-1:lambda:path/2015-03-31/functions/{FUNCTION_ARN}:${{stageVariables.lambdaAlias}}/invocations"
    )
}

struct Harness {
    functions: Arc<InMemoryFunctionApi>,
    gateway: Arc<InMemoryGatewayApi>,
    identity: Arc<InMemoryIdentityPoolApi>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new(gateway: InMemoryGatewayApi, identity: InMemoryIdentityPoolApi) -> Self {
        Self {
            functions: Arc::new(InMemoryFunctionApi::new()),
            gateway: Arc::new(gateway),
            identity: Arc::new(identity),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    async fn run(&self, document: &str, settings: RunSettings) -> RunReport {
        let snapshot = ResolvedConfig::from_yaml(document, &settings).unwrap();
        Pipeline::new(Collaborators {
            functions: self.functions.clone(),
            gateway: self.gateway.clone(),
            identity: self.identity.clone(),
            builder: Arc::new(PrebuiltBuilder::new(self.dir.path())),
        })
        .run(&snapshot)
        .await
    }
}

const REST: &str = r#"
defaults: { stage: dev, runtime: nodejs18.x, role: "arn:aws:iam::123456789012:role/lambda" }
apiGateway: { restApiId: abc, resourcePrefix: /v1 }
serverless:
  prefix: app-
  functions:
    hello:
      handler: index.handler
      api:
        resources: ["get:hello", "post:/v1/hello"]
        resource: "get:missing"
        authorizerId: auth1
"#;

#[tokio::test]
async fn test_rest_routes_and_authorizer_point_at_the_alias() {
    let gateway = InMemoryGatewayApi::new()
        .with_rest_api("abc", &["/", "/v1", "/v1/hello"])
        .with_authorizer("auth1");
    let harness = Harness::new(gateway, InMemoryIdentityPoolApi::new());
    let report = harness.run(REST, RunSettings::default()).await;

    assert!(!report.has_failures());
    let summary = report.gateway.unwrap();
    assert_eq!(summary.applied, 3);
    assert_eq!(summary.failed, 1);

    let uri = invocation_uri();
    assert_eq!(harness.gateway.integration_uri("/v1/hello", "GET").await, Some(uri.clone()));
    assert_eq!(harness.gateway.integration_uri("/v1/hello", "POST").await, Some(uri.clone()));
    assert_eq!(harness.gateway.authorizer_uri("auth1").await, Some(uri));

    let permissions = harness.functions.permissions(ALIAS_ARN).await;
    assert_eq!(permissions.len(), 3);
    assert!(permissions.iter().all(|p| p.principal == GATEWAY_PRINCIPAL));
    assert!(permissions.iter().all(|p| p.action == "lambda:InvokeFunction"));

    let get_arn = "arn:aws:execute-api:ap-southeast-1:123456789012:abc/dev/GET/v1/hello";
    let get = permissions
        .iter()
        .find(|p| p.source_arn.as_deref() == Some(get_arn))
        .unwrap();
    assert_eq!(get.statement_id, statement_id(get_arn));
    assert!(permissions.iter().any(|p| p.source_arn.as_deref()
        == Some("arn:aws:execute-api:ap-southeast-1:123456789012:abc/authorizers/auth1")));

    assert_eq!(
        harness.gateway.deployments().await,
        vec![("abc".to_string(), "dev".to_string())]
    );
}

#[tokio::test]
async fn test_rerun_replaces_permissions_instead_of_duplicating() {
    let gateway = InMemoryGatewayApi::new()
        .with_rest_api("abc", &["/v1/hello"])
        .with_authorizer("auth1");
    let harness = Harness::new(gateway, InMemoryIdentityPoolApi::new());

    harness.run(REST, RunSettings::default()).await;
    harness.run(REST, RunSettings::default()).await;

    assert_eq!(harness.functions.permissions(ALIAS_ARN).await.len(), 3);
    assert_eq!(harness.functions.count("remove_permission").await, 6);
    assert_eq!(harness.functions.count("add_permission").await, 6);
    assert_eq!(harness.gateway.deployments().await.len(), 2);
}

#[tokio::test]
async fn test_websocket_wiring_preserves_existing_settings() {
    let existing = WsIntegration {
        integration_id: "int1".to_string(),
        connection_id: Some("vpc-link".to_string()),
        description: Some("chat".to_string()),
        template_selection_expression: Some("\\$default".to_string()),
        integration_uri: Some("arn:old".to_string()),
        integration_type: Some("MOCK".to_string()),
        ..WsIntegration::default()
    };
    let authorizer = WsAuthorizer {
        authorizer_id: "wsauth".to_string(),
        name: Some("token-check".to_string()),
        authorizer_type: Some("REQUEST".to_string()),
        identity_source: Some(vec!["route.request.querystring.token".to_string()]),
        authorizer_uri: Some("arn:old".to_string()),
        ..WsAuthorizer::default()
    };
    let gateway = InMemoryGatewayApi::new()
        .with_rest_api("abc", &["/v1/hello"])
        .with_ws_api("ws1", &[("$connect", "int1")])
        .with_ws_integration(existing)
        .with_ws_authorizer(authorizer);
    let doc = r#"
defaults: { stage: dev, runtime: nodejs18.x, role: "arn:aws:iam::123456789012:role/lambda" }
apiGateway: { restApiId: abc, wsApiId: ws1 }
serverless:
  prefix: app-
  functions:
    hello:
      handler: index.handler
      api:
        wsResource: "$connect"
        wsAuthorizerId: wsauth
"#;
    let harness = Harness::new(gateway, InMemoryIdentityPoolApi::new());
    let report = harness.run(doc, RunSettings::default()).await;
    assert_eq!(report.gateway.unwrap().applied, 2);

    let integration = harness.gateway.ws_integration("int1").await.unwrap();
    assert_eq!(integration.integration_uri, Some(invocation_uri()));
    assert_eq!(integration.integration_type.as_deref(), Some("AWS_PROXY"));
    assert_eq!(integration.timeout_in_millis, Some(29_000));
    assert_eq!(integration.connection_id.as_deref(), Some("vpc-link"));
    assert_eq!(integration.description.as_deref(), Some("chat"));
    assert_eq!(integration.template_selection_expression.as_deref(), Some("\\$default"));

    let authorizer = harness.gateway.ws_authorizer("wsauth").await.unwrap();
    assert_eq!(authorizer.authorizer_uri, Some(invocation_uri()));
    assert_eq!(authorizer.name.as_deref(), Some("token-check"));
    assert_eq!(
        authorizer.identity_source,
        Some(vec!["route.request.querystring.token".to_string()])
    );

    let sources: Vec<String> = harness
        .functions
        .permissions(ALIAS_ARN)
        .await
        .into_iter()
        .filter_map(|p| p.source_arn)
        .collect();
    assert!(sources.contains(&"arn:aws:execute-api:ap-southeast-1:123456789012:ws1/*/$connect".to_string()));
    assert!(sources.contains(&"arn:aws:execute-api:ap-southeast-1:123456789012:ws1/authorizers/wsauth".to_string()));

    let deployments = harness.gateway.deployments().await;
    assert!(deployments.contains(&("ws1".to_string(), "dev".to_string())));
}

#[tokio::test]
async fn test_functions_only_skips_every_integration() {
    let gateway = InMemoryGatewayApi::new().with_rest_api("abc", &["/v1/hello"]);
    let harness = Harness::new(gateway, InMemoryIdentityPoolApi::new());
    let settings = RunSettings {
        functions_only: true,
        ..RunSettings::default()
    };
    let report = harness.run(REST, settings).await;

    assert_eq!(report.deployed(), 1);
    assert!(report.gateway.is_none());
    assert!(harness.gateway.calls().await.is_empty());
}

#[tokio::test]
async fn test_unreadable_gateway_aborts_only_the_gateway_phase() {
    let gateway = InMemoryGatewayApi::new()
        .with_rest_api("abc", &["/v1/hello"])
        .fail("get_resources");
    let harness = Harness::new(gateway, InMemoryIdentityPoolApi::new());
    let report = harness.run(REST, RunSettings::default()).await;

    assert!(!report.has_failures());
    assert_eq!(report.deployed(), 1);
    assert_eq!(report.gateway.unwrap().failed, 1);
    assert!(!harness.gateway.calls().await.contains(&"update_integration".to_string()));
    assert_eq!(harness.gateway.deployments().await.len(), 1);
}

#[tokio::test]
async fn test_identity_pool_triggers_point_at_the_alias() {
    let identity = InMemoryIdentityPoolApi::new().with_pool("ap-southeast-1_pool", "ap-southeast-1");
    let doc = r#"
defaults: { stage: dev, runtime: nodejs18.x, role: "arn:aws:iam::123456789012:role/lambda" }
cognito: { userPools: { dev: ap-southeast-1_pool } }
serverless:
  prefix: app-
  functions:
    hello:
      handler: index.handler
      cognito: { triggers: [PreSignUp, OnBirthday] }
"#;
    let harness = Harness::new(InMemoryGatewayApi::new(), identity);
    let report = harness.run(doc, RunSettings::default()).await;

    assert_eq!(report.identity.unwrap().applied, 1);
    let pool = harness.identity.pool("ap-southeast-1_pool").await.unwrap();
    assert_eq!(pool.lambda_config.pre_sign_up.as_deref(), Some(ALIAS_ARN));
    assert!(pool.lambda_config.post_confirmation.is_none());

    let permissions = harness.functions.permissions(ALIAS_ARN).await;
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].principal, IDENTITY_PRINCIPAL);
    assert_eq!(permissions[0].source_arn.as_deref(), Some(pool.arn.as_str()));
}

#[tokio::test]
async fn test_dry_run_wiring_applies_nothing() {
    let gateway = Arc::new(
        InMemoryGatewayApi::new()
            .with_rest_api("abc", &["/v1/hello"])
            .with_authorizer("auth1"),
    );
    let functions = Arc::new(InMemoryFunctionApi::new());
    let settings = GatewaySettings {
        rest_api_id: "abc".to_string(),
        ws_api_id: None,
        resource_prefix: "/v1".to_string(),
        region: "ap-southeast-1".to_string(),
        stage: "dev".to_string(),
    };
    let wiring = GatewayWiring::new(gateway.clone(), functions.clone(), settings, true);

    let config = ConfigTree::from_yaml(
        "stage: dev\napi: { resources: ['get:hello'], authorizerId: auth1 }",
    )
    .unwrap();
    let mut unit = DeploymentUnit::new("hello", "app-hello", "hello.zip", config);
    unit.state = ConvergenceState::AliasBound;
    unit.identifiers = Some(UnitIdentifiers {
        function_arn: FUNCTION_ARN.to_string(),
        version: "1".to_string(),
        alias_arn: ALIAS_ARN.to_string(),
        revision_id: "rev-1".to_string(),
    });

    let summary = wiring.wire(&[unit]).await.unwrap();
    wiring.deploy_stage().await.unwrap();

    assert_eq!(summary.planned, 2);
    assert_eq!(summary.applied, 0);
    assert_eq!(
        gateway.calls().await,
        vec!["get_rest_api".to_string(), "get_resources".to_string()]
    );
    assert!(functions.calls().await.is_empty());
}

#[tokio::test]
async fn test_permission_upsert_tolerates_missing_statement() {
    let functions = InMemoryFunctionApi::new().with_function(
        FunctionConfiguration {
            function_name: Some("app-hello".to_string()),
            ..FunctionConfiguration::default()
        },
        BTreeMap::new(),
    );
    let source = "arn:aws:execute-api:ap-southeast-1:123456789012:abc/dev/GET/v1/hello";

    upsert_invoke_permission(&functions, "app-hello", GATEWAY_PRINCIPAL, source)
        .await
        .unwrap();
    upsert_invoke_permission(&functions, "app-hello", GATEWAY_PRINCIPAL, source)
        .await
        .unwrap();
    assert_eq!(functions.permissions("app-hello").await.len(), 1);

    let failing = InMemoryFunctionApi::new().fail(
        "remove_permission",
        ApiError::Service {
            status: 403,
            code: "AccessDeniedException".to_string(),
            message: "denied".to_string(),
        },
    );
    let err = upsert_invoke_permission(&failing, "app-hello", GATEWAY_PRINCIPAL, source)
        .await
        .unwrap_err();
    assert!(!err.is_not_found());
    assert_eq!(failing.count("add_permission").await, 0);
}
