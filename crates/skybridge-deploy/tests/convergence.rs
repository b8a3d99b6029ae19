//! Per-unit convergence scenarios against the in-memory collaborators

use skybridge_config::{ResolvedConfig, RunSettings};
use skybridge_deploy::memory::{
    ApiCall, InMemoryFunctionApi, InMemoryGatewayApi, InMemoryIdentityPoolApi, PrebuiltBuilder,
};
use skybridge_deploy::model::{EnvironmentResponse, FunctionConfiguration};
use skybridge_deploy::{
    ApiError, Collaborators, Convergence, ConvergenceState, Converger, DeploymentUnit, Pipeline,
    RunReport, SettlePolicy, UnitOutcome,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const ROLE: &str = "arn:aws:iam::123456789012:role/lambda";

const HELLO: &str = r#"
defaults:
  stage: dev
  runtime: nodejs18.x
  role: "arn:aws:iam::123456789012:role/lambda"
serverless:
  prefix: app-
  functions:
    hello:
      handler: index.handler
"#;

struct Harness {
    functions: Arc<InMemoryFunctionApi>,
    builder: Arc<PrebuiltBuilder>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(functions: InMemoryFunctionApi) -> Self {
        Self::with_builder(functions, |builder| builder)
    }

    fn with_builder(functions: InMemoryFunctionApi, configure: impl FnOnce(PrebuiltBuilder) -> PrebuiltBuilder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            functions: Arc::new(functions),
            builder: Arc::new(configure(PrebuiltBuilder::new(dir.path().join("packages")))),
            _dir: dir,
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(Collaborators {
            functions: self.functions.clone(),
            gateway: Arc::new(InMemoryGatewayApi::new()),
            identity: Arc::new(InMemoryIdentityPoolApi::new()),
            builder: self.builder.clone(),
        })
        .with_settle_policy(SettlePolicy {
            attempts: 5,
            interval: Duration::from_millis(1),
        })
    }

    async fn run(&self, document: &str, settings: RunSettings) -> RunReport {
        let snapshot = ResolvedConfig::from_yaml(document, &settings).unwrap();
        self.pipeline().run(&snapshot).await
    }
}

fn deployed(name: &str) -> FunctionConfiguration {
    FunctionConfiguration {
        function_name: Some(name.to_string()),
        runtime: Some("nodejs18.x".to_string()),
        role: Some("arn:aws:iam::123456789012:role/remote".to_string()),
        handler: Some("index.handler".to_string()),
        memory_size: Some(512),
        timeout: Some(10),
        environment: Some(EnvironmentResponse {
            variables: BTreeMap::from([("EXISTING".to_string(), "1".to_string())]),
            error: None,
        }),
        ..FunctionConfiguration::default()
    }
}

#[tokio::test]
async fn test_new_function_is_created_published_and_aliased() {
    let harness = Harness::new(InMemoryFunctionApi::new());
    let report = harness.run(HELLO, RunSettings::default()).await;

    assert!(!report.has_failures());
    let unit = report.unit("hello").unwrap();
    assert_eq!(unit.function_name, "app-hello");
    assert_eq!(unit.outcome, UnitOutcome::Deployed { created: true });
    assert_eq!(unit.state, ConvergenceState::AliasBound);

    let api = &harness.functions;
    assert_eq!(api.count("create_function").await, 1);
    assert_eq!(api.count("update_function_code").await, 0);
    assert_eq!(api.count("publish_version").await, 1);
    assert_eq!(api.count("create_alias").await, 1);
    assert!(api.calls().await.contains(&ApiCall::CreateFunction("app-hello".to_string())));
    assert!(api.calls().await.contains(&ApiCall::CreateAlias {
        function: "app-hello".to_string(),
        alias: "dev".to_string(),
    }));

    let identifiers = unit.identifiers.as_ref().unwrap();
    assert_eq!(
        identifiers.function_arn,
        "arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello"
    );
    assert_eq!(identifiers.version, "1");
    assert!(identifiers.alias_arn.ends_with(":app-hello:dev"));
    assert!(!identifiers.revision_id.is_empty());

    let alias = api.alias("app-hello", "dev").await.unwrap();
    assert_eq!(alias.function_version, "1");
    assert_eq!(harness.builder.shutdown_count(), 1);
}

#[tokio::test]
async fn test_existing_function_is_updated_in_two_phases() {
    let api = InMemoryFunctionApi::new()
        .with_function(deployed("app-hello"), BTreeMap::new())
        .with_alias("app-hello", "dev", "3");
    let harness = Harness::new(api);
    let report = harness.run(HELLO, RunSettings::default()).await;

    let unit = report.unit("hello").unwrap();
    assert_eq!(unit.outcome, UnitOutcome::Deployed { created: false });

    let api = &harness.functions;
    assert_eq!(api.count("create_function").await, 0);
    assert_eq!(api.count("update_function_code").await, 1);
    assert_eq!(api.count("update_function_configuration").await, 1);
    assert_eq!(api.count("tag_resource").await, 1);
    assert_eq!(api.count("update_alias").await, 1);
    assert_eq!(api.count("create_alias").await, 0);

    let operations: Vec<&str> = api
        .mutations()
        .await
        .iter()
        .map(ApiCall::operation)
        .collect();
    assert_eq!(
        operations,
        vec![
            "update_function_code",
            "update_function_configuration",
            "tag_resource",
            "publish_version",
            "update_alias",
        ]
    );

    let alias = api.alias("app-hello", "dev").await.unwrap();
    assert_eq!(alias.function_version, "1");
}

#[tokio::test]
async fn test_remote_values_survive_unless_desired() {
    let doc = r#"
defaults:
  stage: dev
  runtime: nodejs18.x
serverless:
  prefix: app-
  functions:
    hello:
      handler: index.handler
      role: ""
      memorySize: 64
      timeout: 30
      environment: { log_level: debug }
      tags: { team: core }
"#;
    let api = InMemoryFunctionApi::new().with_function(
        deployed("app-hello"),
        BTreeMap::from([("owner".to_string(), "platform".to_string())]),
    );
    let harness = Harness::new(api);
    let report = harness.run(doc, RunSettings::default()).await;
    assert!(!report.has_failures(), "{report:?}");

    let function = harness.functions.function("app-hello").await.unwrap();
    assert_eq!(function.role.as_deref(), Some("arn:aws:iam::123456789012:role/remote"));
    assert_eq!(function.memory_size, Some(512));
    assert_eq!(function.timeout, Some(30));

    let variables = function.environment.unwrap().variables;
    assert_eq!(variables.get("EXISTING").map(String::as_str), Some("1"));
    assert_eq!(variables.get("LOG_LEVEL").map(String::as_str), Some("debug"));

    let tags = harness.functions.tags("app-hello").await;
    assert_eq!(tags.get("owner").map(String::as_str), Some("platform"));
    assert_eq!(tags.get("team").map(String::as_str), Some("core"));
}

#[tokio::test]
async fn test_dry_run_makes_no_state_changing_calls() {
    let api = InMemoryFunctionApi::new().with_function(deployed("app-world"), BTreeMap::new());
    let harness = Harness::new(api);
    let doc = r#"
defaults: { stage: dev, runtime: nodejs18.x, role: "arn:aws:iam::123456789012:role/lambda" }
serverless:
  prefix: app-
  functions:
    hello: { handler: index.handler }
    world: { handler: index.handler }
"#;
    let settings = RunSettings {
        dry_run: true,
        ..RunSettings::default()
    };
    let report = harness.run(doc, settings).await;

    assert!(harness.functions.mutations().await.is_empty());
    assert_eq!(harness.functions.count("get_function").await, 2);

    let hello = report.unit("hello").unwrap();
    assert_eq!(hello.outcome, UnitOutcome::DryRun { create: true });
    assert_eq!(hello.state, ConvergenceState::Creating);
    assert!(hello.identifiers.is_none());

    let world = report.unit("world").unwrap();
    assert_eq!(world.outcome, UnitOutcome::DryRun { create: false });
    assert_eq!(world.state, ConvergenceState::Updating);
    assert!(world.identifiers.is_none());
    assert_eq!(report.planned(), 2);
}

#[tokio::test]
async fn test_alias_update_failure_keeps_existing_alias() {
    let api = InMemoryFunctionApi::new()
        .with_function(deployed("app-hello"), BTreeMap::new())
        .with_alias("app-hello", "dev", "3")
        .fail(
            "update_alias",
            ApiError::Service {
                status: 500,
                code: "ServiceException".to_string(),
                message: "try again".to_string(),
            },
        );
    let harness = Harness::new(api);
    let report = harness.run(HELLO, RunSettings::default()).await;

    let unit = report.unit("hello").unwrap();
    assert_eq!(unit.outcome, UnitOutcome::Deployed { created: false });
    assert_eq!(unit.state, ConvergenceState::AliasBound);
    let identifiers = unit.identifiers.as_ref().unwrap();
    assert_eq!(
        identifiers.alias_arn,
        "arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello:dev"
    );
    assert_eq!(
        harness.functions.alias("app-hello", "dev").await.unwrap().function_version,
        "3"
    );
}

#[tokio::test]
async fn test_failing_units_do_not_stop_the_run() {
    let doc = r#"
defaults: { stage: dev, runtime: nodejs18.x, role: "arn:aws:iam::123456789012:role/lambda" }
serverless:
  prefix: app-
  functions:
    alpha: { handler: index.handler }
    bravo: { handler: index.handler }
    charlie: { handler: index.handler }
    delta: { handler: index.handler }
"#;
    let api = InMemoryFunctionApi::new().fail_for(
        "create_function",
        "app-bravo",
        ApiError::Transport("connection reset".to_string()),
    );
    let harness = Harness::with_builder(api, |builder| builder.failing("delta"));
    let report = harness.run(doc, RunSettings::default()).await;

    assert!(report.has_failures());
    assert_eq!(report.deployed(), 2);
    assert_eq!(report.failed(), 2);

    let bravo = report.unit("bravo").unwrap();
    assert!(matches!(bravo.outcome, UnitOutcome::Failed(ref reason) if reason.contains("connection reset")));
    assert_eq!(bravo.state, ConvergenceState::Creating);
    assert!(bravo.identifiers.is_none());

    let delta = report.unit("delta").unwrap();
    assert!(matches!(delta.outcome, UnitOutcome::BuildFailed(_)));
    assert_eq!(delta.state, ConvergenceState::Unseen);

    for name in ["alpha", "charlie"] {
        let unit = report.unit(name).unwrap();
        assert_eq!(unit.outcome, UnitOutcome::Deployed { created: true }, "{name}");
        assert!(unit.identifiers.is_some());
    }
    assert_eq!(harness.builder.shutdown_count(), 1);
}

const PAIR: &str = r#"
defaults: { stage: dev, runtime: nodejs18.x, role: "arn:aws:iam::123456789012:role/lambda" }
serverless:
  prefix: app-
  functions:
    hello: { handler: index.handler }
    world: { handler: index.handler }
"#;

#[tokio::test]
async fn test_tag_failure_still_deploys() {
    let api = InMemoryFunctionApi::new()
        .with_function(deployed("app-hello"), BTreeMap::new())
        .fail(
            "tag_resource",
            ApiError::Service {
                status: 400,
                code: "InvalidParameterValueException".to_string(),
                message: "too many tags".to_string(),
            },
        );
    let harness = Harness::new(api);
    let report = harness.run(HELLO, RunSettings::default()).await;

    assert!(!report.has_failures());
    let unit = report.unit("hello").unwrap();
    assert_eq!(unit.outcome, UnitOutcome::Deployed { created: false });
    assert_eq!(unit.state, ConvergenceState::AliasBound);
    assert!(unit.identifiers.is_some());

    let api = &harness.functions;
    assert_eq!(api.count("tag_resource").await, 1);
    assert_eq!(api.count("publish_version").await, 1);
    assert_eq!(api.count("create_alias").await, 1);
}

#[tokio::test]
async fn test_pending_function_is_polled_until_active() {
    let api = InMemoryFunctionApi::new().settling_after(2);
    let harness = Harness::new(api);
    let report = harness.run(HELLO, RunSettings::default()).await;

    assert!(!report.has_failures(), "{report:?}");
    let unit = report.unit("hello").unwrap();
    assert_eq!(unit.outcome, UnitOutcome::Deployed { created: true });
    assert_eq!(unit.state, ConvergenceState::AliasBound);

    let api = &harness.functions;
    // one lookup before the create, two while it settles
    assert_eq!(api.count("get_function").await, 3);
    let function = api.function("app-hello").await.unwrap();
    assert_eq!(function.state.as_deref(), Some("Active"));
}

#[tokio::test]
async fn test_update_in_progress_is_polled_between_phases() {
    let api = InMemoryFunctionApi::new()
        .with_function(deployed("app-hello"), BTreeMap::new())
        .settling_after(1);
    let harness = Harness::new(api);
    let report = harness.run(HELLO, RunSettings::default()).await;

    assert!(!report.has_failures(), "{report:?}");
    let api = &harness.functions;
    assert_eq!(api.count("get_function").await, 3);
    let function = api.function("app-hello").await.unwrap();
    assert_eq!(function.last_update_status.as_deref(), Some("Successful"));
}

#[tokio::test]
async fn test_failed_settle_stops_only_that_unit() {
    let api = InMemoryFunctionApi::new()
        .settling_after(1)
        .settle_failing("Layer version does not exist");
    let harness = Harness::new(api);
    let report = harness.run(HELLO, RunSettings::default()).await;

    let unit = report.unit("hello").unwrap();
    assert!(
        matches!(unit.outcome, UnitOutcome::Failed(ref reason) if reason.contains("did not settle") && reason.contains("Layer version does not exist")),
        "{:?}",
        unit.outcome
    );
    assert_eq!(unit.state, ConvergenceState::Creating);
    assert!(unit.identifiers.is_none());
    assert_eq!(harness.functions.count("publish_version").await, 0);
}

#[tokio::test]
async fn test_function_that_never_settles_fails() {
    let api = InMemoryFunctionApi::new().settling_after(50);
    let harness = Harness::new(api);
    let report = harness.run(HELLO, RunSettings::default()).await;

    let unit = report.unit("hello").unwrap();
    assert!(matches!(unit.outcome, UnitOutcome::Failed(ref reason) if reason.contains("still in progress")));
    // initial lookup plus the five allowed polls
    assert_eq!(harness.functions.count("get_function").await, 6);
}

#[tokio::test]
async fn test_stale_revision_on_code_update_stops_only_that_unit() {
    let api = InMemoryFunctionApi::new()
        .with_function(deployed("app-hello"), BTreeMap::new())
        .with_function(deployed("app-world"), BTreeMap::new())
        .fail_for(
            "update_function_code",
            "app-hello",
            ApiError::Conflict("The Revision Id provided does not match the latest Revision Id".to_string()),
        );
    let harness = Harness::new(api);
    let report = harness.run(PAIR, RunSettings::default()).await;

    assert_eq!(report.failed(), 1);
    let hello = report.unit("hello").unwrap();
    assert!(matches!(hello.outcome, UnitOutcome::Failed(ref reason) if reason.contains("Revision Id")));
    assert_eq!(hello.state, ConvergenceState::Updating);
    assert!(hello.identifiers.is_none());

    let world = report.unit("world").unwrap();
    assert_eq!(world.outcome, UnitOutcome::Deployed { created: false });
    assert_eq!(world.state, ConvergenceState::AliasBound);

    let api = &harness.functions;
    assert_eq!(api.count("update_function_configuration").await, 1);
    assert_eq!(api.count("publish_version").await, 1);
    assert!(api.alias("app-hello", "dev").await.is_none());
}

#[tokio::test]
async fn test_builder_is_released_when_a_build_panics() {
    let harness = Harness::with_builder(InMemoryFunctionApi::new(), |builder| builder.panicking("world"));
    let snapshot = ResolvedConfig::from_yaml(PAIR, &RunSettings::default()).unwrap();
    let pipeline = harness.pipeline();

    let run = tokio::spawn(async move { pipeline.run(&snapshot).await }).await;
    assert!(run.unwrap_err().is_panic());

    for _ in 0..100 {
        if harness.builder.shutdown_count() > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.builder.shutdown_count(), 1);
    assert_eq!(harness.builder.built().await, vec!["hello".to_string()]);
}

#[tokio::test]
async fn test_invalid_payload_fails_before_any_apply_call() {
    let doc = r#"
defaults: { stage: dev, runtime: nodejs18.x }
serverless:
  functions:
    hello: { handler: index.handler }
"#;
    let harness = Harness::new(InMemoryFunctionApi::new());
    let report = harness.run(doc, RunSettings::default()).await;

    let unit = report.unit("hello").unwrap();
    assert!(matches!(unit.outcome, UnitOutcome::Failed(ref reason) if reason.contains("role is required")));
    assert!(harness.functions.mutations().await.is_empty());
}

#[tokio::test]
async fn test_converger_walks_the_states() {
    let dir = tempfile::tempdir().unwrap();
    let package = dir.path().join("hello.zip");
    std::fs::write(&package, b"PK\x03\x04hello").unwrap();

    let snapshot = ResolvedConfig::from_yaml(HELLO, &RunSettings::default()).unwrap();
    let config = snapshot.functions().remove("hello").unwrap();
    let mut unit = DeploymentUnit::new("hello", "app-hello", package, config);
    assert_eq!(unit.state, ConvergenceState::Unseen);
    assert_eq!(unit.config.get_string("role"), ROLE);

    let api = Arc::new(InMemoryFunctionApi::new());
    let planned = Converger::new(api.clone(), true).converge(&mut unit).await.unwrap();
    assert_eq!(planned, Convergence::Planned { create: true });
    assert_eq!(unit.state, ConvergenceState::Creating);

    let applied = Converger::new(api.clone(), false).converge(&mut unit).await.unwrap();
    assert_eq!(applied, Convergence::Applied { created: true });
    assert!(unit.is_bound());

    let again = Converger::new(api.clone(), false).converge(&mut unit).await.unwrap();
    assert_eq!(again, Convergence::Applied { created: false });
    assert_eq!(unit.identifiers.as_ref().unwrap().version, "2");
}
