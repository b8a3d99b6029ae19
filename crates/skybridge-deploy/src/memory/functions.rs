use crate::api::FunctionApi;
use crate::error::{ApiError, ApiResult};
use crate::model::*;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Account id used in the ARNs this fake hands out
pub const TEST_ACCOUNT_ID: &str = "123456789012";

const LATEST: &str = "$LATEST";

/// One call received by [`InMemoryFunctionApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    GetFunction(String),
    CreateFunction(String),
    UpdateFunctionCode(String),
    UpdateFunctionConfiguration(String),
    TagResource(String),
    PublishVersion(String),
    GetAlias { function: String, alias: String },
    CreateAlias { function: String, alias: String },
    UpdateAlias { function: String, alias: String },
    AddPermission { function: String, statement_id: String },
    RemovePermission { function: String, statement_id: String },
}

impl ApiCall {
    pub fn operation(&self) -> &'static str {
        match self {
            ApiCall::GetFunction(_) => "get_function",
            ApiCall::CreateFunction(_) => "create_function",
            ApiCall::UpdateFunctionCode(_) => "update_function_code",
            ApiCall::UpdateFunctionConfiguration(_) => "update_function_configuration",
            ApiCall::TagResource(_) => "tag_resource",
            ApiCall::PublishVersion(_) => "publish_version",
            ApiCall::GetAlias { .. } => "get_alias",
            ApiCall::CreateAlias { .. } => "create_alias",
            ApiCall::UpdateAlias { .. } => "update_alias",
            ApiCall::AddPermission { .. } => "add_permission",
            ApiCall::RemovePermission { .. } => "remove_permission",
        }
    }

    /// Whether the call changes remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ApiCall::GetFunction(_) | ApiCall::GetAlias { .. })
    }

    fn function(&self) -> &str {
        match self {
            ApiCall::GetFunction(f)
            | ApiCall::CreateFunction(f)
            | ApiCall::UpdateFunctionCode(f)
            | ApiCall::UpdateFunctionConfiguration(f)
            | ApiCall::TagResource(f)
            | ApiCall::PublishVersion(f) => f,
            ApiCall::GetAlias { function, .. }
            | ApiCall::CreateAlias { function, .. }
            | ApiCall::UpdateAlias { function, .. }
            | ApiCall::AddPermission { function, .. }
            | ApiCall::RemovePermission { function, .. } => function,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredFunction {
    configuration: FunctionConfiguration,
    tags: BTreeMap<String, String>,
    published: u64,
    aliases: BTreeMap<String, AliasConfiguration>,
    /// Reads left before an in-progress write settles
    pending_polls: u32,
}

impl StoredFunction {
    fn new(configuration: FunctionConfiguration, tags: BTreeMap<String, String>) -> Self {
        Self {
            configuration,
            tags,
            published: 0,
            aliases: BTreeMap::new(),
            pending_polls: 0,
        }
    }

    /// Leave the function in progress for `polls` reads
    fn start_settling(&mut self, polls: u32, creating: bool) {
        if polls == 0 {
            return;
        }
        self.pending_polls = polls;
        if creating {
            self.configuration.state = Some("Pending".to_string());
        } else {
            self.configuration.last_update_status = Some("InProgress".to_string());
        }
    }

    /// Count one read; the last one settles the write, failed with `failure`
    fn poll(&mut self, failure: Option<&str>) {
        if self.pending_polls == 0 {
            return;
        }
        self.pending_polls -= 1;
        if self.pending_polls > 0 {
            return;
        }
        let configuration = &mut self.configuration;
        match failure {
            Some(reason) => {
                configuration.state = Some("Failed".to_string());
                configuration.last_update_status = Some("Failed".to_string());
                configuration.state_reason = Some(reason.to_string());
            }
            None => {
                configuration.state = Some("Active".to_string());
                configuration.last_update_status = Some("Successful".to_string());
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Failure {
    operation: &'static str,
    function: Option<String>,
    error: ApiError,
}

#[derive(Debug, Default)]
struct FunctionStore {
    functions: HashMap<String, StoredFunction>,
    /// function name or qualified ARN -> statement id -> statement
    permissions: BTreeMap<String, BTreeMap<String, AddPermissionInput>>,
    calls: Vec<ApiCall>,
    failures: Vec<Failure>,
    revisions: u64,
    settle_polls: u32,
    settle_failure: Option<String>,
}

impl FunctionStore {
    fn next_revision(&mut self) -> String {
        self.revisions += 1;
        format!("rev-{}", self.revisions)
    }

    /// Record `call`, then fail it if a matching failure was injected
    fn record(&mut self, call: ApiCall) -> ApiResult<()> {
        let failure = self.failures.iter().find(|failure| {
            failure.operation == call.operation()
                && failure
                    .function
                    .as_deref()
                    .map_or(true, |function| function == call.function())
        });
        let result = match failure {
            Some(failure) => Err(failure.error.clone()),
            None => Ok(()),
        };
        self.calls.push(call);
        result
    }

    fn function_mut(&mut self, function_name: &str) -> ApiResult<&mut StoredFunction> {
        self.functions
            .get_mut(function_name)
            .ok_or_else(|| ApiError::NotFound(format!("Function not found: {function_name}")))
    }
}

/// In-memory function service
///
/// ARNs read `arn:aws:lambda:<region>:123456789012:function:<name>`. Every
/// write issues a fresh revision id and rejects a stale one with
/// [`ApiError::Conflict`].
pub struct InMemoryFunctionApi {
    region: String,
    state: RwLock<FunctionStore>,
}

impl Default for InMemoryFunctionApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFunctionApi {
    pub fn new() -> Self {
        Self::with_region(skybridge_config::DEFAULT_REGION)
    }

    pub fn with_region(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: RwLock::new(FunctionStore::default()),
        }
    }

    pub fn function_arn(&self, function_name: &str) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            self.region, TEST_ACCOUNT_ID, function_name
        )
    }

    /// Seed an already deployed function
    pub fn with_function(mut self, configuration: FunctionConfiguration, tags: BTreeMap<String, String>) -> Self {
        let name = configuration.function_name.clone().unwrap_or_default();
        let function_arn = self.function_arn(&name);
        let store = self.state.get_mut();
        let revision = store.next_revision();
        let configuration = FunctionConfiguration {
            function_arn: Some(function_arn),
            revision_id: configuration.revision_id.clone().or(Some(revision)),
            version: Some(LATEST.to_string()),
            ..configuration
        };
        store
            .functions
            .insert(name, StoredFunction::new(configuration, tags));
        self
    }

    /// Seed an alias on a seeded function
    pub fn with_alias(mut self, function_name: &str, alias: &str, version: &str) -> Self {
        let alias_arn = format!("{}:{}", self.function_arn(function_name), alias);
        let store = self.state.get_mut();
        let revision = store.next_revision();
        if let Some(function) = store.functions.get_mut(function_name) {
            function.aliases.insert(
                alias.to_string(),
                AliasConfiguration {
                    alias_arn,
                    name: alias.to_string(),
                    function_version: version.to_string(),
                    description: None,
                    revision_id: Some(revision),
                },
            );
        }
        self
    }

    /// Leave every create and update in progress until `polls` further reads
    pub fn settling_after(mut self, polls: u32) -> Self {
        self.state.get_mut().settle_polls = polls;
        self
    }

    /// Settle in-progress writes as failed with `reason`
    pub fn settle_failing(mut self, reason: &str) -> Self {
        self.state.get_mut().settle_failure = Some(reason.to_string());
        self
    }

    /// Fail every call of `operation`
    pub fn fail(mut self, operation: &'static str, error: ApiError) -> Self {
        self.state.get_mut().failures.push(Failure {
            operation,
            function: None,
            error,
        });
        self
    }

    /// Fail calls of `operation` addressed to `function_name`
    pub fn fail_for(mut self, operation: &'static str, function_name: &str, error: ApiError) -> Self {
        self.state.get_mut().failures.push(Failure {
            operation,
            function: Some(function_name.to_string()),
            error,
        });
        self
    }

    pub async fn calls(&self) -> Vec<ApiCall> {
        self.state.read().await.calls.clone()
    }

    /// Calls that change remote state
    pub async fn mutations(&self) -> Vec<ApiCall> {
        self.calls().await.into_iter().filter(ApiCall::is_mutation).collect()
    }

    /// How often `operation` was called
    pub async fn count(&self, operation: &str) -> usize {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub async fn function(&self, function_name: &str) -> Option<FunctionConfiguration> {
        self.state
            .read()
            .await
            .functions
            .get(function_name)
            .map(|function| function.configuration.clone())
    }

    pub async fn tags(&self, function_name: &str) -> BTreeMap<String, String> {
        self.state
            .read()
            .await
            .functions
            .get(function_name)
            .map(|function| function.tags.clone())
            .unwrap_or_default()
    }

    pub async fn alias(&self, function_name: &str, alias: &str) -> Option<AliasConfiguration> {
        self.state
            .read()
            .await
            .functions
            .get(function_name)
            .and_then(|function| function.aliases.get(alias).cloned())
    }

    /// Statements granted on `function_name` (a name or qualified ARN)
    pub async fn permissions(&self, function_name: &str) -> Vec<AddPermissionInput> {
        self.state
            .read()
            .await
            .permissions
            .get(function_name)
            .map(|statements| statements.values().cloned().collect())
            .unwrap_or_default()
    }

    fn decode(zip_file: &str) -> ApiResult<Vec<u8>> {
        BASE64.decode(zip_file).map_err(|e| ApiError::Service {
            status: 400,
            code: "InvalidParameterValueException".to_string(),
            message: format!("Could not unzip uploaded file: {e}"),
        })
    }

    fn code_sha256(archive: &[u8]) -> String {
        BASE64.encode(Sha256::digest(archive))
    }
}

/// Resolve a name or (possibly qualified) function ARN to the function name
fn function_key(name_or_arn: &str) -> String {
    match name_or_arn.strip_prefix("arn:") {
        Some(_) => name_or_arn
            .split(':')
            .nth(6)
            .unwrap_or(name_or_arn)
            .to_string(),
        None => name_or_arn.to_string(),
    }
}

fn check_revision(expected: Option<&str>, current: Option<&str>) -> ApiResult<()> {
    match (expected, current) {
        (Some(expected), Some(current)) if expected != current => Err(ApiError::Conflict(format!(
            "The Revision Id provided does not match the latest Revision Id. Expected {current}, got {expected}"
        ))),
        _ => Ok(()),
    }
}

fn conflict_exists(what: &str) -> ApiError {
    ApiError::Service {
        status: 409,
        code: "ResourceConflictException".to_string(),
        message: format!("{what} already exists"),
    }
}

#[async_trait]
impl FunctionApi for InMemoryFunctionApi {
    async fn get_function(&self, function_name: &str) -> ApiResult<GetFunctionOutput> {
        let mut store = self.state.write().await;
        store.record(ApiCall::GetFunction(function_name.to_string()))?;
        let failure = store.settle_failure.clone();
        let function = store.function_mut(&function_key(function_name))?;
        function.poll(failure.as_deref());
        Ok(GetFunctionOutput {
            configuration: function.configuration.clone(),
            tags: function.tags.clone(),
        })
    }

    async fn create_function(&self, input: &CreateFunctionInput) -> ApiResult<FunctionConfiguration> {
        let name = input.function_name.clone().unwrap_or_default();
        let archive = Self::decode(&input.code.zip_file)?;
        let arn = self.function_arn(&name);

        let mut store = self.state.write().await;
        store.record(ApiCall::CreateFunction(name.clone()))?;
        if store.functions.contains_key(&name) {
            return Err(conflict_exists(&format!("Function {name}")));
        }

        let configuration = FunctionConfiguration {
            function_name: Some(name.clone()),
            function_arn: Some(arn),
            runtime: input.runtime.clone(),
            role: input.role.clone(),
            handler: input.handler.clone(),
            code_size: Some(archive.len() as i64),
            description: input.description.clone(),
            timeout: input.timeout,
            memory_size: input.memory_size,
            code_sha256: Some(Self::code_sha256(&archive)),
            version: Some(LATEST.to_string()),
            vpc_config: Some(VpcConfigResponse {
                subnet_ids: input.vpc_config.subnet_ids.clone(),
                security_group_ids: input.vpc_config.security_group_ids.clone(),
                vpc_id: None,
            }),
            environment: Some(EnvironmentResponse {
                variables: input.environment.variables.clone(),
                error: None,
            }),
            tracing_config: Some(TracingConfigResponse {
                mode: input.tracing_config.mode.clone(),
            }),
            dead_letter_config: input.dead_letter_config.clone(),
            kms_key_arn: input.kms_key_arn.clone(),
            revision_id: Some(store.next_revision()),
            layers: Some(
                input
                    .layers
                    .iter()
                    .map(|arn| Layer {
                        arn: arn.clone(),
                        code_size: None,
                    })
                    .collect(),
            ),
            state: Some("Active".to_string()),
            last_update_status: Some("Successful".to_string()),
            ..FunctionConfiguration::default()
        };
        let mut stored = StoredFunction::new(configuration, input.tags.clone());
        stored.start_settling(store.settle_polls, true);
        let configuration = stored.configuration.clone();
        store.functions.insert(name, stored);
        Ok(configuration)
    }

    async fn update_function_code(&self, input: &UpdateFunctionCodeInput) -> ApiResult<FunctionConfiguration> {
        let archive = Self::decode(&input.zip_file)?;
        let mut store = self.state.write().await;
        store.record(ApiCall::UpdateFunctionCode(input.function_name.clone()))?;
        let revision = store.next_revision();
        let polls = store.settle_polls;
        let function = store.function_mut(&input.function_name)?;
        check_revision(
            input.revision_id.as_deref(),
            function.configuration.revision_id.as_deref(),
        )?;

        let configuration = &mut function.configuration;
        configuration.code_sha256 = Some(Self::code_sha256(&archive));
        configuration.code_size = Some(archive.len() as i64);
        configuration.revision_id = Some(revision);
        configuration.last_update_status = Some("Successful".to_string());
        function.start_settling(polls, false);
        Ok(function.configuration.clone())
    }

    async fn update_function_configuration(
        &self,
        input: &UpdateFunctionConfigurationInput,
    ) -> ApiResult<FunctionConfiguration> {
        let name = input.function_name.clone().unwrap_or_default();
        let mut store = self.state.write().await;
        store.record(ApiCall::UpdateFunctionConfiguration(name.clone()))?;
        let revision = store.next_revision();
        let polls = store.settle_polls;
        let function = store.function_mut(&name)?;
        check_revision(
            input.revision_id.as_deref(),
            function.configuration.revision_id.as_deref(),
        )?;

        let configuration = &mut function.configuration;
        for (slot, value) in [
            (&mut configuration.runtime, &input.runtime),
            (&mut configuration.role, &input.role),
            (&mut configuration.handler, &input.handler),
            (&mut configuration.description, &input.description),
            (&mut configuration.kms_key_arn, &input.kms_key_arn),
        ] {
            if value.is_some() {
                *slot = value.clone();
            }
        }
        if input.timeout.is_some() {
            configuration.timeout = input.timeout;
        }
        if input.memory_size.is_some() {
            configuration.memory_size = input.memory_size;
        }
        if input.dead_letter_config.is_some() {
            configuration.dead_letter_config = input.dead_letter_config.clone();
        }
        configuration.vpc_config = Some(VpcConfigResponse {
            subnet_ids: input.vpc_config.subnet_ids.clone(),
            security_group_ids: input.vpc_config.security_group_ids.clone(),
            vpc_id: None,
        });
        configuration.environment = Some(EnvironmentResponse {
            variables: input.environment.variables.clone(),
            error: None,
        });
        configuration.tracing_config = Some(TracingConfigResponse {
            mode: input.tracing_config.mode.clone(),
        });
        configuration.layers = Some(
            input
                .layers
                .iter()
                .map(|arn| Layer {
                    arn: arn.clone(),
                    code_size: None,
                })
                .collect(),
        );
        configuration.revision_id = Some(revision);
        configuration.last_update_status = Some("Successful".to_string());
        function.start_settling(polls, false);
        Ok(function.configuration.clone())
    }

    async fn tag_resource(&self, resource_arn: &str, tags: &BTreeMap<String, String>) -> ApiResult<()> {
        let mut store = self.state.write().await;
        let name = function_key(resource_arn);
        store.record(ApiCall::TagResource(name.clone()))?;
        let function = store.function_mut(&name)?;
        function
            .tags
            .extend(tags.iter().map(|(key, value)| (key.clone(), value.clone())));
        Ok(())
    }

    async fn publish_version(&self, input: &PublishVersionInput) -> ApiResult<FunctionConfiguration> {
        let mut store = self.state.write().await;
        store.record(ApiCall::PublishVersion(input.function_name.clone()))?;
        let revision = store.next_revision();
        let function = store.function_mut(&input.function_name)?;
        check_revision(
            input.revision_id.as_deref(),
            function.configuration.revision_id.as_deref(),
        )?;
        if let (Some(expected), Some(current)) = (
            input.code_sha256.as_deref(),
            function.configuration.code_sha256.as_deref(),
        ) {
            if expected != current {
                return Err(ApiError::Service {
                    status: 412,
                    code: "InvalidParameterValueException".to_string(),
                    message: "CodeSHA256 does not match the function code".to_string(),
                });
            }
        }

        function.published += 1;
        function.configuration.revision_id = Some(revision);
        let mut published = function.configuration.clone();
        published.version = Some(function.published.to_string());
        published.function_arn = published
            .function_arn
            .map(|arn| format!("{arn}:{}", function.published));
        published.description = input.description.clone();
        Ok(published)
    }

    async fn get_alias(&self, function_name: &str, alias: &str) -> ApiResult<AliasConfiguration> {
        let mut store = self.state.write().await;
        store.record(ApiCall::GetAlias {
            function: function_name.to_string(),
            alias: alias.to_string(),
        })?;
        let function = store.function_mut(function_name)?;
        function
            .aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("Alias not found: {function_name}:{alias}")))
    }

    async fn create_alias(&self, input: &CreateAliasInput) -> ApiResult<AliasConfiguration> {
        let alias_arn = format!("{}:{}", self.function_arn(&input.function_name), input.name);
        let mut store = self.state.write().await;
        store.record(ApiCall::CreateAlias {
            function: input.function_name.clone(),
            alias: input.name.clone(),
        })?;
        let revision = store.next_revision();
        let function = store.function_mut(&input.function_name)?;
        if function.aliases.contains_key(&input.name) {
            return Err(conflict_exists(&format!("Alias {}", input.name)));
        }

        let alias = AliasConfiguration {
            alias_arn,
            name: input.name.clone(),
            function_version: input.function_version.clone(),
            description: input.description.clone(),
            revision_id: Some(revision),
        };
        function.aliases.insert(input.name.clone(), alias.clone());
        Ok(alias)
    }

    async fn update_alias(&self, input: &UpdateAliasInput) -> ApiResult<AliasConfiguration> {
        let mut store = self.state.write().await;
        store.record(ApiCall::UpdateAlias {
            function: input.function_name.clone(),
            alias: input.name.clone(),
        })?;
        let revision = store.next_revision();
        let function = store.function_mut(&input.function_name)?;
        let alias = function.aliases.get_mut(&input.name).ok_or_else(|| {
            ApiError::NotFound(format!("Alias not found: {}:{}", input.function_name, input.name))
        })?;
        check_revision(input.revision_id.as_deref(), alias.revision_id.as_deref())?;

        alias.function_version = input.function_version.clone();
        alias.revision_id = Some(revision);
        Ok(alias.clone())
    }

    async fn add_permission(&self, input: &AddPermissionInput) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record(ApiCall::AddPermission {
            function: input.function_name.clone(),
            statement_id: input.statement_id.clone(),
        })?;
        if !store.functions.contains_key(&function_key(&input.function_name)) {
            return Err(ApiError::NotFound(format!("Function not found: {}", input.function_name)));
        }
        let statements = store.permissions.entry(input.function_name.clone()).or_default();
        if statements.contains_key(&input.statement_id) {
            return Err(conflict_exists(&format!("Statement {}", input.statement_id)));
        }
        statements.insert(input.statement_id.clone(), input.clone());
        Ok(())
    }

    async fn remove_permission(&self, function_name: &str, statement_id: &str) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.record(ApiCall::RemovePermission {
            function: function_name.to_string(),
            statement_id: statement_id.to_string(),
        })?;
        store
            .permissions
            .get_mut(function_name)
            .and_then(|statements| statements.remove(statement_id))
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("No policy statement {statement_id}")))
    }
}
