//! Function service client

use crate::error::{api_error, Result};
use crate::sdk::{endpoint_override, hashed, int, narrow, owned, sorted, text, timeouts};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types as sdk;
use aws_sdk_lambda::Client;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use skybridge_deploy::model::{
    AddPermissionInput, AliasConfiguration, CreateAliasInput, CreateFunctionInput, DeadLetterConfig,
    Environment, EnvironmentError, EnvironmentResponse, FunctionConfiguration, GetFunctionOutput,
    Layer, PublishVersionInput, TracingConfig, TracingConfigResponse, UpdateAliasInput,
    UpdateFunctionCodeInput, UpdateFunctionConfigurationInput, VpcConfig, VpcConfigResponse,
};
use skybridge_deploy::{ApiError, ApiResult, FunctionApi};
use std::collections::BTreeMap;
use tracing::instrument;

/// Function configuration, create, update and publish responses share one
/// set of getters
macro_rules! function_configuration {
    ($source:expr) => {{
        let source = $source;
        let layers: Vec<Layer> = source
            .layers()
            .iter()
            .map(|layer| Layer {
                arn: text(layer.arn()),
                code_size: None,
            })
            .collect();
        FunctionConfiguration {
            function_name: owned(source.function_name()),
            function_arn: owned(source.function_arn()),
            runtime: source.runtime().map(|runtime| runtime.as_str().to_string()),
            role: owned(source.role()),
            handler: owned(source.handler()),
            code_size: None,
            description: owned(source.description()),
            timeout: int(source.timeout()),
            memory_size: int(source.memory_size()),
            last_modified: owned(source.last_modified()),
            code_sha256: owned(source.code_sha256()),
            version: owned(source.version()),
            vpc_config: source.vpc_config().map(|vpc| VpcConfigResponse {
                subnet_ids: vpc.subnet_ids().to_vec(),
                security_group_ids: vpc.security_group_ids().to_vec(),
                vpc_id: owned(vpc.vpc_id()),
            }),
            environment: source.environment().map(|environment| EnvironmentResponse {
                variables: sorted(environment.variables()).unwrap_or_default(),
                error: environment.error().map(|error| EnvironmentError {
                    error_code: owned(error.error_code()),
                    message: owned(error.message()),
                }),
            }),
            tracing_config: source.tracing_config().map(|tracing| TracingConfigResponse {
                mode: tracing.mode().map(|mode| mode.as_str().to_string()),
            }),
            dead_letter_config: source.dead_letter_config().map(|dlq| DeadLetterConfig {
                target_arn: owned(dlq.target_arn()),
            }),
            kms_key_arn: owned(source.kms_key_arn()),
            revision_id: owned(source.revision_id()),
            layers: (!layers.is_empty()).then_some(layers),
            state: source.state().map(|state| state.as_str().to_string()),
            state_reason: owned(source.state_reason()),
            last_update_status: source
                .last_update_status()
                .map(|status| status.as_str().to_string()),
        }
    }};
}

macro_rules! alias_configuration {
    ($source:expr) => {{
        let source = $source;
        AliasConfiguration {
            alias_arn: text(source.alias_arn()),
            name: text(source.name()),
            function_version: text(source.function_version()),
            description: owned(source.description()),
            revision_id: owned(source.revision_id()),
        }
    }};
}

/// [`FunctionApi`] over the function service SDK
#[derive(Debug, Clone)]
pub struct LambdaClient {
    client: Client,
}

impl LambdaClient {
    /// Client inheriting `config`; `endpoint` points it at an emulator
    pub fn new(config: &SdkConfig, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = aws_sdk_lambda::config::Builder::from(config).timeout_config(timeouts());
        if let Some(endpoint) = endpoint_override(endpoint)? {
            builder = builder.endpoint_url(endpoint);
        }
        Ok(Self::from_client(Client::from_conf(builder.build())))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn archive(zip_file: &str) -> ApiResult<Blob> {
    BASE64
        .decode(zip_file)
        .map(Blob::new)
        .map_err(|err| ApiError::Transport(format!("deployment archive is not base64: {err}")))
}

fn vpc_config(vpc: &VpcConfig) -> sdk::VpcConfig {
    sdk::VpcConfig::builder()
        .set_subnet_ids(Some(vpc.subnet_ids.clone()))
        .set_security_group_ids(Some(vpc.security_group_ids.clone()))
        .build()
}

fn environment(environment: &Environment) -> sdk::Environment {
    sdk::Environment::builder()
        .set_variables(Some(hashed(&environment.variables)))
        .build()
}

fn tracing_config(tracing: &TracingConfig) -> sdk::TracingConfig {
    sdk::TracingConfig::builder()
        .set_mode(tracing.mode.as_deref().map(sdk::TracingMode::from))
        .build()
}

fn dead_letter_config(dlq: &DeadLetterConfig) -> sdk::DeadLetterConfig {
    sdk::DeadLetterConfig::builder()
        .set_target_arn(dlq.target_arn.clone())
        .build()
}

#[async_trait]
impl FunctionApi for LambdaClient {
    #[instrument(skip(self))]
    async fn get_function(&self, function_name: &str) -> ApiResult<GetFunctionOutput> {
        let output = self
            .client
            .get_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(api_error)?;
        Ok(GetFunctionOutput {
            configuration: output
                .configuration()
                .map(|configuration| function_configuration!(configuration))
                .unwrap_or_default(),
            tags: sorted(output.tags()).unwrap_or_default(),
        })
    }

    #[instrument(skip_all, fields(function = ?input.function_name))]
    async fn create_function(&self, input: &CreateFunctionInput) -> ApiResult<FunctionConfiguration> {
        let code = sdk::FunctionCode::builder()
            .zip_file(archive(&input.code.zip_file)?)
            .build();
        let output = self
            .client
            .create_function()
            .set_function_name(input.function_name.clone())
            .set_runtime(input.runtime.as_deref().map(sdk::Runtime::from))
            .set_role(input.role.clone())
            .set_handler(input.handler.clone())
            .set_description(input.description.clone())
            .set_timeout(narrow(input.timeout))
            .set_memory_size(narrow(input.memory_size))
            .set_publish(input.publish)
            .vpc_config(vpc_config(&input.vpc_config))
            .environment(environment(&input.environment))
            .tracing_config(tracing_config(&input.tracing_config))
            .set_dead_letter_config(input.dead_letter_config.as_ref().map(dead_letter_config))
            .set_kms_key_arn(input.kms_key_arn.clone())
            .set_layers(Some(input.layers.clone()))
            .set_tags((!input.tags.is_empty()).then(|| hashed(&input.tags)))
            .code(code)
            .send()
            .await
            .map_err(api_error)?;
        Ok(function_configuration!(&output))
    }

    #[instrument(skip_all, fields(function = %input.function_name))]
    async fn update_function_code(
        &self,
        input: &UpdateFunctionCodeInput,
    ) -> ApiResult<FunctionConfiguration> {
        let output = self
            .client
            .update_function_code()
            .function_name(&input.function_name)
            .zip_file(archive(&input.zip_file)?)
            .set_revision_id(input.revision_id.clone())
            .send()
            .await
            .map_err(api_error)?;
        Ok(function_configuration!(&output))
    }

    #[instrument(skip_all, fields(function = ?input.function_name))]
    async fn update_function_configuration(
        &self,
        input: &UpdateFunctionConfigurationInput,
    ) -> ApiResult<FunctionConfiguration> {
        let output = self
            .client
            .update_function_configuration()
            .set_function_name(input.function_name.clone())
            .set_runtime(input.runtime.as_deref().map(sdk::Runtime::from))
            .set_role(input.role.clone())
            .set_handler(input.handler.clone())
            .set_description(input.description.clone())
            .set_timeout(narrow(input.timeout))
            .set_memory_size(narrow(input.memory_size))
            .vpc_config(vpc_config(&input.vpc_config))
            .environment(environment(&input.environment))
            .tracing_config(tracing_config(&input.tracing_config))
            .set_dead_letter_config(input.dead_letter_config.as_ref().map(dead_letter_config))
            .set_kms_key_arn(input.kms_key_arn.clone())
            .set_layers(Some(input.layers.clone()))
            .set_revision_id(input.revision_id.clone())
            .send()
            .await
            .map_err(api_error)?;
        Ok(function_configuration!(&output))
    }

    #[instrument(skip(self, tags))]
    async fn tag_resource(&self, resource_arn: &str, tags: &BTreeMap<String, String>) -> ApiResult<()> {
        self.client
            .tag_resource()
            .resource(resource_arn)
            .set_tags(Some(hashed(tags)))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip_all, fields(function = %input.function_name))]
    async fn publish_version(&self, input: &PublishVersionInput) -> ApiResult<FunctionConfiguration> {
        let output = self
            .client
            .publish_version()
            .function_name(&input.function_name)
            .set_code_sha256(input.code_sha256.clone())
            .set_description(input.description.clone())
            .set_revision_id(input.revision_id.clone())
            .send()
            .await
            .map_err(api_error)?;
        Ok(function_configuration!(&output))
    }

    #[instrument(skip(self))]
    async fn get_alias(&self, function_name: &str, alias: &str) -> ApiResult<AliasConfiguration> {
        let output = self
            .client
            .get_alias()
            .function_name(function_name)
            .name(alias)
            .send()
            .await
            .map_err(api_error)?;
        Ok(alias_configuration!(&output))
    }

    #[instrument(skip_all, fields(function = %input.function_name, alias = %input.name))]
    async fn create_alias(&self, input: &CreateAliasInput) -> ApiResult<AliasConfiguration> {
        let output = self
            .client
            .create_alias()
            .function_name(&input.function_name)
            .name(&input.name)
            .function_version(&input.function_version)
            .set_description(input.description.clone())
            .send()
            .await
            .map_err(api_error)?;
        Ok(alias_configuration!(&output))
    }

    #[instrument(skip_all, fields(function = %input.function_name, alias = %input.name))]
    async fn update_alias(&self, input: &UpdateAliasInput) -> ApiResult<AliasConfiguration> {
        let output = self
            .client
            .update_alias()
            .function_name(&input.function_name)
            .name(&input.name)
            .function_version(&input.function_version)
            .set_revision_id(input.revision_id.clone())
            .send()
            .await
            .map_err(api_error)?;
        Ok(alias_configuration!(&output))
    }

    #[instrument(skip_all, fields(function = %input.function_name, statement = %input.statement_id))]
    async fn add_permission(&self, input: &AddPermissionInput) -> ApiResult<()> {
        self.client
            .add_permission()
            .function_name(&input.function_name)
            .statement_id(&input.statement_id)
            .action(&input.action)
            .principal(&input.principal)
            .set_source_arn(input.source_arn.clone())
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_permission(&self, function_name: &str, statement_id: &str) -> ApiResult<()> {
        self.client
            .remove_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}
