//! Reconciliation of remote state with locally desired configuration
//!
//! Two steps, always in this order:
//!
//! 1. [`merge_remote`] copies the remote configuration into a freshly seeded
//!    [`CreateFunctionInput`], so fields skybridge does not manage survive.
//! 2. [`DesiredFunction::apply`] overwrites every field the local
//!    configuration explicitly sets.
//!
//! The configuration update sent for an existing function is a projection
//! of the same merged payload ([`configuration_update`]).

use crate::api::RemoteState;
use crate::error::{DeployError, Result};
use crate::model::*;
use skybridge_config::{ConfigTree, ConfigValue};
use skybridge_merge::{field_map, Binding, FieldMap, TranslatorError};
use std::collections::BTreeMap;
use tracing::warn;

/// Value that clears a string field instead of leaving it untouched
pub const CLEAR_SENTINEL: &str = "<clear>";

/// What the local configuration asks for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired<T> {
    /// Not set locally; the merged remote value survives
    Keep,
    Set(T),
    /// Explicitly cleared with [`CLEAR_SENTINEL`]
    Clear,
}

impl Desired<String> {
    fn apply_to(&self, slot: &mut Option<String>) {
        match self {
            Desired::Keep => {}
            Desired::Set(value) => *slot = Some(value.clone()),
            Desired::Clear => *slot = Some(String::new()),
        }
    }
}

impl Desired<i64> {
    fn apply_to(&self, slot: &mut Option<i64>) {
        if let Desired::Set(value) = self {
            *slot = Some(*value);
        }
    }
}

/// Desired state of one function, read from its configuration view
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredFunction {
    pub function_name: String,
    pub role: Desired<String>,
    pub handler: Desired<String>,
    pub runtime: Desired<String>,
    pub description: Desired<String>,
    pub tracing_mode: Desired<String>,
    pub memory_size: Desired<i64>,
    pub timeout: Desired<i64>,
    pub security_group_ids: Option<Vec<String>>,
    pub subnet_ids: Option<Vec<String>>,
    pub layers: Option<Vec<String>>,
    pub environment: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

fn desired_string(view: &ConfigTree, key: &str, function_name: &str) -> Desired<String> {
    let value = view.get(key);
    if value.is_absent() {
        return Desired::Keep;
    }
    let value = value.to_string_lossy();
    if value.is_empty() {
        warn!(
            function = %function_name,
            field = key,
            "Empty value keeps the deployed setting; use {CLEAR_SENTINEL} to clear it"
        );
        Desired::Keep
    } else if value == CLEAR_SENTINEL {
        Desired::Clear
    } else {
        Desired::Set(value)
    }
}

fn desired_number(view: &ConfigTree, key: &str, minimum: i64) -> Desired<i64> {
    match view.get(key) {
        ConfigValue::Absent => Desired::Keep,
        value if value.to_i64() >= minimum => Desired::Set(value.to_i64()),
        _ => Desired::Keep,
    }
}

fn desired_list(view: &ConfigTree, key: &str) -> Option<Vec<String>> {
    match view.get(key) {
        ConfigValue::Absent => None,
        value => Some(value.to_string_vec()),
    }
}

impl DesiredFunction {
    /// Read the desired state from a function's resolved configuration view
    pub fn from_config(function_name: &str, view: &ConfigTree) -> Self {
        Self {
            function_name: function_name.to_string(),
            role: desired_string(view, "role", function_name),
            handler: desired_string(view, "handler", function_name),
            runtime: desired_string(view, "runtime", function_name),
            description: desired_string(view, "description", function_name),
            tracing_mode: desired_string(view, "tracing", function_name),
            memory_size: desired_number(view, "memorySize", MIN_MEMORY_MB),
            timeout: desired_number(view, "timeout", 1),
            security_group_ids: desired_list(view, "vpcConfig.securityGroupIds"),
            subnet_ids: desired_list(view, "vpcConfig.subnetIds"),
            layers: desired_list(view, "layers"),
            environment: view
                .get_string_map("environment")
                .into_iter()
                .map(|(k, v)| (k.to_uppercase(), v))
                .collect(),
            tags: view.get_string_map("tags"),
        }
    }

    /// Overwrite `target` with every explicitly desired value
    ///
    /// Tags and environment variables are merged key by key over what is
    /// already there.
    pub fn apply(&self, target: &mut CreateFunctionInput, remote_tags: &BTreeMap<String, String>) {
        target.function_name = Some(self.function_name.clone());
        self.role.apply_to(&mut target.role);
        self.handler.apply_to(&mut target.handler);
        self.runtime.apply_to(&mut target.runtime);
        self.description.apply_to(&mut target.description);
        self.tracing_mode.apply_to(&mut target.tracing_config.mode);
        self.memory_size.apply_to(&mut target.memory_size);
        self.timeout.apply_to(&mut target.timeout);

        if let Some(ids) = &self.security_group_ids {
            target.vpc_config.security_group_ids = ids.clone();
        }
        if let Some(ids) = &self.subnet_ids {
            target.vpc_config.subnet_ids = ids.clone();
        }
        if let Some(layers) = &self.layers {
            target.layers = layers.clone();
        }

        target.environment.variables.extend(self.environment.clone());

        let mut tags = remote_tags.clone();
        tags.extend(self.tags.clone());
        target.tags = tags;
    }
}

fn remote_to_create() -> FieldMap<FunctionConfiguration, CreateFunctionInput> {
    field_map!(FunctionConfiguration => CreateFunctionInput {
        function_name,
        runtime,
        role,
        handler,
        description,
        timeout,
        memory_size,
        dead_letter_config,
        kms_key_arn,
    })
}

fn create_to_update() -> FieldMap<CreateFunctionInput, UpdateFunctionConfigurationInput> {
    field_map!(CreateFunctionInput => UpdateFunctionConfigurationInput {
        function_name,
        runtime,
        role,
        handler,
        description,
        timeout,
        memory_size,
        vpc_config,
        environment,
        tracing_config,
        dead_letter_config,
        kms_key_arn,
        layers,
    })
}

fn nested<S, T: Default>(map: &FieldMap<S, T>, source: Option<&S>) -> std::result::Result<T, TranslatorError> {
    let mut target = T::default();
    if let Some(source) = source {
        map.merge(source, &mut target, Vec::new())?;
    }
    Ok(target)
}

/// Copy a remote configuration into `target`
///
/// Nested objects are merged recursively into fresh request-shaped values;
/// attached layers are projected down to their ARNs.
pub fn merge_remote(remote: &FunctionConfiguration, target: &mut CreateFunctionInput) -> Result<()> {
    let vpc_map = field_map!(VpcConfigResponse => VpcConfig { subnet_ids, security_group_ids });
    let env_map = field_map!(EnvironmentResponse => Environment { variables });
    let tracing_map = field_map!(TracingConfigResponse => TracingConfig { mode });

    let bindings = vec![
        Binding::new(
            "vpc_config",
            "vpc_config",
            |s: &FunctionConfiguration| &s.vpc_config,
            |t: &mut CreateFunctionInput| &mut t.vpc_config,
            |value: &Option<VpcConfigResponse>| nested(&vpc_map, value.as_ref()),
        ),
        Binding::new(
            "environment",
            "environment",
            |s: &FunctionConfiguration| &s.environment,
            |t: &mut CreateFunctionInput| &mut t.environment,
            |value: &Option<EnvironmentResponse>| nested(&env_map, value.as_ref()),
        ),
        Binding::new(
            "tracing_config",
            "tracing_config",
            |s: &FunctionConfiguration| &s.tracing_config,
            |t: &mut CreateFunctionInput| &mut t.tracing_config,
            |value: &Option<TracingConfigResponse>| nested(&tracing_map, value.as_ref()),
        ),
        Binding::new(
            "layers",
            "layers",
            |s: &FunctionConfiguration| &s.layers,
            |t: &mut CreateFunctionInput| &mut t.layers,
            |value: &Option<Vec<Layer>>| {
                Ok(value
                    .iter()
                    .flatten()
                    .map(|layer| layer.arn.clone())
                    .collect::<Vec<_>>())
            },
        ),
    ];

    remote_to_create().merge(remote, target, bindings)?;
    Ok(())
}

/// Build the full payload for one function
///
/// Fails with [`DeployError::Merge`] when a translator fails and with
/// [`DeployError::Validation`] when the result is not deployable.
pub fn reconcile(
    remote: &RemoteState,
    desired: &DesiredFunction,
    archive: &[u8],
) -> Result<CreateFunctionInput> {
    let mut input = CreateFunctionInput::seeded(&desired.function_name);
    let mut remote_tags = BTreeMap::new();

    if let RemoteState::Present(existing) = remote {
        merge_remote(&existing.configuration, &mut input)?;
        remote_tags = existing.tags.clone();
    }

    desired.apply(&mut input, &remote_tags);
    input.code = FunctionCode::from_archive(archive);
    input.validate().map_err(DeployError::Validation)?;
    Ok(input)
}

/// Configuration-shaped projection of a merged payload
pub fn configuration_update(
    input: &CreateFunctionInput,
    revision_id: Option<String>,
) -> Result<UpdateFunctionConfigurationInput> {
    let mut update = UpdateFunctionConfigurationInput::default();
    create_to_update().merge(input, &mut update, Vec::new())?;
    update.revision_id = revision_id;
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(doc: &str) -> ConfigTree {
        ConfigTree::from_yaml(doc).unwrap()
    }

    fn remote() -> FunctionConfiguration {
        FunctionConfiguration {
            function_name: Some("app-hello".to_string()),
            function_arn: Some("arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello".to_string()),
            runtime: Some("python3.8".to_string()),
            role: Some("arn:x".to_string()),
            handler: Some("main.handler".to_string()),
            description: Some("deployed".to_string()),
            timeout: Some(30),
            memory_size: Some(512),
            kms_key_arn: Some("arn:kms".to_string()),
            vpc_config: Some(VpcConfigResponse {
                subnet_ids: vec!["subnet-1".to_string()],
                security_group_ids: vec!["sg-1".to_string()],
                vpc_id: Some("vpc-1".to_string()),
            }),
            environment: Some(EnvironmentResponse {
                variables: BTreeMap::from([("EXISTING".to_string(), "1".to_string())]),
                error: None,
            }),
            layers: Some(vec![Layer {
                arn: "arn:layer:deps:3".to_string(),
                code_size: Some(100),
            }]),
            revision_id: Some("rev-1".to_string()),
            ..FunctionConfiguration::default()
        }
    }

    #[test]
    fn test_merge_remote_keeps_unmanaged_fields() {
        let mut input = CreateFunctionInput::seeded("app-hello");
        merge_remote(&remote(), &mut input).unwrap();

        assert_eq!(input.kms_key_arn.as_deref(), Some("arn:kms"));
        assert_eq!(input.vpc_config.subnet_ids, vec!["subnet-1"]);
        assert_eq!(input.environment.variables["EXISTING"], "1");
        assert_eq!(input.layers, vec!["arn:layer:deps:3"]);
        assert_eq!(input.memory_size, Some(512));
    }

    #[test]
    fn test_empty_desired_role_keeps_remote_role() {
        let remote = RemoteState::Present(Box::new(GetFunctionOutput {
            configuration: remote(),
            tags: BTreeMap::new(),
        }));

        let keep = DesiredFunction::from_config("app-hello", &view("role: \"\""));
        let input = reconcile(&remote, &keep, b"zip").unwrap();
        assert_eq!(input.role.as_deref(), Some("arn:x"));

        let set = DesiredFunction::from_config("app-hello", &view("role: arn:y"));
        let input = reconcile(&remote, &set, b"zip").unwrap();
        assert_eq!(input.role.as_deref(), Some("arn:y"));
    }

    #[test]
    fn test_clear_sentinel_empties_field() {
        let remote = RemoteState::Present(Box::new(GetFunctionOutput {
            configuration: remote(),
            tags: BTreeMap::new(),
        }));
        let desired = DesiredFunction::from_config("app-hello", &view("description: \"<clear>\""));
        let input = reconcile(&remote, &desired, b"zip").unwrap();
        assert_eq!(input.description.as_deref(), Some(""));
    }

    #[test]
    fn test_numeric_thresholds() {
        let desired = DesiredFunction::from_config("f", &view("memorySize: 64\ntimeout: 0"));
        assert_eq!(desired.memory_size, Desired::Keep);
        assert_eq!(desired.timeout, Desired::Keep);

        let desired = DesiredFunction::from_config("f", &view("memorySize: 128\ntimeout: 5"));
        assert_eq!(desired.memory_size, Desired::Set(128));
        assert_eq!(desired.timeout, Desired::Set(5));
    }

    #[test]
    fn test_lists_and_maps() {
        let remote = RemoteState::Present(Box::new(GetFunctionOutput {
            configuration: remote(),
            tags: BTreeMap::from([("team".to_string(), "core".to_string())]),
        }));
        let desired = DesiredFunction::from_config(
            "app-hello",
            &view(
                r#"
vpcConfig: { subnetIds: [] }
environment: { log_level: debug }
tags: { owner: me }
"#,
            ),
        );
        let input = reconcile(&remote, &desired, b"zip").unwrap();

        assert!(input.vpc_config.subnet_ids.is_empty());
        assert_eq!(input.vpc_config.security_group_ids, vec!["sg-1"]);
        assert_eq!(input.layers, vec!["arn:layer:deps:3"]);
        assert_eq!(input.environment.variables["LOG_LEVEL"], "debug");
        assert_eq!(input.environment.variables["EXISTING"], "1");
        assert_eq!(input.tags["team"], "core");
        assert_eq!(input.tags["owner"], "me");
    }

    #[test]
    fn test_missing_remote_requires_complete_desired_state() {
        let desired = DesiredFunction::from_config("app-hello", &view("handler: main.handler"));
        let err = reconcile(&RemoteState::Missing, &desired, b"zip").unwrap_err();
        assert!(matches!(err, DeployError::Validation(ref msg) if msg.contains("role")));
    }

    #[test]
    fn test_configuration_update_projection() {
        let mut input = CreateFunctionInput::seeded("app-hello");
        merge_remote(&remote(), &mut input).unwrap();
        input.code = FunctionCode::from_archive(b"zip");

        let update = configuration_update(&input, Some("rev-2".to_string())).unwrap();
        assert_eq!(update.function_name.as_deref(), Some("app-hello"));
        assert_eq!(update.memory_size, Some(512));
        assert_eq!(update.layers, vec!["arn:layer:deps:3"]);
        assert_eq!(update.revision_id.as_deref(), Some("rev-2"));
    }
}
