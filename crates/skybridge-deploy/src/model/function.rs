//! Function service request and response shapes

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_FUNCTION_NAME_LEN: usize = 140;
pub const MIN_MEMORY_MB: i64 = 128;
pub const MAX_MEMORY_MB: i64 = 10240;
pub const MAX_TIMEOUT_SECS: i64 = 900;

/// Observed networking configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VpcConfigResponse {
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

/// Requested networking configuration; empty lists detach the function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VpcConfig {
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EnvironmentError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EnvironmentResponse {
    pub variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvironmentError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Environment {
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TracingConfigResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TracingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DeadLetterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_arn: Option<String>,
}

/// An attached layer as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Layer {
    pub arn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_size: Option<i64>,
}

/// The service's view of one function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FunctionConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_config: Option<VpcConfigResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracing_config: Option<TracingConfigResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_config: Option<DeadLetterConfig>,
    #[serde(rename = "KMSKeyArn", skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<Layer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_status: Option<String>,
}

impl FunctionConfiguration {
    /// Whether a create or update is still being applied
    pub fn is_settling(&self) -> bool {
        self.state.as_deref() == Some("Pending")
            || self.last_update_status.as_deref() == Some("InProgress")
    }

    /// Whether the last create or update failed
    pub fn has_failed(&self) -> bool {
        self.state.as_deref() == Some("Failed")
            || self.last_update_status.as_deref() == Some("Failed")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct GetFunctionOutput {
    pub configuration: FunctionConfiguration,
    pub tags: BTreeMap<String, String>,
}

/// Deployment archive, base64 encoded on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FunctionCode {
    pub zip_file: String,
}

impl FunctionCode {
    pub fn from_archive(archive: &[u8]) -> Self {
        Self {
            zip_file: BASE64.encode(archive),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.zip_file.is_empty()
    }
}

/// Full create payload; also the reconciliation target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CreateFunctionInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,
    pub vpc_config: VpcConfig,
    pub environment: Environment,
    pub tracing_config: TracingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_config: Option<DeadLetterConfig>,
    #[serde(rename = "KMSKeyArn", skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
    pub layers: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub code: FunctionCode,
}

impl CreateFunctionInput {
    /// Payload seeded with empty nested objects
    pub fn seeded(function_name: &str) -> Self {
        Self {
            function_name: Some(function_name.to_string()),
            ..Self::default()
        }
    }

    /// Check the payload before any apply call
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();

        match self.function_name.as_deref() {
            None | Some("") => problems.push("function name is empty".to_string()),
            Some(name) if name.len() > MAX_FUNCTION_NAME_LEN => problems.push(format!(
                "function name exceeds {MAX_FUNCTION_NAME_LEN} characters"
            )),
            Some(_) => {}
        }
        for (field, value) in [
            ("role", &self.role),
            ("handler", &self.handler),
            ("runtime", &self.runtime),
        ] {
            if value.as_deref().map_or(true, str::is_empty) {
                problems.push(format!("{field} is required"));
            }
        }
        if let Some(memory) = self.memory_size {
            if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&memory) {
                problems.push(format!(
                    "memory size {memory} outside {MIN_MEMORY_MB}..={MAX_MEMORY_MB}"
                ));
            }
        }
        if let Some(timeout) = self.timeout {
            if !(1..=MAX_TIMEOUT_SECS).contains(&timeout) {
                problems.push(format!("timeout {timeout} outside 1..={MAX_TIMEOUT_SECS}"));
            }
        }
        if self.code.is_empty() {
            problems.push("deployment archive is empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UpdateFunctionCodeInput {
    #[serde(skip_serializing)]
    pub function_name: String,
    pub zip_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

/// Configuration-shaped projection of [`CreateFunctionInput`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UpdateFunctionConfigurationInput {
    #[serde(skip_serializing)]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<i64>,
    pub vpc_config: VpcConfig,
    pub environment: Environment,
    pub tracing_config: TracingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_config: Option<DeadLetterConfig>,
    #[serde(rename = "KMSKeyArn", skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
    pub layers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PublishVersionInput {
    #[serde(skip_serializing)]
    pub function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AliasConfiguration {
    pub alias_arn: String,
    pub name: String,
    pub function_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CreateAliasInput {
    #[serde(skip_serializing)]
    pub function_name: String,
    pub name: String,
    pub function_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UpdateAliasInput {
    #[serde(skip_serializing)]
    pub function_name: String,
    #[serde(skip_serializing)]
    pub name: String,
    pub function_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AddPermissionInput {
    #[serde(skip_serializing)]
    pub function_name: String,
    pub statement_id: String,
    pub action: String,
    pub principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_arn: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> CreateFunctionInput {
        CreateFunctionInput {
            role: Some("arn:aws:iam::123456789012:role/lambda".to_string()),
            handler: Some("main.handler".to_string()),
            runtime: Some("python3.8".to_string()),
            memory_size: Some(256),
            timeout: Some(30),
            code: FunctionCode::from_archive(b"PK\x03\x04"),
            ..CreateFunctionInput::seeded("app-hello")
        }
    }

    #[test]
    fn test_valid_payload() {
        assert!(valid_input().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let input = CreateFunctionInput {
            memory_size: Some(64),
            timeout: Some(0),
            code: FunctionCode::default(),
            ..CreateFunctionInput::seeded(&"x".repeat(141))
        };
        let problems = input.validate().unwrap_err();
        assert!(problems.contains("140"));
        assert!(problems.contains("role is required"));
        assert!(problems.contains("handler is required"));
        assert!(problems.contains("runtime is required"));
        assert!(problems.contains("memory size 64"));
        assert!(problems.contains("timeout 0"));
        assert!(problems.contains("archive is empty"));
    }

    #[test]
    fn test_wire_shape() {
        let input = CreateFunctionInput {
            kms_key_arn: Some("arn:aws:kms:ap-southeast-1:123456789012:key/k1".to_string()),
            ..valid_input()
        };
        let json = serde_json::to_value(input).unwrap();
        assert!(json.get("KMSKeyArn").is_some());
        assert!(json.get("KmsKeyArn").is_none());
        assert_eq!(json["FunctionName"], "app-hello");
        assert_eq!(json["MemorySize"], 256);
        assert_eq!(json["Code"]["ZipFile"], "UEsDBA==");
        assert_eq!(json["VpcConfig"]["SubnetIds"], serde_json::json!([]));
        assert!(json.get("Description").is_none());

        let update = UpdateFunctionCodeInput {
            function_name: "app-hello".to_string(),
            zip_file: "UEsDBA==".to_string(),
            revision_id: Some("r1".to_string()),
        };
        let json = serde_json::to_value(update).unwrap();
        assert!(json.get("FunctionName").is_none());
        assert_eq!(json["RevisionId"], "r1");
    }

    #[test]
    fn test_decode_remote_configuration() {
        let doc = r#"{
            "Configuration": {
                "FunctionName": "app-hello",
                "FunctionArn": "arn:aws:lambda:ap-southeast-1:123456789012:function:app-hello",
                "CodeSha256": "abc=",
                "MemorySize": 512,
                "KMSKeyArn": "arn:aws:kms:ap-southeast-1:123456789012:key/k1",
                "Layers": [{"Arn": "arn:aws:lambda:ap-southeast-1:123456789012:layer:deps:3", "CodeSize": 10}],
                "LastUpdateStatus": "InProgress"
            },
            "Tags": {"team": "core"}
        }"#;
        let output: GetFunctionOutput = serde_json::from_str(doc).unwrap();
        assert_eq!(output.configuration.memory_size, Some(512));
        assert_eq!(output.configuration.code_sha256.as_deref(), Some("abc="));
        assert_eq!(
            output.configuration.kms_key_arn.as_deref(),
            Some("arn:aws:kms:ap-southeast-1:123456789012:key/k1")
        );
        assert_eq!(output.configuration.layers.as_ref().map(Vec::len), Some(1));
        assert!(output.configuration.is_settling());
        assert_eq!(output.tags["team"], "core");
    }
}
