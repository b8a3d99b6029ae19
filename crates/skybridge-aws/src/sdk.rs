//! Shared SDK configuration: loading, credentials, endpoint overrides
//!
//! Every client is built from one [`SdkConfig`]. The per-service config
//! inherits the HTTP client, retry policy and credentials from it; only the
//! endpoint and the operation timeout are applied on top.

use crate::error::{AwsError, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::timeout::TimeoutConfig;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Upper bound for a single call, retries included
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Load the shared configuration for `region` from the default provider
/// chain (environment, profile files, container and instance metadata)
#[instrument]
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Resolve credentials once up front so a missing profile fails before any
/// build work starts
pub async fn ensure_credentials(config: &SdkConfig) -> Result<()> {
    let provider = config
        .credentials_provider()
        .ok_or_else(|| AwsError::Credentials("no credentials provider configured".to_string()))?;
    provider
        .provide_credentials()
        .await
        .map_err(|err| AwsError::Credentials(DisplayErrorContext(&err).to_string()))?;
    debug!("Resolved credentials");
    Ok(())
}

/// Validate an endpoint override; an empty value keeps the service defaults
pub fn endpoint_override(endpoint: Option<&str>) -> Result<Option<String>> {
    let Some(endpoint) = endpoint.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    let invalid = |reason: String| AwsError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };
    let url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(Some(endpoint.trim_end_matches('/').to_string()))
}

pub fn timeouts() -> TimeoutConfig {
    TimeoutConfig::builder()
        .operation_timeout(OPERATION_TIMEOUT)
        .build()
}

// Getter adapters. Required members come back as plain values and optional
// ones as `Option`; both convert through `Into<Option<_>>`.

pub(crate) fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}

pub(crate) fn owned<'a>(value: impl Into<Option<&'a str>>) -> Option<String> {
    value.into().map(str::to_string)
}

pub(crate) fn int(value: impl Into<Option<i32>>) -> Option<i64> {
    value.into().map(i64::from)
}

pub(crate) fn narrow(value: Option<i64>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}

pub(crate) fn sorted<'a>(
    map: impl Into<Option<&'a HashMap<String, String>>>,
) -> Option<BTreeMap<String, String>> {
    map.into()
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

pub(crate) fn hashed(map: &BTreeMap<String, String>) -> HashMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}
