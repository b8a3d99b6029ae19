//! Amazon resource names used while wiring integrations

use crate::paths;
use std::fmt;
use std::str::FromStr;

/// `arn:partition:service:region:account:resource`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource: String,
}

impl Arn {
    fn aws(service: &str, region: &str, account_id: &str, resource: String) -> Self {
        Self {
            partition: "aws".to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            resource,
        }
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArnParseError(pub String);

impl fmt::Display for ArnParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not an ARN: {}", self.0)
    }
}

impl std::error::Error for ArnParseError {}

impl FromStr for Arn {
    type Err = ArnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        match parts.as_slice() {
            ["arn", partition, service, region, account_id, resource] => Ok(Self {
                partition: partition.to_string(),
                service: service.to_string(),
                region: region.to_string(),
                account_id: account_id.to_string(),
                resource: resource.to_string(),
            }),
            _ => Err(ArnParseError(s.to_string())),
        }
    }
}

/// Account id embedded in a deployed function ARN
pub fn account_id(function_arn: &str) -> Option<String> {
    function_arn
        .parse::<Arn>()
        .ok()
        .map(|arn| arn.account_id)
        .filter(|id| !id.is_empty())
}

/// Source ARN of a REST API method invoking a function
pub fn invoke_api_arn(
    region: &str,
    account_id: &str,
    rest_api_id: &str,
    stage: &str,
    method: &str,
    resource_path: &str,
) -> Arn {
    Arn::aws(
        "execute-api",
        region,
        account_id,
        paths::join(&[rest_api_id, stage, method, resource_path]),
    )
}

/// Source ARN of a WebSocket route invoking a function
pub fn invoke_ws_api_arn(region: &str, account_id: &str, ws_api_id: &str, route_key: &str) -> Arn {
    Arn::aws(
        "execute-api",
        region,
        account_id,
        paths::join(&[ws_api_id, "*", route_key]),
    )
}

/// Source ARN of an authorizer invoking a function
pub fn authorizer_arn(region: &str, account_id: &str, api_id: &str, authorizer_id: &str) -> Arn {
    Arn::aws(
        "execute-api",
        region,
        account_id,
        paths::join(&[api_id, "authorizers", authorizer_id]),
    )
}

/// Gateway integration URI invoking `function_arn`
pub fn lambda_invocation_uri(region: &str, function_arn: &str) -> Arn {
    Arn::aws(
        "apigateway",
        region,
        "lambda",
        paths::join(&["path", "2015-03-31", "functions", function_arn, "invocations"]),
    )
}
