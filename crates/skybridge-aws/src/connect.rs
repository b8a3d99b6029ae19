//! One client per service, sharing one SDK configuration

use crate::cognito::CognitoClient;
use crate::error::Result;
use crate::gateway::GatewayClient;
use crate::lambda::LambdaClient;
use crate::sdk::{ensure_credentials, load_sdk_config};
use aws_config::SdkConfig;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct ServiceClients {
    pub functions: LambdaClient,
    pub gateway: GatewayClient,
    pub identity: CognitoClient,
}

impl ServiceClients {
    /// Clients built from `config`; `endpoint` overrides every service
    /// endpoint (local emulators)
    pub fn new(config: &SdkConfig, endpoint: Option<&str>) -> Result<Self> {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            debug!(endpoint, "Using endpoint override");
        }
        Ok(Self {
            functions: LambdaClient::new(config, endpoint)?,
            gateway: GatewayClient::new(config, endpoint)?,
            identity: CognitoClient::new(config, endpoint)?,
        })
    }

    /// Clients for `region` with credentials from the default provider
    /// chain, resolved before returning
    #[instrument]
    pub async fn load(region: &str, endpoint: Option<&str>) -> Result<Self> {
        let config = load_sdk_config(region).await;
        ensure_credentials(&config).await?;
        Self::new(&config, endpoint)
    }
}
