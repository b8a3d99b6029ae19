//! Skybridge cloud clients
//!
//! SDK-backed implementations of the `skybridge-deploy` collaborator traits:
//! [`LambdaClient`] for functions, [`GatewayClient`] for REST and WebSocket
//! gateways, [`CognitoClient`] for identity pools. All of them share one
//! [`aws_config::SdkConfig`], so credentials come from the default provider
//! chain and an endpoint override reaches every service.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cognito;
pub mod connect;
pub mod error;
pub mod gateway;
pub mod lambda;
pub mod sdk;

// Re-exports
pub use cognito::CognitoClient;
pub use connect::ServiceClients;
pub use error::{api_error, AwsError, Result};
pub use gateway::GatewayClient;
pub use lambda::LambdaClient;
pub use sdk::{ensure_credentials, load_sdk_config};
