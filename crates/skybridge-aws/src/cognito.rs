//! Identity provider (user pool) client

use crate::error::{api_error, Result};
use crate::sdk::{endpoint_override, owned, text, timeouts};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cognitoidentityprovider::types::LambdaConfigType;
use aws_sdk_cognitoidentityprovider::Client;
use skybridge_deploy::model::{LambdaConfig, UserPool};
use skybridge_deploy::{ApiResult, IdentityPoolApi};
use tracing::instrument;

/// [`IdentityPoolApi`] over the user pool SDK
#[derive(Debug, Clone)]
pub struct CognitoClient {
    client: Client,
}

impl CognitoClient {
    pub fn new(config: &SdkConfig, endpoint: Option<&str>) -> Result<Self> {
        let mut builder =
            aws_sdk_cognitoidentityprovider::config::Builder::from(config).timeout_config(timeouts());
        if let Some(endpoint) = endpoint_override(endpoint)? {
            builder = builder.endpoint_url(endpoint);
        }
        Ok(Self::from_client(Client::from_conf(builder.build())))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn lambda_config(triggers: Option<&LambdaConfigType>) -> LambdaConfig {
    let Some(triggers) = triggers else {
        return LambdaConfig::default();
    };
    LambdaConfig {
        pre_sign_up: owned(triggers.pre_sign_up()),
        custom_message: owned(triggers.custom_message()),
        post_confirmation: owned(triggers.post_confirmation()),
        pre_authentication: owned(triggers.pre_authentication()),
        post_authentication: owned(triggers.post_authentication()),
        define_auth_challenge: owned(triggers.define_auth_challenge()),
        create_auth_challenge: owned(triggers.create_auth_challenge()),
        verify_auth_challenge_response: owned(triggers.verify_auth_challenge_response()),
        pre_token_generation: owned(triggers.pre_token_generation()),
        user_migration: owned(triggers.user_migration()),
    }
}

fn lambda_config_type(config: &LambdaConfig) -> LambdaConfigType {
    LambdaConfigType::builder()
        .set_pre_sign_up(config.pre_sign_up.clone())
        .set_custom_message(config.custom_message.clone())
        .set_post_confirmation(config.post_confirmation.clone())
        .set_pre_authentication(config.pre_authentication.clone())
        .set_post_authentication(config.post_authentication.clone())
        .set_define_auth_challenge(config.define_auth_challenge.clone())
        .set_create_auth_challenge(config.create_auth_challenge.clone())
        .set_verify_auth_challenge_response(config.verify_auth_challenge_response.clone())
        .set_pre_token_generation(config.pre_token_generation.clone())
        .set_user_migration(config.user_migration.clone())
        .build()
}

#[async_trait]
impl IdentityPoolApi for CognitoClient {
    #[instrument(skip(self))]
    async fn describe_user_pool(&self, pool_id: &str) -> ApiResult<UserPool> {
        let output = self
            .client
            .describe_user_pool()
            .user_pool_id(pool_id)
            .send()
            .await
            .map_err(api_error)?;
        let pool = output.user_pool();
        Ok(UserPool {
            id: text(pool.and_then(|pool| pool.id())),
            arn: text(pool.and_then(|pool| pool.arn())),
            name: owned(pool.and_then(|pool| pool.name())),
            lambda_config: lambda_config(pool.and_then(|pool| pool.lambda_config())),
        })
    }

    /// Only the trigger configuration is sent; the service resets every
    /// attribute the request leaves out.
    #[instrument(skip(self, config))]
    async fn update_lambda_config(&self, pool_id: &str, config: &LambdaConfig) -> ApiResult<()> {
        self.client
            .update_user_pool()
            .user_pool_id(pool_id)
            .lambda_config(lambda_config_type(config))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}
