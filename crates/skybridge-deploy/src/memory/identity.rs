use crate::api::IdentityPoolApi;
use crate::error::{ApiError, ApiResult};
use crate::model::{LambdaConfig, UserPool};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct PoolStore {
    pools: BTreeMap<String, UserPool>,
    calls: Vec<String>,
}

/// In-memory identity provider
pub struct InMemoryIdentityPoolApi {
    state: RwLock<PoolStore>,
}

impl Default for InMemoryIdentityPoolApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityPoolApi {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolStore::default()),
        }
    }

    pub fn with_pool(mut self, pool_id: &str, region: &str) -> Self {
        let arn = format!(
            "arn:aws:cognito-idp:{region}:{}:userpool/{pool_id}",
            super::TEST_ACCOUNT_ID
        );
        self.state.get_mut().pools.insert(
            pool_id.to_string(),
            UserPool {
                id: pool_id.to_string(),
                arn,
                name: Some(format!("{pool_id}-pool")),
                lambda_config: LambdaConfig::default(),
            },
        );
        self
    }

    pub async fn pool(&self, pool_id: &str) -> Option<UserPool> {
        self.state.read().await.pools.get(pool_id).cloned()
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.read().await.calls.clone()
    }
}

fn missing_pool(pool_id: &str) -> ApiError {
    ApiError::NotFound(format!("User pool {pool_id} does not exist."))
}

#[async_trait]
impl IdentityPoolApi for InMemoryIdentityPoolApi {
    async fn describe_user_pool(&self, pool_id: &str) -> ApiResult<UserPool> {
        let mut store = self.state.write().await;
        store.calls.push(format!("describe_user_pool {pool_id}"));
        store.pools.get(pool_id).cloned().ok_or_else(|| missing_pool(pool_id))
    }

    async fn update_lambda_config(&self, pool_id: &str, config: &LambdaConfig) -> ApiResult<()> {
        let mut store = self.state.write().await;
        store.calls.push(format!("update_lambda_config {pool_id}"));
        let pool = store.pools.get_mut(pool_id).ok_or_else(|| missing_pool(pool_id))?;
        pool.lambda_config = config.clone();
        Ok(())
    }
}
