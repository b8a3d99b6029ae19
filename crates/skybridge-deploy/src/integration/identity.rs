//! Identity-pool trigger wiring

use super::WiringSummary;
use crate::api::{FunctionApi, IdentityPoolApi};
use crate::permission::{upsert_invoke_permission, IDENTITY_PRINCIPAL};
use crate::unit::DeploymentUnit;
use skybridge_config::ResolvedConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// `cognito.userPools`: stage name -> user pool id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySettings {
    pub user_pools: BTreeMap<String, String>,
}

impl IdentitySettings {
    /// `None` when no user pool is configured
    pub fn from_snapshot(snapshot: &ResolvedConfig) -> Option<Self> {
        let user_pools = snapshot.tree().get_string_map("cognito.userpools");
        (!user_pools.is_empty()).then_some(Self { user_pools })
    }
}

/// Attaches deployed aliases to user pool triggers
pub struct IdentityWiring {
    pools: Arc<dyn IdentityPoolApi>,
    functions: Arc<dyn FunctionApi>,
    settings: IdentitySettings,
    dry_run: bool,
}

impl IdentityWiring {
    pub fn new(
        pools: Arc<dyn IdentityPoolApi>,
        functions: Arc<dyn FunctionApi>,
        settings: IdentitySettings,
        dry_run: bool,
    ) -> Self {
        Self {
            pools,
            functions,
            settings,
            dry_run,
        }
    }

    /// Wire every bound unit that names `cognito.triggers`
    #[instrument(skip_all)]
    pub async fn wire(&self, units: &[DeploymentUnit]) -> WiringSummary {
        let mut summary = WiringSummary::default();

        for unit in units.iter().filter(|unit| unit.is_bound()) {
            let Some(identifiers) = &unit.identifiers else {
                continue;
            };
            let triggers = unit.config.get_string_vec("cognito.triggers");
            if triggers.is_empty() {
                continue;
            }
            let stage = unit.stage();
            let Some(pool_id) = self.settings.user_pools.get(&stage) else {
                warn!(function = %unit.function_name, stage = %stage, "No user pool configured for stage");
                continue;
            };

            info!(function = %unit.function_name, pool = %pool_id, "Activating function on user pool");
            let pool = match self.pools.describe_user_pool(pool_id).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!(pool = %pool_id, error = %e, "Failed to describe user pool");
                    summary.failed += 1;
                    continue;
                }
            };

            let mut lambda_config = pool.lambda_config.clone();
            let mut attached = 0;
            for trigger in &triggers {
                if lambda_config.set_trigger(trigger, &identifiers.alias_arn) {
                    attached += 1;
                } else {
                    warn!(trigger = %trigger, "Unknown user pool trigger");
                }
            }
            if attached == 0 {
                continue;
            }

            if self.dry_run {
                warn!(pool = %pool_id, "Dry run, skipping user pool update");
                summary.planned += 1;
                continue;
            }

            if let Err(e) = self.pools.update_lambda_config(pool_id, &lambda_config).await {
                error!(pool = %pool_id, error = %e, "Failed to update user pool triggers");
                summary.failed += 1;
                continue;
            }

            match upsert_invoke_permission(
                self.functions.as_ref(),
                &identifiers.alias_arn,
                IDENTITY_PRINCIPAL,
                &pool.arn,
            )
            .await
            {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    error!(pool = %pool_id, error = %e, "Failed to grant invoke permission");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
