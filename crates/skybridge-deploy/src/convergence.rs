//! Per-unit convergence: function → version → alias

use crate::api::{fetch_remote, FunctionApi, RemoteState};
use crate::error::{ApiError, DeployError, Result};
use crate::model::*;
use crate::reconcile::{configuration_update, reconcile, DesiredFunction};
use crate::unit::{ConvergenceState, DeploymentUnit, UnitIdentifiers};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How long to wait for an in-progress create or update to finish
#[derive(Debug, Clone, Copy)]
pub struct SettlePolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            attempts: 60,
            interval: Duration::from_secs(2),
        }
    }
}

/// What converging one unit did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// Applied; `created` tells which branch ran
    Applied { created: bool },
    /// Dry run: fetch and reconcile ran, nothing was applied
    Planned { create: bool },
}

/// Drives units through [`ConvergenceState`]
pub struct Converger {
    api: Arc<dyn FunctionApi>,
    dry_run: bool,
    settle: SettlePolicy,
}

impl Converger {
    pub fn new(api: Arc<dyn FunctionApi>, dry_run: bool) -> Self {
        Self {
            api,
            dry_run,
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Converge one unit
    ///
    /// Any error stops this unit at its current state; identifiers are only
    /// recorded once the alias is bound. In dry-run mode the unit stays in
    /// `Creating` or `Updating` with no identifiers.
    #[instrument(skip(self, unit), fields(unit = %unit.name, function = %unit.function_name))]
    pub async fn converge(&self, unit: &mut DeploymentUnit) -> Result<Convergence> {
        let stage = unit.stage();
        info!(stage = %stage, "Deploying function");

        let remote = fetch_remote(self.api.as_ref(), &unit.function_name).await?;
        let create = !remote.exists();
        unit.state = if create {
            ConvergenceState::Creating
        } else {
            ConvergenceState::Updating
        };
        debug!(state = %unit.state, "Fetched remote state");

        let archive = tokio::fs::read(&unit.package_file).await?;
        let desired = DesiredFunction::from_config(&unit.function_name, &unit.config);
        let input = reconcile(&remote, &desired, &archive)?;

        if self.dry_run {
            warn!(create, "Dry run, skipping deploy");
            return Ok(Convergence::Planned { create });
        }

        let deployed = match &remote {
            RemoteState::Missing => self.api.create_function(&input).await?,
            RemoteState::Present(existing) => self.update(existing, &input).await?,
        };
        let function_arn = deployed.function_arn.clone().unwrap_or_default();
        let code_sha256 = deployed.code_sha256.clone();
        let deployed = self.settled(&unit.function_name, deployed).await?;

        unit.state = ConvergenceState::VersionPublishing;
        let published = self
            .api
            .publish_version(&PublishVersionInput {
                function_name: unit.function_name.clone(),
                code_sha256,
                description: Some(stage.clone()),
                revision_id: deployed.revision_id.clone(),
            })
            .await?;
        let version = published.version.clone().unwrap_or_default();
        info!(version = %version, "Published version");

        unit.state = ConvergenceState::AliasResolving;
        let alias = self.bind_alias(&unit.function_name, &stage, &version).await?;
        info!(alias = %alias.name, "Published alias");

        unit.state = ConvergenceState::AliasBound;
        unit.identifiers = Some(UnitIdentifiers {
            function_arn,
            version,
            alias_arn: alias.alias_arn,
            revision_id: published.revision_id.unwrap_or_default(),
        });
        info!("Deployed function");
        Ok(Convergence::Applied { created: create })
    }

    /// Two-phase update: code guarded by the observed token, then
    /// configuration guarded by the token the code update returned, then tags
    async fn update(
        &self,
        existing: &GetFunctionOutput,
        input: &CreateFunctionInput,
    ) -> Result<FunctionConfiguration> {
        let function_name = input.function_name.clone().unwrap_or_default();

        let code = self
            .api
            .update_function_code(&UpdateFunctionCodeInput {
                function_name: function_name.clone(),
                zip_file: input.code.zip_file.clone(),
                revision_id: existing.configuration.revision_id.clone(),
            })
            .await?;
        let code_sha256 = code.code_sha256.clone();
        let code = self.settled(&function_name, code).await?;

        let update = configuration_update(input, code.revision_id.clone())?;
        let mut deployed = self.api.update_function_configuration(&update).await?;
        if deployed.code_sha256.is_none() {
            deployed.code_sha256 = code_sha256;
        }

        let arn = deployed
            .function_arn
            .clone()
            .or_else(|| existing.configuration.function_arn.clone())
            .unwrap_or_default();
        if let Err(err) = self.api.tag_resource(&arn, &input.tags).await {
            warn!(error = %err, "Failed to tag function");
        }

        Ok(deployed)
    }

    /// Wait until a create or update is no longer in progress
    async fn settled(
        &self,
        function_name: &str,
        mut current: FunctionConfiguration,
    ) -> Result<FunctionConfiguration> {
        let mut attempts = 0;
        while current.is_settling() {
            if attempts >= self.settle.attempts {
                return Err(DeployError::Unsettled {
                    function: function_name.to_string(),
                    status: "still in progress".to_string(),
                });
            }
            attempts += 1;
            debug!(attempt = attempts, "Waiting for function update to finish");
            tokio::time::sleep(self.settle.interval).await;
            current = self.api.get_function(function_name).await?.configuration;
        }

        if current.has_failed() {
            return Err(DeployError::Unsettled {
                function: function_name.to_string(),
                status: current
                    .state_reason
                    .clone()
                    .unwrap_or_else(|| "failed".to_string()),
            });
        }
        Ok(current)
    }

    /// Point the stage alias at `version`
    ///
    /// A failed update of an existing alias is logged and the existing alias
    /// is kept; the function itself is already deployed.
    async fn bind_alias(
        &self,
        function_name: &str,
        stage: &str,
        version: &str,
    ) -> Result<AliasConfiguration> {
        match self.api.get_alias(function_name, stage).await {
            Ok(existing) => {
                let update = UpdateAliasInput {
                    function_name: function_name.to_string(),
                    name: stage.to_string(),
                    function_version: version.to_string(),
                    revision_id: existing.revision_id.clone(),
                };
                match self.api.update_alias(&update).await {
                    Ok(updated) => Ok(updated),
                    Err(err) => {
                        warn!(alias = %stage, error = %err, "Failed to update alias");
                        Ok(existing)
                    }
                }
            }
            Err(ApiError::NotFound(_)) => Ok(self
                .api
                .create_alias(&CreateAliasInput {
                    function_name: function_name.to_string(),
                    name: stage.to_string(),
                    function_version: version.to_string(),
                    description: None,
                })
                .await?),
            Err(err) => Err(err.into()),
        }
    }
}
