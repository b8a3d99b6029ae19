//! The deploy run: build, converge, wire, report

use crate::api::{FunctionApi, GatewayApi, IdentityPoolApi};
use crate::build::{plan_units, BuildRequest, BuildSession, Builder};
use crate::convergence::{Convergence, Converger, SettlePolicy};
use crate::integration::{GatewaySettings, GatewayWiring, IdentitySettings, IdentityWiring, WiringSummary};
use crate::unit::{ConvergenceState, DeploymentUnit, UnitIdentifiers};
use serde::Serialize;
use skybridge_config::ResolvedConfig;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Everything the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub functions: Arc<dyn FunctionApi>,
    pub gateway: Arc<dyn GatewayApi>,
    pub identity: Arc<dyn IdentityPoolApi>,
    pub builder: Arc<dyn Builder>,
}

/// How one unit ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum UnitOutcome {
    Deployed { created: bool },
    DryRun { create: bool },
    BuildFailed(String),
    Failed(String),
}

impl UnitOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, UnitOutcome::BuildFailed(_) | UnitOutcome::Failed(_))
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Deployed { created: true } => f.write_str("created"),
            UnitOutcome::Deployed { created: false } => f.write_str("updated"),
            UnitOutcome::DryRun { create: true } => f.write_str("would create"),
            UnitOutcome::DryRun { create: false } => f.write_str("would update"),
            UnitOutcome::BuildFailed(_) => f.write_str("build failed"),
            UnitOutcome::Failed(_) => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub function_name: String,
    pub outcome: UnitOutcome,
    /// State the unit stopped in
    pub state: ConvergenceState,
    pub identifiers: Option<UnitIdentifiers>,
}

/// Result of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub stage: String,
    pub dry_run: bool,
    pub units: Vec<UnitReport>,
    /// `None` when gateway wiring did not run
    pub gateway: Option<WiringSummary>,
    pub identity: Option<WiringSummary>,
}

impl RunReport {
    pub fn deployed(&self) -> usize {
        self.count(|outcome| matches!(outcome, UnitOutcome::Deployed { .. }))
    }

    pub fn planned(&self) -> usize {
        self.count(|outcome| matches!(outcome, UnitOutcome::DryRun { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(UnitOutcome::is_failure)
    }

    /// Whether any unit failed to build or converge
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|unit| unit.name == name)
    }

    fn count(&self, predicate: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|unit| predicate(&unit.outcome)).count()
    }
}

/// Runs a whole deployment against a resolved snapshot
pub struct Pipeline {
    collaborators: Collaborators,
    settle: SettlePolicy,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Deploy every configured function
    ///
    /// Units are independent: a failed build or convergence is recorded in
    /// the report and the run moves on to the next unit.
    #[instrument(skip_all, fields(stage = %snapshot.stage(), region = %snapshot.region()))]
    pub async fn run(&self, snapshot: &ResolvedConfig) -> RunReport {
        let dry_run = snapshot.dry_run();
        let mut report = RunReport {
            stage: snapshot.stage(),
            dry_run,
            ..RunReport::default()
        };

        let requests = plan_units(snapshot);
        info!(units = requests.len(), "Building functions");
        let mut units = self.build_all(&requests, &mut report).await;

        let converger =
            Converger::new(self.collaborators.functions.clone(), dry_run).with_settle_policy(self.settle);
        for unit in &mut units {
            let outcome = match converger.converge(unit).await {
                Ok(Convergence::Applied { created }) => UnitOutcome::Deployed { created },
                Ok(Convergence::Planned { create }) => UnitOutcome::DryRun { create },
                Err(e) => {
                    error!(unit = %unit.name, function = %unit.function_name, state = %unit.state, error = %e, "Failed to deploy function");
                    UnitOutcome::Failed(e.to_string())
                }
            };
            report.units.push(UnitReport {
                name: unit.name.clone(),
                function_name: unit.function_name.clone(),
                outcome,
                state: unit.state,
                identifiers: unit.identifiers.clone(),
            });
        }

        if snapshot.functions_only() {
            info!("Functions only, skipping integrations");
        } else {
            report.gateway = self.wire_gateway(snapshot, &units, dry_run).await;
            report.identity = self.wire_identity(snapshot, &units, dry_run).await;
        }

        info!(
            deployed = report.deployed(),
            planned = report.planned(),
            failed = report.failed(),
            "Deployment finished"
        );
        report
    }

    /// Build every request, releasing build environments afterwards
    async fn build_all(&self, requests: &[BuildRequest], report: &mut RunReport) -> Vec<DeploymentUnit> {
        let session = BuildSession::new(self.collaborators.builder.clone());
        let builder = session.builder();
        let mut units = Vec::with_capacity(requests.len());

        match builder.prepare().await {
            Ok(()) => {
                for request in requests {
                    match builder.build(request).await {
                        Ok(package_file) => units.push(DeploymentUnit::new(
                            request.name.as_str(),
                            request.function_name.as_str(),
                            package_file,
                            request.config.clone(),
                        )),
                        Err(e) => {
                            error!(unit = %request.name, error = %e, "Failed to build function");
                            report.units.push(build_failure(request, e.to_string()));
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to prepare build directory");
                report
                    .units
                    .extend(requests.iter().map(|request| build_failure(request, e.to_string())));
            }
        }

        session.finish().await;
        units
    }

    async fn wire_gateway(
        &self,
        snapshot: &ResolvedConfig,
        units: &[DeploymentUnit],
        dry_run: bool,
    ) -> Option<WiringSummary> {
        let settings = GatewaySettings::from_snapshot(snapshot)?;
        let wiring = GatewayWiring::new(
            self.collaborators.gateway.clone(),
            self.collaborators.functions.clone(),
            settings,
            dry_run,
        );

        let summary = match wiring.wire(units).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Failed to wire API gateway");
                WiringSummary {
                    failed: 1,
                    ..WiringSummary::default()
                }
            }
        };
        if let Err(e) = wiring.deploy_stage().await {
            error!(error = %e, "Failed to deploy stage");
        }
        if !summary.is_clean() {
            warn!(failed = summary.failed, "Some gateway integrations failed");
        }
        Some(summary)
    }

    async fn wire_identity(
        &self,
        snapshot: &ResolvedConfig,
        units: &[DeploymentUnit],
        dry_run: bool,
    ) -> Option<WiringSummary> {
        let settings = IdentitySettings::from_snapshot(snapshot)?;
        let wiring = IdentityWiring::new(
            self.collaborators.identity.clone(),
            self.collaborators.functions.clone(),
            settings,
            dry_run,
        );
        Some(wiring.wire(units).await)
    }
}

fn build_failure(request: &BuildRequest, reason: String) -> UnitReport {
    UnitReport {
        name: request.name.clone(),
        function_name: request.function_name.clone(),
        outcome: UnitOutcome::BuildFailed(reason),
        state: ConvergenceState::Unseen,
        identifiers: None,
    }
}
