//! Build, deploy and wire every configured function

use crate::error::{CliError, CliResult};
use crate::output;
use skybridge_aws::ServiceClients;
use skybridge_config::ResolvedConfig;
use skybridge_deploy::{BuildSettings, Collaborators, ContainerBuilder, DockerCli, Pipeline};
use std::sync::Arc;
use tracing::info;

/// Config key overriding every service endpoint
pub const ENDPOINT_KEY: &str = "aws.endpoint";
/// Config key naming the container CLI
pub const CONTAINER_CLI_KEY: &str = "serverless.package.containercli";
const DEFAULT_CONTAINER_CLI: &str = "docker";

pub async fn execute(snapshot: &ResolvedConfig) -> CliResult<()> {
    let tree = snapshot.tree();
    let region = snapshot.region();
    let endpoint = tree.get_string(ENDPOINT_KEY);
    let clients = ServiceClients::load(&region, Some(endpoint.as_str())).await?;

    let container_cli = match tree.get_string(CONTAINER_CLI_KEY) {
        cli if cli.is_empty() => DEFAULT_CONTAINER_CLI.to_string(),
        cli => cli,
    };
    let settings = BuildSettings::from_snapshot(snapshot, std::env::current_dir()?);
    let builder = ContainerBuilder::new(settings, Arc::new(DockerCli::new(container_cli)));

    let collaborators = Collaborators {
        functions: Arc::new(clients.functions),
        gateway: Arc::new(clients.gateway),
        identity: Arc::new(clients.identity),
        builder: Arc::new(builder),
    };

    info!(region = %region, stage = %snapshot.stage(), "Starting deployment");
    let report = Pipeline::new(collaborators).run(snapshot).await;
    output::print_report(&report);

    if report.has_failures() {
        return Err(CliError::DeployFailed {
            failed: report.failed(),
            total: report.units.len(),
        });
    }
    Ok(())
}
