//! Deployable units and their convergence state

use serde::Serialize;
use skybridge_config::{ConfigTree, DEFAULT_STAGE};
use std::fmt;
use std::path::PathBuf;

/// Where a unit is in its convergence
///
/// `Unseen → {Creating | Updating} → VersionPublishing → AliasResolving → AliasBound`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConvergenceState {
    #[default]
    Unseen,
    Creating,
    Updating,
    VersionPublishing,
    AliasResolving,
    AliasBound,
}

impl fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unseen => "unseen",
            Self::Creating => "creating",
            Self::Updating => "updating",
            Self::VersionPublishing => "version-publishing",
            Self::AliasResolving => "alias-resolving",
            Self::AliasBound => "alias-bound",
        };
        f.write_str(label)
    }
}

/// Remote identifiers recorded once a unit reaches [`ConvergenceState::AliasBound`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitIdentifiers {
    pub function_arn: String,
    pub version: String,
    pub alias_arn: String,
    pub revision_id: String,
}

/// One function's lifecycle record
#[derive(Debug, Clone)]
pub struct DeploymentUnit {
    /// Logical name from the configuration
    pub name: String,
    /// Deployed name (prefix + name + suffix)
    pub function_name: String,
    /// Built archive
    pub package_file: PathBuf,
    /// Resolved configuration view with defaults applied
    pub config: ConfigTree,
    pub state: ConvergenceState,
    pub identifiers: Option<UnitIdentifiers>,
}

impl DeploymentUnit {
    pub fn new(
        name: impl Into<String>,
        function_name: impl Into<String>,
        package_file: impl Into<PathBuf>,
        config: ConfigTree,
    ) -> Self {
        Self {
            name: name.into(),
            function_name: function_name.into(),
            package_file: package_file.into(),
            config,
            state: ConvergenceState::Unseen,
            identifiers: None,
        }
    }

    /// Deployment stage, which is also the alias name
    pub fn stage(&self) -> String {
        let stage = self.config.get_string("stage");
        if stage.is_empty() {
            DEFAULT_STAGE.to_string()
        } else {
            stage
        }
    }

    pub fn is_bound(&self) -> bool {
        self.state == ConvergenceState::AliasBound && self.identifiers.is_some()
    }
}
