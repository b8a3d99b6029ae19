//! The resolved, immutable configuration snapshot

use crate::error::{ConfigError, Result};
use crate::resolver::Resolver;
use crate::tree::ConfigTree;
use crate::value::ConfigValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const DEFAULT_REGION: &str = "ap-southeast-1";
pub const DEFAULT_STAGE: &str = "dev";
pub const FUNCTIONS_PATH: &str = "serverless.functions";

/// Per-run settings supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub dry_run: bool,
    pub functions_only: bool,
    /// Restrict the run to these logical function names; empty means all
    pub only: Vec<String>,
    /// Overrides `defaults.stage`
    pub stage: Option<String>,
    /// Overrides `region`
    pub region: Option<String>,
}

/// Fully resolved configuration
///
/// Built once at startup from the raw tree; every consumer reads it by
/// reference afterwards. No reference expressions remain inside.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    tree: ConfigTree,
}

impl ResolvedConfig {
    /// Resolve `raw` and apply the run settings
    pub fn build(raw: &ConfigTree, settings: &RunSettings) -> Result<Self> {
        let mut tree = Resolver::new(raw).resolve_tree()?;

        if !matches!(tree.get(FUNCTIONS_PATH), ConfigValue::Absent | ConfigValue::Mapping(_)) {
            return Err(ConfigError::Invalid(format!(
                "{FUNCTIONS_PATH} must be a mapping of function names"
            )));
        }
        if !matches!(tree.get("defaults"), ConfigValue::Absent | ConfigValue::Mapping(_)) {
            return Err(ConfigError::Invalid("defaults must be a mapping".to_string()));
        }

        tree.set("dryrun", settings.dry_run);
        tree.set("functionsonly", settings.functions_only);
        tree.set(
            "only",
            settings
                .only
                .iter()
                .map(|name| ConfigValue::from(name.to_lowercase()))
                .collect::<Vec<_>>(),
        );

        match settings.region.as_deref().filter(|r| !r.is_empty()) {
            Some(region) => tree.set("region", region),
            None if tree.get_string("region").is_empty() => tree.set("region", DEFAULT_REGION),
            None => {}
        }

        if tree.get_string("serverless.rootdir").is_empty() {
            tree.set("serverless.rootdir", ".");
        }

        match settings.stage.as_deref().filter(|s| !s.is_empty()) {
            Some(stage) => tree.set("defaults.stage", stage),
            None if tree.get_string("defaults.stage").is_empty() => {
                tree.set("defaults.stage", DEFAULT_STAGE)
            }
            None => {}
        }

        let snapshot = Self { tree };
        for name in settings.only.iter().map(|n| n.to_lowercase()) {
            if !snapshot.tree.is_set(&format!("{FUNCTIONS_PATH}.{name}")) {
                warn!(function = %name, "Requested function is not configured");
            }
        }
        debug!(
            region = %snapshot.region(),
            stage = %snapshot.stage(),
            dry_run = snapshot.dry_run(),
            "Configuration resolved"
        );
        Ok(snapshot)
    }

    /// Parse, resolve and finalize an inline YAML document
    pub fn from_yaml(document: &str, settings: &RunSettings) -> Result<Self> {
        Self::build(&ConfigTree::from_yaml(document)?, settings)
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    pub fn dry_run(&self) -> bool {
        self.tree.get_bool("dryrun")
    }

    pub fn functions_only(&self) -> bool {
        self.tree.get_bool("functionsonly")
    }

    pub fn only(&self) -> Vec<String> {
        self.tree.get_string_vec("only")
    }

    pub fn region(&self) -> String {
        self.tree.get_string("region")
    }

    pub fn stage(&self) -> String {
        self.tree.get_string("defaults.stage")
    }

    pub fn root_dir(&self) -> PathBuf {
        PathBuf::from(self.tree.get_string("serverless.rootdir"))
    }

    /// One view per configured function with `defaults` overlaid, honoring
    /// the `only` filter
    pub fn functions(&self) -> BTreeMap<String, ConfigTree> {
        let only = self.only();
        let mut views = self.tree.sub_trees(FUNCTIONS_PATH, self.tree.get("defaults"));
        views.retain(|name, _| only.is_empty() || only.contains(name));
        views
    }

    /// Render the snapshot as YAML
    pub fn to_yaml(&self) -> Result<String> {
        self.tree.to_yaml()
    }
}
