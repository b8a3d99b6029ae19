//! Producing deployment archives
//!
//! A [`Builder`] turns a [`BuildRequest`] into a zip archive on the local
//! filesystem. [`ContainerBuilder`] does it inside one long-lived container
//! per runtime. The pipeline holds the builder through a [`BuildSession`],
//! which releases those containers on every exit path.

pub mod container;
pub mod script;

use crate::error::BuildResult;
use async_trait::async_trait;
use skybridge_config::{ConfigTree, ResolvedConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub use container::{CommandOutput, ContainerBuilder, ContainerRuntime, DockerCli};
pub use script::{render_script, shell_quote, BuildSettings, CONTAINER_ROOT};

/// One function to package
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Logical name from the configuration
    pub name: String,
    /// Deployed name (prefix + name + suffix)
    pub function_name: String,
    pub runtime: String,
    /// Source directory relative to the project root dir
    pub source: String,
    /// Function view with defaults applied
    pub config: ConfigTree,
}

#[async_trait]
pub trait Builder: Send + Sync {
    /// Reset shared build state before the first build of a run
    async fn prepare(&self) -> BuildResult<()> {
        Ok(())
    }

    /// Build one archive and return its local path
    async fn build(&self, request: &BuildRequest) -> BuildResult<PathBuf>;

    /// Release every build environment; safe to call more than once
    async fn shutdown(&self);
}

/// Scoped use of a [`Builder`]
///
/// [`BuildSession::finish`] awaits [`Builder::shutdown`]. A session dropped
/// without finishing, by a panic or a cancelled run, spawns the shutdown on
/// the current runtime instead.
pub struct BuildSession {
    builder: Arc<dyn Builder>,
    finished: bool,
}

impl BuildSession {
    pub fn new(builder: Arc<dyn Builder>) -> Self {
        Self {
            builder,
            finished: false,
        }
    }

    pub fn builder(&self) -> &dyn Builder {
        self.builder.as_ref()
    }

    /// Release every build environment
    pub async fn finish(mut self) {
        self.finished = true;
        self.builder.shutdown().await;
    }
}

impl Drop for BuildSession {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let builder = self.builder.clone();
                handle.spawn(async move { builder.shutdown().await });
            }
            Err(_) => warn!("Build session dropped outside a runtime, environments not released"),
        }
    }
}

/// Build requests for every configured function, in name order
///
/// Per-function `prefix` / `suffix` override `serverless.prefix` /
/// `serverless.suffix`; `source` defaults to the logical name.
pub fn plan_units(snapshot: &ResolvedConfig) -> Vec<BuildRequest> {
    let tree = snapshot.tree();
    let prefix = tree.get_string("serverless.prefix");
    let suffix = tree.get_string("serverless.suffix");

    snapshot
        .functions()
        .into_iter()
        .map(|(name, mut config)| {
            config.set_default("prefix", prefix.as_str());
            config.set_default("suffix", suffix.as_str());
            config.set_default("source", name.as_str());

            let function_name = format!(
                "{}{}{}",
                config.get_string("prefix"),
                name,
                config.get_string("suffix")
            );
            BuildRequest {
                function_name,
                runtime: config.get_string("runtime"),
                source: config.get_string("source"),
                name,
                config,
            }
        })
        .collect()
}
