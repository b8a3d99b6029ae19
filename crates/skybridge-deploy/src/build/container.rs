//! Container-backed builds

use super::script::{artifact_exists, render_script, BuildSettings, CONTAINER_ROOT};
use super::{BuildRequest, Builder};
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Exit status and combined output of a command run in a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Minimal container engine surface used by [`ContainerBuilder`]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached, idle container with `source` bind-mounted at `target`
    async fn start(&self, image: &str, source: &Path, target: &str) -> BuildResult<String>;

    async fn exec(&self, container_id: &str, command: &[String]) -> BuildResult<CommandOutput>;

    /// Force-remove a container
    async fn remove(&self, container_id: &str) -> BuildResult<()>;
}

/// [`ContainerRuntime`] over the `docker` command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[String]) -> BuildResult<CommandOutput> {
        debug!(program = %self.program, args = ?args, "Running container command");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| BuildError::Container(format!("Failed to run {}: {}", self.program, e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            status: output.status.code(),
            output: text,
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start(&self, image: &str, source: &Path, target: &str) -> BuildResult<String> {
        let args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--mount".to_string(),
            format!("type=bind,source={},target={}", source.display(), target),
            image.to_string(),
            "tail".to_string(),
            "-f".to_string(),
            "/dev/null".to_string(),
        ];
        let output = self.run(&args).await?;
        if !output.success() {
            return Err(BuildError::Container(output.output.trim().to_string()));
        }
        // `docker run -d` may print pull progress before the id
        output
            .output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| BuildError::Container("no container id reported".to_string()))
    }

    async fn exec(&self, container_id: &str, command: &[String]) -> BuildResult<CommandOutput> {
        let mut args = vec!["exec".to_string(), container_id.to_string()];
        args.extend(command.iter().cloned());
        self.run(&args).await
    }

    async fn remove(&self, container_id: &str) -> BuildResult<()> {
        let args = vec!["rm".to_string(), "-f".to_string(), container_id.to_string()];
        let output = self.run(&args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(BuildError::Container(output.output.trim().to_string()))
        }
    }
}

/// Builds archives inside one long-lived container per runtime
pub struct ContainerBuilder {
    settings: BuildSettings,
    runtime: Arc<dyn ContainerRuntime>,
    /// runtime name -> container id
    containers: Mutex<HashMap<String, String>>,
}

impl ContainerBuilder {
    pub fn new(settings: BuildSettings, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            settings,
            runtime,
            containers: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Running container for `runtime`, started on first use
    async fn container_for(&self, runtime: &str) -> BuildResult<String> {
        let mut containers = self.containers.lock().await;
        if let Some(id) = containers.get(runtime) {
            return Ok(id.clone());
        }

        info!(runtime = %runtime, "Preparing build environment");
        let image = self.settings.image_for(runtime);
        let id = self
            .runtime
            .start(&image, &self.settings.project_dir, CONTAINER_ROOT)
            .await
            .map_err(|e| BuildError::Environment {
                runtime: runtime.to_string(),
                reason: e.to_string(),
            })?;
        debug!(runtime = %runtime, container = %id, "Build environment started");
        containers.insert(runtime.to_string(), id.clone());
        Ok(id)
    }
}

#[async_trait]
impl Builder for ContainerBuilder {
    async fn prepare(&self) -> BuildResult<()> {
        let build_dir = self.settings.local_build_dir();
        match tokio::fs::remove_dir_all(&build_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(self.settings.local_package_dir()).await?;
        debug!(build_dir = %build_dir.display(), "Build directory recreated");
        Ok(())
    }

    #[instrument(skip(self, request), fields(unit = %request.name, runtime = %request.runtime))]
    async fn build(&self, request: &BuildRequest) -> BuildResult<PathBuf> {
        if request.runtime.is_empty() {
            return Err(BuildError::Environment {
                runtime: String::new(),
                reason: format!("no runtime configured for {}", request.name),
            });
        }
        let container = self.container_for(&request.runtime).await?;

        let script = render_script(&self.settings, request);
        tokio::fs::write(self.settings.local_script_path(&request.name), script).await?;

        info!("Building function");
        let command = vec![
            "/bin/sh".to_string(),
            self.settings.container_script_path(&request.name),
        ];
        let output = self.runtime.exec(&container, &command).await?;
        if !output.success() {
            return Err(BuildError::Command {
                unit: request.name.clone(),
                status: output.status,
                output: output.output,
            });
        }

        let package_file = self.settings.package_file(&request.name);
        if !artifact_exists(&package_file).await {
            return Err(BuildError::MissingArtifact {
                unit: request.name.clone(),
                path: package_file.display().to_string(),
            });
        }
        info!(package = %package_file.display(), "Built function");
        Ok(package_file)
    }

    async fn shutdown(&self) {
        let drained: Vec<(String, String)> = self.containers.lock().await.drain().collect();
        for (runtime, id) in drained {
            debug!(runtime = %runtime, container = %id, "Removing build environment");
            if let Err(e) = self.runtime.remove(&id).await {
                warn!(runtime = %runtime, container = %id, error = %e, "Failed to remove build environment");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybridge_config::ConfigTree;
    use std::sync::Mutex as StdMutex;

    /// Records calls; `exec` writes the archive the script would have produced
    struct RecordingRuntime {
        package_dir: PathBuf,
        fail_exec: bool,
        calls: StdMutex<Vec<String>>,
    }

    impl RecordingRuntime {
        fn new(package_dir: PathBuf, fail_exec: bool) -> Self {
            Self {
                package_dir,
                fail_exec,
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for RecordingRuntime {
        async fn start(&self, image: &str, _source: &Path, target: &str) -> BuildResult<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(format!("start {image} {target}"));
            Ok(format!("container-{}", calls.len()))
        }

        async fn exec(&self, container_id: &str, command: &[String]) -> BuildResult<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("exec {container_id} {}", command.join(" ")));
            if self.fail_exec {
                return Ok(CommandOutput {
                    status: Some(1),
                    output: "pip: not found".to_string(),
                });
            }
            let script = command.last().cloned().unwrap_or_default();
            let name = script
                .rsplit('/')
                .next()
                .and_then(|file| file.strip_prefix("build-"))
                .and_then(|file| file.strip_suffix(".sh"))
                .unwrap_or_default()
                .to_string();
            std::fs::write(self.package_dir.join(format!("{name}.zip")), b"PK\x03\x04").unwrap();
            Ok(CommandOutput {
                status: Some(0),
                output: String::new(),
            })
        }

        async fn remove(&self, container_id: &str) -> BuildResult<()> {
            self.calls.lock().unwrap().push(format!("remove {container_id}"));
            Ok(())
        }
    }

    fn settings(project_dir: &Path) -> BuildSettings {
        BuildSettings {
            project_dir: project_dir.to_path_buf(),
            root_dir: ".".to_string(),
            build_dir: ".skybridge".to_string(),
            requirements_file: "requirements.txt".to_string(),
            cleanup: false,
            image: "lambci/lambda:build-{runtime}".to_string(),
            global_requirements: Vec::new(),
            global_includes: Vec::new(),
        }
    }

    fn request(name: &str, runtime: &str) -> BuildRequest {
        BuildRequest {
            name: name.to_string(),
            function_name: format!("app-{name}"),
            runtime: runtime.to_string(),
            source: name.to_string(),
            config: ConfigTree::new(),
        }
    }

    #[tokio::test]
    async fn test_container_reused_per_runtime_and_removed_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let runtime = Arc::new(RecordingRuntime::new(settings.local_package_dir(), false));
        let builder = ContainerBuilder::new(settings.clone(), runtime.clone());

        builder.prepare().await.unwrap();
        let first = builder.build(&request("hello", "python3.8")).await.unwrap();
        builder.build(&request("world", "python3.8")).await.unwrap();
        builder.build(&request("jobs", "python3.9")).await.unwrap();
        assert_eq!(first, settings.package_file("hello"));
        assert!(settings.local_script_path("world").is_file());

        builder.shutdown().await;
        builder.shutdown().await;

        let calls = runtime.calls();
        let starts: Vec<_> = calls.iter().filter(|c| c.starts_with("start")).collect();
        let removes: Vec<_> = calls.iter().filter(|c| c.starts_with("remove")).collect();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0], "start lambci/lambda:build-python3.8 /cwd");
        assert_eq!(removes.len(), 2);
        assert!(calls.contains(&"exec container-1 /bin/sh /cwd/.skybridge/build-world.sh".to_string()));
    }

    #[tokio::test]
    async fn test_prepare_recreates_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        std::fs::create_dir_all(settings.local_build_dir()).unwrap();
        std::fs::write(settings.local_build_dir().join("stale.txt"), "old").unwrap();

        let runtime = Arc::new(RecordingRuntime::new(settings.local_package_dir(), false));
        let builder = ContainerBuilder::new(settings.clone(), runtime);
        builder.prepare().await.unwrap();

        assert!(!settings.local_build_dir().join("stale.txt").exists());
        assert!(settings.local_package_dir().is_dir());
    }

    #[tokio::test]
    async fn test_failed_command_reports_output() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let runtime = Arc::new(RecordingRuntime::new(settings.local_package_dir(), true));
        let builder = ContainerBuilder::new(settings, runtime);
        builder.prepare().await.unwrap();

        let err = builder.build(&request("hello", "python3.8")).await.unwrap_err();
        match err {
            BuildError::Command { unit, status, output } => {
                assert_eq!(unit, "hello");
                assert_eq!(status, Some(1));
                assert!(output.contains("pip"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_runtime_is_an_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let runtime = Arc::new(RecordingRuntime::new(settings.local_package_dir(), false));
        let builder = ContainerBuilder::new(settings, runtime.clone());

        let err = builder.build(&request("hello", "")).await.unwrap_err();
        assert!(matches!(err, BuildError::Environment { .. }));
        assert!(runtime.calls().is_empty());
    }
}
