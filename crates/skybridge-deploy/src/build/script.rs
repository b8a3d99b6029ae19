//! Package settings and the in-container build script

use super::BuildRequest;
use crate::paths;
use skybridge_config::ResolvedConfig;
use std::path::{Path, PathBuf};

/// Where the project directory is mounted inside build containers
pub const CONTAINER_ROOT: &str = "/cwd";

const DEFAULT_BUILD_DIR: &str = ".skybridge";
const DEFAULT_REQUIREMENTS_FILE: &str = "requirements.txt";
const DEFAULT_IMAGE: &str = "docker.io/lambci/lambda:build-{runtime}";

/// `serverless.package.*` settings plus the local project directory
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSettings {
    /// Local directory mounted at [`CONTAINER_ROOT`]
    pub project_dir: PathBuf,
    /// `serverless.rootDir`, relative to the project directory
    pub root_dir: String,
    /// Build directory, relative to the root dir
    pub build_dir: String,
    /// Requirements file name looked up in each source directory
    pub requirements_file: String,
    pub cleanup: bool,
    /// Image reference; `{runtime}` is replaced by the function runtime
    pub image: String,
    pub global_requirements: Vec<String>,
    pub global_includes: Vec<String>,
}

impl BuildSettings {
    pub fn from_snapshot(snapshot: &ResolvedConfig, project_dir: impl Into<PathBuf>) -> Self {
        let tree = snapshot.tree();
        let or_default = |path: &str, default: &str| {
            let value = tree.get_string(path);
            if value.is_empty() {
                default.to_string()
            } else {
                value
            }
        };

        Self {
            project_dir: project_dir.into(),
            root_dir: or_default("serverless.rootdir", "."),
            build_dir: or_default("serverless.package.builddir", DEFAULT_BUILD_DIR),
            requirements_file: or_default(
                "serverless.package.requirementsfile",
                DEFAULT_REQUIREMENTS_FILE,
            ),
            cleanup: tree.get_bool("serverless.package.cleanup"),
            image: or_default("serverless.package.image", DEFAULT_IMAGE),
            global_requirements: tree.get_string_vec("serverless.package.globalrequirements"),
            global_includes: tree.get_string_vec("serverless.package.globalincludes"),
        }
    }

    pub fn image_for(&self, runtime: &str) -> String {
        self.image.replace("{runtime}", runtime)
    }

    pub fn container_root_dir(&self) -> String {
        paths::join(&[CONTAINER_ROOT, &self.root_dir])
    }

    pub fn container_build_dir(&self) -> String {
        paths::join(&[&self.container_root_dir(), &self.build_dir])
    }

    pub fn container_package_dir(&self) -> String {
        paths::join(&[&self.container_build_dir(), "packages"])
    }

    pub fn local_build_dir(&self) -> PathBuf {
        self.project_dir.join(&self.root_dir).join(&self.build_dir)
    }

    pub fn local_package_dir(&self) -> PathBuf {
        self.local_build_dir().join("packages")
    }

    /// Local path of the archive built for `name`
    pub fn package_file(&self, name: &str) -> PathBuf {
        self.local_package_dir().join(archive_name(name))
    }

    /// Name of the script file written for `name`
    pub fn script_name(name: &str) -> String {
        format!("build-{name}.sh")
    }

    /// Local path the script for `name` is written to
    pub fn local_script_path(&self, name: &str) -> PathBuf {
        self.local_build_dir().join(Self::script_name(name))
    }

    /// Container path of the script for `name`
    pub fn container_script_path(&self, name: &str) -> String {
        paths::join(&[&self.container_build_dir(), &Self::script_name(name)])
    }
}

fn archive_name(name: &str) -> String {
    format!("{name}.zip")
}

/// Single-quote `value` for `sh`
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render the script that packages `request` inside its build container
///
/// The script copies the sources into the build dir, installs the unit's
/// requirements and the global requirements that exist, copies the global
/// includes, then zips the result into the packages dir. Any failing
/// command fails the script.
pub fn render_script(settings: &BuildSettings, request: &BuildRequest) -> String {
    let root_dir = settings.container_root_dir();
    let build_dir = settings.container_build_dir();
    let source_path = paths::join(&[&root_dir, &request.source]);
    let build_path = paths::join(&[&build_dir, &paths::base(&source_path)]);
    let requirements = paths::join(&[&source_path, &settings.requirements_file]);
    let package_file = paths::join(&[
        &settings.container_package_dir(),
        &archive_name(&request.name),
    ]);

    let build_path_q = shell_quote(&build_path);
    let mut lines = vec![
        "#!/bin/sh".to_string(),
        "set -e".to_string(),
        format!("rm -rf {build_path_q}"),
        format!("cp -rf {} {}", shell_quote(&source_path), shell_quote(&build_dir)),
        format!("cd {build_path_q}"),
    ];

    for file in std::iter::once(requirements).chain(
        settings
            .global_requirements
            .iter()
            .map(|name| paths::join(&[&root_dir, name])),
    ) {
        let file = shell_quote(&file);
        lines.push(format!("if [ -f {file} ]; then pip install -r {file} -t .; fi"));
    }
    for include in &settings.global_includes {
        let include = paths::join(&[&root_dir, include]);
        lines.push(format!("cp -rf {}/. .", shell_quote(&include)));
    }

    let package_file = shell_quote(&package_file);
    lines.push(format!("rm -f {package_file}"));
    lines.push(format!("zip -r9 -q {package_file} ."));

    if settings.cleanup {
        lines.push(format!("cd {}", shell_quote(&build_dir)));
        lines.push(format!("rm -rf {build_path_q}"));
        lines.push("rm -f -- \"$0\"".to_string());
    }

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Whether `path` is an archive the build left behind
pub(crate) async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
