//! Loading the raw configuration tree from file and environment

use crate::error::{ConfigError, Result};
use crate::tree::ConfigTree;
use crate::value::ConfigValue;
use std::path::Path;
use tracing::debug;

/// Base name searched for when no explicit file is given
/// (`skybridge.yaml`, `skybridge.yml`, `skybridge.json`, `skybridge.toml`)
pub const CONFIG_BASENAME: &str = "skybridge";

/// Environment variable prefix (`SKYBRIDGE_REGION`, `SKYBRIDGE_DEFAULTS__STAGE`)
pub const ENV_PREFIX: &str = "SKYBRIDGE";

/// Load the raw configuration tree
///
/// Reads `path` (or searches for [`CONFIG_BASENAME`] in the working
/// directory) and overlays environment variables. A missing file is an
/// error. Nothing is resolved here.
pub fn load_tree(path: Option<&Path>) -> Result<ConfigTree> {
    let mut builder = config::Config::builder();

    builder = match path {
        Some(path) => builder.add_source(config::File::from(path).required(true)),
        None => builder.add_source(config::File::with_name(CONFIG_BASENAME).required(true)),
    };

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let value: ConfigValue = builder.build()?.try_deserialize()?;
    match value {
        ConfigValue::Mapping(_) => {
            let tree = ConfigTree::from_value(value);
            debug!(keys = tree.entries().len(), "Loaded configuration");
            Ok(tree)
        }
        ConfigValue::Absent => Ok(ConfigTree::new()),
        _ => Err(ConfigError::Invalid(
            "configuration root must be a mapping".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "region: eu-west-1\nserverless:\n  functions:\n    hello:\n      memorySize: 256"
        )
        .unwrap();

        let tree = load_tree(Some(file.path())).unwrap();
        assert_eq!(tree.get_string("region"), "eu-west-1");
        assert_eq!(tree.get_i64("serverless.functions.hello.memorysize"), 256);
    }

    #[test]
    fn test_environment_overlay() {
        std::env::set_var("SKYBRIDGE_LOADERTEST__STAGE", "qa");
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "loadertest:\n  stage: dev\n  runtime: node").unwrap();

        let tree = load_tree(Some(file.path())).unwrap();
        std::env::remove_var("SKYBRIDGE_LOADERTEST__STAGE");

        assert_eq!(tree.get_string("loadertest.stage"), "qa");
        assert_eq!(tree.get_string("loadertest.runtime"), "node");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_tree(Some(&dir.path().join("absent.yaml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
