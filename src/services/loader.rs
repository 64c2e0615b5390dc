//! # Services-file loader.
//!
//! Reads a YAML document, takes its `services` section and turns it into
//! `name → ServiceSpec`. Invoked once, before the registry is built.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::services::ServiceSpec;

/// Conventional services-file name used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "procvisor.yaml";

/// Top-level document; only `services` is read, other keys are ignored.
#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    services: Option<BTreeMap<String, ServiceSpec>>,
}

/// Loads and validates the services file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<BTreeMap<String, ServiceSpec>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let services = parse_str(&text, path)?;
    debug!(path = %path.display(), count = services.len(), "services loaded");
    Ok(services)
}

/// Parses and validates a services document; `origin` is only used in errors.
pub fn parse_str(
    text: &str,
    origin: impl Into<PathBuf>,
) -> Result<BTreeMap<String, ServiceSpec>, ConfigError> {
    let file: ConfigFile = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
        path: origin.into(),
        source,
    })?;

    let Some(mut services) = file.services else {
        return Err(ConfigError::Invalid {
            reason: "missing `services` section".into(),
        });
    };

    for (name, spec) in services.iter_mut() {
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "service names must not be empty".into(),
            });
        }
        if spec.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: format!("service {name:?} has an empty command"),
            });
        }
        spec.name = name.clone();
    }
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
version: 1
services:
  A:
    command: "true"
  B:
    command: "false"
    hooks:
      wait: [A]
  C:
    cwd: /tmp
    command: sleep 5
    ignore_failures: false
    auto_restart: true
    environs:
      PORT: 8080
"#;

    #[test]
    fn parses_services_and_fills_names() {
        let services = parse_str(SAMPLE, "inline").unwrap();
        assert_eq!(services.len(), 3);
        assert_eq!(services["A"].name, "A");
        assert_eq!(services["B"].hooks.wait, vec!["A"]);
        assert_eq!(services["C"].cwd, "/tmp");
        assert!(services["C"].auto_restart);
        assert_eq!(services["C"].environs["PORT"], "8080");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let services = load(file.path()).unwrap();
        assert!(services.contains_key("B"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load("/definitely/not/here.yaml").unwrap_err();
        assert_eq!(err.as_label(), "config_io");
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = parse_str("services: [unclosed", "inline").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn schema_mismatch_is_parse_error() {
        let err = parse_str("services:\n  a:\n    command: x\n    restart: yes\n", "inline")
            .unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn missing_section_and_empty_command_are_invalid() {
        let err = parse_str("other: 1\n", "inline").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");

        let err = parse_str("services:\n  a:\n    command: \"  \"\n", "inline").unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
