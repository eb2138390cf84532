//! YAML configuration loading.
//!
//! Loads an [`ExperimentConfig`] from a YAML file on disk. Fields left out of
//! the file keep their default constants.

use crate::{ArpGuardError, ExperimentConfig, Result};
use std::path::Path;

/// Load and validate an [`ExperimentConfig`] from a YAML file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the YAML is invalid, or a
/// value fails [`ExperimentConfig::validate`].
pub fn load_config(path: &Path) -> Result<ExperimentConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ArpGuardError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let config: ExperimentConfig = serde_yaml::from_str(&contents)
        .map_err(|e| ArpGuardError::Config(format!("Failed to parse config YAML: {}", e)))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper to write YAML to a temp file and return the path.
    fn write_yaml(yaml: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_config_full() {
        let yaml = r#"
masking:
  fraction: 0.3
  sentinel: 0.0
pretext:
  epochs: 5
  batch_size: 32
  learning_rate: 0.01
downstream:
  epochs: 3
  batch_size: 16
  learning_rate: 0.005
model:
  hidden_dim: 16
  embedding_dim: 8
  dropout: 0.0
seed: 7
logging:
  level: debug
"#;
        let f = write_yaml(yaml);
        let config = load_config(f.path()).unwrap();
        assert!((config.masking.fraction - 0.3).abs() < 1e-12);
        assert_eq!(config.pretext.epochs, 5);
        assert_eq!(config.downstream.batch_size, 16);
        assert_eq!(config.model.embedding_dim, 8);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_config_partial_keeps_defaults() {
        let f = write_yaml("seed: 42\npretext:\n  epochs: 2\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.pretext.epochs, 2);
        assert_eq!(config.pretext.batch_size, 64);
        assert_eq!(config.downstream, crate::StageConfig::default());
    }

    #[test]
    fn test_load_config_invalid_value() {
        let f = write_yaml("masking:\n  fraction: -0.1\n");
        let result = load_config(f.path());
        assert!(matches!(result, Err(ArpGuardError::Config(_))));
    }

    #[test]
    fn test_load_config_malformed_yaml() {
        let f = write_yaml("pretext: [not, a, map");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/arpguard.yaml"));
        assert!(result.is_err());
    }
}
