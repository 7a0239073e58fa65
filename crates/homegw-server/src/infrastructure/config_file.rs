//! TOML persistence for [`GatewayConfig`].
//!
//! The gateway reads one TOML file at start-up.  A missing file is not an
//! error: the built-in defaults (listener on `0.0.0.0:8443`, one `admin`
//! account) are used instead, so a fresh install runs without any setup
//! beyond the TLS material.  A file that exists but does not parse *is* an
//! error; silently ignoring a typo in a security-relevant file would be worse.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::GatewayConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Loads the configuration at `path`, returning defaults if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &GatewayConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();

        // Act
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();

        // Assert
        assert_eq!(cfg, GatewayConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_changes() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("homegw.toml");
        let mut cfg = GatewayConfig::default();
        cfg.server.port = 10443;
        cfg.discovery.node_name = "attic".to_string();
        cfg.server.www_root = Some(PathBuf::from("/srv/www"));

        // Act
        save_config(&path, &cfg).unwrap();
        let restored = load_config(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_absent_www_root_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homegw.toml");

        save_config(&path, &GatewayConfig::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("www_root"));
    }
}
