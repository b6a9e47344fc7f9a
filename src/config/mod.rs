//! Engine configuration loaded from `htmlsync.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── error      # ConfigError
//! ├── handle     # Global config handle
//! └── mod.rs     # SyncConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section  | Purpose                                             |
//! |----------|-----------------------------------------------------|
//! | `[sync]` | Debounce delay, echo timeout, string sanitizing     |
//! | `[log]`  | Verbose debug tracing                               |

mod error;
mod handle;

pub use error::ConfigError;
pub use handle::{CONFIG, cfg, init_config, reload_config};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Default config file name.
pub const CONFIG_FILE: &str = "htmlsync.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing htmlsync.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Change propagation settings
    #[serde(default)]
    pub sync: SyncSectionConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogSectionConfig,
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSectionConfig {
    /// Delay before buffered client edits are processed.
    pub debounce_ms: u64,
    /// Lifetime of a "recently sent" marker awaiting its echo.
    pub timeout_ms: u64,
    /// HTML-escape string values pushed into client data containers.
    pub sanitize_strings: bool,
}

impl Default for SyncSectionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            timeout_ms: 20_000,
            sanitize_strings: true,
        }
    }
}

impl SyncSectionConfig {
    #[inline]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSectionConfig {
    pub verbose: bool,
}

impl SyncConfig {
    /// Load and validate configuration from a file.
    ///
    /// Unknown fields are reported as warnings and otherwise ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load `htmlsync.toml` from `dir`, falling back to defaults if absent.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("config"; "unknown fields in {}, ignoring: {}", display_path, fields.join(", "));
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.timeout_ms == 0 {
            return Err(ConfigError::invalid("sync.timeout_ms", "must be greater than 0"));
        }
        if self.sync.debounce_ms >= self.sync.timeout_ms {
            return Err(ConfigError::invalid(
                "sync.debounce_ms",
                format!("{} must be smaller than timeout_ms ({})", self.sync.debounce_ms, self.sync.timeout_ms),
            ));
        }
        Ok(())
    }
}

/// Parse a config snippet for tests, asserting there are no unknown fields.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SyncConfig {
    let (parsed, ignored) = SyncConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.sync.debounce_ms, 50);
        assert_eq!(config.sync.timeout_ms, 20_000);
        assert!(config.sync.sanitize_strings);
        assert!(!config.log.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section() {
        let config = test_parse_config("[sync]\ndebounce_ms = 10\n");
        assert_eq!(config.sync.debounce(), Duration::from_millis(10));
        assert_eq!(config.sync.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_unknown_fields_collected() {
        let (_, ignored) =
            SyncConfig::parse_with_ignored("[sync]\ndebounse_ms = 10\n[extra]\nx = 1\n").unwrap();
        assert!(ignored.iter().any(|f| f.contains("debounse_ms")));
        assert!(ignored.iter().any(|f| f.contains("extra")));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = test_parse_config("[sync]\ndebounce_ms = 0\ntimeout_ms = 0\n");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { field: "sync.timeout_ms", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_debounce_over_timeout() {
        let config = test_parse_config("[sync]\ndebounce_ms = 500\ntimeout_ms = 100\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[sync]\ntimeout_ms = 1000\n[log]\nverbose = true").unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.sync.timeout_ms, 1000);
        assert!(config.log.verbose);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::load(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());

        let config = SyncConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, SyncConfig::default());
    }
}
