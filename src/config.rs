//! Runtime configuration: a TOML file plus environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Overrides `machine.max_steps`.
pub const ENV_MAX_STEPS: &str = "TORQ_MAX_STEPS";
/// Overrides `log.filter`.
pub const ENV_LOG: &str = "TORQ_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {error}", path.display())]
    Read { path: PathBuf, error: std::io::Error },
    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("{var} must be a number, got '{value}'")]
    Env { var: &'static str, value: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "TQ-C001",
            ConfigError::Parse { .. } => "TQ-C002",
            ConfigError::Env { .. } => "TQ-C003",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub machine: MachineConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Statements one run may execute; 0 is unlimited.
    pub max_steps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { filter: "warn".to_string(), json: false }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        Config::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<Config, String> {
        toml::from_str(content).map_err(|err| err.to_string())
    }

    /// Applies `TORQ_MAX_STEPS` and `TORQ_LOG` from the process environment.
    pub fn with_env(self) -> Result<Config, ConfigError> {
        self.with_vars(|var| std::env::var(var).ok())
    }

    fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        if let Some(value) = lookup(ENV_MAX_STEPS) {
            self.machine.max_steps = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { var: ENV_MAX_STEPS, value })?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log.filter = filter;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log.filter, "warn");
        assert_eq!(config.machine.max_steps, 0);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::parse("[machine]\nmax_steps = 500\n").unwrap();
        assert_eq!(config.machine.max_steps, 500);
        assert!(!config.log.json);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("[machine]\nmax_step = 5\n").is_err());
    }

    #[test]
    fn env_overrides() {
        let config = Config::default()
            .with_vars(|var| match var {
                ENV_MAX_STEPS => Some("42".to_string()),
                ENV_LOG => Some("torqlang=debug".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.machine.max_steps, 42);
        assert_eq!(config.log.filter, "torqlang=debug");

        let err = Config::default()
            .with_vars(|var| (var == ENV_MAX_STEPS).then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(err.code(), "TQ-C003");
    }

    #[test]
    fn load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[log]\njson = true").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert!(config.log.json);

        let err = Config::load(Path::new("/nonexistent/torq.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert_eq!(err.code(), "TQ-C001");
    }
}
