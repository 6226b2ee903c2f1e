//! `stratum.toml` settings.
//!
//! Every section is optional; CLI flags override what is loaded here.

use crate::cli::GlobalArgs;
use crate::paths;
use anyhow::{Context, Result, bail};
use cloudkit::RetryConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StratumConfig {
    pub engine: EngineConfig,
    pub retry: RetrySettings,
    pub backend: BackendConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub jobs: usize,
    pub step_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            step_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Local backend state file; defaults to the state directory
    pub state_file: Option<String>,
    pub soft_delete_retention_days: i64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            soft_delete_retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// DNS-over-HTTPS endpoint for recursion
    pub upstream: Option<String>,
    /// Suffix -> DNS-over-HTTPS endpoint
    pub forwarders: BTreeMap<String, String>,
    /// Hosts-format file used for recursion when no upstream is set
    pub hosts: Option<String>,
}

impl StratumConfig {
    /// Load from an explicit path (which must exist) or the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => {
                let path = paths::config_file()?;
                if !path.exists() {
                    log::debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Concurrency after CLI overrides.
    pub fn jobs(&self, global: &GlobalArgs) -> usize {
        global.jobs.unwrap_or(self.engine.jobs).max(1)
    }

    pub fn step_timeout(&self, global: &GlobalArgs) -> Option<Duration> {
        global
            .step_timeout
            .or(self.engine.step_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Backend state file after CLI overrides.
    pub fn state_file(&self, global: &GlobalArgs) -> Result<PathBuf> {
        if let Some(path) = &global.backend_state {
            return Ok(path.clone());
        }
        match &self.backend.state_file {
            Some(path) => Ok(paths::expand(path)),
            None => paths::backend_state_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let config: StratumConfig = toml::from_str(
            r#"
            [engine]
            jobs = 8
            step_timeout_secs = 600

            [retry]
            max_attempts = 6
            base_delay_ms = 250

            [backend]
            state_file = "/var/lib/stratum/backend.json"
            soft_delete_retention_days = 7

            [resolver]
            upstream = "https://dns.example/resolve"
            hosts = "/etc/stratum/hosts"

            [resolver.forwarders]
            "corp.example" = "https://dns.corp.example/resolve"
            "#,
        )
        .unwrap();

        let global = GlobalArgs::default();
        assert_eq!(config.jobs(&global), 8);
        assert_eq!(config.step_timeout(&global), Some(Duration::from_secs(600)));
        assert_eq!(
            config.state_file(&global).unwrap(),
            PathBuf::from("/var/lib/stratum/backend.json")
        );

        let retry = config.retry.to_retry_config();
        assert_eq!(retry.max_attempts, 6);
        assert_eq!(retry.base_delay, Duration::from_millis(250));
        assert!((retry.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.resolver.forwarders.len(), 1);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let config = StratumConfig::default();
        let global = GlobalArgs {
            jobs: Some(2),
            step_timeout: Some(30),
            backend_state: Some(PathBuf::from("/tmp/state.json")),
            ..Default::default()
        };
        assert_eq!(config.jobs(&global), 2);
        assert_eq!(config.step_timeout(&global), Some(Duration::from_secs(30)));
        assert_eq!(config.state_file(&global).unwrap(), PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: Result<StratumConfig, _> = toml::from_str("[engine]\nworkers = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(StratumConfig::load(Some(&missing)).is_err());

        let present = dir.path().join("stratum.toml");
        fs::write(&present, "[engine]\njobs = 3\n").unwrap();
        assert_eq!(StratumConfig::load(Some(&present)).unwrap().engine.jobs, 3);
    }
}
