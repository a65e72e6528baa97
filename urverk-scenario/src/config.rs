//! ## urverk-scenario::config
//! **Host runtime settings**
//!
//! Settings that belong to the host process, not to any one scenario.
//! Hierarchy: defaults, then `urverk.yaml` next to the working directory,
//! then `URVERK_`-prefixed environment variables.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ScenarioError;

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct HostConfig {
    /// Default log filter when no CLI flag overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Wrap every dynamics in the call-logging shell.
    #[serde(default)]
    pub trace_models: bool,

    /// Idle event buffers the kernel pool retains between bags.
    #[serde(default = "default_pool_retention")]
    #[validate(range(min = 1, max = 65536))]
    pub pool_retention: usize,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_pool_retention() -> usize {
    64
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            trace_models: false,
            pool_retention: default_pool_retention(),
        }
    }
}

impl HostConfig {
    pub fn load() -> Result<Self, ScenarioError> {
        let mut figment = Figment::from(Serialized::defaults(HostConfig::default()));
        if Path::new("urverk.yaml").exists() {
            figment = figment.merge(Yaml::file("urverk.yaml"));
        }
        let config: HostConfig = figment
            .merge(Env::prefixed("URVERK_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let config: HostConfig = Figment::from(Serialized::defaults(HostConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("URVERK_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = HostConfig::default();
        config.validate().unwrap();
        assert_eq!(config.log_level, "info");
        assert!(!config.trace_models);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urverk.yaml");
        std::fs::write(&path, "log_level: debug\ntrace_models: true\n").unwrap();
        let config = HostConfig::load_from_path(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.trace_models);
        assert_eq!(config.pool_retention, 64);
    }

    #[test]
    fn out_of_range_retention_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urverk.yaml");
        std::fs::write(&path, "pool_retention: 0\n").unwrap();
        assert!(HostConfig::load_from_path(&path).is_err());
    }
}
