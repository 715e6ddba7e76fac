//! # Node Configuration
//!
//! One TOML file (`EDGE_CONFIG`, default `edge.toml`) with environment
//! overrides applied on top. A missing file means the built-in reference
//! deployment.
//!
//! | Variable             | Overrides                  |
//! |----------------------|----------------------------|
//! | `EDGE_ORIGIN_SECRET` | `router.origin_secret`     |
//! | `EDGE_DEPLOY_ENV`    | `deployment.environment`   |
//! | `EDGE_USE_AUTH`      | `router.use_auth`          |
//!
//! ## Security Requirements
//!
//! - The origin secret must be set whenever a rule requires it
//! - Authentication cannot be disabled in `prod`

use edge_router::{AuthConfig, RouterConfig, RuleConfigError};
use event_fanout::{FanoutConfig, FanoutError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::naming::{DeployEnv, ResourceNamer};

pub const CONFIG_PATH_ENV: &str = "EDGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "edge.toml";

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub deployment: DeploymentConfig,
    pub router: RouterConfig,
    pub auth: AuthConfig,
    pub fanout: FanoutConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub project: String,
    pub environment: DeployEnv,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            project: "marketplace".to_string(),
            environment: DeployEnv::Dev,
        }
    }
}

/// Background housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// How often expired auth decisions and dead letters are purged.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How long shutdown waits for consumers to finish.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(35),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("invalid routing rules: {0}")]
    Rules(#[from] RuleConfigError),

    #[error("invalid fan-out topology: {0}")]
    Fanout(#[from] FanoutError),
}

impl NodeConfig {
    /// Load from `EDGE_CONFIG` (or `edge.toml`) and apply environment
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "Loaded configuration file");
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup("EDGE_ORIGIN_SECRET") {
            self.router.origin_secret = secret;
            info!("Loaded origin secret from environment");
        }

        if let Some(env) = lookup("EDGE_DEPLOY_ENV") {
            match env.parse() {
                Ok(env) => self.deployment.environment = env,
                Err(e) => warn!(error = %e, "Ignoring EDGE_DEPLOY_ENV"),
            }
        }

        if let Some(flag) = lookup("EDGE_USE_AUTH") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.router.use_auth = true,
                "0" | "false" | "no" | "off" => self.router.use_auth = false,
                other => warn!(value = %other, "Ignoring EDGE_USE_AUTH"),
            }
        }
    }

    /// Validate everything once, before anything is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deployment.project.trim().is_empty() {
            return Err(ConfigError::Validation(
                "deployment.project cannot be empty".into(),
            ));
        }
        if self.router.target.trim().is_empty() {
            return Err(ConfigError::Validation(
                "router.target cannot be empty".into(),
            ));
        }
        if self.maintenance.interval.is_zero() {
            return Err(ConfigError::Validation(
                "maintenance.interval cannot be 0".into(),
            ));
        }

        self.router.compile()?;
        self.auth.validate()?;
        self.fanout.validate()?;

        if self.deployment.environment == DeployEnv::Prod && !self.router.use_auth {
            return Err(ConfigError::Validation(
                "authentication cannot be disabled in prod".into(),
            ));
        }
        Ok(())
    }

    pub fn namer(&self) -> ResourceNamer {
        ResourceNamer::new(
            self.deployment.project.clone(),
            self.deployment.environment,
        )
    }
}
