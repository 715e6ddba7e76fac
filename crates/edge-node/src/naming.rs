//! Environment-specific resource names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl DeployEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "dev",
            DeployEnv::Staging => "staging",
            DeployEnv::Prod => "prod",
        }
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(DeployEnv::Dev),
            "staging" | "stage" => Ok(DeployEnv::Staging),
            "prod" | "production" => Ok(DeployEnv::Prod),
            other => Err(format!("unknown deployment environment '{}'", other)),
        }
    }
}

/// Builds `{project}-{environment}-{base}` names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNamer {
    project: String,
    environment: DeployEnv,
}

impl ResourceNamer {
    pub fn new(project: impl Into<String>, environment: DeployEnv) -> Self {
        Self {
            project: project.into(),
            environment,
        }
    }

    pub fn name(&self, base: &str) -> String {
        format!("{}-{}-{}", self.project, self.environment, base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_names() {
        let namer = ResourceNamer::new("marketplace", DeployEnv::Staging);
        assert_eq!(namer.name("orders"), "marketplace-staging-orders");
    }

    #[test]
    fn test_parse_env() {
        assert_eq!("PROD".parse::<DeployEnv>().unwrap(), DeployEnv::Prod);
        assert_eq!("development".parse::<DeployEnv>().unwrap(), DeployEnv::Dev);
        assert!("qa".parse::<DeployEnv>().is_err());
    }
}
