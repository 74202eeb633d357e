//! Installer configuration types.
//!
//! Controls how a fresh template is merged into an existing working
//! configuration on redeploy.

use crate::env::MergePolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default installer configuration filename.
pub const INSTALLER_CONFIG_FILENAME: &str = "installer_config.yml";

/// Update policy applied when the template changes between deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Merge policy (default: `update_new_only`, i.e. allow list).
    #[serde(default)]
    pub policy: MergePolicy,

    /// Dotted paths whose template values replace working values,
    /// e.g. `global.*` or `services.default.core.JAVA_OPTS`.
    #[serde(default)]
    pub allow_list: Vec<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            policy: MergePolicy::AllowList,
            allow_list: Vec::new(),
        }
    }
}

/// Root of `installer_config.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default)]
    pub update: UpdateConfig,
}

impl InstallerConfig {
    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Handle empty or comment-only YAML files (which parse as null)
        let config: Option<InstallerConfig> = serde_yaml::from_str(&content)?;
        Ok(config.unwrap_or_default())
    }

    /// Load from a YAML file, or return defaults if it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
