//! Configuration loader with tier-based merging.
//!
//! A deployment directory carries up to two configuration tiers:
//! - the **template**, shipped with a release and possibly updated between
//!   deployments
//! - the **working** configuration, written back by the previous deployment
//!   with every generated value frozen
//!
//! The working tier is merged first, so its values win unless the installer
//! configuration's update policy says otherwise.

use super::tree::ConfigTree;
use super::types::{INSTALLER_CONFIG_FILENAME, InstallerConfig};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default working configuration filename.
pub const WORKING_CONFIG_FILENAME: &str = "stack.yml";
/// Default template configuration filename.
pub const TEMPLATE_CONFIG_FILENAME: &str = "stack.template";

/// Configuration tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Release template
    Template = 0,
    /// Configuration frozen by the previous deployment
    Working = 1,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Template => write!(f, "template"),
            ConfigTier::Working => write!(f, "working"),
        }
    }
}

/// Paths for each configuration tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub working: PathBuf,
    pub template: PathBuf,
    pub installer: PathBuf,
}

impl ConfigPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::with_names(
            dir,
            WORKING_CONFIG_FILENAME,
            TEMPLATE_CONFIG_FILENAME,
            INSTALLER_CONFIG_FILENAME,
        )
    }

    /// Explicit file names inside `dir`.
    pub fn with_names(dir: &Path, working: &str, template: &str, installer: &str) -> Self {
        Self {
            working: dir.join(working),
            template: dir.join(template),
            installer: dir.join(installer),
        }
    }

    pub fn path(&self, tier: ConfigTier) -> &Path {
        match tier {
            ConfigTier::Template => &self.template,
            ConfigTier::Working => &self.working,
        }
    }
}

/// Loads the configuration tiers and merges them into one tree.
#[derive(Debug)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    tree: ConfigTree,
    tiers: Vec<ConfigTier>,
}

impl ConfigLoader {
    /// Load both tiers with the update policy from the installer config.
    ///
    /// Missing tiers are skipped; with neither present the tree is empty.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let installer = InstallerConfig::load_or_default(&paths.installer)?;
        let working = ConfigTree::load_optional(&paths.working)?;
        let template = ConfigTree::load_optional(&paths.template)?;

        let mut tiers = Vec::new();
        if template.is_some() {
            tiers.push(ConfigTier::Template);
        }
        if working.is_some() {
            tiers.push(ConfigTier::Working);
        }
        for tier in &tiers {
            debug!(tier = %tier, path = %paths.path(*tier).display(), "Loaded configuration tier");
        }

        let tree = match (working, template) {
            (Some(working), Some(template)) => {
                info!(
                    policy = %installer.update.policy,
                    allow_list = ?installer.update.allow_list,
                    "Merging template into working configuration"
                );
                ConfigTree::merge(
                    &working,
                    &template,
                    installer.update.policy,
                    &installer.update.allow_list,
                )?
            }
            (Some(tree), None) | (None, Some(tree)) => tree,
            (None, None) => {
                debug!("No working configuration nor template, using an empty tree");
                ConfigTree::new()
            }
        };

        Ok(Self {
            paths,
            tree,
            tiers,
        })
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Tiers found on disk, lowest precedence first.
    pub fn tiers(&self) -> &[ConfigTier] {
        &self.tiers
    }

    pub fn has_tier(&self, tier: ConfigTier) -> bool {
        self.tiers.contains(&tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_tier() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::load_with_paths(ConfigPaths::in_dir(temp.path())).unwrap();
        assert!(loader.tiers().is_empty());
        assert!(loader.tree().servers().is_empty());
    }

    #[test]
    fn test_template_only() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(TEMPLATE_CONFIG_FILENAME),
            "global:\n  ns1:\n    auto:\n      VAR1: random_uuid\n",
        )
        .unwrap();
        let loader = ConfigLoader::load_with_paths(ConfigPaths::in_dir(temp.path())).unwrap();
        assert_eq!(loader.tiers(), &[ConfigTier::Template]);
        assert!(loader.tree().global_envs().has_env("ns1", "VAR1"));
    }

    #[test]
    fn test_working_values_win_by_default() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(TEMPLATE_CONFIG_FILENAME),
            "global:\n  ns1:\n    constant:\n      VAR1: template\n      VAR2: template\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join(WORKING_CONFIG_FILENAME),
            "global:\n  ns1:\n    constant:\n      VAR1: working\n",
        )
        .unwrap();
        let loader = ConfigLoader::load_with_paths(ConfigPaths::in_dir(temp.path())).unwrap();
        assert!(loader.has_tier(ConfigTier::Working));
        let global = loader.tree().global_envs();
        assert_eq!(global.get_env("ns1", "VAR1").unwrap(), "working");
        assert_eq!(global.get_env("ns1", "VAR2").unwrap(), "template");
    }

    #[test]
    fn test_allow_list_lets_template_win() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(TEMPLATE_CONFIG_FILENAME),
            "global:\n  ns1:\n    constant:\n      VAR1: template\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join(WORKING_CONFIG_FILENAME),
            "global:\n  ns1:\n    constant:\n      VAR1: working\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join(INSTALLER_CONFIG_FILENAME),
            "update:\n  allow_list: [\"global.*\"]\n",
        )
        .unwrap();
        let loader = ConfigLoader::load_with_paths(ConfigPaths::in_dir(temp.path())).unwrap();
        let global = loader.tree().global_envs();
        assert_eq!(global.get_env("ns1", "VAR1").unwrap(), "template");
    }

    #[test]
    fn test_invalid_tier_reports_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(WORKING_CONFIG_FILENAME), "bogus: {}\n").unwrap();
        let err = ConfigLoader::load_with_paths(ConfigPaths::in_dir(temp.path())).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains(WORKING_CONFIG_FILENAME), "{message}");
        assert!(message.contains("unknown section 'bogus'"), "{message}");
    }
}
